//! Instant launches
//!
//! An instant launch binds a saved quick launch to a file pattern so the UI
//! can offer one-click launches. The default mappings are versioned; each
//! version is a full pattern → selector map stored as JSON. A user mapping
//! overrides the defaults for one user.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use exposer_common::Error;
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;
use sqlx::PgPool;

#[cfg(test)]
use mockall::automock;

use crate::error::ApiError;
use crate::server::AppState;

/// A quick launch registered for instant launching
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstantLaunch {
    /// Instant launch id
    pub id: String,
    /// Quick launch it starts
    pub quick_launch_id: String,
    /// User who registered it
    pub added_by: String,
    /// When it was registered
    pub added_on: DateTime<Utc>,
}

/// Default and compatible instant launches for a file pattern
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstantLaunchSelector {
    /// Pattern matched against the file
    pub pattern: String,
    /// What the pattern matches, e.g. `glob` or `infoType`
    #[serde(alias = "type")]
    pub kind: String,
    /// Instant launch used when the pattern matches
    pub default: InstantLaunch,
    /// Other instant launches that can open a match
    #[serde(default)]
    pub compatible: Vec<InstantLaunch>,
}

/// Pattern to selector
pub type InstantLaunchMapping = BTreeMap<String, InstantLaunchSelector>;

/// One version of the default mapping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefaultInstantLaunchMapping {
    /// Row id
    pub id: String,
    /// Monotonic version number
    pub version: i32,
    /// The mapping itself
    pub mapping: InstantLaunchMapping,
}

/// A user's mapping, overriding the defaults
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserInstantLaunchMapping {
    /// Row id
    pub id: String,
    /// Version of the user's mapping
    pub version: i32,
    /// Owning user's id
    pub user_id: String,
    /// The mapping itself
    pub mapping: InstantLaunchMapping,
}

type MappingRow = (String, i32, SqlJson<InstantLaunchMapping>);
type UserMappingRow = (String, i32, String, SqlJson<InstantLaunchMapping>);

impl From<MappingRow> for DefaultInstantLaunchMapping {
    fn from((id, version, mapping): MappingRow) -> Self {
        Self {
            id,
            version,
            mapping: mapping.0,
        }
    }
}

impl From<UserMappingRow> for UserInstantLaunchMapping {
    fn from((id, version, user_id, mapping): UserMappingRow) -> Self {
        Self {
            id,
            version,
            user_id,
            mapping: mapping.0,
        }
    }
}

/// Trait abstracting instant launch storage
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstantLaunchStore: Send + Sync {
    /// All registered instant launches
    async fn list_instant_launches(&self) -> Result<Vec<InstantLaunch>, Error>;

    /// Every version of the default mapping, oldest first
    async fn list_defaults(&self) -> Result<Vec<DefaultInstantLaunchMapping>, Error>;

    /// Highest version of the default mapping
    async fn latest_defaults(&self) -> Result<Option<DefaultInstantLaunchMapping>, Error>;

    /// One version of the default mapping
    async fn defaults_by_version(
        &self,
        version: i32,
    ) -> Result<Option<DefaultInstantLaunchMapping>, Error>;

    /// Newest mapping saved by `username`
    async fn latest_user_mapping(
        &self,
        username: &str,
    ) -> Result<Option<UserInstantLaunchMapping>, Error>;
}

const LIST_INSTANT_LAUNCHES_SQL: &str = r#"
    SELECT id::text, quick_launch_id::text, added_by::text, added_on
    FROM instant_launches
    ORDER BY added_on
"#;

const LIST_DEFAULTS_SQL: &str = r#"
    SELECT id::text, version, instant_launches
    FROM default_instant_launches
    ORDER BY version
"#;

const LATEST_DEFAULTS_SQL: &str = r#"
    SELECT id::text, version, instant_launches
    FROM default_instant_launches
    ORDER BY version DESC
    LIMIT 1
"#;

const DEFAULTS_BY_VERSION_SQL: &str = r#"
    SELECT id::text, version, instant_launches
    FROM default_instant_launches
    WHERE version = $1
"#;

const LATEST_USER_MAPPING_SQL: &str = r#"
    SELECT m.id::text, m.version, m.user_id::text, m.instant_launches
    FROM user_instant_launches m
    JOIN users u ON m.user_id = u.id
    WHERE u.username = $1
    ORDER BY m.version DESC
    LIMIT 1
"#;

/// Postgres implementation
#[derive(Clone)]
pub struct PgInstantLaunchStore {
    pool: PgPool,
}

impl PgInstantLaunchStore {
    /// Create a store over a connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstantLaunchStore for PgInstantLaunchStore {
    async fn list_instant_launches(&self) -> Result<Vec<InstantLaunch>, Error> {
        let rows = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            LIST_INSTANT_LAUNCHES_SQL,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, quick_launch_id, added_by, added_on)| InstantLaunch {
                id,
                quick_launch_id,
                added_by,
                added_on,
            })
            .collect())
    }

    async fn list_defaults(&self) -> Result<Vec<DefaultInstantLaunchMapping>, Error> {
        let rows = sqlx::query_as::<_, MappingRow>(LIST_DEFAULTS_SQL)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest_defaults(&self) -> Result<Option<DefaultInstantLaunchMapping>, Error> {
        let row = sqlx::query_as::<_, MappingRow>(LATEST_DEFAULTS_SQL)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn defaults_by_version(
        &self,
        version: i32,
    ) -> Result<Option<DefaultInstantLaunchMapping>, Error> {
        let row = sqlx::query_as::<_, MappingRow>(DEFAULTS_BY_VERSION_SQL)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn latest_user_mapping(
        &self,
        username: &str,
    ) -> Result<Option<UserInstantLaunchMapping>, Error> {
        let row = sqlx::query_as::<_, UserMappingRow>(LATEST_USER_MAPPING_SQL)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}

/// `GET /instantlaunches`
pub async fn list_instant_launches_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<InstantLaunch>>, ApiError> {
    Ok(Json(state.instant_launches.list_instant_launches().await?))
}

/// `GET /instantlaunches/default`
pub async fn list_defaults_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<DefaultInstantLaunchMapping>>, ApiError> {
    Ok(Json(state.instant_launches.list_defaults().await?))
}

/// `GET /instantlaunches/default/latest`
pub async fn latest_defaults_handler(
    State(state): State<AppState>,
) -> Result<Json<DefaultInstantLaunchMapping>, ApiError> {
    state
        .instant_launches
        .latest_defaults()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no default instant launch mapping".to_string()))
}

/// `GET /instantlaunches/default/{version}`
pub async fn defaults_by_version_handler(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<DefaultInstantLaunchMapping>, ApiError> {
    let version: i32 = version
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid mapping version '{version}'")))?;

    state
        .instant_launches
        .defaults_by_version(version)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("default instant launch mapping version {version} not found"))
        })
}

/// `GET /instantlaunches/user/{username}`
pub async fn latest_user_mapping_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserInstantLaunchMapping>, ApiError> {
    state
        .instant_launches
        .latest_user_mapping(&username)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no instant launch mapping for {username}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jupyter() -> serde_json::Value {
        serde_json::json!({
            "id": "il-jupyter",
            "quick_launch_id": "ql-jupyter",
            "added_by": "ipcdev",
            "added_on": "2021-03-04T17:02:11Z"
        })
    }

    #[test]
    fn selector_holds_instant_launches() {
        let mapping: InstantLaunchMapping = serde_json::from_value(serde_json::json!({
            "*.ipynb": {
                "pattern": "*.ipynb",
                "kind": "glob",
                "default": jupyter(),
                "compatible": [jupyter()]
            }
        }))
        .unwrap();
        let selector = &mapping["*.ipynb"];
        assert_eq!(selector.kind, "glob");
        assert_eq!(selector.default.id, "il-jupyter");
        assert_eq!(selector.default.quick_launch_id, "ql-jupyter");
        assert_eq!(selector.compatible.len(), 1);
        assert_eq!(
            selector.default.added_on.to_rfc3339(),
            "2021-03-04T17:02:11+00:00"
        );
    }

    #[test]
    fn selector_accepts_type_and_defaults_compatible() {
        let selector: InstantLaunchSelector = serde_json::from_value(serde_json::json!({
            "pattern": "*.R",
            "type": "glob",
            "default": jupyter()
        }))
        .unwrap();
        assert!(selector.compatible.is_empty());
        assert_eq!(serde_json::to_value(&selector).unwrap()["kind"], "glob");
    }

    #[test]
    fn selector_without_default_launch_is_rejected() {
        let parsed: Result<InstantLaunchSelector, _> = serde_json::from_value(serde_json::json!({
            "pattern": "*.R",
            "kind": "glob",
            "default": "il-rstudio"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn latest_queries_order_descending() {
        assert!(LATEST_DEFAULTS_SQL.contains("ORDER BY version DESC"));
        assert!(LATEST_DEFAULTS_SQL.contains("LIMIT 1"));
        assert!(DEFAULTS_BY_VERSION_SQL.contains("version = $1"));
        assert!(LATEST_USER_MAPPING_SQL.contains("u.username = $1"));
        assert!(LATEST_USER_MAPPING_SQL.contains("ORDER BY m.version DESC"));
    }
}
