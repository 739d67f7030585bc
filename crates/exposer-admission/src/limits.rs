//! Concurrent job limits stored in Postgres
//!
//! `job_limits(launcher, concurrent_jobs)` holds one row per user override
//! and a single row with a NULL launcher for the system default. Launcher
//! names are matched with the first dash replaced by an underscore.

use async_trait::async_trait;
use exposer_common::Error;
use sqlx::PgPool;

#[cfg(test)]
use mockall::automock;

const USER_JOB_LIMIT_SQL: &str = r#"
    SELECT concurrent_jobs FROM job_limits
    WHERE launcher = regexp_replace($1, '-', '_')
"#;

const DEFAULT_JOB_LIMIT_SQL: &str = r#"
    SELECT concurrent_jobs FROM job_limits
    WHERE launcher IS NULL
"#;

/// Trait abstracting job limit lookups
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobLimitStore: Send + Sync {
    /// Override for a user; `None` when the user has no row
    async fn user_job_limit(&self, username: &str) -> Result<Option<i32>, Error>;

    /// System-wide default; `None` when no default row exists
    async fn default_job_limit(&self) -> Result<Option<i32>, Error>;
}

/// Postgres implementation
#[derive(Clone)]
pub struct PgJobLimitStore {
    pool: PgPool,
}

impl PgJobLimitStore {
    /// Create a store over a pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLimitStore for PgJobLimitStore {
    async fn user_job_limit(&self, username: &str) -> Result<Option<i32>, Error> {
        let limit = sqlx::query_scalar::<_, i32>(USER_JOB_LIMIT_SQL)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(limit)
    }

    async fn default_job_limit(&self) -> Result<Option<i32>, Error> {
        let limit = sqlx::query_scalar::<_, i32>(DEFAULT_JOB_LIMIT_SQL)
            .fetch_optional(&self.pool)
            .await?;
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_normalize_launcher_in_sql() {
        assert!(USER_JOB_LIMIT_SQL.contains("regexp_replace($1, '-', '_')"));
        assert!(DEFAULT_JOB_LIMIT_SQL.contains("launcher IS NULL"));
    }
}
