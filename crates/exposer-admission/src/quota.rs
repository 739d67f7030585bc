//! Resource overage lookups against the quota service
//!
//! The quota service answers JSON request/reply messages on a NATS
//! subject. A request that gets no reply within the configured timeout
//! fails; there is no retry at this layer.

use std::time::Duration;

use async_trait::async_trait;
use exposer_common::Error;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Subject the quota service listens on for overage requests
pub const QUOTA_OVERAGES_SUBJECT: &str = "cyverse.qms.user.overages.get";

/// Default time to wait for a quota reply
pub const DEFAULT_QUOTA_TIMEOUT: Duration = Duration::from_secs(10);

/// Usage of one resource against its quota
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Overage {
    /// Resource type, e.g. `cpu.hours`
    pub resource_name: String,
    /// Current usage
    #[serde(default)]
    pub usage: f64,
    /// Quota
    #[serde(default)]
    pub quota: f64,
}

impl Overage {
    /// Whether usage has reached the quota
    pub fn is_over_quota(&self) -> bool {
        self.usage >= self.quota
    }
}

/// Overage request body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverageRequest {
    /// Username without the domain suffix
    pub username: String,
}

/// Error reported in a reply body
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    /// Description
    #[serde(default)]
    pub message: String,
    /// Status code reported by the service
    #[serde(default)]
    pub status_code: i32,
}

/// Overage reply body
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OverageReply {
    /// Resources the user has usage records for
    #[serde(default)]
    pub overages: Vec<Overage>,
    /// Set when the service failed to answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,
}

impl OverageReply {
    /// Overages, or the error the service reported
    pub fn into_result(self, subject: &str) -> Result<Vec<Overage>, Error> {
        match self.error {
            Some(err) if !err.message.is_empty() || err.status_code >= 400 => Err(
                Error::messaging(subject, format!("{} (status {})", err.message, err.status_code)),
            ),
            _ => Ok(self.overages),
        }
    }
}

/// Strip a configured domain suffix from a username
///
/// `ipcdev@iplantcollaborative.org` with suffix `iplantcollaborative.org`
/// (with or without a leading `@`) becomes `ipcdev`. Usernames without
/// the suffix are returned as is.
pub fn normalize_username<'a>(username: &'a str, domain_suffix: Option<&str>) -> &'a str {
    let Some(suffix) = domain_suffix.map(|s| s.trim_start_matches('@')) else {
        return username;
    };
    if suffix.is_empty() {
        return username;
    }
    username
        .strip_suffix(suffix)
        .and_then(|u| u.strip_suffix('@'))
        .filter(|u| !u.is_empty())
        .unwrap_or(username)
}

/// Trait abstracting the quota service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuotaClient: Send + Sync {
    /// Overage records for an already normalized username
    async fn user_overages(&self, username: &str) -> Result<Vec<Overage>, Error>;
}

/// NATS request/reply implementation
pub struct NatsQuotaClient {
    client: async_nats::Client,
    subject: String,
    timeout: Duration,
}

impl NatsQuotaClient {
    /// Create a client on the default subject
    pub fn new(client: async_nats::Client, timeout: Duration) -> Self {
        Self {
            client,
            subject: QUOTA_OVERAGES_SUBJECT.to_string(),
            timeout,
        }
    }

    /// Use a different subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

#[async_trait]
impl QuotaClient for NatsQuotaClient {
    async fn user_overages(&self, username: &str) -> Result<Vec<Overage>, Error> {
        let request = OverageRequest {
            username: username.to_string(),
        };
        let payload = serde_json::to_vec(&request)?;

        let reply = tokio::time::timeout(
            self.timeout,
            self.client.request(self.subject.clone(), payload.into()),
        )
        .await
        .map_err(|_| {
            Error::messaging(
                &self.subject,
                format!("no reply within {}ms", self.timeout.as_millis()),
            )
        })?
        .map_err(|e| Error::messaging(&self.subject, e.to_string()))?;

        let body: OverageReply = serde_json::from_slice(&reply.payload)?;
        let overages = body.into_result(&self.subject)?;
        debug!(username, count = overages.len(), "fetched resource overages");
        Ok(overages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_configured_domain() {
        assert_eq!(
            normalize_username("ipcdev@iplantcollaborative.org", Some("iplantcollaborative.org")),
            "ipcdev"
        );
        assert_eq!(
            normalize_username("ipcdev@iplantcollaborative.org", Some("@iplantcollaborative.org")),
            "ipcdev"
        );
    }

    #[test]
    fn leaves_other_usernames_alone() {
        assert_eq!(normalize_username("ipcdev", Some("iplantcollaborative.org")), "ipcdev");
        assert_eq!(
            normalize_username("ipcdev@example.org", Some("iplantcollaborative.org")),
            "ipcdev@example.org"
        );
        assert_eq!(normalize_username("ipcdev@example.org", None), "ipcdev@example.org");
        assert_eq!(normalize_username("a@b.org", Some("")), "a@b.org");
    }

    #[test]
    fn suffix_must_follow_an_at_sign() {
        assert_eq!(
            normalize_username("fooexample.org", Some("example.org")),
            "fooexample.org"
        );
    }

    #[test]
    fn reply_decodes_overages() {
        let reply: OverageReply = serde_json::from_value(serde_json::json!({
            "overages": [
                {"resource_name": "cpu.hours", "usage": 25.5, "quota": 20.0},
                {"resource_name": "data.size", "usage": 1.0, "quota": 100.0}
            ]
        }))
        .unwrap();
        let overages = reply.into_result(QUOTA_OVERAGES_SUBJECT).unwrap();
        assert_eq!(overages.len(), 2);
        assert!(overages[0].is_over_quota());
        assert!(!overages[1].is_over_quota());
    }

    #[test]
    fn reply_error_becomes_messaging_error() {
        let reply: OverageReply = serde_json::from_value(serde_json::json!({
            "overages": [],
            "error": {"message": "user not found", "status_code": 404}
        }))
        .unwrap();
        let err = reply.into_result(QUOTA_OVERAGES_SUBJECT).unwrap_err();
        assert!(matches!(err, Error::Messaging { .. }));
        assert!(err.to_string().contains("user not found"));
    }

    #[test]
    fn empty_error_object_is_ignored() {
        let reply: OverageReply =
            serde_json::from_value(serde_json::json!({"overages": [], "error": {}})).unwrap();
        assert!(reply.into_result(QUOTA_OVERAGES_SUBJECT).unwrap().is_empty());
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(OverageRequest {
            username: "ipcdev".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"username": "ipcdev"}));
    }
}
