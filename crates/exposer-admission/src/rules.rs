//! Admission rule table
//!
//! Rules are checked in a fixed priority order and the first match wins:
//!
//! | # | condition                                   | code                    |
//! |---|---------------------------------------------|-------------------------|
//! | 1 | no override and default <= 0                | `ERR_PERMISSION_NEEDED` |
//! | 2 | override <= 0                               | `ERR_FORBIDDEN`         |
//! | 3 | no override and running >= default          | `ERR_LIMIT_REACHED`     |
//! | 4 | override and running >= override            | `ERR_LIMIT_REACHED`     |
//! | 5 | any resource with usage >= quota            | `ERR_RESOURCE_OVERAGE`  |
//! | 6 | otherwise                                   | allowed                 |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::quota::Overage;

/// Denial codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// Jobs are disabled by default and the user has no override
    PermissionNeeded,
    /// Jobs are explicitly disabled for the user
    Forbidden,
    /// The user is at their concurrent job limit
    LimitReached,
    /// The user is over quota on at least one resource
    ResourceOverage,
}

impl ErrorCode {
    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermissionNeeded => "ERR_PERMISSION_NEEDED",
            Self::Forbidden => "ERR_FORBIDDEN",
            Self::LimitReached => "ERR_LIMIT_REACHED",
            Self::ResourceOverage => "ERR_RESOURCE_OVERAGE",
        }
    }
}

/// Structured error body returned to clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Machine-readable code
    pub error_code: String,
    /// Human-readable message
    pub message: String,
    /// Extra fields for client display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl ErrorResponse {
    /// Response without details
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach details
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Outcome of admission for one job
#[derive(Clone, Debug, PartialEq)]
pub enum AdmissionDecision {
    /// The job may be provisioned
    Allowed,
    /// The job is rejected with a client-facing explanation
    Denied(ErrorResponse),
}

impl AdmissionDecision {
    /// Whether the job was admitted
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Denial code, if denied
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied(resp) => Some(resp.error_code.as_str()),
        }
    }
}

/// Everything the rule table looks at
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LimitInputs {
    /// Submitter, used in messages
    pub user: String,
    /// System-wide default limit
    pub default_job_limit: i32,
    /// Running jobs counted for the user
    pub job_count: usize,
    /// Per-user override, if any
    pub job_limit: Option<i32>,
    /// Resource overages reported by the quota service
    pub overages: Vec<Overage>,
}

impl LimitInputs {
    fn limit_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("defaultJobLimit".to_string(), Value::from(self.default_job_limit));
        details.insert("jobCount".to_string(), Value::from(self.job_count));
        details.insert(
            "jobLimit".to_string(),
            self.job_limit.map(Value::from).unwrap_or(Value::Null),
        );
        details
    }

    fn deny(&self, code: ErrorCode, message: String) -> AdmissionDecision {
        AdmissionDecision::Denied(
            ErrorResponse::new(code.as_str(), message).with_details(self.limit_details()),
        )
    }

    fn at_or_over(&self, limit: i32) -> bool {
        self.job_count as i64 >= i64::from(limit)
    }
}

/// Apply the rule table
pub fn evaluate(inputs: &LimitInputs) -> AdmissionDecision {
    let user = &inputs.user;

    match inputs.job_limit {
        None if inputs.default_job_limit <= 0 => {
            return inputs.deny(
                ErrorCode::PermissionNeeded,
                format!("{user} has not been granted permission to run jobs yet"),
            );
        }
        Some(limit) if limit <= 0 => {
            return inputs.deny(
                ErrorCode::Forbidden,
                format!("{user} is not permitted to run jobs"),
            );
        }
        None if inputs.at_or_over(inputs.default_job_limit) => {
            return inputs.deny(
                ErrorCode::LimitReached,
                format!(
                    "{user} is already running {} or more concurrent jobs",
                    inputs.default_job_limit
                ),
            );
        }
        Some(limit) if inputs.at_or_over(limit) => {
            return inputs.deny(
                ErrorCode::LimitReached,
                format!("{user} is already running {limit} or more concurrent jobs"),
            );
        }
        _ => {}
    }

    let over: Vec<&Overage> = inputs
        .overages
        .iter()
        .filter(|o| o.is_over_quota())
        .collect();
    if over.is_empty() {
        return AdmissionDecision::Allowed;
    }

    let mut details = Map::new();
    for overage in over {
        details.insert(
            overage.resource_name.clone(),
            Value::String(format!(
                "quota: {:.6}, usage: {:.6}",
                overage.quota, overage.usage
            )),
        );
    }
    AdmissionDecision::Denied(
        ErrorResponse::new(
            ErrorCode::ResourceOverage.as_str(),
            format!("{user} has resource overages."),
        )
        .with_details(details),
    )
}
