//! Label and naming policy for VICE workloads
//!
//! Every object compiled for a job carries the same label set, and the
//! Deployment selector matches on [`LABEL_APP`] only. Admission counts
//! running jobs by selecting on [`LABEL_USERNAME`], so both sides must use
//! [`label_value`] for the username.

use std::collections::BTreeMap;

use crate::job::Job;

/// Selector label; always the invocation id
pub const LABEL_APP: &str = "app";
/// App name label
pub const LABEL_APP_NAME: &str = "app-name";
/// App id label
pub const LABEL_APP_ID: &str = "app-id";
/// Submitter label (sanitized)
pub const LABEL_USERNAME: &str = "username";
/// Submitter id label
pub const LABEL_USER_ID: &str = "user-id";
/// Job tracker correlation id label
pub const LABEL_EXTERNAL_ID: &str = "external-id";

/// Maximum length of a Kubernetes label value
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Prefix of the excludes-file ConfigMap name
pub const EXCLUDES_CONFIG_MAP_PREFIX: &str = "excludes-file";
/// Prefix of the input-path-list ConfigMap name
pub const INPUT_PATH_LIST_CONFIG_MAP_PREFIX: &str = "input-path-list";

/// Labels attached to every object compiled for a job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadLabels(BTreeMap<String, String>);

impl WorkloadLabels {
    /// Derive the label set for a job
    pub fn for_job(job: &Job) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), job.invocation_id.clone());
        labels.insert(LABEL_APP_NAME.to_string(), label_value(&job.app_name));
        labels.insert(LABEL_APP_ID.to_string(), label_value(&job.app_id));
        labels.insert(LABEL_USERNAME.to_string(), label_value(&job.submitter));
        labels.insert(LABEL_USER_ID.to_string(), label_value(&job.user_id));
        if let Some(external_id) = job.external_id.as_deref().filter(|id| !id.is_empty()) {
            labels.insert(LABEL_EXTERNAL_ID.to_string(), label_value(external_id));
        }
        Self(labels)
    }

    /// The pod selector: `app` only
    pub fn selector(&self) -> BTreeMap<String, String> {
        self.0
            .get(LABEL_APP)
            .map(|app| BTreeMap::from([(LABEL_APP.to_string(), app.clone())]))
            .unwrap_or_default()
    }

    /// Borrow the full label map
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Clone the full label map
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    /// Look up a single label
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Name of the Deployment and Service for a job
pub fn workload_name(job: &Job) -> &str {
    &job.invocation_id
}

/// Name of the excludes-file ConfigMap for a job
pub fn excludes_config_map_name(job: &Job) -> String {
    format!("{}-{}", EXCLUDES_CONFIG_MAP_PREFIX, job.invocation_id)
}

/// Name of the input-path-list ConfigMap for a job
pub fn input_path_list_config_map_name(job: &Job) -> String {
    format!("{}-{}", INPUT_PATH_LIST_CONFIG_MAP_PREFIX, job.invocation_id)
}

/// Convert an arbitrary string into a valid label value
///
/// Characters outside `[A-Za-z0-9._-]` become `-`, the result is cut to
/// [`MAX_LABEL_VALUE_LEN`], and leading/trailing non-alphanumerics are
/// trimmed.
pub fn label_value(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .take(MAX_LABEL_VALUE_LEN)
        .collect();

    replaced
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Label selector string matching every workload of a user
pub fn username_selector(username: &str) -> String {
    format!("{}={}", LABEL_USERNAME, label_value(username))
}
