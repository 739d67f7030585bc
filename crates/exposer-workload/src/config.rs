//! ConfigMap payloads mounted into the stager containers
//!
//! The excludes list tells the output stager which files not to upload.
//! The input path list tells the input stager which files to download;
//! it only exists when at least one input has no ticket.

use exposer_common::labels::{
    excludes_config_map_name, input_path_list_config_map_name, WorkloadLabels,
};
use exposer_common::Job;

use crate::error::CompilationError;
use crate::k8s::ConfigMap;
use crate::layout::{EXCLUDES_FILE_NAME, INPUT_PATH_LIST_FILE_NAME};

/// Default header line of an input path list
pub const DEFAULT_PATH_LIST_IDENTIFIER: &str = "# application/vnd.de.path-list+csv; version=1";

/// Header line identifying an input path list to the data-movement tool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathListIdentifier(String);

impl Default for PathListIdentifier {
    fn default() -> Self {
        Self(DEFAULT_PATH_LIST_IDENTIFIER.to_string())
    }
}

impl PathListIdentifier {
    /// Wrap a header line
    pub fn new(header: impl Into<String>) -> Self {
        Self(header.into())
    }

    /// The header line
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The header must be a single non-empty line
    pub fn validate(&self) -> Result<(), String> {
        if self.0.trim().is_empty() {
            return Err("path list identifier is empty".to_string());
        }
        if self.0.contains('\n') {
            return Err("path list identifier spans multiple lines".to_string());
        }
        Ok(())
    }
}

/// Newline-terminated base names of every non-retained input and output
pub fn excludes_contents(job: &Job) -> String {
    let inputs = job.inputs().filter(|i| !i.retain).map(|i| i.base_name());
    let outputs = job
        .outputs()
        .filter(|o| !o.retain)
        .map(|o| exposer_common::job::base_name(&o.name));

    inputs
        .chain(outputs)
        .filter(|name| !name.is_empty())
        .map(|name| format!("{name}\n"))
        .collect()
}

/// Build the excludes-file ConfigMap
pub fn excludes_config_map(job: &Job, namespace: &str, labels: &WorkloadLabels) -> ConfigMap {
    ConfigMap::new(excludes_config_map_name(job), namespace)
        .with_labels(labels.to_map())
        .with_data(EXCLUDES_FILE_NAME, excludes_contents(job))
}

/// Header line followed by one ticket-less input path per line
pub fn input_path_list_contents(
    job: &Job,
    identifier: &PathListIdentifier,
) -> Result<String, CompilationError> {
    let fail = |message: String| {
        CompilationError::config_derivation(
            job.invocation_id.as_str(),
            input_path_list_config_map_name(job),
            message,
        )
    };

    identifier.validate().map_err(fail)?;

    let mut contents = format!("{}\n", identifier.as_str());
    for (index, input) in job.inputs_without_tickets().into_iter().enumerate() {
        let path = input.value.trim();
        if path.is_empty() {
            return Err(fail(format!("input {index} has no path")));
        }
        if path.contains('\n') {
            return Err(fail(format!("input {index} path spans multiple lines")));
        }
        contents.push_str(path);
        contents.push('\n');
    }
    Ok(contents)
}

/// Build the input-path-list ConfigMap, or `None` when every input has a ticket
pub fn input_path_list_config_map(
    job: &Job,
    namespace: &str,
    labels: &WorkloadLabels,
    identifier: &PathListIdentifier,
) -> Result<Option<ConfigMap>, CompilationError> {
    if !job.has_ticketless_inputs() {
        return Ok(None);
    }

    let contents = input_path_list_contents(job, identifier)?;
    Ok(Some(
        ConfigMap::new(input_path_list_config_map_name(job), namespace)
            .with_labels(labels.to_map())
            .with_data(INPUT_PATH_LIST_FILE_NAME, contents),
    ))
}
