//! Common types for the VICE exposer: job model, labels, errors, utilities

#![deny(missing_docs)]

pub mod error;
pub mod job;
pub mod kube_utils;
pub mod labels;
pub mod telemetry;

pub use error::Error;
pub use job::Job;
pub use labels::WorkloadLabels;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace VICE workloads are created in unless configured otherwise
pub const DEFAULT_VICE_NAMESPACE: &str = "vice-apps";

/// Field manager / user agent name used against the Kubernetes API
pub const FIELD_MANAGER: &str = "app-exposer";
