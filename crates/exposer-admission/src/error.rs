//! Admission error types
//!
//! These are failures to reach a decision. Denials are not errors; they
//! are returned as [`crate::AdmissionDecision::Denied`].

/// Errors that stop the admission controller from deciding
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The job is not an interactive analysis
    #[error("job type {job_type} is not supported by this service")]
    UnsupportedJobType {
        /// Reported job type
        job_type: String,
        /// Execution target the job asked for
        execution_target: String,
    },

    /// Running deployments could not be listed
    #[error("unable to determine the number of jobs that {user} is currently running: {source}")]
    CountJobs {
        /// Submitter
        user: String,
        /// Underlying failure
        source: exposer_common::Error,
    },

    /// The per-user override could not be read
    #[error("unable to determine the concurrent job limit for {user}: {source}")]
    JobLimit {
        /// Submitter
        user: String,
        /// Underlying failure
        source: exposer_common::Error,
    },

    /// The system default could not be read
    #[error("unable to determine the default concurrent job limit: {source}")]
    DefaultJobLimit {
        /// Underlying failure
        source: exposer_common::Error,
    },

    /// The job limit table has no default row
    #[error("no default concurrent job limit is configured")]
    MissingDefaultJobLimit,

    /// The quota service could not be queried
    #[error("unable to get list of resource overages for user {user}: {source}")]
    Overages {
        /// Submitter
        user: String,
        /// Underlying failure
        source: exposer_common::Error,
    },
}

impl AdmissionError {
    /// HTTP status the error maps to
    ///
    /// Unsupported jobs are the caller's fault; everything else is an
    /// infrastructure or configuration failure.
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionError::UnsupportedJobType { .. } => 400,
            _ => 500,
        }
    }

    /// Stable error code for response bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            AdmissionError::UnsupportedJobType { .. } => "ERR_UNSUPPORTED_JOB_TYPE",
            _ => "ERR_INTERNAL",
        }
    }
}
