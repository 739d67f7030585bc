//! Workload compilation errors

use thiserror::Error;

/// Errors raised while compiling a job into Kubernetes objects
#[derive(Debug, Error)]
pub enum CompilationError {
    /// The job cannot produce a pod template (no step, no image)
    #[error("malformed job {invocation}: {message}")]
    MalformedJob {
        /// Invocation id of the job
        invocation: String,
        /// What is wrong with it
        message: String,
    },

    /// A ConfigMap payload could not be derived from the job
    #[error("cannot derive {config_map} for job {invocation}: {message}")]
    ConfigDerivation {
        /// Invocation id of the job
        invocation: String,
        /// Name of the ConfigMap being built
        config_map: String,
        /// What went wrong
        message: String,
    },

    /// A compiled object could not be serialized for the API server
    #[error("failed to serialize {kind}: {source}")]
    Serialization {
        /// Kind of the object
        kind: &'static str,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },
}

impl CompilationError {
    /// Create a malformed-job error
    pub fn malformed(invocation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedJob {
            invocation: invocation.into(),
            message: message.into(),
        }
    }

    /// Create a config derivation error
    pub fn config_derivation(
        invocation: impl Into<String>,
        config_map: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConfigDerivation {
            invocation: invocation.into(),
            config_map: config_map.into(),
            message: message.into(),
        }
    }
}

impl From<CompilationError> for exposer_common::Error {
    fn from(err: CompilationError) -> Self {
        match err {
            CompilationError::Serialization { kind, source } => {
                exposer_common::Error::serialization_for_kind(kind, source.to_string())
            }
            CompilationError::MalformedJob {
                invocation,
                message,
            } => exposer_common::Error::validation_for(invocation, message),
            CompilationError::ConfigDerivation {
                invocation,
                config_map,
                message,
            } => exposer_common::Error::validation_for(
                invocation,
                format!("{config_map}: {message}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_invocation() {
        let err = CompilationError::malformed("abc", "job has no steps");
        assert_eq!(err.to_string(), "malformed job abc: job has no steps");

        let err = CompilationError::config_derivation("abc", "input-path-list-abc", "empty path");
        assert!(err.to_string().contains("input-path-list-abc"));
    }

    #[test]
    fn converts_to_validation_error() {
        let err: exposer_common::Error = CompilationError::malformed("abc", "no image").into();
        assert!(matches!(err, exposer_common::Error::Validation { .. }));
    }
}
