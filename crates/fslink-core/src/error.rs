//! Core error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised by the execution engine and the analyses built on it.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid dataset or link type combination.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A blocking rule cannot be cost-estimated without materialising the join.
    #[error("unsupported blocking rule `{rule}`: {reason}")]
    UnsupportedRule {
        /// The rule's predicate text.
        rule: String,
        /// Why the rule cannot be estimated.
        reason: String,
    },

    /// The backend failed while executing a statement.
    ///
    /// The backend's own message is kept verbatim in `source`.
    #[error(
        "error executing the following sql for table `{templated_name}` ({physical_name}):\n{statement}\n\nerror was: {source}"
    )]
    PipelineExecution {
        /// Logical role of the table being created.
        templated_name: String,
        /// Backend name of the table being created.
        physical_name: String,
        /// The offending statement, reformatted when possible.
        statement: String,
        /// Backend failure, message kept verbatim.
        #[source]
        source: BackendError,
    },

    /// A pipeline was reused after compilation without being reset.
    #[error("invalid pipeline state: {0}")]
    InvalidPipelineState(String),

    /// Backend error outside of pipeline execution.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Unexpected shape or content of data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Settings could not be parsed.
    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Shorthand for an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData(message.into())
    }
}
