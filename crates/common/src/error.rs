use thiserror::Error;

/// Canonical fedq error taxonomy used across crates.
///
/// Classification guidance:
/// - [`FedqError::Planning`]: query text/name/type issues discovered before execution
/// - [`FedqError::Unsupported`]: a valid query whose shape is outside the supported subset
/// - [`FedqError::InvalidPage`]: negative OFFSET/LIMIT handed to an execution entry point
/// - [`FedqError::Connector`]: a source call failed; surfaced unchanged, never retried
/// - [`FedqError::Execution`]: coordinator-side evaluation or row-shape failures
/// - [`FedqError::InvalidConfig`]: catalog/config/environment contract violations
/// - [`FedqError::Io`]: raw filesystem failures from std APIs
#[derive(Debug, Error)]
pub enum FedqError {
    /// Invalid or inconsistent configuration/catalog state.
    ///
    /// Examples:
    /// - a table bound to a source with no registered connector
    /// - unparsable `FEDQ_STRATEGY` value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Parse and name-resolution failures.
    ///
    /// Examples:
    /// - malformed SQL text
    /// - unknown table or column, ambiguous bare column
    /// - non-integer OFFSET/LIMIT literal
    #[error("planning error: {0}")]
    Planning(String),

    /// Runtime failures after planning succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Query or plan shape outside the supported template and the generic operator set.
    #[error("unsupported query: {0}")]
    Unsupported(String),

    /// Negative offset or limit. Never clamped.
    #[error("invalid page: {0}")]
    InvalidPage(String),

    /// A connector call failed.
    #[error("connector '{connector}' failed: {message}")]
    Connector {
        /// Name of the source whose call failed.
        connector: String,
        /// Backend-provided failure text.
        message: String,
    },

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FedqError {
    /// Stable short name of the error kind.
    ///
    /// Two executions "fail identically" when their kinds match.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::Planning(_) => "planning",
            Self::Execution(_) => "execution",
            Self::Unsupported(_) => "unsupported",
            Self::InvalidPage(_) => "invalid_page",
            Self::Connector { .. } => "connector",
            Self::Io(_) => "io",
        }
    }

    /// Build a connector failure for `connector`.
    pub fn connector(connector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connector {
            connector: connector.into(),
            message: message.into(),
        }
    }
}

/// Standard fedq result alias.
pub type Result<T> = std::result::Result<T, FedqError>;
