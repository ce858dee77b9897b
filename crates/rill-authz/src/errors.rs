use thiserror::Error;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

/// Failure to parse a resource matching pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceSpecError {
    #[error("failed to parse resource pattern '{pattern}': segment '{segment}' does not follow the TYPE:NAME format")]
    MissingSeparator { pattern: String, segment: String },
    #[error("failed to parse resource pattern '{pattern}': cluster segment specified multiple times")]
    DuplicateCluster { pattern: String },
    #[error("failed to parse resource pattern '{pattern}': resource segment specified multiple times")]
    DuplicateResource { pattern: String },
    #[error("failed to parse resource pattern '{pattern}': unsupported segment type '{segment}'")]
    UnknownType { pattern: String, segment: String },
    #[error("failed to parse resource pattern '{pattern}': missing resource segment")]
    MissingResource { pattern: String },
}

/// Error returned by a [`GrantsProvider`](crate::GrantsProvider) call.
///
/// A non-2xx response maps to `Http` so the caller can tell an invalid token
/// (401) or a no-matching-policy response (403) from transient failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("grants endpoint returned status {status}: {message}")]
    Http { status: u16, message: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            FetchError::Other(_) => None,
        }
    }
}

/// Error delivered to grants-cache callers, including every waiter parked on
/// an in-flight fetch. Clone so one outcome can fan out to all of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantsError {
    #[error("grants endpoint returned status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("failed to fetch grants: {0}")]
    Fetch(String),
    #[error("service error: {0}")]
    Service(String),
}

impl GrantsError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GrantsError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<FetchError> for GrantsError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Http { status, message } => GrantsError::Http { status, message },
            // Flatten the cause chain into the message so the error stays Clone.
            FetchError::Other(cause) => GrantsError::Fetch(format!("{cause:#}")),
        }
    }
}
