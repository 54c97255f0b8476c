//! Domain errors for the command-and-control core.

use thiserror::Error;

/// Domain-level errors that can occur while routing commands, aggregating
/// hosts, or fanning events out to webhook/push subscribers.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed input: an unparseable FQN, an out-of-range port list, an
    /// invalid notification-preferences payload.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A lookup (host by FQN, device by token) came back empty.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation requires a live node but the node is offline.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A command exceeded `commandTimeout` before a result arrived.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The node agent replied with `success: false`.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The socket write to a node failed.
    #[error("transport failed: {0}")]
    Transport(String),

    /// A database operation failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Serializing or deserializing an opaque payload failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the core.
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Returns `true` if the condition is likely to clear on its own and is
    /// worth a reconnect-flush re-dispatch rather than a terminal failure.
    ///
    /// This never drives an in-process retry loop (see design notes on
    /// retry semantics) — it only selects a log level at the call site.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Transport(_) | Self::Timeout(_))
    }

    /// Returns `true` if retrying the same input would not help.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// HTTP status an operator-facing controller layer would map this to.
    /// The controller itself is out of scope; this just keeps the mapping
    /// from §7 discoverable from the error type instead of re-derived ad hoc.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ValidationFailed(_) => 400,
            Self::NotFound(_) => 404,
            Self::PreconditionFailed(_) => 409,
            Self::Timeout(_) => 504,
            Self::ExecutionFailed(_) => 502,
            Self::Persistence(_) | Self::Serialization(_) => 500,
            Self::Transport(_) => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failed_is_permanent() {
        let err = DomainError::ValidationFailed("bad fqn".into());
        assert!(err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn transport_is_transient() {
        let err = DomainError::Transport("socket closed".into());
        assert!(err.is_transient());
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn timeout_maps_to_504() {
        let err = DomainError::Timeout("command timed out after 30000ms".into());
        assert_eq!(err.http_status(), 504);
        assert!(err.is_transient());
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = DomainError::NotFound("host desktop@lab-node-1 not found".into());
        assert_eq!(err.http_status(), 404);
        assert!(err.is_permanent());
    }
}
