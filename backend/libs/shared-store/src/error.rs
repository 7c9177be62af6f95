use std::time::Duration;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure of the store itself, as opposed to a negative answer from it.
///
/// Callers must never read a `StoreError` as "key absent", "token invalid" or
/// "not rate limited".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store operation {op} timed out after {}ms", .timeout.as_millis())]
    Timeout { op: &'static str, timeout: Duration },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("unexpected store reply: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            StoreError::Unavailable(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            StoreError::Protocol(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = StoreError::Timeout {
            op: "GET",
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "store operation GET timed out after 250ms");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_io_error_maps_to_unavailable() {
        let err: StoreError =
            redis::RedisError::from((redis::ErrorKind::IoError, "connection reset")).into();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_type_error_maps_to_protocol() {
        let err: StoreError =
            redis::RedisError::from((redis::ErrorKind::TypeError, "not an integer")).into();
        assert!(matches!(err, StoreError::Protocol(_)));
    }
}
