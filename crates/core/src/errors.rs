use std::time::Duration;
use thiserror::Error;

/// Exchange error code for an order that is no longer open.
pub const CODE_ORDER_NOT_OPEN: i64 = 1102;

/// Exchange error code for insufficient funds.
pub const CODE_INSUFFICIENT_FUNDS: i64 = 3003;

/// Errors surfaced by the exchange client and the resilience layer.
///
/// The circuit breaker only counts transport-class failures; business
/// rejections (invalid quantity, insufficient funds) are surfaced to the
/// caller and never retried within a cycle.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Connection, timeout, or 5xx-class failure. Counts toward the
    /// circuit breaker threshold.
    #[error("transport error: {0}")]
    Transport(String),

    /// A well-formed rejection from the exchange (4xx-class).
    #[error("exchange error {code}: {message}")]
    Business { code: i64, message: String },

    /// The shared circuit breaker is open; the call never left the process.
    #[error("circuit breaker open, retry in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },

    /// Cached data is missing or older than tolerance; the market is
    /// skipped this cycle.
    #[error("stale data: {0}")]
    Stale(String),
}

impl ExchangeError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Whether this failure counts toward the circuit breaker threshold.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Business { code, .. } => *code >= 500,
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            Self::Business {
                code: CODE_INSUFFICIENT_FUNDS,
                ..
            }
        )
    }

    /// A cancel that raced with a fill or another cancel; benign.
    #[must_use]
    pub const fn is_order_not_open(&self) -> bool {
        matches!(
            self,
            Self::Business {
                code: CODE_ORDER_NOT_OPEN,
                ..
            }
        )
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_count_toward_breaker() {
        assert!(ExchangeError::Transport("connection refused".into()).is_transport());
        assert!(ExchangeError::Business {
            code: 502,
            message: "bad gateway".into()
        }
        .is_transport());
    }

    #[test]
    fn business_errors_do_not_count_toward_breaker() {
        let err = ExchangeError::Business {
            code: CODE_INSUFFICIENT_FUNDS,
            message: "funds error".into(),
        };
        assert!(!err.is_transport());
        assert!(err.is_insufficient_funds());
    }

    #[test]
    fn order_not_open_is_benign() {
        let err = ExchangeError::Business {
            code: CODE_ORDER_NOT_OPEN,
            message: "order is not open".into(),
        };
        assert!(err.is_order_not_open());
        assert!(!err.is_transport());
    }
}
