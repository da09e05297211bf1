use crate::types::MarketId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A real-time event from the exchange WebSocket. Both variants trigger an
/// immediate reconciliation of the affected market only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    Trade { market: MarketId },
    OrderbookChange { market: MarketId },
}

impl MarketEvent {
    #[must_use]
    pub const fn market(&self) -> &MarketId {
        match self {
            Self::Trade { market } | Self::OrderbookChange { market } => market,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Parses a configured minimum level, defaulting to `Warning`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "info" => Self::Info,
            "error" => Self::Error,
            "critical" => Self::Critical,
            _ => Self::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCode {
    CircuitOpen,
    InsufficientFunds,
    PlacementFailure,
    StaleData,
    Startup,
    Shutdown,
}

impl AlertCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::InsufficientFunds => "insufficient_funds",
            Self::PlacementFailure => "placement_failure",
            Self::StaleData => "stale_data",
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A structured alert emitted toward the configured notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub severity: AlertSeverity,
    pub code: AlertCode,
    pub message: String,
    pub market: Option<MarketId>,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    #[must_use]
    pub fn new(
        severity: AlertSeverity,
        code: AlertCode,
        message: impl Into<String>,
        market: Option<MarketId>,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            market,
            timestamp: Utc::now(),
        }
    }
}
