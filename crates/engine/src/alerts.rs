use ironmaker_core::{AlertCode, AlertEvent, AlertSeverity, AlertsConfig, MarketId};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Delivers alert events to a Discord, Slack, or custom JSON webhook.
///
/// Every alert is logged regardless of configuration; webhook delivery is
/// filtered by minimum severity and rate-limited per alert code so a
/// flapping condition cannot flood the channel. Delivery runs in a
/// spawned task and never blocks the trading path.
pub struct AlertManager {
    enabled: bool,
    webhook_url: Option<String>,
    webhook_type: String,
    min_level: AlertSeverity,
    rate_limit: Duration,
    last_sent: std::sync::Mutex<HashMap<AlertCode, Instant>>,
    http: reqwest::Client,
}

impl AlertManager {
    #[must_use]
    pub fn new(config: &AlertsConfig) -> Self {
        Self {
            enabled: config.enabled,
            webhook_url: config.webhook_url.clone(),
            webhook_type: config.webhook_type.clone(),
            min_level: AlertSeverity::parse(&config.min_level),
            rate_limit: Duration::from_secs_f64(config.rate_limit_seconds.max(0.0)),
            last_sent: std::sync::Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
        }
    }

    pub fn emit(&self, event: AlertEvent) {
        match event.severity {
            AlertSeverity::Info => {
                tracing::info!(code = event.code.as_str(), "{}", event.message);
            }
            AlertSeverity::Warning => {
                tracing::warn!(code = event.code.as_str(), "{}", event.message);
            }
            AlertSeverity::Error | AlertSeverity::Critical => {
                tracing::error!(code = event.code.as_str(), "{}", event.message);
            }
        }

        if !self.enabled || event.severity < self.min_level || !self.should_send(event.code) {
            return;
        }
        let Some(url) = self.webhook_url.clone() else {
            return;
        };

        let payload = self.payload(&event);
        let http = self.http.clone();
        tokio::spawn(async move {
            let result = http
                .post(&url)
                .json(&payload)
                .timeout(Duration::from_secs(10))
                .send()
                .await;
            if let Err(err) = result {
                tracing::error!("webhook alert delivery failed: {err}");
            }
        });
    }

    pub fn warning(&self, code: AlertCode, message: impl Into<String>, market: Option<MarketId>) {
        self.emit(AlertEvent::new(
            AlertSeverity::Warning,
            code,
            message,
            market,
        ));
    }

    pub fn error(&self, code: AlertCode, message: impl Into<String>, market: Option<MarketId>) {
        self.emit(AlertEvent::new(AlertSeverity::Error, code, message, market));
    }

    pub fn info(&self, code: AlertCode, message: impl Into<String>) {
        self.emit(AlertEvent::new(AlertSeverity::Info, code, message, None));
    }

    /// Per-code rate limit: true if this code has not fired within the
    /// configured window.
    fn should_send(&self, code: AlertCode) -> bool {
        let mut last_sent = self
            .last_sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        match last_sent.get(&code) {
            Some(at) if now.duration_since(*at) < self.rate_limit => false,
            _ => {
                last_sent.insert(code, now);
                true
            }
        }
    }

    fn payload(&self, event: &AlertEvent) -> serde_json::Value {
        let title = match event.market.as_ref() {
            Some(market) => format!("{} ({market})", event.code.as_str()),
            None => event.code.as_str().to_string(),
        };

        match self.webhook_type.as_str() {
            "discord" => {
                let color = match event.severity {
                    AlertSeverity::Info => 3_447_003,
                    AlertSeverity::Warning => 16_776_960,
                    AlertSeverity::Error => 15_158_332,
                    AlertSeverity::Critical => 10_038_562,
                };
                json!({
                    "embeds": [{
                        "title": title,
                        "description": event.message,
                        "color": color,
                        "footer": {"text": format!("ironmaker • {}", event.severity.as_str().to_uppercase())},
                        "timestamp": event.timestamp.to_rfc3339(),
                    }]
                })
            }
            "slack" => json!({
                "blocks": [{
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("*{title}*\n{}", event.message),
                    }
                }]
            }),
            _ => json!({
                "level": event.severity.as_str(),
                "code": event.code.as_str(),
                "title": title,
                "message": event.message,
                "market": event.market.as_ref().map(ToString::to_string),
                "timestamp": event.timestamp.to_rfc3339(),
                "source": "ironmaker",
            }),
        }
    }
}
