use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, TraderError};

/// Upper bound on one webhook delivery, connect included.
pub const ALERT_TIMEOUT: Duration = Duration::from_secs(3);

/// Operator alerts over a Slack incoming webhook. Without a URL every alert is a no-op.
#[derive(Clone)]
pub struct Notifier {
    slack_webhook_url: Option<String>,
    http: Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
}

impl Notifier {
    pub fn new(slack_webhook_url: Option<String>) -> Self {
        Self::with_timeout(slack_webhook_url, ALERT_TIMEOUT)
    }

    pub fn with_timeout(slack_webhook_url: Option<String>, timeout: Duration) -> Self {
        Self { slack_webhook_url, http: Client::new(), timeout }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub async fn alert(&self, text: &str) -> Result<()> {
        let Some(url) = self.slack_webhook_url.as_deref() else {
            return Ok(());
        };

        let send = self.http.post(url).json(&SlackPayload { text }).send();
        let resp = match tokio::time::timeout(self.timeout, send).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(TraderError::Timeout {
                    operation: "slack.alert",
                    elapsed_ms: self.timeout.as_millis() as u64,
                })
            }
        };
        if !resp.status().is_success() {
            return Err(TraderError::Alert(resp.status().as_u16()));
        }
        Ok(())
    }

    /// Like `alert`, but a delivery failure is only logged.
    pub async fn alert_best_effort(&self, text: &str) {
        if let Err(e) = self.alert(text).await {
            warn!(error = %e, "notifier.alert_failed");
        }
    }
}
