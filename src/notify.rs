use crate::config::FeishuConfig;
use crate::credentials::Credentials;
use crate::state::ResourceAlert;
use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use std::fmt;
use tracing::{info, warn};

/// Delivers a finished report to an external channel.
#[async_trait]
pub trait MessageSender: Send + Sync {
    type Error: fmt::Display + Send;

    async fn send(&self, credentials: &Credentials, text: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Nothing to report and outside the hourly window.
    Skipped,
    /// No credentials were found; checked before anything else.
    NotConfigured,
    /// Credentials exist but `feishu.enabled` is off.
    Disabled,
    Failed(String),
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Sent => f.write_str("sent"),
            DeliveryOutcome::Skipped => f.write_str("skipped"),
            DeliveryOutcome::NotConfigured => f.write_str("not configured"),
            DeliveryOutcome::Disabled => f.write_str("disabled"),
            DeliveryOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendPolicy {
    pub enabled: bool,
    pub hourly_window_minutes: u32,
}

impl From<&FeishuConfig> for SendPolicy {
    fn from(cfg: &FeishuConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            hourly_window_minutes: cfg.hourly_window_minutes,
        }
    }
}

/// Alerts always go out; a quiet report only near the top of the hour so a
/// frequent poller does not flood the chat.
pub fn should_send(alerts: &[ResourceAlert], minute: u32, window_minutes: u32) -> bool {
    !alerts.is_empty() || minute < window_minutes
}

pub async fn maybe_send<S: MessageSender>(
    sender: &S,
    report: &str,
    alerts: &[ResourceAlert],
    now: DateTime<Local>,
    credentials: Option<&Credentials>,
    policy: SendPolicy,
) -> DeliveryOutcome {
    let Some(credentials) = credentials else {
        info!("notification credentials not configured, skipping delivery");
        return DeliveryOutcome::NotConfigured;
    };
    if !policy.enabled {
        info!("notifications disabled, skipping delivery");
        return DeliveryOutcome::Disabled;
    }
    if !should_send(alerts, now.minute(), policy.hourly_window_minutes) {
        info!(minute = now.minute(), "no alerts outside the hourly window, skipping delivery");
        return DeliveryOutcome::Skipped;
    }

    match sender.send(credentials, report).await {
        Ok(()) => {
            info!(alerts = alerts.len(), "report delivered");
            DeliveryOutcome::Sent
        }
        Err(err) => {
            warn!(error = %err, "report delivery failed");
            DeliveryOutcome::Failed(err.to_string())
        }
    }
}
