use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FmtpType;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    None,
}

/// One entry of a channel's protocol log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub channel_id: u32,
    pub severity: Severity,
    pub packet_type: Option<FmtpType>,
    pub direction: Direction,
    pub text: String,
}

impl LogRecord {
    pub fn new(channel_id: u32, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            channel_id,
            severity,
            packet_type: None,
            direction: Direction::None,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn packet(mut self, typ: FmtpType, direction: Direction) -> Self {
        self.packet_type = Some(typ);
        self.direction = direction;
        self
    }

    /// Mirrors the record to `tracing`.
    pub fn trace(&self) {
        let id = self.channel_id;
        let text = &self.text;
        match (self.severity, self.packet_type) {
            (Severity::Debug, None) => tracing::debug!("channel {id}: {text}"),
            (Severity::Info, None) => tracing::info!("channel {id}: {text}"),
            (Severity::Warning, None) => tracing::warn!("channel {id}: {text}"),
            (Severity::Error, None) => tracing::error!("channel {id}: {text}"),
            (Severity::Debug, Some(typ)) => {
                tracing::debug!("channel {id} [{typ} {:?}]: {text}", self.direction);
            }
            (Severity::Info, Some(typ)) => {
                tracing::info!("channel {id} [{typ} {:?}]: {text}", self.direction);
            }
            (Severity::Warning, Some(typ)) => {
                tracing::warn!("channel {id} [{typ} {:?}]: {text}", self.direction);
            }
            (Severity::Error, Some(typ)) => {
                tracing::error!("channel {id} [{typ} {:?}]: {text}", self.direction);
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    Ok,
    Stopped,
    Error,
}

/// Externally visible state of a channel, published once per second.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub channel_id: u32,
    pub local_name: String,
    pub remote_name: String,
    pub daemon_state: DaemonState,
    pub fmtp_state: String,
    pub channel_url: String,
}
