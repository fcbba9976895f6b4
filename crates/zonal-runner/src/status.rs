//! Human-readable progress messages for the presentation layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl StatusLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            StatusLevel::Info => "info",
            StatusLevel::Warning => "warning",
            StatusLevel::Error => "error",
            StatusLevel::Success => "success",
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One status update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusMessage {
    pub fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:>7}: {}", self.timestamp.format("%H:%M:%S"), self.level, self.text)
    }
}

/// Callback receiving status updates.
pub type StatusCallback = Box<dyn Fn(&StatusMessage) + Send + Sync>;

/// Log a status update and forward it to the callback, if any.
pub fn emit(callback: Option<&StatusCallback>, level: StatusLevel, text: impl Into<String>) {
    let message = StatusMessage::new(level, text);
    match level {
        StatusLevel::Info | StatusLevel::Success => info!("{}", message.text),
        StatusLevel::Warning => warn!("{}", message.text),
        StatusLevel::Error => error!("{}", message.text),
    }
    if let Some(callback) = callback {
        callback(&message);
    }
}
