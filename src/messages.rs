//! User-facing message collection.
//!
//! The mixing pipeline reports every rejection and error path through an
//! optional [`MessageCollector`]. These messages are meant for the people who
//! wrote the configuration, not for operators; operator diagnostics go through
//! `tracing` and the [`Monitor`](crate::monitor::Monitor).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageLevel::Info => write!(f, "info"),
            MessageLevel::Warning => write!(f, "warning"),
            MessageLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

/// Sink for user-facing info, warning and error strings.
pub trait MessageCollector: Send + Sync {
    fn add(&self, level: MessageLevel, text: String);

    fn info(&self, text: &str) {
        self.add(MessageLevel::Info, text.to_string());
    }

    fn warning(&self, text: &str) {
        self.add(MessageLevel::Warning, text.to_string());
    }

    fn error(&self, text: &str) {
        self.add(MessageLevel::Error, text.to_string());
    }
}

/// In-memory collector that keeps messages in arrival order.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<Vec<Message>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn with_level(&self, level: MessageLevel) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|message| message.level == level)
            .map(|message| message.text.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_level(MessageLevel::Error)
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl MessageCollector for MessageLog {
    fn add(&self, level: MessageLevel, text: String) {
        self.messages.lock().push(Message { level, text });
    }
}
