//! Operator-facing monitor.
//!
//! A monitor opens and closes named groups at a severity level and records
//! error, warning and trace entries. Build-time configuration problems and
//! evaluation tracing are both reported here.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{Level, debug, error, info, trace, warn};

pub trait Monitor: Send + Sync {
    fn open_group(&self, level: Level, name: &str);

    fn close_group(&self, level: Level, name: &str, outcome: &str);

    fn error(&self, message: &str);

    fn warn(&self, message: &str);

    fn trace(&self, message: &str);
}

/// Monitor backed by `tracing` events.
///
/// Groups are flat events carrying a `depth` field, since evaluation can
/// suspend between opening and closing a group and a span guard cannot be
/// held across that.
#[derive(Debug, Default)]
pub struct TracingMonitor {
    depth: AtomicUsize,
}

impl TracingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            error!($($arg)+)
        } else if level == Level::WARN {
            warn!($($arg)+)
        } else if level == Level::INFO {
            info!($($arg)+)
        } else if level == Level::DEBUG {
            debug!($($arg)+)
        } else {
            trace!($($arg)+)
        }
    }};
}

impl Monitor for TracingMonitor {
    fn open_group(&self, level: Level, name: &str) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed);
        event_at!(level, group = %name, depth, "begin");
    }

    fn close_group(&self, level: Level, name: &str, outcome: &str) {
        let depth = self
            .depth
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        event_at!(level, group = %name, depth, outcome = %outcome, "end");
    }

    fn error(&self, message: &str) {
        error!(details = %message, "monitor error");
    }

    fn warn(&self, message: &str) {
        warn!(details = %message, "monitor warning");
    }

    fn trace(&self, message: &str) {
        trace!(details = %message, "monitor trace");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEntry {
    Open { name: String },
    Close { name: String, outcome: String },
    Error(String),
    Warn(String),
    Trace(String),
}

/// Monitor that records every entry, for inspection after a run.
#[derive(Debug, Default)]
pub struct MemoryMonitor {
    entries: Mutex<Vec<MonitorEntry>>,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<MonitorEntry> {
        self.entries.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                MonitorEntry::Warn(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                MonitorEntry::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn opened_groups(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                MonitorEntry::Open { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Monitor for MemoryMonitor {
    fn open_group(&self, _level: Level, name: &str) {
        self.entries.lock().push(MonitorEntry::Open {
            name: name.to_string(),
        });
    }

    fn close_group(&self, _level: Level, name: &str, outcome: &str) {
        self.entries.lock().push(MonitorEntry::Close {
            name: name.to_string(),
            outcome: outcome.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.entries
            .lock()
            .push(MonitorEntry::Error(message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.entries
            .lock()
            .push(MonitorEntry::Warn(message.to_string()));
    }

    fn trace(&self, message: &str) {
        self.entries
            .lock()
            .push(MonitorEntry::Trace(message.to_string()));
    }
}
