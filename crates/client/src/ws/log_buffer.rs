//! Bounded, timestamped record of realtime lifecycle events.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Local, Utc};

/// Default number of entries kept before the oldest is evicted
pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of the lifecycle log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub text: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.timestamp.with_timezone(&Local);
        match self.level {
            LogLevel::Info => write!(f, "[{}] {}", local.format("%H:%M:%S"), self.text),
            LogLevel::Warn => write!(f, "[{}] warning: {}", local.format("%H:%M:%S"), self.text),
            LogLevel::Error => write!(f, "[{}] error: {}", local.format("%H:%M:%S"), self.text),
        }
    }
}

#[derive(Debug)]
struct Inner {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    evicted: u64,
}

/// Append-only ring buffer shared between the manager (single writer) and
/// any number of readers. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<RwLock<Inner>>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
                capacity,
                evicted: 0,
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, text: impl Into<String>) {
        self.push(LogLevel::Info, text.into());
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.push(LogLevel::Warn, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.push(LogLevel::Error, text.into());
    }

    fn push(&self, level: LogLevel, text: String) {
        crate::logging::log_at(level, &text);

        let mut inner = self.write();
        // Wall clock can step backwards; entries must not.
        let now = Utc::now();
        let timestamp = match inner.entries.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        if inner.entries.len() == inner.capacity {
            inner.entries.pop_front();
            inner.evicted += 1;
        }
        inner.entries.push_back(LogEntry {
            timestamp,
            level,
            text,
        });
    }

    /// Snapshot of the retained entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.read().entries.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<LogEntry> {
        self.read().entries.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.read().capacity
    }

    /// Number of entries dropped by the capacity cap so far
    pub fn evicted(&self) -> u64 {
        self.read().evicted
    }
}
