//! Connection state, reconnect policy and the transport seam.
//!
//! This module provides the shared types and includes the native
//! tokio-tungstenite transport. The state machine itself lives in
//! [`manager`](super::manager).

use std::fmt;
use std::time::Duration;

use futures_channel::mpsc::UnboundedSender;
use rand::Rng;

use super::manager::ManagerEvent;

/// Connection state of the realtime manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    ReconnectWaiting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::ReconnectWaiting => "waiting to reconnect",
        };
        f.write_str(label)
    }
}

/// Tag of one transport attempt. Callbacks carrying an older tag are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub(crate) fn bump(&mut self) -> Generation {
        self.0 += 1;
        *self
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Configuration for auto-reconnect behavior.
///
/// The default is a flat 3 second delay with no attempt cap. Backoff and a
/// cap are opt-in through [`ReconnectConfig::hardened`] or the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Ceiling for the delay once backoff grows it
    pub max_delay: Duration,
    /// Multiplier applied per attempt (1.0 = fixed delay)
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0-1.0) applied as +/- to each delay
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(3),
            backoff_multiplier: 1.0,
            jitter: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Exponential backoff with a ceiling and a finite number of attempts.
    pub fn hardened() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }

    /// Fixed delay, never gives up.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            ..Self::default()
        }
    }

    /// Whether attempt number `attempt` (0-based) may still be scheduled
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }

    /// Calculate delay for a given attempt number (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self
            .initial_delay
            .mul_f64(multiplier.powi(exponent).min(f64::from(u32::MAX)));
        let ceiling = self.max_delay.max(self.initial_delay);
        let base = base.min(ceiling);

        if self.jitter <= 0.0 {
            return base;
        }
        let jitter = self.jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor).min(ceiling)
    }
}

/// Lifecycle callback reported by a transport attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    Close { code: u16, reason: String },
}

/// Where a transport attempt reports its callbacks.
///
/// Every event is tagged with the attempt's [`Generation`] before it reaches
/// the manager, so implementations cannot forget the tag.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: Generation,
    events: UnboundedSender<ManagerEvent>,
}

impl TransportSink {
    pub(crate) fn new(generation: Generation, events: UnboundedSender<ManagerEvent>) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn emit(&self, event: TransportEvent) {
        // The manager loop may already be gone after shutdown; nothing to report to.
        let _ = self.events.unbounded_send(ManagerEvent::Transport {
            generation: self.generation,
            event,
        });
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Open);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    pub fn error(&self, description: impl Into<String>) {
        self.emit(TransportEvent::Error(description.into()));
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>) {
        self.emit(TransportEvent::Close {
            code,
            reason: reason.into(),
        });
    }
}

/// Errors raised while talking to a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid realtime URL: {0}")]
    InvalidUrl(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection is no longer running")]
    NotRunning,
}

/// Opens realtime connections. Opening is fire-and-forget: the outcome is
/// reported later through the [`TransportSink`].
pub trait Transport: Send + 'static {
    type Connection: TransportConnection;

    fn open(&mut self, url: &str, sink: TransportSink) -> Self::Connection;
}

/// Handle to one transport attempt.
pub trait TransportConnection: Send + 'static {
    /// Queue a text frame.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Request a close with `code`. Completion arrives as a close event.
    fn close(&mut self, code: u16, reason: &str);
}

mod connection_native;
pub use connection_native::{NativeConnection, NativeTransport, SessionCookies};
