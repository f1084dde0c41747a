//! Realtime notification connection.
//!
//! This module provides:
//! - A single auth-gated WebSocket connection with auto-reconnect
//! - Generation-tagged transport callbacks, so late events from a superseded
//!   attempt are ignored
//! - A bounded lifecycle log and an observable connection state
//!
//! # Architecture
//!
//! ```text
//!  AuthStateTracker ──AuthEvent──┐
//!  RealtimeHandle ──commands─────┤
//!                                ▼
//!                      ┌───────────────────┐      open / send / close
//!                      │ ConnectionManager │ ─────────────────────────▶ Transport
//!                      │  (one tokio task) │ ◀──── TransportSink ─────  (tungstenite)
//!                      └───────────────────┘   (generation-tagged)
//!                         │        │    ▲
//!                 watch   │        │    │ TimerFired
//!                         ▼        ▼    │
//!               ConnectionSnapshot  LogBuffer  ReconnectTimer
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env()?;
//! let api = ApiClient::new(&config.base_url)?;
//! let transport = NativeTransport::new().with_cookies(Arc::new(api.clone()));
//! let realtime = RealtimeHandle::from_config(&config, transport)?;
//!
//! let tracker = AuthStateTracker::new(Arc::new(api));
//! tracker.subscribe(Arc::new(realtime.notifier()));
//! tracker.refresh(ProbeReason::Startup).await;
//!
//! realtime.send("ping");
//! realtime.shutdown().await;
//! ```

mod connection;
mod handle;
mod log_buffer;
mod manager;
mod timer;

pub use connection::{
    ConnectionState, Generation, NativeConnection, NativeTransport, ReconnectConfig,
    SessionCookies, Transport, TransportConnection, TransportError, TransportEvent, TransportSink,
};
pub use handle::{RealtimeHandle, RealtimeNotifier};
pub use log_buffer::{LogBuffer, LogEntry, LogLevel, DEFAULT_LOG_CAPACITY};
pub use manager::{ConnectionManager, ConnectionSnapshot, ManagerEvent};
pub use timer::ReconnectTimer;
