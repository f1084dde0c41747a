//! Aeiouly Client - realtime notification client
//!
//! This crate contains the client side of the aeiouly realtime channel:
//! the auth-gated WebSocket connection manager, the session tracker that
//! drives it, and the cookie-carrying REST client for the auth endpoints.

pub mod api_client;
pub mod auth_session;
pub mod config;
pub mod logging;
pub mod ws;

pub use api_client::ApiClient;
pub use auth_session::{
    AuthEvent, AuthListener, AuthState, AuthStateTracker, ProbeReason, SessionProbe,
};
pub use config::{ClientConfig, ConfigError};
pub use ws::{ConnectionState, LogEntry, NativeTransport, RealtimeHandle, ReconnectConfig};
