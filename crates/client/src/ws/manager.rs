//! The realtime connection state machine.
//!
//! [`ConnectionManager`] owns the transport, the reconnect timer and the
//! generation counter. It is driven one event at a time by [`run`], so no
//! state needs locking; every asynchronous callback arrives as a
//! [`ManagerEvent`] and is checked against the current generation before it
//! may touch anything.
//!
//! ```text
//!  Closed ──LoggedIn──▶ Connecting ──Open──▶ Open
//!    ▲                    │    ▲              │
//!    │      close(1000)   │    │ timer /      │ close(≠1000)
//!    ├────────────────────┘    │ visibility   ▼
//!    └──LoggedOut / manual──── ReconnectWaiting
//! ```
//!
//! [`run`]: ConnectionManager::run

use aeiouly_shared::{is_normal_closure, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION};
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::watch;

use super::connection::{
    ConnectionState, Generation, ReconnectConfig, Transport, TransportConnection, TransportEvent,
    TransportSink,
};
use super::log_buffer::LogBuffer;
use super::timer::ReconnectTimer;
use crate::auth_session::AuthEvent;

/// Everything that can happen to the manager, one turn each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    Auth(AuthEvent),
    /// Explicit connect request (same effect as a login).
    Connect,
    /// Explicit manual disconnect.
    Disconnect,
    VisibilityRegained,
    Send(String),
    Transport {
        generation: Generation,
        event: TransportEvent,
    },
    TimerFired {
        generation: Generation,
    },
    Shutdown,
}

/// Point-in-time view of the manager for observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub generation: Generation,
    /// Consecutive reconnect attempts since the last successful open
    pub attempt: u32,
    pub auto_reconnect: bool,
}

impl ConnectionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

pub struct ConnectionManager<T: Transport> {
    transport: T,
    url: String,
    reconnect: ReconnectConfig,
    events: UnboundedSender<ManagerEvent>,
    state: ConnectionState,
    generation: Generation,
    auto_reconnect: bool,
    attempt: u32,
    connection: Option<T::Connection>,
    timer: ReconnectTimer,
    logs: LogBuffer,
    observers: watch::Sender<ConnectionSnapshot>,
    shut_down: bool,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager in the `Closed` state.
    ///
    /// `events` must feed the receiver later passed to [`run`](Self::run);
    /// transport callbacks and timer fires are posted there.
    pub fn new(
        transport: T,
        url: impl Into<String>,
        reconnect: ReconnectConfig,
        logs: LogBuffer,
        events: UnboundedSender<ManagerEvent>,
    ) -> Self {
        let (observers, _) = watch::channel(ConnectionSnapshot {
            state: ConnectionState::Closed,
            generation: Generation::default(),
            attempt: 0,
            auto_reconnect: false,
        });
        Self {
            transport,
            url: url.into(),
            reconnect,
            events,
            state: ConnectionState::Closed,
            generation: Generation::default(),
            auto_reconnect: false,
            attempt: 0,
            connection: None,
            timer: ReconnectTimer::new(),
            logs,
            observers,
            shut_down: false,
        }
    }

    /// Process events until shutdown.
    pub async fn run(mut self, mut events: UnboundedReceiver<ManagerEvent>) {
        while let Some(event) = events.next().await {
            self.handle_event(event);
            if self.shut_down {
                break;
            }
        }
        self.shutdown();
    }

    pub fn handle_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Auth(event) => self.notify_auth(event),
            ManagerEvent::Connect => self.connect(),
            ManagerEvent::Disconnect => self.disconnect(),
            ManagerEvent::VisibilityRegained => self.notify_visibility_regained(),
            ManagerEvent::Send(message) => self.send(&message),
            ManagerEvent::Transport { generation, event } => {
                self.handle_transport(generation, event)
            }
            ManagerEvent::TimerFired { generation } => self.handle_timer_fired(generation),
            ManagerEvent::Shutdown => self.shutdown(),
        }
    }

    // --- Observables ---

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn has_pending_timer(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            generation: self.generation,
            attempt: self.attempt,
            auto_reconnect: self.auto_reconnect,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.observers.subscribe()
    }

    // --- Commands ---

    pub fn notify_auth(&mut self, event: AuthEvent) {
        if self.shut_down {
            return;
        }
        match event {
            AuthEvent::LoggedIn => self.request_connect("logged in"),
            AuthEvent::LoggedOut => self.manual_close("logged out"),
        }
    }

    pub fn connect(&mut self) {
        if self.shut_down {
            return;
        }
        self.request_connect("connect requested");
    }

    pub fn disconnect(&mut self) {
        if self.shut_down {
            return;
        }
        self.manual_close("disconnected by user");
    }

    /// Deliver `message` if the connection is open; otherwise record a
    /// warning and drop it.
    pub fn send(&mut self, message: &str) {
        if self.state != ConnectionState::Open {
            self.logs
                .warn(format!("not connected, dropping message: {message}"));
            return;
        }
        let Some(connection) = self.connection.as_mut() else {
            self.logs
                .warn(format!("no active connection, dropping message: {message}"));
            return;
        };
        match connection.send(message) {
            Ok(()) => self.logs.append(format!("sent: {message}")),
            Err(e) => self.logs.warn(format!("dropping message {message}: {e}")),
        }
    }

    pub fn notify_visibility_regained(&mut self) {
        if self.shut_down {
            return;
        }
        let idle = matches!(
            self.state,
            ConnectionState::Closed | ConnectionState::ReconnectWaiting
        );
        if idle && self.auto_reconnect && !self.is_connected() {
            self.attempt = 0;
            self.logs.append("page visible again, reconnecting now");
            self.start_attempt();
        } else {
            crate::log_debug!(
                "visibility regained while {} (auto reconnect: {}), nothing to do",
                self.state,
                self.auto_reconnect
            );
        }
    }

    /// Cancel the timer, force-close the transport and make every later
    /// callback inert. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.timer.cancel();
        self.auto_reconnect = false;
        if let Some(mut connection) = self.connection.take() {
            connection.close(CLOSE_NORMAL, "session ended");
        }
        self.generation.bump();
        self.logs.append("realtime connection shut down");
        self.set_state(ConnectionState::Closed);
    }

    // --- Callbacks ---

    pub fn handle_transport(&mut self, generation: Generation, event: TransportEvent) {
        if self.shut_down {
            return;
        }
        if generation != self.generation {
            crate::log_debug!(
                "ignoring stale {:?} from attempt {} (current {})",
                event,
                generation,
                self.generation
            );
            return;
        }

        match (self.state, event) {
            (ConnectionState::Connecting, TransportEvent::Open) => {
                self.timer.cancel();
                self.attempt = 0;
                self.logs.append("connected");
                self.set_state(ConnectionState::Open);
            }
            (ConnectionState::Open, TransportEvent::Message(text)) => {
                self.logs.append(format!("received: {text}"));
            }
            (
                ConnectionState::Connecting | ConnectionState::Open,
                TransportEvent::Error(description),
            ) => {
                self.logs.error(format!("transport error: {description}"));
            }
            (
                ConnectionState::Connecting | ConnectionState::Open,
                TransportEvent::Close { code, reason },
            ) => self.handle_close(code, &reason),
            (state, event) => {
                crate::log_debug!("ignoring {:?} while {}", event, state);
            }
        }
    }

    pub fn handle_timer_fired(&mut self, generation: Generation) {
        if self.shut_down {
            return;
        }
        if self.state != ConnectionState::ReconnectWaiting || generation != self.generation {
            crate::log_debug!(
                "ignoring reconnect timer from attempt {} while {} (current {})",
                generation,
                self.state,
                self.generation
            );
            return;
        }
        self.start_attempt();
    }

    // --- Transitions ---

    fn request_connect(&mut self, cause: &str) {
        match self.state {
            ConnectionState::Closed | ConnectionState::ReconnectWaiting => {
                self.auto_reconnect = true;
                self.attempt = 0;
                self.logs.append(format!("{cause}, opening realtime connection"));
                self.start_attempt();
            }
            ConnectionState::Connecting | ConnectionState::Open => {
                crate::log_debug!("{}: already {}", cause, self.state);
            }
        }
    }

    fn manual_close(&mut self, cause: &str) {
        self.timer.cancel();
        self.auto_reconnect = false;
        self.attempt = 0;
        if let Some(mut connection) = self.connection.take() {
            connection.close(CLOSE_NORMAL, cause);
        }
        if self.state != ConnectionState::Closed {
            self.logs.append(format!("{cause}, connection closed"));
        }
        // Whatever the closed attempt still reports is stale from here on.
        self.generation.bump();
        self.set_state(ConnectionState::Closed);
    }

    fn start_attempt(&mut self) {
        self.timer.cancel();
        if let Some(mut superseded) = self.connection.take() {
            superseded.close(CLOSE_NORMAL, "superseded");
        }
        let generation = self.generation.bump();
        self.logs
            .append(format!("connecting to {} (attempt {generation})", self.url));
        let sink = TransportSink::new(generation, self.events.clone());
        self.connection = Some(self.transport.open(&self.url, sink));
        self.set_state(ConnectionState::Connecting);
    }

    fn handle_close(&mut self, code: u16, reason: &str) {
        self.connection = None;
        let detail = if reason.is_empty() {
            format!("code {code}")
        } else {
            format!("code {code}: {reason}")
        };

        if is_normal_closure(code) {
            self.logs.append(format!("disconnected ({detail})"));
            self.set_state(ConnectionState::Closed);
            return;
        }

        self.logs.warn(format!("connection lost ({detail})"));
        if code == CLOSE_POLICY_VIOLATION {
            self.logs.warn("server rejected the session cookie");
        }
        if !self.auto_reconnect {
            self.set_state(ConnectionState::Closed);
            return;
        }
        if !self.reconnect.allows_attempt(self.attempt) {
            self.logs.error(format!(
                "giving up after {} reconnect attempts",
                self.attempt
            ));
            self.set_state(ConnectionState::Closed);
            return;
        }

        let delay = self.reconnect.delay_for_attempt(self.attempt);
        self.attempt += 1;
        self.schedule_reconnect(delay);
        self.logs.append(format!(
            "reconnecting in {:.1}s (retry {})",
            delay.as_secs_f64(),
            self.attempt
        ));
        self.set_state(ConnectionState::ReconnectWaiting);
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        let events = self.events.clone();
        let generation = self.generation;
        self.timer.schedule(delay, move || {
            let _ = events.unbounded_send(ManagerEvent::TimerFired { generation });
        });
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.observers.send_replace(self.snapshot());
    }
}
