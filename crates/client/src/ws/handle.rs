//! Owner-side API of a running realtime manager.
//!
//! These are the only ways to reach the manager: commands are posted to its
//! event queue, state is read from a watch channel, and logs from the shared
//! [`LogBuffer`]. Nothing here touches manager state directly.

use futures_channel::mpsc::{unbounded, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::{ConnectionState, ReconnectConfig, Transport};
use super::log_buffer::{LogBuffer, LogEntry};
use super::manager::{ConnectionManager, ConnectionSnapshot, ManagerEvent};
use crate::auth_session::{AuthEvent, AuthListener};
use crate::config::{ClientConfig, ConfigError};

/// Cloneable command sender. Register it with the auth tracker to feed
/// login/logout transitions into the manager.
#[derive(Debug, Clone)]
pub struct RealtimeNotifier {
    events: UnboundedSender<ManagerEvent>,
}

impl RealtimeNotifier {
    fn post(&self, event: ManagerEvent) {
        if self.events.unbounded_send(event).is_err() {
            crate::log_debug!("realtime manager already stopped, command dropped");
        }
    }

    pub fn notify_auth(&self, event: AuthEvent) {
        self.post(ManagerEvent::Auth(event));
    }

    pub fn connect(&self) {
        self.post(ManagerEvent::Connect);
    }

    pub fn disconnect(&self) {
        self.post(ManagerEvent::Disconnect);
    }

    /// Send a text frame if connected; dropped with a warning entry otherwise
    pub fn send(&self, message: impl Into<String>) {
        self.post(ManagerEvent::Send(message.into()));
    }

    pub fn notify_visibility_regained(&self) {
        self.post(ManagerEvent::VisibilityRegained);
    }
}

impl AuthListener for RealtimeNotifier {
    fn on_auth_event(&self, event: AuthEvent) {
        self.notify_auth(event);
    }
}

/// Handle to the manager task. Dropping it shuts the manager down;
/// [`shutdown`](Self::shutdown) does the same and waits for it.
pub struct RealtimeHandle {
    notifier: RealtimeNotifier,
    snapshot: watch::Receiver<ConnectionSnapshot>,
    logs: LogBuffer,
    task: Option<JoinHandle<()>>,
}

impl RealtimeHandle {
    /// Start a manager for `url` on the current tokio runtime.
    pub fn spawn<T: Transport>(
        transport: T,
        url: impl Into<String>,
        reconnect: ReconnectConfig,
        logs: LogBuffer,
    ) -> Self {
        let (events, receiver) = unbounded();
        let manager =
            ConnectionManager::new(transport, url, reconnect, logs.clone(), events.clone());
        let snapshot = manager.subscribe();
        let task = tokio::spawn(manager.run(receiver));

        Self {
            notifier: RealtimeNotifier { events },
            snapshot,
            logs,
            task: Some(task),
        }
    }

    pub fn from_config<T: Transport>(
        config: &ClientConfig,
        transport: T,
    ) -> Result<Self, ConfigError> {
        let url = config.ws_url()?;
        Ok(Self::spawn(
            transport,
            url,
            config.reconnect.clone(),
            LogBuffer::with_capacity(config.log_capacity),
        ))
    }

    pub fn notifier(&self) -> RealtimeNotifier {
        self.notifier.clone()
    }

    pub fn notify_auth(&self, event: AuthEvent) {
        self.notifier.notify_auth(event);
    }

    pub fn connect(&self) {
        self.notifier.connect();
    }

    pub fn disconnect(&self) {
        self.notifier.disconnect();
    }

    pub fn send(&self, message: impl Into<String>) {
        self.notifier.send(message);
    }

    pub fn notify_visibility_regained(&self) {
        self.notifier.notify_visibility_regained();
    }

    // --- Observables ---

    pub fn snapshot(&self) -> ConnectionSnapshot {
        *self.snapshot.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot().state
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot().is_connected()
    }

    /// Receiver that is notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.clone()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.entries()
    }

    pub fn log_buffer(&self) -> &LogBuffer {
        &self.logs
    }

    /// Tear the connection down and wait for the manager task to finish.
    pub async fn shutdown(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.notifier.post(ManagerEvent::Shutdown);
        if let Err(e) = task.await {
            crate::log_error!("realtime manager task failed: {}", e);
        }
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        if self.task.take().is_some() {
            self.notifier.post(ManagerEvent::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::{TransportConnection, TransportError, TransportSink};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Opens succeed immediately; closes are echoed back as close events.
    #[derive(Clone, Default)]
    struct LoopbackTransport {
        sent: Arc<Mutex<Vec<String>>>,
    }

    struct LoopbackConnection {
        sink: TransportSink,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for LoopbackTransport {
        type Connection = LoopbackConnection;

        fn open(&mut self, _url: &str, sink: TransportSink) -> LoopbackConnection {
            sink.opened();
            LoopbackConnection {
                sink,
                sent: self.sent.clone(),
            }
        }
    }

    impl TransportConnection for LoopbackConnection {
        fn send(&mut self, text: &str) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(text.to_string());
            self.sink.message(format!("echo: {text}"));
            Ok(())
        }

        fn close(&mut self, code: u16, reason: &str) {
            self.sink.closed(code, reason);
        }
    }

    async fn wait_for(
        rx: &mut watch::Receiver<ConnectionSnapshot>,
        state: ConnectionState,
    ) -> ConnectionSnapshot {
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|snapshot| snapshot.state == state),
        )
        .await
        .expect("timed out waiting for state")
        .expect("manager stopped");
        *snapshot
    }

    async fn wait_for_log(logs: &LogBuffer, text: &str) {
        for _ in 0..500 {
            if logs.entries().iter().any(|e| e.text == text) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("log entry {text:?} never appeared");
    }

    #[tokio::test]
    async fn test_auth_events_drive_connection() {
        let transport = LoopbackTransport::default();
        let handle = RealtimeHandle::spawn(
            transport.clone(),
            "ws://test/notifications/ws",
            ReconnectConfig::default(),
            LogBuffer::default(),
        );
        let mut rx = handle.subscribe();
        assert_eq!(handle.state(), ConnectionState::Closed);

        handle.notifier().on_auth_event(AuthEvent::LoggedIn);
        wait_for(&mut rx, ConnectionState::Open).await;
        assert!(handle.is_connected());

        handle.send("ping");
        wait_for_log(handle.log_buffer(), "received: echo: ping").await;
        handle.notify_auth(AuthEvent::LoggedOut);
        let snapshot = wait_for(&mut rx, ConnectionState::Closed).await;
        assert!(!snapshot.auto_reconnect);
        assert_eq!(*transport.sent.lock().unwrap(), ["ping"]);

        let texts: Vec<_> = handle.logs().into_iter().map(|e| e.text).collect();
        assert!(texts.contains(&"connected".to_string()));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_stops_task() {
        let handle = RealtimeHandle::spawn(
            LoopbackTransport::default(),
            "ws://test/notifications/ws",
            ReconnectConfig::default(),
            LogBuffer::default(),
        );
        let mut rx = handle.subscribe();
        let notifier = handle.notifier();
        let logs = handle.log_buffer().clone();

        handle.connect();
        wait_for(&mut rx, ConnectionState::Open).await;
        handle.shutdown().await;

        // Commands after shutdown go nowhere.
        notifier.connect();
        assert_eq!(rx.borrow().state, ConnectionState::Closed);
        assert_eq!(
            logs.last().map(|e| e.text),
            Some("realtime connection shut down".to_string())
        );
    }

    #[tokio::test]
    async fn test_drop_shuts_down() {
        let logs = LogBuffer::default();
        let mut rx = {
            let handle = RealtimeHandle::spawn(
                LoopbackTransport::default(),
                "ws://test/notifications/ws",
                ReconnectConfig::default(),
                logs.clone(),
            );
            let mut rx = handle.subscribe();
            handle.connect();
            wait_for(&mut rx, ConnectionState::Open).await;
            rx
        };
        wait_for(&mut rx, ConnectionState::Closed).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            logs.last().map(|e| e.text),
            Some("realtime connection shut down".to_string())
        );
    }
}
