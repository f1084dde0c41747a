//! Authentication state tracking.
//!
//! [`AuthStateTracker`] probes the session through a [`SessionProbe`] and
//! turns what it observes into discrete [`AuthEvent`]s for its listeners.
//! It emits only on change: a probe that confirms the current state is
//! silent.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use aeiouly_shared::{ApiError, CurrentUser};
use async_trait::async_trait;

/// Logical auth transition delivered to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Not probed yet
    #[default]
    Unknown,
    LoggedOut,
    LoggedIn,
}

impl AuthState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }
}

/// Signal that triggered a session probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReason {
    Startup,
    FocusRegained,
    VisibilityRegained,
    LoginCompleted,
}

impl fmt::Display for ProbeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProbeReason::Startup => "startup",
            ProbeReason::FocusRegained => "focus regained",
            ProbeReason::VisibilityRegained => "visibility regained",
            ProbeReason::LoginCompleted => "login completed",
        };
        f.write_str(label)
    }
}

/// Receives auth transitions. Implementations must not block and must not
/// call back into the tracker; they run under its session lock.
pub trait AuthListener: Send + Sync {
    fn on_auth_event(&self, event: AuthEvent);
}

/// Asks the auth service who the current session belongs to.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    async fn check_session(&self) -> Result<CurrentUser, ApiError>;
}

#[derive(Debug, Default)]
struct Session {
    state: AuthState,
    user: Option<CurrentUser>,
    /// Sequence number of the newest probe whose result was applied
    applied: u64,
}

pub struct AuthStateTracker {
    probe: Arc<dyn SessionProbe>,
    session: Mutex<Session>,
    listeners: RwLock<Vec<Arc<dyn AuthListener>>>,
    probes: AtomicU64,
}

impl AuthStateTracker {
    pub fn new(probe: Arc<dyn SessionProbe>) -> Self {
        Self {
            probe,
            session: Mutex::new(Session::default()),
            listeners: RwLock::new(Vec::new()),
            probes: AtomicU64::new(0),
        }
    }

    /// Register a listener for every future transition
    pub fn subscribe(&self, listener: Arc<dyn AuthListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> AuthState {
        self.session().state
    }

    /// Identity from the last successful probe, cleared on logout
    pub fn current_user(&self) -> Option<CurrentUser> {
        self.session().user.clone()
    }

    /// Probe the session and emit a transition if the state changed.
    ///
    /// Any probe failure counts as logged out. If a newer probe finished
    /// first, this probe's result is discarded.
    pub async fn refresh(&self, reason: ProbeReason) -> AuthState {
        let sequence = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        crate::log_debug!("session probe {} ({})", sequence, reason);

        let user = match self.probe.check_session().await {
            Ok(user) => Some(user),
            Err(e) if e.is_unauthorized() => None,
            Err(e) => {
                crate::log_warn!("session probe failed, treating as logged out: {}", e);
                None
            }
        };
        self.apply(sequence, user)
    }

    /// Record a completed logout without probing.
    pub fn logout_completed(&self) -> AuthState {
        let sequence = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        self.apply(sequence, None)
    }

    /// Applies a probe result and emits its event under the session lock, so
    /// listeners see events in the order the states were applied.
    fn apply(&self, sequence: u64, user: Option<CurrentUser>) -> AuthState {
        let mut session = self.session();
        if sequence < session.applied {
            crate::log_debug!(
                "discarding probe {} (probe {} already applied)",
                sequence,
                session.applied
            );
            return session.state;
        }
        session.applied = sequence;

        let next = if user.is_some() {
            AuthState::LoggedIn
        } else {
            AuthState::LoggedOut
        };
        let event = transition(session.state, next);
        if let Some(user) = &user {
            if event.is_some() {
                crate::log_info!("signed in as {}", user.display_name());
            }
        }
        session.state = next;
        session.user = user;

        if let Some(event) = event {
            self.emit(event);
        }
        next
    }

    fn emit(&self, event: AuthEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in listeners {
            listener.on_auth_event(event);
        }
    }
}

/// Event for moving from `previous` to `next`, if it is a change
fn transition(previous: AuthState, next: AuthState) -> Option<AuthEvent> {
    if previous == next {
        return None;
    }
    match next {
        AuthState::LoggedIn => Some(AuthEvent::LoggedIn),
        AuthState::LoggedOut => Some(AuthEvent::LoggedOut),
        AuthState::Unknown => None,
    }
}
