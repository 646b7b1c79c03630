use std::sync::Mutex;

use voice_domain::SessionStatus;

pub type StatusListener = Box<dyn Fn(SessionStatus, Option<&str>) + Send + Sync>;

/// Status FSM (§4.4): `idle → connecting → connected`, with `error` reachable
/// from any state and looping back to `idle` on retry. Tracks two extra
/// booleans the Connection Orchestrator gates outgoing traffic on.
pub struct SessionStateManager {
    inner: Mutex<Inner>,
}

struct Inner {
    status: SessionStatus,
    error: Option<String>,
    awaiting_session_ack: bool,
    session_ready: bool,
    fully_ready: bool,
    listeners: Vec<StatusListener>,
}

impl Default for SessionStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: SessionStatus::Idle,
                error: None,
                awaiting_session_ack: false,
                session_ready: false,
                fully_ready: false,
                listeners: Vec::new(),
            }),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().unwrap().status
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().unwrap().error.clone()
    }

    pub fn awaiting_session_ack(&self) -> bool {
        self.inner.lock().unwrap().awaiting_session_ack
    }

    pub fn session_ready(&self) -> bool {
        self.inner.lock().unwrap().session_ready
    }

    pub fn fully_ready(&self) -> bool {
        self.inner.lock().unwrap().fully_ready
    }

    pub fn set_connecting(&self) {
        self.transition(SessionStatus::Connecting, None);
    }

    pub fn set_connected(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.fully_ready = guard.session_ready;
        drop(guard);
        self.transition(SessionStatus::Connected, None);
    }

    pub fn set_error(&self, reason: impl Into<String>) {
        self.transition(SessionStatus::Error, Some(reason.into()));
    }

    pub fn set_idle(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.awaiting_session_ack = false;
        guard.session_ready = false;
        guard.fully_ready = false;
        drop(guard);
        self.transition(SessionStatus::Idle, None);
    }

    pub fn begin_awaiting_session_ack(&self) {
        self.inner.lock().unwrap().awaiting_session_ack = true;
    }

    /// Server `session.updated` arrived, or the 5s ack timer gave up and the
    /// controller decided to treat the session as ready anyway (§4.1).
    pub fn mark_session_ready(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.awaiting_session_ack = false;
        guard.session_ready = true;
        if guard.status == SessionStatus::Connected {
            guard.fully_ready = true;
        }
    }

    fn transition(&self, status: SessionStatus, error: Option<String>) {
        let mut guard = self.inner.lock().unwrap();
        guard.status = status;
        guard.error = error.clone();
        let listeners_snapshot: Vec<&StatusListener> = guard.listeners.iter().collect();
        for listener in listeners_snapshot {
            listener(status, error.as_deref());
        }
    }

    /// Registers a listener and immediately delivers the current state, per
    /// §4.4 ("receive the current state synchronously on subscribe").
    pub fn on_status_change(&self, listener: StatusListener) {
        let mut guard = self.inner.lock().unwrap();
        listener(guard.status, guard.error.as_deref());
        guard.listeners.push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn new_listener_receives_current_state_immediately() {
        let manager = SessionStateManager::new();
        manager.set_connecting();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        manager.on_status_change(Box::new(move |status, _| {
            *seen_clone.lock().unwrap() = Some(status);
        }));
        assert_eq!(*seen.lock().unwrap(), Some(SessionStatus::Connecting));
    }

    #[test]
    fn connected_marks_fully_ready_only_if_session_already_acked() {
        let manager = SessionStateManager::new();
        manager.set_connecting();
        manager.mark_session_ready();
        manager.set_connected();
        assert!(manager.fully_ready());
    }

    #[test]
    fn error_clears_on_return_to_idle() {
        let manager = SessionStateManager::new();
        manager.set_error("boom");
        assert_eq!(manager.error().as_deref(), Some("boom"));
        manager.set_idle();
        assert!(manager.error().is_none());
        assert!(!manager.awaiting_session_ack());
    }

    #[test]
    fn listeners_all_receive_transitions() {
        let manager = SessionStateManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&count);
        manager.on_status_change(Box::new(move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        manager.set_connecting();
        manager.set_connected();
        // 1 on subscribe + 2 transitions
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
