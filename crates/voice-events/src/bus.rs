//! Event fan-out for the voice conversation core.
//!
//! Grounded on the same decoupling idea as a classic in-process event bus:
//! the core never talks to a UI framework directly, only to listener
//! closures, so it can be driven headlessly in tests.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::conversation::ConversationEvent;
use crate::debug::{DebugEvent, DebugKind};

pub type ConversationListener = Box<dyn Fn(&ConversationEvent) + Send + Sync>;
pub type DebugListener = Box<dyn Fn(&DebugEvent) + Send + Sync>;

/// Synchronous conversation-event fan-out, in registration order. A listener
/// that panics is caught so later listeners still run.
#[derive(Default)]
pub struct ConversationBus {
    listeners: Mutex<Vec<ConversationListener>>,
}

impl ConversationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: ConversationListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn emit(&self, event: ConversationEvent) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::warn!("conversation listener panicked, continuing");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

/// Debug-event fan-out with a bounded replay backlog (§4.12).
///
/// When debug mode is disabled, events are still recorded into the ring
/// buffer but not forwarded live. Enabling debug flushes the backlog to new
/// listeners first, then live events flow, then a synthetic `debug enabled`
/// info event is appended.
pub struct DebugBus {
    enabled: Mutex<bool>,
    backlog: Mutex<VecDeque<DebugEvent>>,
    capacity: usize,
    listeners: Mutex<Vec<DebugListener>>,
}

impl DebugBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            enabled: Mutex::new(false),
            backlog: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock().unwrap()
    }

    /// Enable debug mode, flush the backlog to every current listener, then
    /// append a synthetic `debug enabled` marker.
    pub fn set_enabled(&self, enabled: bool, now_ms: i64) {
        let was_enabled = {
            let mut guard = self.enabled.lock().unwrap();
            let was = *guard;
            *guard = enabled;
            was
        };

        if enabled && !was_enabled {
            let backlog: Vec<DebugEvent> = self.backlog.lock().unwrap().iter().cloned().collect();
            let listeners = self.listeners.lock().unwrap();
            for event in &backlog {
                for listener in listeners.iter() {
                    let _ = catch_unwind(AssertUnwindSafe(|| listener(event)));
                }
            }
            drop(listeners);
            self.record(DebugEvent::new(DebugKind::Info, "debug enabled", now_ms));
        }
    }

    pub fn subscribe(&self, listener: DebugListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Always records into the backlog; only forwards live when enabled.
    pub fn record(&self, event: DebugEvent) {
        {
            let mut backlog = self.backlog.lock().unwrap();
            if backlog.len() >= self.capacity {
                backlog.pop_front();
            }
            backlog.push_back(event.clone());
        }

        if self.is_enabled() {
            let listeners = self.listeners.lock().unwrap();
            for listener in listeners.iter() {
                if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                    tracing::warn!("debug listener panicked, continuing");
                }
            }
        }
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().unwrap().len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

/// Shared handle combining both fan-outs, as owned by the controller.
#[derive(Clone)]
pub struct EventEmitter {
    pub conversation: Arc<ConversationBus>,
    pub debug: Arc<DebugBus>,
}

impl EventEmitter {
    pub fn new(debug_backlog_capacity: usize) -> Self {
        Self {
            conversation: Arc::new(ConversationBus::new()),
            debug: Arc::new(DebugBus::new(debug_backlog_capacity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::DebugKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn conversation_bus_delivers_in_order_and_isolates_panics() {
        let bus = ConversationBus::new();
        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        bus.subscribe(Box::new(move |_| o1.lock().unwrap().push(1)));
        bus.subscribe(Box::new(|_| panic!("boom")));
        let o2 = Arc::clone(&order);
        bus.subscribe(Box::new(move |_| o2.lock().unwrap().push(2)));

        bus.emit(ConversationEvent::Pause { paused: true });

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn debug_bus_records_to_backlog_even_when_disabled() {
        let bus = DebugBus::new(5);
        bus.record(DebugEvent::new(DebugKind::Info, "hello", 0));
        assert_eq!(bus.backlog_len(), 1);
        assert!(!bus.is_enabled());
    }

    #[test]
    fn debug_bus_enabling_flushes_backlog_then_appends_enabled_marker() {
        let bus = DebugBus::new(10);
        bus.record(DebugEvent::new(DebugKind::Info, "pre-enable", 0));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        bus.subscribe(Box::new(move |e| seen_clone.lock().unwrap().push(e.marker.clone())));

        bus.set_enabled(true, 10);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["pre-enable", "debug enabled"]);
    }

    #[test]
    fn debug_bus_drops_oldest_when_over_capacity() {
        let bus = DebugBus::new(2);
        bus.record(DebugEvent::new(DebugKind::Info, "a", 0));
        bus.record(DebugEvent::new(DebugKind::Info, "b", 1));
        bus.record(DebugEvent::new(DebugKind::Info, "c", 2));
        assert_eq!(bus.backlog_len(), 2);
    }

    #[test]
    fn re_enabling_does_not_replay_backlog_twice() {
        let bus = DebugBus::new(10);
        bus.record(DebugEvent::new(DebugKind::Info, "a", 0));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        bus.subscribe(Box::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));
        bus.set_enabled(true, 1);
        bus.set_enabled(true, 2);
        // one flush of "a" + one "debug enabled" marker == 2, not re-flushed.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
