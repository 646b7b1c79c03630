use std::collections::{HashSet, VecDeque};

use voice_domain::{Channel, Fingerprint, Role};

/// Rounds timestamps to a 200ms bucket so a locally-emitted final and its
/// later socket replay collide on purpose (§4.6).
const DEDUPE_WINDOW_MS: i64 = 200;

/// A session rarely finalizes more than a few hundred turns; this is a
/// generous cap on a "set of fingerprints with bounded age" (§9) implemented
/// as insertion-order eviction rather than a wall-clock TTL, since every
/// fingerprint already carries its own rounded timestamp.
const MAX_TRACKED_FINGERPRINTS: usize = 512;

/// Tracks fingerprints of turns emitted locally in fallback mode, so that
/// when the backend socket recovers and replays catch-up events, already
/// seen turns are suppressed instead of appearing twice.
#[derive(Default)]
pub struct DedupeTable {
    seen: HashSet<Fingerprint>,
    order: VecDeque<Fingerprint>,
}

impl DedupeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a locally emitted final. Call once per turn, right after
    /// emitting it.
    pub fn register(&mut self, session_id: &str, role: Role, text: &str, started_at_ms: i64) {
        let fp = Self::fingerprint(session_id, role, text, started_at_ms);
        if self.seen.insert(fp.clone()) {
            self.order.push_back(fp);
            if self.order.len() > MAX_TRACKED_FINGERPRINTS {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
    }

    /// Returns `true` if this exact `(role, text, timestamp)` was already
    /// emitted locally and should be dropped rather than re-emitted.
    pub fn is_duplicate(&self, session_id: &str, role: Role, text: &str, started_at_ms: i64) -> bool {
        self.seen.contains(&Self::fingerprint(session_id, role, text, started_at_ms))
    }

    fn fingerprint(session_id: &str, role: Role, text: &str, started_at_ms: i64) -> Fingerprint {
        let normalized = Fingerprint::normalize_text(text);
        Fingerprint::compute(session_id, role, Channel::Text, started_at_ms, &normalized, DEDUPE_WINDOW_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_turn_is_reported_as_duplicate() {
        let mut table = DedupeTable::new();
        table.register("s1", Role::User, "hello doctor", 1000);
        assert!(table.is_duplicate("s1", Role::User, "hello doctor", 1000));
    }

    #[test]
    fn nearby_replay_within_window_is_still_duplicate() {
        let mut table = DedupeTable::new();
        table.register("s1", Role::User, "hello doctor", 1000);
        assert!(table.is_duplicate("s1", Role::User, "hello doctor", 1150));
    }

    #[test]
    fn unregistered_turn_is_not_duplicate() {
        let table = DedupeTable::new();
        assert!(!table.is_duplicate("s1", Role::User, "never seen", 1000));
    }

    #[test]
    fn oldest_entry_is_evicted_once_the_table_exceeds_its_cap() {
        let mut table = DedupeTable::new();
        table.register("s1", Role::User, "turn zero", 0);
        for i in 1..=MAX_TRACKED_FINGERPRINTS {
            table.register("s1", Role::User, &format!("turn {i}"), (i * 1000) as i64);
        }
        assert!(!table.is_duplicate("s1", Role::User, "turn zero", 0));
        assert!(table.is_duplicate("s1", Role::User, &format!("turn {MAX_TRACKED_FINGERPRINTS}"), (MAX_TRACKED_FINGERPRINTS * 1000) as i64));
    }
}
