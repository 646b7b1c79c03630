use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Text,
    Audio,
}

/// Deterministic hash over `(session_id, role, channel, rounded_timestamp,
/// normalized_text)`, used to reject duplicate turns when the client falls
/// back to direct emission after a socket hiccup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// `window_ms` rounds `started_at_ms` down to a bucket so near-identical
    /// timestamps (±200ms per the transcript dedupe rule) collide on purpose.
    pub fn compute(
        session_id: &str,
        role: Role,
        channel: Channel,
        started_at_ms: i64,
        normalized_text: &str,
        window_ms: i64,
    ) -> Self {
        let rounded = if window_ms > 0 {
            (started_at_ms / window_ms) * window_ms
        } else {
            started_at_ms
        };

        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        matches!(role, Role::Assistant).hash(&mut hasher);
        channel.hash(&mut hasher);
        rounded.hash(&mut hasher);
        normalized_text.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }

    pub fn normalize_text(text: &str) -> String {
        text.trim().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_identical_fingerprints() {
        let a = Fingerprint::compute("s1", Role::User, Channel::Text, 1000, "hello doctor", 200);
        let b = Fingerprint::compute("s1", Role::User, Channel::Text, 1000, "hello doctor", 200);
        assert_eq!(a, b);
    }

    #[test]
    fn nearby_timestamps_within_window_collide() {
        let a = Fingerprint::compute("s1", Role::User, Channel::Text, 1000, "hello doctor", 200);
        let b = Fingerprint::compute("s1", Role::User, Channel::Text, 1150, "hello doctor", 200);
        assert_eq!(a, b);
    }

    #[test]
    fn different_role_changes_fingerprint() {
        let a = Fingerprint::compute("s1", Role::User, Channel::Text, 1000, "hi", 200);
        let b = Fingerprint::compute("s1", Role::Assistant, Channel::Text, 1000, "hi", 200);
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_text_collapses_whitespace_and_case() {
        assert_eq!(Fingerprint::normalize_text("  Hello   Doctor \n"), "hello doctor");
    }
}
