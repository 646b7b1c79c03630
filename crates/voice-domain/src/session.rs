use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Student,
    Faculty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Error,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

/// A realtime voice session as created by the HTTP service (§6.1).
///
/// Exactly one is live per controller instance; its lifetime runs from a
/// successful `start()` to `stop()` or an unrecoverable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub persona_id: String,
    pub scenario_id: String,
    pub audience: Audience,
    #[serde(default)]
    pub realtime_session_id: Option<String>,
    pub status: SessionStatus,
    pub created_at_ms: i64,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        persona_id: impl Into<String>,
        scenario_id: impl Into<String>,
        audience: Audience,
        created_at_ms: i64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            persona_id: persona_id.into(),
            scenario_id: scenario_id.into(),
            audience,
            realtime_session_id: None,
            status: SessionStatus::Idle,
            created_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_idle() {
        assert_eq!(SessionStatus::default(), SessionStatus::Idle);
    }

    #[test]
    fn new_session_starts_without_realtime_id() {
        let s = Session::new("sess-1", "persona-1", "scenario-1", Audience::Student, 0);
        assert!(s.realtime_session_id.is_none());
        assert_eq!(s.status, SessionStatus::Idle);
    }
}
