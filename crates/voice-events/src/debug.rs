use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugKind {
    Info,
    Warn,
    Error,
    Event,
}

/// Finer-grained diagnostic event. Always recorded in the bounded backlog
/// (§4.12); only forwarded live to listeners when debug mode is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugEvent {
    pub kind: DebugKind,
    pub marker: String,
    #[serde(default)]
    pub data: Value,
    pub emitted_at_ms: i64,
}

impl DebugEvent {
    pub fn new(kind: DebugKind, marker: impl Into<String>, emitted_at_ms: i64) -> Self {
        Self {
            kind,
            marker: marker.into(),
            data: Value::Null,
            emitted_at_ms,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// A message containing "error" or "warning" is classified as an error
    /// debug event (§4.5); everything else is a plain `event`.
    pub fn classify_wire_type(type_word: &str) -> DebugKind {
        let lower = type_word.to_lowercase();
        if lower.contains("error") || lower.contains("warning") {
            DebugKind::Error
        } else {
            DebugKind::Event
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_and_warning_types() {
        assert_eq!(DebugEvent::classify_wire_type("response.error"), DebugKind::Error);
        assert_eq!(DebugEvent::classify_wire_type("session.warning"), DebugKind::Error);
        assert_eq!(DebugEvent::classify_wire_type("session.created"), DebugKind::Event);
    }
}
