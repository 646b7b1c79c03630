use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A finalized or in-progress unit of conversational exchange.
///
/// Ordering exposed to the UI is always by `started_at_ms`, never by
/// `finalized_at_ms` — a user turn that began speaking before an assistant
/// turn started must still be listed first, even if its transcription
/// finalizes later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub item_id: Option<String>,
    pub role: Role,
    pub text: String,
    pub is_final: bool,
    pub started_at_ms: i64,
    pub emitted_at_ms: i64,
    pub finalized_at_ms: Option<i64>,
}

/// A running best-guess transcript for an in-progress turn. At most one
/// user partial and one assistant partial exist at any moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partial {
    pub role: Role,
    pub text: String,
    pub started_at_ms: i64,
    pub emitted_at_ms: i64,
}

