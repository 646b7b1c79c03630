use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, OnceCell};

use voice_domain::{GateFlags, Result};
use voice_http::{InstructionsRequest, VoiceHttpClient};

/// Emitted to the UI once a refresh completes (§4.9 step 5).
#[derive(Debug, Clone)]
pub struct InstructionsUpdate {
    pub instructions: String,
    pub phase: String,
    pub outstanding_gate: Vec<String>,
}

fn content_hash(instructions: &str, phase: &str, outstanding_gate: &[String]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    instructions.hash(&mut hasher);
    phase.hash(&mut hasher);
    outstanding_gate.hash(&mut hasher);
    hasher.finish()
}

/// Pulls fresh persona/gate-driven instructions and pushes them onto the
/// data channel, deduplicating both by content hash and by in-flight reason
/// (§4.9).
pub struct InstructionSyncer {
    http: Arc<VoiceHttpClient>,
    session_id: String,
    last_sent_hash: AsyncMutex<Option<u64>>,
    in_flight: AsyncMutex<HashMap<String, Arc<OnceCell<Result<Option<InstructionsUpdate>>>>>>,
}

impl InstructionSyncer {
    pub fn new(http: Arc<VoiceHttpClient>, session_id: impl Into<String>) -> Self {
        Self {
            http,
            session_id: session_id.into(),
            last_sent_hash: AsyncMutex::new(None),
            in_flight: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Fetches instructions and returns `Some(update)` if they differ from
    /// the last sent hash, `None` if deduplicated away. Concurrent calls
    /// sharing the same `reason` share a single in-flight fetch: the first
    /// caller drives it to completion and every other caller awaits the same
    /// `OnceCell`, so only one request ever reaches the network per reason.
    pub async fn refresh(
        &self,
        reason: &str,
        phase: Option<String>,
        gate: Option<GateFlags>,
    ) -> Result<Option<InstructionsUpdate>> {
        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(reason.to_string()).or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let result = cell
            .get_or_init(|| async move {
                let req = InstructionsRequest { session_id: self.session_id.clone(), phase, gate, role_id: None, audience: None };
                let resp = self.http.fetch_instructions(&req).await?;

                let hash = content_hash(&resp.instructions, &resp.phase, &resp.outstanding_gate);
                let mut last = self.last_sent_hash.lock().await;
                if *last == Some(hash) {
                    return Ok(None);
                }
                *last = Some(hash);

                Ok(Some(InstructionsUpdate {
                    instructions: resp.instructions,
                    phase: resp.phase,
                    outstanding_gate: resp.outstanding_gate,
                }))
            })
            .await
            .clone();

        self.in_flight.lock().await.remove(reason);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_hashes_to_the_same_value() {
        let a = content_hash("hi", "intro", &["greeting".to_string()]);
        let b = content_hash("hi", "intro", &["greeting".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_phase_changes_hash() {
        let a = content_hash("hi", "intro", &[]);
        let b = content_hash("hi", "exam", &[]);
        assert_ne!(a, b);
    }
}
