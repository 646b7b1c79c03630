use serde::{Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum VoiceCommandError {
    #[error("voice conversation not started")]
    NotStarted,

    #[error(transparent)]
    Voice(#[from] voice_domain::VoiceError),
}

impl Serialize for VoiceCommandError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VoiceCommandError>;
