use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Animation,
    Youtube,
}

/// A structured citation the assistant may embed in its transcript as
/// `[[MEDIA:<id>]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaReference {
    pub id: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub caption: String,
    #[serde(default)]
    pub animation_id: Option<String>,
}
