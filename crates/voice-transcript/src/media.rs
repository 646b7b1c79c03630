use voice_domain::MediaReference;

/// Result of stripping a `[[MEDIA:<id>]]` marker out of a finalized turn's
/// text (§4.6).
pub struct ParsedText {
    pub clean_text: String,
    pub media: Option<MediaReference>,
    /// Set when the marker referenced an id absent from the scenario's
    /// media list; the caller should emit `media.marker.unresolved`.
    pub unresolved_marker: Option<String>,
}

/// Scans `text` for a single `[[MEDIA:<id>]]` marker, looks `<id>` up in
/// `catalog`, and returns the text with the marker stripped plus the
/// resolved reference, if any.
pub fn parse_media_markers(text: &str, catalog: &[MediaReference]) -> ParsedText {
    let Some(start) = text.find("[[MEDIA:") else {
        return ParsedText { clean_text: text.to_string(), media: None, unresolved_marker: None };
    };
    let Some(end_offset) = text[start..].find("]]") else {
        return ParsedText { clean_text: text.to_string(), media: None, unresolved_marker: None };
    };
    let end = start + end_offset + 2;
    let id = text[start + "[[MEDIA:".len()..start + end_offset].trim();

    let media = catalog.iter().find(|m| m.id == id).cloned();
    let unresolved_marker = if media.is_none() { Some(id.to_string()) } else { None };

    let mut clean_text = String::with_capacity(text.len());
    clean_text.push_str(text[..start].trim_end());
    if !clean_text.is_empty() && end < text.len() {
        clean_text.push(' ');
    }
    clean_text.push_str(text[end..].trim_start());

    ParsedText { clean_text: clean_text.trim().to_string(), media, unresolved_marker }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_domain::MediaKind;

    fn catalog() -> Vec<MediaReference> {
        vec![MediaReference {
            id: "xray-1".to_string(),
            kind: MediaKind::Image,
            url: Some("https://example.test/xray-1.png".to_string()),
            thumbnail: None,
            caption: "Chest X-ray".to_string(),
            animation_id: None,
        }]
    }

    #[test]
    fn strips_resolved_marker_and_returns_reference() {
        let parsed = parse_media_markers("Here is the scan [[MEDIA:xray-1]] for review.", &catalog());
        assert_eq!(parsed.clean_text, "Here is the scan for review.");
        assert!(parsed.media.is_some());
        assert!(parsed.unresolved_marker.is_none());
    }

    #[test]
    fn unknown_id_is_stripped_but_flagged() {
        let parsed = parse_media_markers("See [[MEDIA:missing]] now.", &catalog());
        assert_eq!(parsed.clean_text, "See now.");
        assert!(parsed.media.is_none());
        assert_eq!(parsed.unresolved_marker.as_deref(), Some("missing"));
    }

    #[test]
    fn text_without_marker_passes_through() {
        let parsed = parse_media_markers("no markers here", &catalog());
        assert_eq!(parsed.clean_text, "no markers here");
        assert!(parsed.media.is_none());
    }
}
