//! Lightweight message classification.
//!
//! The kind of a document is the name of the first element under the `WWKS`
//! envelope. Classification walks the XML event stream only as far as that
//! element and never deserializes the payload, so a document whose body would
//! fail to decode can still be routed.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::types::MessageKind;

/// Determine the kind of a complete frame. Never fails; anything not
/// recognised is [`MessageKind::Unknown`].
pub fn classify(frame: &str) -> MessageKind {
    match scan_first_child(frame) {
        Some(kind) => kind,
        None => scan_tag_names(frame),
    }
}

/// Structural pass: returns `Some` once the depth-1 element is seen, `None`
/// when the reader errors before reaching it.
fn scan_first_child(frame: &str) -> Option<MessageKind> {
    let mut reader = Reader::from_str(frame);
    reader.config_mut().trim_text(true);
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth == 1 {
                    return Some(MessageKind::from_tag(e.local_name().as_ref()));
                }
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                if depth == 1 {
                    return Some(MessageKind::from_tag(e.local_name().as_ref()));
                }
                if depth == 0 {
                    // `<WWKS/>` carries no message.
                    return Some(MessageKind::Unknown);
                }
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => return Some(MessageKind::Unknown),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    "[classify] structural scan stopped at {}: {e}",
                    reader.buffer_position()
                );
                return None;
            }
        }
    }
}

/// Fallback for documents the reader rejects: look for an opening tag of a
/// known kind anywhere in the text.
fn scan_tag_names(frame: &str) -> MessageKind {
    MessageKind::KNOWN
        .iter()
        .copied()
        .filter_map(|kind| {
            let open = format!("<{}", kind.tag());
            frame
                .match_indices(open.as_str())
                .find(|(pos, _)| {
                    let next = frame[pos + open.len()..].chars().next();
                    matches!(next, Some(c) if c.is_whitespace() || c == '>' || c == '/')
                })
                .map(|(pos, _)| (pos, kind))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, kind)| kind)
        .unwrap_or(MessageKind::Unknown)
}
