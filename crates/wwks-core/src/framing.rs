//! Frame reassembly and outbound character sanitising.
//!
//! The robot streams `WWKS` documents back to back with no length prefix; a
//! frame ends with the literal closing tag `</WWKS>`. [`FrameReader`]
//! accumulates bytes across reads and emits complete documents. An unfinished
//! frame may not grow past the configured limit.
//!
//! Sanitising applies to outbound application data only. Inbound bytes are
//! framed and classified untouched so that stripping never shifts a tag.

use serde::Deserialize;

use crate::error::{Result, WwksError};
use crate::types::WWKS_END_TAG;

/// What to do with bytes that follow the first end tag found in a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePolicy {
    /// Emit the first complete document and drop the remainder.
    #[default]
    FirstOnly,
    /// Emit every complete document and keep the trailing partial one.
    Drain,
}

/// Accumulates raw stream bytes and yields complete frames.
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    policy: FramePolicy,
    max_frame: usize,
}

impl FrameReader {
    pub fn new(policy: FramePolicy, max_frame: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(8192),
            policy,
            max_frame,
        }
    }

    /// Append one read's worth of bytes and return the frames it completed.
    ///
    /// Fails with [`WwksError::Framing`] once the unfinished frame exceeds
    /// the limit; the buffer is discarded in that case.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        // Only the new bytes, plus a tag's worth of overlap, can hold a new end tag.
        let mut from = self.buffer.len().saturating_sub(WWKS_END_TAG.len() - 1);
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(end) = find_end(&self.buffer, from) {
            let frame: Vec<u8> = self.buffer.drain(..end).collect();
            frames.push(String::from_utf8_lossy(&frame).into_owned());
            from = 0;

            if self.policy == FramePolicy::FirstOnly {
                if !self.buffer.is_empty() {
                    tracing::warn!(
                        "[framing] dropping {} byte(s) after end tag in the same read",
                        self.buffer.len()
                    );
                }
                self.buffer.clear();
                break;
            }
        }

        if self.buffer.len() > self.max_frame {
            let pending = self.buffer.len();
            self.buffer.clear();
            return Err(WwksError::Framing(format!(
                "{pending} byte(s) without {WWKS_END_TAG}, limit is {}",
                self.max_frame
            )));
        }
        Ok(frames)
    }

    /// Bytes of the incomplete frame currently buffered.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partial frame (stream closed or reconnected).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Index just past the first end tag in `buf` at or after `from`.
fn find_end(buf: &[u8], from: usize) -> Option<usize> {
    let tag = WWKS_END_TAG.as_bytes();
    buf[from..]
        .windows(tag.len())
        .position(|w| w == tag)
        .map(|pos| from + pos + tag.len())
}

/// Whether `c` may appear in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Prepare an outbound document: trim a leading BOM / zero-width space and
/// drop characters outside the XML character ranges.
pub fn sanitize_outbound(message: &str) -> String {
    message
        .trim_start_matches(['\u{FEFF}', '\u{200B}'])
        .chars()
        .filter(|&c| is_xml_char(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<WWKS Version="2.0"><HelloResponse Id="1"/></WWKS>"#;
    const LIMIT: usize = 4096;

    fn reader(policy: FramePolicy) -> FrameReader {
        FrameReader::new(policy, LIMIT)
    }

    #[test]
    fn split_frame_is_reassembled() {
        let mut reader = reader(FramePolicy::FirstOnly);
        let (a, b) = DOC.split_at(20);
        assert!(reader.push(a.as_bytes()).unwrap().is_empty());
        assert_eq!(reader.pending(), 20);
        let frames = reader.push(b.as_bytes()).unwrap();
        assert_eq!(frames, vec![DOC.to_string()]);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn end_tag_split_across_reads() {
        let mut reader = reader(FramePolicy::FirstOnly);
        let cut = DOC.len() - 3;
        assert!(reader.push(DOC[..cut].as_bytes()).unwrap().is_empty());
        assert_eq!(reader.push(DOC[cut..].as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn end_tag_arriving_byte_by_byte() {
        let mut reader = reader(FramePolicy::FirstOnly);
        let mut frames = Vec::new();
        for byte in DOC.as_bytes() {
            frames.extend(reader.push(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(frames, vec![DOC.to_string()]);
    }

    #[test]
    fn first_only_drops_concatenated_remainder() {
        let mut reader = reader(FramePolicy::FirstOnly);
        let two = format!("{DOC}{DOC}");
        let frames = reader.push(two.as_bytes()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn drain_emits_all_and_keeps_partial() {
        let mut reader = reader(FramePolicy::Drain);
        let chunk = format!("{DOC}\n{DOC}<WWKS");
        let frames = reader.push(chunk.as_bytes()).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].starts_with('\n'));
        assert_eq!(reader.pending(), "<WWKS".len());
    }

    #[test]
    fn multibyte_char_split_between_reads() {
        let mut reader = reader(FramePolicy::FirstOnly);
        let doc = r#"<WWKS><Article Name="Crème"/></WWKS>"#;
        let bytes = doc.as_bytes();
        let cut = doc.find('è').unwrap() + 1;
        assert!(reader.push(&bytes[..cut]).unwrap().is_empty());
        let frames = reader.push(&bytes[cut..]).unwrap();
        assert_eq!(frames[0], doc);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut reader = reader(FramePolicy::Drain);
        reader.push(b"<WWKS><Hello").unwrap();
        reader.reset();
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn oversized_frame_without_end_tag_is_a_framing_error() {
        let mut reader = reader(FramePolicy::FirstOnly);
        reader.push(&[b'x'; LIMIT]).unwrap();
        assert_eq!(reader.pending(), LIMIT);

        let err = reader.push(b"<WWKS>").unwrap_err();
        assert!(matches!(err, WwksError::Framing(_)), "{err}");
        assert_eq!(reader.pending(), 0);

        // The reader is usable again afterwards.
        assert_eq!(reader.push(DOC.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn single_oversized_chunk_is_rejected() {
        let mut reader = reader(FramePolicy::Drain);
        let chunk = vec![b'<'; LIMIT * 2];
        assert!(matches!(reader.push(&chunk), Err(WwksError::Framing(_))));
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn sanitize_strips_illegal_characters() {
        let dirty = "\u{FEFF}\u{200B}<WWKS>a\u{1}b\u{FFFE}c\td\n</WWKS>";
        assert_eq!(sanitize_outbound(dirty), "<WWKS>abc\td\n</WWKS>");
    }

    #[test]
    fn sanitize_keeps_astral_characters() {
        assert_eq!(sanitize_outbound("💊"), "💊");
    }
}
