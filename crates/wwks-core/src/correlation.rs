//! Bracket-encoded request ids.
//!
//! A `StockInfoResponse` with an empty result set carries nothing but the
//! echoed request `Id`. To know which article such a response is about, a
//! targeted probe embeds the article id in its request id:
//! `<baseId>[<articleId>]`. The base is either a fresh request id or the id
//! of the output order the probe belongs to.
//!
//! The bracket part must be stripped before the base id is compared with
//! anything else (order ids in particular).

use crate::error::{Result, WwksError};

/// Result of splitting an echoed request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedId<'a> {
    /// No bracket present.
    Plain(&'a str),
    /// `base[article]`.
    Probe { base: &'a str, article: &'a str },
    /// An opening bracket without a matching close. The base is still the
    /// part before the bracket so it never leaks into other correlation.
    Malformed { base: &'a str },
}

impl<'a> ParsedId<'a> {
    /// Id with any bracket part removed.
    pub fn base(&self) -> &'a str {
        match *self {
            Self::Plain(base) | Self::Probe { base, .. } | Self::Malformed { base } => base,
        }
    }

    /// Embedded article id, when present and non-empty.
    pub fn article(&self) -> Option<&'a str> {
        match *self {
            Self::Probe { article, .. } if !article.is_empty() => Some(article),
            _ => None,
        }
    }
}

/// Embed `article_id` into `base_id`.
pub fn encode(base_id: &str, article_id: &str) -> Result<String> {
    if article_id.contains(['[', ']']) || base_id.contains(['[', ']']) {
        return Err(WwksError::Protocol(format!(
            "cannot bracket-encode '{article_id}' into '{base_id}'"
        )));
    }
    Ok(format!("{base_id}[{article_id}]"))
}

/// Split an echoed id into its base and optional embedded article.
pub fn decode(id: &str) -> ParsedId<'_> {
    let Some(start) = id.find('[') else {
        return ParsedId::Plain(id);
    };
    match id[start + 1..].find(']') {
        Some(len) => ParsedId::Probe {
            base: &id[..start],
            article: &id[start + 1..start + 1 + len],
        },
        None => ParsedId::Malformed { base: &id[..start] },
    }
}
