//! Raw URI token extraction from arbitrary text
//!
//! Scans message bodies and subscription payloads for protocol-prefixed
//! tokens. A match is rejected when it sits inside a larger word (preceded by
//! a word character or hyphen) or when the source truncated it (horizontal
//! ellipsis, also inside the display fragment). Surviving tokens have their
//! `#...` display fragment stripped; remarks are always reconstructed later,
//! never trusted from raw text. VLess tokens carrying the `security=reality`
//! marker land in the dedicated Reality bucket and nowhere else.

use crate::collector::models::ProtocolTag;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Source-side truncation marker
const ELLIPSIS: char = '\u{2026}';

/// Reality security marker inside a VLess query string
const REALITY_MARKER: &str = "security=reality";

static SS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ss://[^\s<>]+").expect("Invalid ss regex"));
static VMESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)vmess://[^\s<>]+").expect("Invalid vmess regex"));
static VLESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)vless://[^\s<>]+").expect("Invalid vless regex"));
static HYSTERIA2_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:hy2|hysteria2)://[^\s<>]+").expect("Invalid hysteria2 regex"));

/// Extracts raw proxy URI tokens from text, bucketed per protocol tag
pub struct RawExtractor;

impl RawExtractor {
    /// Scan a block of text and return every acceptable token per tag.
    /// Tags without matches are absent from the map.
    pub fn find_all(text: &str) -> HashMap<ProtocolTag, Vec<String>> {
        let mut all: HashMap<ProtocolTag, Vec<String>> = HashMap::new();

        for token in Self::scan(text, &SS_REGEX) {
            all.entry(ProtocolTag::Shadowsocks).or_default().push(token);
        }
        for token in Self::scan(text, &VMESS_REGEX) {
            all.entry(ProtocolTag::Vmess).or_default().push(token);
        }
        // Reality and generic VLess are mutually exclusive by construction:
        // a token goes to exactly one bucket depending on the marker.
        for token in Self::scan(text, &VLESS_REGEX) {
            let tag = if token.to_ascii_lowercase().contains(REALITY_MARKER) {
                ProtocolTag::Reality
            } else {
                ProtocolTag::Vless
            };
            all.entry(tag).or_default().push(token);
        }
        for token in Self::scan(text, &HYSTERIA2_REGEX) {
            all.entry(ProtocolTag::Hysteria2).or_default().push(token);
        }

        all
    }

    /// The truncation check runs on the full match, fragment included; the
    /// fragment is stripped only from survivors.
    fn scan(text: &str, pattern: &Regex) -> Vec<String> {
        pattern
            .find_iter(text)
            .filter(|m| !Self::preceded_by_word_char(text, m.start()))
            .map(|m| m.as_str())
            .filter(|token| !token.contains(ELLIPSIS))
            .map(Self::strip_display_fragment)
            .collect()
    }

    /// The scheme must not continue a larger token (e.g. the `ss://` inside
    /// `vless://`, or `foo-ss://`)
    fn preceded_by_word_char(text: &str, start: usize) -> bool {
        text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
    }

    fn strip_display_fragment(token: &str) -> String {
        match token.find('#') {
            Some(idx) => token[..idx].to_string(),
            None => token.to_string(),
        }
    }
}
