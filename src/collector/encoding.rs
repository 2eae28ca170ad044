//! Base64 helpers for the URI codec and the subscription wrapper
//!
//! Sources routinely publish unpadded and URL-safe-alphabet payloads, so the
//! tolerant decoder re-pads and accepts both alphabets. VMess bodies are
//! required to be standard-alphabet.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;

/// Re-pad a base64 payload to a multiple of four characters
fn repad(s: &str) -> String {
    let mut out = s.to_string();
    let rem = out.len() % 4;
    if rem != 0 {
        out.extend(std::iter::repeat('=').take(4 - rem));
    }
    out
}

/// Tolerant text decode: strips whitespace, re-pads, accepts both the
/// standard and URL-safe alphabets. Returns `None` for anything that is not
/// valid base64-wrapped UTF-8.
pub fn b64_decode_tolerant(s: &str) -> Option<String> {
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    let bytes = STANDARD.decode(repad(&compact)).ok()?;
    String::from_utf8(bytes).ok()
}

/// Strict standard-alphabet decode (re-padding allowed), for VMess bodies
pub fn b64_decode_standard(s: &str) -> Option<String> {
    let bytes = STANDARD.decode(repad(s.trim())).ok()?;
    String::from_utf8(bytes).ok()
}

/// Standard-alphabet encode without padding, for VMess/Shadowsocks bodies
pub fn b64_encode_standard_nopad(s: &str) -> String {
    STANDARD_NO_PAD.encode(s.as_bytes())
}

/// URL-safe encode without padding, for the subscription wrapper
pub fn b64_encode_urlsafe_nopad(s: &str) -> String {
    URL_SAFE_NO_PAD.encode(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_unpadded() {
        // "aes-256-gcm:pass" without its trailing padding
        assert_eq!(
            b64_decode_tolerant("YWVzLTI1Ni1nY206cGFzcw").as_deref(),
            Some("aes-256-gcm:pass")
        );
    }

    #[test]
    fn test_decode_urlsafe_alphabet() {
        let encoded = URL_SAFE_NO_PAD.encode("subj?>~data");
        assert_eq!(b64_decode_tolerant(&encoded).as_deref(), Some("subj?>~data"));
    }

    #[test]
    fn test_decode_ignores_line_wrapping() {
        let wrapped = "YWVzLTI1Ni1nY2\n06cGFzcw==\n";
        assert_eq!(b64_decode_tolerant(wrapped).as_deref(), Some("aes-256-gcm:pass"));
    }

    #[test]
    fn test_decode_garbage_is_none() {
        assert!(b64_decode_tolerant("!!!not base64!!!").is_none());
        assert!(b64_decode_standard("%%%").is_none());
    }

    #[test]
    fn test_standard_rejects_urlsafe_chars() {
        let urlsafe = URL_SAFE_NO_PAD.encode([0xfbu8, 0xff, 0xfe]);
        assert!(urlsafe.contains('-') || urlsafe.contains('_'));
        assert!(b64_decode_standard(&urlsafe).is_none());
    }

    #[test]
    fn test_encode_has_no_padding() {
        assert_eq!(b64_encode_standard_nopad("ab"), "YWI");
        assert_eq!(b64_encode_urlsafe_nopad("ab"), "YWI");
    }

    #[test]
    fn test_roundtrip() {
        let text = "method:password";
        let encoded = b64_encode_standard_nopad(text);
        assert_eq!(b64_decode_tolerant(&encoded).as_deref(), Some(text));
    }
}
