//! Character encoding detection for OCX input files.
//!
//! OCX documents are usually UTF-8, but exports from older authoring tools
//! still declare legacy charsets. The input is decoded to UTF-8 once, before
//! the JSON-LD extractor and the sanitizer see it.

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use std::sync::LazyLock;

/// Number of leading bytes searched for a charset declaration.
const SNIFF_LEN: usize = 1024;

/// Match `<meta charset="...">` tag
#[allow(clippy::expect_used)]
static CHARSET_META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([^"'\s>/]+)"#).expect("valid regex")
});

/// Match `<meta http-equiv="Content-Type" content="...; charset=...">` tag
#[allow(clippy::expect_used)]
static CONTENT_TYPE_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+http-equiv\s*=\s*["']?content-type["']?[^>]+content\s*=\s*["']?[^"'>]*;\s*charset\s*=\s*([^"'\s>]+)"#).expect("valid regex")
});

/// Detect the character encoding of an input document.
///
/// Precedence: byte order mark, `<meta charset>`, `http-equiv` content type,
/// then UTF-8.
#[must_use]
pub fn detect_encoding(html: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(html) {
        return encoding;
    }

    let head = String::from_utf8_lossy(&html[..html.len().min(SNIFF_LEN)]);

    [&*CHARSET_META_RE, &*CONTENT_TYPE_CHARSET_RE]
        .into_iter()
        .filter_map(|re| declared_label(re, &head))
        .find_map(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8)
}

fn declared_label(re: &Regex, head: &str) -> Option<String> {
    re.captures(head)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Decode input bytes to a UTF-8 string.
///
/// Malformed sequences are replaced with U+FFFD rather than rejected; the
/// JSON-LD extractor reports real structural problems later.
///
/// # Examples
///
/// ```
/// use ocx_nimas::encoding::decode_document;
///
/// let html = b"<html><head><meta charset=\"ISO-8859-1\"></head><body>Caf\xE9</body></html>";
/// assert!(decode_document(html).contains("Café"));
/// ```
#[must_use]
pub fn decode_document(html: &[u8]) -> String {
    let encoding = detect_encoding(html);
    // decode() strips a matching BOM
    let (decoded, _used, _had_errors) = encoding.decode(html);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_declared() {
        let html = br#"<html><head><meta charset="utf-8"></head><body>Test</body></html>"#;
        assert_eq!(detect_encoding(html), UTF_8);
    }

    #[test]
    fn latin1_maps_to_windows1252() {
        let html = br#"<html><head><meta charset="ISO-8859-1"></head><body>Test</body></html>"#;
        // encoding_rs follows WHATWG: ISO-8859-1 is windows-1252
        assert_eq!(detect_encoding(html).name(), "windows-1252");
    }

    #[test]
    fn content_type_declaration() {
        let html = br#"<meta http-equiv="Content-Type" content="text/html; charset=ISO-8859-1">"#;
        assert_eq!(detect_encoding(html).name(), "windows-1252");
    }

    #[test]
    fn bom_beats_meta() {
        let mut html = vec![0xFF, 0xFE];
        html.extend_from_slice(br#"<meta charset="utf-8">"#);
        assert_eq!(detect_encoding(&html).name(), "UTF-16LE");
    }

    #[test]
    fn unknown_label_falls_back_to_utf8() {
        let html = br#"<meta charset="no-such-charset">"#;
        assert_eq!(detect_encoding(html), UTF_8);
    }

    #[test]
    fn decode_strips_utf8_bom() {
        let html = b"\xEF\xBB\xBF<p>x</p>";
        assert_eq!(decode_document(html), "<p>x</p>");
    }

    #[test]
    fn decode_windows1252_quotes() {
        let html = b"<html><head><meta charset=\"windows-1252\"></head><body>\x93Hi\x94</body></html>";
        assert!(decode_document(html).contains("\u{201C}Hi\u{201D}"));
    }

    #[test]
    fn decode_invalid_utf8_is_lossy() {
        let html = b"<body>Test \xFF\xFE Invalid</body>";
        let out = decode_document(html);
        assert!(out.contains("Test"));
        assert!(out.contains('\u{FFFD}'));
    }

    #[test]
    fn meta_without_quotes() {
        let html = b"<META CHARSET=utf-8>";
        assert_eq!(declared_label(&CHARSET_META_RE, &String::from_utf8_lossy(html)), Some("utf-8".to_string()));
    }
}
