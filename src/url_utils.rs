//! URL Utility Functions
//!
//! Parsing and resolution helpers for `<img src>` values, which in OCX
//! documents may be absolute HTTP URLs, `file://` URLs, or paths relative to
//! the document.

use url::Url;

/// `true` if the value starts with a URL scheme (`http:`, `file:`, `data:`, ...).
///
/// Windows drive letters (`C:\img.png`) are not treated as schemes.
#[must_use]
pub fn has_scheme(s: &str) -> bool {
    let Some((scheme, _)) = s.trim().split_once(':') else {
        return false;
    };
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Resolve a possibly relative URL against a base.
///
/// Absolute values are returned parsed as-is; relative values are joined to
/// `base`. Returns `None` if neither yields a valid URL.
#[must_use]
pub fn create_absolute_url(url_str: &str, base: Option<&Url>) -> Option<Url> {
    let url_str = url_str.trim();
    if url_str.is_empty() {
        return None;
    }
    if has_scheme(url_str) {
        return Url::parse(url_str).ok();
    }
    base.and_then(|b| b.join(url_str).ok())
}

/// Path component of an image source, without query string or fragment.
///
/// For URLs with a scheme this is the parsed URL path (percent-encoded, as it
/// appears on the wire); for relative references it is the reference itself
/// up to the first `?` or `#`.
///
/// # Examples
/// ```
/// use ocx_nimas::url_utils::url_path;
///
/// assert_eq!(url_path("https://ex.com/a/b-c.png?v=2"), "/a/b-c.png");
/// assert_eq!(url_path("img/photo.jpg#x"), "img/photo.jpg");
/// ```
#[must_use]
pub fn url_path(src: &str) -> String {
    let src = src.trim();
    if has_scheme(src) {
        if let Ok(url) = Url::parse(src) {
            return url.path().to_string();
        }
    }
    let end = src.find(['?', '#']).unwrap_or(src.len());
    src[..end].to_string()
}
