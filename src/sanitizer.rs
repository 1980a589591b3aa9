//! Markup Sanitizer
//!
//! Reduces an OCX document to an allow-listed element and attribute set
//! before any structural work happens. The policy is a "relaxed" content set
//! minus presentational inline wrappers (`b`, `em`, `i`, `strong`, `u`,
//! `span`): those are unwrapped so their text survives. Elements whose
//! content is never document text (scripts, styles, embedded SVG/MathML) are
//! removed together with their children.
//!
//! [`sanitize`] is a pure function and idempotent: sanitizing its own
//! output yields the same output.

use std::collections::HashSet;
use std::sync::LazyLock;

use dom_query::{Document, NodeRef, Selection};

use crate::dom;

/// Elements kept as-is.
pub static ALLOWED_ELEMENTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "abbr", "address", "article", "aside", "bdi", "bdo", "blockquote", "body", "br",
        "caption", "cite", "code", "col", "colgroup", "data", "dd", "del", "dfn", "div", "dl",
        "dt", "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "head",
        "header", "hgroup", "hr", "html", "img", "ins", "kbd", "li", "main", "mark", "nav", "ol",
        "p", "pre", "q", "rp", "rt", "ruby", "s", "samp", "section", "small", "strike", "sub",
        "summary", "sup", "table", "tbody", "td", "tfoot", "th", "thead", "time", "title", "tr",
        "ul", "var", "wbr",
    ]
    .into_iter()
    .collect()
});

/// Disallowed elements that are dropped with their whole subtree instead of
/// being unwrapped.
pub static REMOVE_CONTENTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "iframe", "math", "noembed", "noframes", "noscript", "plaintext", "script", "style",
        "svg", "template", "xmp",
    ]
    .into_iter()
    .collect()
});

/// Attributes allowed on every element.
const GLOBAL_ATTRIBUTES: [&str; 3] = ["id", "class", "type"];

/// Attributes allowed on specific elements, in addition to the global ones.
const ELEMENT_ATTRIBUTES: [(&str, &[&str]); 8] = [
    ("a", &["href"]),
    ("abbr", &["title"]),
    ("blockquote", &["cite"]),
    ("dfn", &["title"]),
    ("q", &["cite"]),
    ("time", &["datetime", "pubdate"]),
    ("img", &["alt", "src"]),
    ("ol", &["start"]),
];

/// URL-valued attributes and the schemes they may carry.
/// Values without a scheme (relative URLs) are always allowed.
const PROTOCOL_ATTRIBUTES: [(&str, &str); 3] = [("a", "href"), ("blockquote", "cite"), ("q", "cite")];

const ALLOWED_SCHEMES: [&str; 4] = ["ftp", "http", "https", "mailto"];

/// Upper bound on reparse rounds in [`sanitize`].
const MAX_PASSES: usize = 4;

/// Sanitize an HTML document according to the allow-list policy.
///
/// Unwrapping a container such as `button`, `object` or `form` can leave
/// markup the parser nests differently on the next read, so the document is
/// reparsed and sanitized again until the serialization stops changing.
///
/// # Example
///
/// ```rust
/// use ocx_nimas::sanitizer::sanitize;
///
/// let clean = sanitize(r#"<p style="x">a <b>bold</b> word<script>evil()</script></p>"#);
/// assert!(clean.contains("<p>a bold word</p>"));
/// ```
#[must_use]
pub fn sanitize(html: &str) -> String {
    let mut current = sanitize_once(html);
    for _ in 1..MAX_PASSES {
        let next = sanitize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
    tracing::warn!(passes = MAX_PASSES, "sanitized markup did not settle");
    current
}

fn sanitize_once(html: &str) -> String {
    let doc = dom::parse(html);
    sanitize_document(&doc);
    dom::document_html(&doc)
}

/// Sanitize a parsed document in place.
///
/// This is a single pass; see [`sanitize`] for reaching a stable result.
pub fn sanitize_document(doc: &Document) {
    let mut doomed: Vec<NodeRef> = Vec::new();
    let mut unwrap: HashSet<String> = HashSet::new();

    for node in doc.root().descendants() {
        if node.is_comment() {
            doomed.push(node);
            continue;
        }
        let Some(tag) = dom::node_tag_name(&node) else {
            continue;
        };
        if REMOVE_CONTENTS.contains(tag.as_str()) {
            doomed.push(node);
        } else if !ALLOWED_ELEMENTS.contains(tag.as_str()) {
            unwrap.insert(tag);
        }
    }

    let removed = doomed.len();
    for node in doomed {
        node.remove_from_parent();
    }

    if !unwrap.is_empty() {
        let names: Vec<&str> = unwrap.iter().map(String::as_str).collect();
        dom::strip_tags(&doc.select("html"), &names);
    }

    for el in dom::query_all(&doc.select("html"), "*") {
        clean_attributes(&el);
    }
    // The html element itself is not its own descendant
    clean_attributes(&doc.select("html"));

    tracing::debug!(removed, unwrapped = unwrap.len(), "sanitized document");
}

fn clean_attributes(el: &Selection) {
    let Some(tag) = dom::tag_name(el) else {
        return;
    };
    let extra: &[&str] = ELEMENT_ATTRIBUTES
        .iter()
        .find(|(name, _)| *name == tag)
        .map_or(&[], |(_, attrs)| *attrs);

    for (name, value) in dom::get_all_attributes(el) {
        let allowed = GLOBAL_ATTRIBUTES.contains(&name.as_str()) || extra.contains(&name.as_str());
        let safe_url = !PROTOCOL_ATTRIBUTES.contains(&(tag.as_str(), name.as_str()))
            || has_allowed_scheme(&value);
        if !allowed || !safe_url {
            dom::remove_attribute(el, &name);
        }
    }

    if tag == "a" {
        dom::set_attribute(el, "rel", "nofollow");
    }
}

/// `true` if `value` is relative or uses one of [`ALLOWED_SCHEMES`].
fn has_allowed_scheme(value: &str) -> bool {
    let value = value.trim();
    let Some(colon) = value.find(':') else {
        return true;
    };
    // A ':' after the first path, query or fragment delimiter is not a scheme
    if value[..colon].contains(['/', '?', '#']) {
        return true;
    }
    let scheme = value[..colon].to_ascii_lowercase();
    ALLOWED_SCHEMES.contains(&scheme.as_str())
}
