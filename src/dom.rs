//! DOM Operations Adapter
//!
//! Thin helpers over the `dom_query` crate. Every pass that touches the
//! working document (sanitizer, normalizer, image resolver, XML builder)
//! goes through these functions so tag and attribute handling stays uniform.

// Re-export core types for external use
pub use dom_query::{Document, NodeRef, Selection};

pub use tendril::StrTendril;

// === Attribute Operations ===

/// Get element ID attribute
#[inline]
#[must_use]
pub fn id(sel: &Selection) -> Option<String> {
    sel.attr("id").map(|s| s.to_string())
}

/// Get any attribute value
#[inline]
#[must_use]
pub fn get_attribute(sel: &Selection, name: &str) -> Option<String> {
    sel.attr(name).map(|s| s.to_string())
}

/// Set an attribute value
#[inline]
pub fn set_attribute(sel: &Selection, name: &str, value: &str) {
    sel.set_attr(name, value);
}

/// Remove an attribute
#[inline]
pub fn remove_attribute(sel: &Selection, name: &str) {
    sel.remove_attr(name);
}

/// Get all attributes as key-value pairs, in source order.
///
/// Returns empty vector if node has no attributes or if selection is empty.
#[must_use]
pub fn get_all_attributes(sel: &Selection) -> Vec<(String, String)> {
    sel.nodes()
        .first()
        .map(node_attributes)
        .unwrap_or_default()
}

/// Attributes of a single node as key-value pairs.
#[must_use]
pub fn node_attributes(node: &NodeRef) -> Vec<(String, String)> {
    node.attrs()
        .iter()
        .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
        .collect()
}

// === Tag/Node Information ===

/// Get tag name (lowercase)
#[must_use]
pub fn tag_name(sel: &Selection) -> Option<String> {
    sel.nodes().first().and_then(node_tag_name)
}

/// Tag name of a single node, lowercased. `None` for non-elements.
#[must_use]
pub fn node_tag_name(node: &NodeRef) -> Option<String> {
    if !node.is_element() {
        return None;
    }
    node.node_name().map(|t| t.to_ascii_lowercase())
}

// === Text Content ===

/// Get all text content of node and descendants
#[inline]
#[must_use]
pub fn text_content(sel: &Selection) -> StrTendril {
    sel.text()
}

// === Querying ===

/// All elements matching `selector`, in document order, as single-node
/// selections.
///
/// The selections are collected up front, so callers may rename or remove
/// the returned elements while iterating.
#[must_use]
pub fn query_all<'a>(sel: &Selection<'a>, selector: &str) -> Vec<Selection<'a>> {
    sel.select(selector)
        .nodes()
        .iter()
        .map(|node| Selection::from(*node))
        .collect()
}

// === Tree Manipulation ===

/// Rename element tag, keeping attributes and children.
#[inline]
pub fn rename(sel: &Selection, new_tag: &str) {
    sel.rename(new_tag);
}

/// Remove elements but keep their children (unwrap)
#[inline]
pub fn strip_tags(sel: &Selection, tags: &[&str]) {
    sel.strip_elements(tags);
}

/// Serialize the whole document.
#[inline]
#[must_use]
pub fn document_html(doc: &Document) -> String {
    doc.html().to_string()
}

// === Parsing ===

/// Parse HTML string into document
#[inline]
#[must_use]
pub fn parse(html: &str) -> Document {
    Document::from(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_select() {
        let doc = parse(r#"<section id="sec1" class="activity">content</section>"#);
        let section = doc.select("section");

        assert_eq!(id(&section), Some("sec1".to_string()));
        assert_eq!(get_attribute(&section, "class"), Some("activity".to_string()));
        assert_eq!(tag_name(&section), Some("section".to_string()));
    }

    #[test]
    fn test_strip_tags_keep_content() {
        let doc = parse(r#"<div>before <span>inner</span> after</div>"#);
        let div = doc.select("div");

        strip_tags(&div, &["span"]);

        assert_eq!(text_content(&div), "before inner after".into());
        assert!(doc.select("span").is_empty());
    }

    #[test]
    fn test_attribute_round_trip() {
        let doc = parse(r#"<img src="a.png" alt="A">"#);
        let img = doc.select("img");

        set_attribute(&img, "src", "images/a.png");
        remove_attribute(&img, "alt");

        assert_eq!(
            get_all_attributes(&img),
            vec![("src".to_string(), "images/a.png".to_string())]
        );
    }

    #[test]
    fn test_rename_keeps_children_and_attributes() {
        let doc = parse(r#"<ul class="steps"><li>one</li></ul>"#);
        let ul = doc.select("ul");

        rename(&ul, "list");

        let list = doc.select("list");
        assert_eq!(get_attribute(&list, "class"), Some("steps".to_string()));
        assert_eq!(list.select("li").length(), 1);
    }

    #[test]
    fn test_query_all_is_document_order() {
        let doc = parse("<h2>a</h2><div><h2>b</h2></div><h2>c</h2>");
        let texts: Vec<String> = query_all(&doc.select("body"), "h2")
            .iter()
            .map(|s| text_content(s).to_string())
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_operations_on_empty_selection() {
        let doc = parse("<p>x</p>");
        let missing = doc.select("section");

        assert_eq!(tag_name(&missing), None);
        assert_eq!(id(&missing), None);
        assert!(get_all_attributes(&missing).is_empty());
    }
}
