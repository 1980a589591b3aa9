//! Structural Normalizer
//!
//! Two in-place passes over the working document that bring OCX markup
//! closer to the NIMAS structure:
//!
//! - [`renormalize_headings`]: inside every `<section>`, heading levels 2-6
//!   move up by one (`h2` → `h1`, ..., `h6` → `h5`).
//! - [`retag_lists`]: `<ul>`/`<ol>` become `<list type="ul|ol">`.
//!
//! The whole document is normalized, including sections that are not later
//! copied into the NIMAS XML.

use dom_query::Document;

use crate::dom;

/// Demote headings inside each section by one level.
///
/// Sections are visited in document order and levels in ascending order, so
/// a heading renamed by the `h2` pass is not picked up again by the `h3`
/// pass. A heading inside nested sections is renamed once per enclosing
/// section.
///
/// Returns the number of renames performed.
pub fn renormalize_headings(doc: &Document) -> usize {
    let mut renamed = 0;
    for section in dom::query_all(&doc.select("html"), "section") {
        for level in 2..=6 {
            let headings = section.select(&format!("h{level}"));
            renamed += headings.length();
            dom::rename(&headings, &format!("h{}", level - 1));
        }
    }
    tracing::debug!(renamed, "renormalized section headings");
    renamed
}

/// Rewrite every `<ul>` and `<ol>` as `<list type="ul">` / `<list type="ol">`.
///
/// Other attributes and children are preserved. Returns the number of lists
/// retagged.
pub fn retag_lists(doc: &Document) -> usize {
    let lists = dom::query_all(&doc.select("html"), "ul, ol");
    for list in &lists {
        if let Some(tag) = dom::tag_name(list) {
            dom::set_attribute(list, "type", &tag);
            dom::rename(list, "list");
        }
    }
    tracing::debug!(retagged = lists.len(), "retagged lists");
    lists.len()
}

/// Run both normalization passes.
pub fn normalize(doc: &Document) {
    renormalize_headings(doc);
    retag_lists(doc);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(doc: &Document) -> String {
        doc.select("body").inner_html().to_string()
    }

    #[test]
    fn demotes_each_level_once() {
        let doc = dom::parse("<section><h2>a</h2><h3>b</h3><h4>c</h4><h5>d</h5><h6>e</h6></section>");
        assert_eq!(renormalize_headings(&doc), 5);
        assert_eq!(body(&doc), "<section><h1>a</h1><h2>b</h2><h3>c</h3><h4>d</h4><h5>e</h5></section>");
    }

    #[test]
    fn existing_h1_is_untouched() {
        let doc = dom::parse("<section><h1>x</h1><h2>y</h2></section>");
        renormalize_headings(&doc);
        assert_eq!(body(&doc), "<section><h1>x</h1><h1>y</h1></section>");
    }

    #[test]
    fn headings_outside_sections_are_kept() {
        let doc = dom::parse("<h2>out</h2><section><h2>in</h2></section>");
        renormalize_headings(&doc);
        assert_eq!(body(&doc), "<h2>out</h2><section><h1>in</h1></section>");
    }

    #[test]
    fn nested_sections_demote_per_enclosing_section() {
        let doc = dom::parse("<section><h2>outer</h2><section><h3>inner</h3></section></section>");
        renormalize_headings(&doc);
        assert_eq!(
            body(&doc),
            "<section><h1>outer</h1><section><h1>inner</h1></section></section>"
        );
    }

    #[test]
    fn lists_become_generic_list() {
        let doc = dom::parse(r#"<ul class="a"><li>x</li></ul><ol start="2"><li>y</li></ol>"#);
        assert_eq!(retag_lists(&doc), 2);
        assert_eq!(
            body(&doc),
            r#"<list class="a" type="ul"><li>x</li></list><list start="2" type="ol"><li>y</li></list>"#
        );
        assert!(doc.select("ul, ol").is_empty());
    }

    #[test]
    fn nested_lists_keep_their_own_type() {
        let doc = dom::parse("<ol><li>a<ul><li>b</li></ul></li></ol>");
        retag_lists(&doc);
        assert_eq!(
            body(&doc),
            r#"<list type="ol"><li>a<list type="ul"><li>b</li></list></li></list>"#
        );
    }

    #[test]
    fn existing_type_attribute_is_overwritten() {
        let doc = dom::parse(r#"<ul type="disc"><li>x</li></ul>"#);
        retag_lists(&doc);
        assert_eq!(body(&doc), r#"<list type="ul"><li>x</li></list>"#);
    }
}
