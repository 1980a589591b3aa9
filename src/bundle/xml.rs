//! NIMAS XML Builder
//!
//! Assembles the intermediate document handed to the style transform:
//!
//! ```text
//! <root>
//!   <title>{graph name}</title>
//!   <sections>
//!     <section id="...">...</section>   one per oer:Activity, graph order
//!   </sections>
//! </root>
//! ```
//!
//! Sections are deep copies taken from the working document after image
//! rewriting and normalization.

use std::collections::HashMap;

use dom_query::Document;

use crate::dom;
use crate::error::{Error, Result};
use crate::etree::Element;
use crate::metadata::LinkedDataGraph;

/// Placeholder for document fields the graph does not supply.
pub const PLACEHOLDER: &str = "N/A";

/// The `{title, sections}` input of the style transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateDocument {
    /// Document title (the graph's `name`).
    pub title: String,
    /// Copied activity sections in graph order.
    pub sections: Vec<Element>,
}

impl IntermediateDocument {
    /// Collect the section of every activity node from `doc`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSection`] if an activity's id matches no
    /// `<section>` in the document, or the activity has no usable id.
    pub fn build(graph: &LinkedDataGraph, doc: &Document) -> Result<Self> {
        let title = match graph.name.as_deref() {
            Some(name) => name.to_string(),
            None => {
                tracing::warn!("graph has no name, using placeholder title");
                PLACEHOLDER.to_string()
            }
        };

        // First section wins for duplicate ids
        let mut by_id: HashMap<String, Element> = HashMap::new();
        for section in dom::query_all(&doc.select("html"), "section[id]") {
            let Some(id) = dom::id(&section) else {
                continue;
            };
            if by_id.contains_key(&id) {
                continue;
            }
            if let Some(copy) = Element::from_selection(&section) {
                by_id.insert(id, copy);
            }
        }

        let mut sections = Vec::new();
        for node in graph.activities() {
            let id = node.section_id().ok_or_else(|| Error::MissingSection {
                id: node.id.clone().unwrap_or_default(),
            })?;
            let copy = by_id
                .get(id)
                .ok_or_else(|| Error::MissingSection { id: id.to_string() })?;
            sections.push(copy.clone());
        }

        tracing::debug!(sections = sections.len(), "assembled intermediate document");
        Ok(Self { title, sections })
    }

    /// The document as an element tree.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut root = Element::new("root");
        root.push(Element::with_text("title", self.title.as_str()));
        let mut sections = Element::new("sections");
        for section in &self.sections {
            sections.push(section.clone());
        }
        root.push(sections);
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::extract_graph;

    fn graph(ids: &[&str]) -> LinkedDataGraph {
        let nodes: Vec<String> = ids
            .iter()
            .map(|id| format!(r##"{{"@id":"{id}","@type":"oer:Activity"}}"##))
            .collect();
        let html = format!(
            r#"<script type="application/ld+json">{{"name":"Bio 101","identifier":"abc123","@graph":[{}]}}</script>"#,
            nodes.join(",")
        );
        extract_graph(&html).unwrap()
    }

    #[test]
    fn sections_follow_graph_order() {
        let doc = dom::parse(
            r#"<section id="b"><p>B</p></section><section id="a"><p>A</p></section><section id="c"></section>"#,
        );
        let inter = IntermediateDocument::build(&graph(&["#a", "#b"]), &doc).unwrap();

        assert_eq!(inter.title, "Bio 101");
        let ids: Vec<_> = inter.sections.iter().filter_map(|s| s.attr("id")).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn only_the_leading_hash_is_stripped() {
        let doc = dom::parse(r#"<section id="b"><p>wrong</p></section><section id="a#b"><p>right</p></section>"#);
        let inter = IntermediateDocument::build(&graph(&["#a#b"]), &doc).unwrap();

        assert_eq!(inter.sections.len(), 1);
        assert_eq!(inter.sections[0].attr("id"), Some("a#b"));
        assert_eq!(inter.sections[0].text(), "right");
    }

    #[test]
    fn missing_section_is_an_error() {
        let doc = dom::parse(r#"<section id="sec1"></section>"#);
        let err = IntermediateDocument::build(&graph(&["#sec1", "#sec2"]), &doc);
        assert!(matches!(err, Err(Error::MissingSection { ref id }) if id == "sec2"));
    }

    #[test]
    fn copies_are_detached_from_the_document() {
        let doc = dom::parse(r#"<section id="s"><p>before</p></section>"#);
        let inter = IntermediateDocument::build(&graph(&["#s"]), &doc).unwrap();
        doc.select("p").set_html("after");

        assert_eq!(inter.sections[0].text(), "before");
    }

    #[test]
    fn element_shape() {
        let inter = IntermediateDocument {
            title: "T".to_string(),
            sections: vec![Element::new("section")],
        };
        let root = inter.to_element();
        let names: Vec<_> = root.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["title", "sections"]);
        assert_eq!(root.child_elements().nth(1).map(|s| s.children.len()), Some(1));
    }
}
