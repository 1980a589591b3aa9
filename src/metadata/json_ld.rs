//! JSON-LD Graph Extraction
//!
//! OCX documents embed their structure as JSON-LD: the document object
//! carries `name` and `identifier`, and its `@graph` lists the content
//! units. Nodes typed `oer:Activity` each correspond to a `<section>` in the
//! markup. This module turns the embedded payloads into a typed, read-only
//! [`LinkedDataGraph`].

use std::collections::HashMap;

use dom_query::{Document, Selection};
use serde_json::{Map, Value};

use crate::dom;
use crate::error::{Error, Result};
use crate::url_utils::has_scheme;

/// Type marking a graph node whose section is copied into the NIMAS XML.
pub const ACTIVITY_TYPE: &str = "oer:Activity";

/// Selector for embedded JSON-LD payloads.
const JSON_LD_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

/// A node of the JSON-LD `@graph`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphNode {
    /// `@id` as written in the payload.
    pub id: Option<String>,
    /// `@type` values as written in the payload.
    pub types: Vec<String>,
    /// `@type` values with compact IRIs expanded through `@context`.
    expanded_types: Vec<String>,
}

impl GraphNode {
    /// Create a node from its id and type set. Types are not expanded.
    #[must_use]
    pub fn new(id: Option<&str>, types: &[&str]) -> Self {
        let types: Vec<String> = types.iter().map(|t| (*t).to_string()).collect();
        Self {
            id: id.map(str::to_string),
            expanded_types: types.clone(),
            types,
        }
    }

    /// Type-set membership test. `ty` may be compact or expanded.
    #[must_use]
    pub fn has_type(&self, ty: &str) -> bool {
        self.types.iter().any(|t| t == ty) || self.expanded_types.iter().any(|t| t == ty)
    }

    /// Id of the DOM `<section>` this node refers to.
    ///
    /// A relative id loses its leading `#` only, so `#a#b` maps to `a#b`.
    /// An absolute IRI such as `http://host/doc#sec1` maps to its fragment.
    #[must_use]
    pub fn section_id(&self) -> Option<&str> {
        let id = self.id.as_deref()?;
        let section = if has_scheme(id) {
            id.split_once('#').map_or(id, |(_, fragment)| fragment)
        } else {
            id.strip_prefix('#').unwrap_or(id)
        };
        (!section.is_empty()).then_some(section)
    }
}

/// Typed view of the document's linked data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedDataGraph {
    /// Document `name`.
    pub name: Option<String>,
    /// Document `identifier`.
    pub identifier: Option<String>,
    nodes: Vec<GraphNode>,
    prefixes: HashMap<String, String>,
}

impl LinkedDataGraph {
    /// Build a graph directly from its parts.
    #[must_use]
    pub fn new(name: Option<&str>, identifier: Option<&str>, nodes: Vec<GraphNode>) -> Self {
        Self {
            name: name.map(str::to_string),
            identifier: identifier.map(str::to_string),
            nodes,
            prefixes: HashMap::new(),
        }
    }

    /// All graph nodes in payload order.
    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Nodes typed `oer:Activity` (compact or expanded), in payload order.
    pub fn activities(&self) -> impl Iterator<Item = &GraphNode> {
        let expanded = self.expand(ACTIVITY_TYPE);
        self.nodes
            .iter()
            .filter(move |n| n.has_type(ACTIVITY_TYPE) || n.has_type(&expanded))
    }

    /// Expand a compact IRI (`prefix:local`) using the collected `@context`
    /// prefixes. Terms without a known prefix are returned unchanged.
    #[must_use]
    pub fn expand(&self, term: &str) -> String {
        expand_term(&self.prefixes, term)
    }

    /// `{identifier}-NIMAS`, or `None` without a document identifier.
    #[must_use]
    pub fn unique_identifier(&self) -> Option<String> {
        self.identifier.as_ref().map(|id| format!("{id}-NIMAS"))
    }

    fn absorb(&mut self, payload: &Map<String, Value>) {
        if let Some(context) = payload.get("@context") {
            collect_prefixes(context, &mut self.prefixes);
        }
        if self.name.is_none() {
            self.name = payload.get("name").and_then(literal);
        }
        if self.identifier.is_none() {
            self.identifier = payload.get("identifier").and_then(literal);
        }
        if let Some(Value::Array(items)) = payload.get("@graph") {
            for item in items.iter().filter_map(Value::as_object) {
                let types = schema_types(item);
                let expanded_types = types.iter().map(|t| expand_term(&self.prefixes, t)).collect();
                self.nodes.push(GraphNode {
                    id: item.get("@id").and_then(Value::as_str).map(str::to_string),
                    types,
                    expanded_types,
                });
            }
        }
    }
}

/// Extract the linked-data graph from raw HTML text.
///
/// Every `<script type="application/ld+json">` is parsed in document order.
///
/// # Errors
///
/// Returns [`Error::Metadata`] if no non-empty payload exists, a payload is
/// not well-formed JSON, or a payload is neither an object nor an array of
/// objects.
pub fn extract_graph(html: &str) -> Result<LinkedDataGraph> {
    let doc = Document::from(html);
    extract_graph_from_document(&doc)
}

/// Extract the linked-data graph from an already parsed document.
///
/// # Errors
///
/// See [`extract_graph`].
pub fn extract_graph_from_document(doc: &Document) -> Result<LinkedDataGraph> {
    let mut graph = LinkedDataGraph::default();
    let mut payloads = 0usize;

    for (index, script) in doc.select(JSON_LD_SELECTOR).nodes().iter().enumerate() {
        let script_sel = Selection::from(*script);
        let json_text = dom::text_content(&script_sel);
        let json_text = json_text.trim();
        if json_text.is_empty() {
            continue;
        }

        let data: Value = serde_json::from_str(json_text).map_err(|e| {
            Error::Metadata(format!("JSON-LD script #{} is not well-formed JSON: {e}", index + 1))
        })?;

        match data {
            Value::Object(map) => graph.absorb(&map),
            Value::Array(items) => {
                for item in &items {
                    let Some(map) = item.as_object() else {
                        return Err(Error::Metadata(format!(
                            "JSON-LD script #{} contains a non-object entry",
                            index + 1
                        )));
                    };
                    graph.absorb(map);
                }
            }
            _ => {
                return Err(Error::Metadata(format!(
                    "JSON-LD script #{} is not an object",
                    index + 1
                )))
            }
        }
        payloads += 1;
    }

    if payloads == 0 {
        return Err(Error::Metadata("no JSON-LD script found in document".to_string()));
    }

    tracing::debug!(
        payloads,
        nodes = graph.nodes.len(),
        activities = graph.activities().count(),
        "extracted JSON-LD graph"
    );
    Ok(graph)
}

/// `@type` values of a node; a single string or an array of strings.
fn schema_types(obj: &Map<String, Value>) -> Vec<String> {
    match obj.get("@type") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// A plain literal: string, number, `{"@value": ..}` or the first literal of
/// an array. Blank strings count as absent.
fn literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_string()) }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj.get("@value").and_then(literal),
        Value::Array(arr) => arr.iter().find_map(literal),
        _ => None,
    }
}

fn collect_prefixes(context: &Value, prefixes: &mut HashMap<String, String>) {
    match context {
        Value::Object(map) => {
            for (key, val) in map {
                if key.starts_with('@') {
                    continue;
                }
                let iri = match val {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(def) => def.get("@id").and_then(Value::as_str),
                    _ => None,
                };
                if let Some(iri) = iri {
                    prefixes.entry(key.clone()).or_insert_with(|| iri.to_string());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_prefixes(item, prefixes);
            }
        }
        // Remote contexts are not dereferenced
        _ => {}
    }
}

fn expand_term(prefixes: &HashMap<String, String>, term: &str) -> String {
    if let Some((prefix, local)) = term.split_once(':') {
        if !local.starts_with("//") {
            if let Some(base) = prefixes.get(prefix) {
                return format!("{base}{local}");
            }
        }
    }
    term.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(scripts: &[&str]) -> String {
        let body: String = scripts
            .iter()
            .map(|s| format!(r#"<script type="application/ld+json">{s}</script>"#))
            .collect();
        format!("<html><head>{body}</head><body></body></html>")
    }

    #[test]
    fn extracts_document_fields_and_graph() {
        let html = page(&[r##"{
            "@context": {"oer": "http://oerschema.org/"},
            "name": "Bio 101",
            "identifier": "abc123",
            "@graph": [
                {"@id": "#intro", "@type": "oer:Lesson"},
                {"@id": "#sec1", "@type": ["oer:Activity"]}
            ]
        }"##]);
        let graph = extract_graph(&html).unwrap();

        assert_eq!(graph.name.as_deref(), Some("Bio 101"));
        assert_eq!(graph.identifier.as_deref(), Some("abc123"));
        assert_eq!(graph.nodes().len(), 2);
        let ids: Vec<_> = graph.activities().filter_map(GraphNode::section_id).collect();
        assert_eq!(ids, vec!["sec1"]);
        assert_eq!(graph.unique_identifier().as_deref(), Some("abc123-NIMAS"));
    }

    #[test]
    fn expanded_activity_type_matches() {
        let html = page(&[r##"{
            "@context": {"oer": "http://oerschema.org/"},
            "@graph": [{"@id": "#a", "@type": "http://oerschema.org/Activity"}]
        }"##]);
        let graph = extract_graph(&html).unwrap();
        assert_eq!(graph.activities().count(), 1);
    }

    #[test]
    fn missing_script_is_an_error() {
        let result = extract_graph("<html><body><p>no data</p></body></html>");
        assert!(matches!(result, Err(Error::Metadata(_))));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let result = extract_graph(&page(&["{ not json"]));
        assert!(matches!(result, Err(Error::Metadata(_))));
    }

    #[test]
    fn scalar_payload_is_an_error() {
        let result = extract_graph(&page(&["42"]));
        assert!(matches!(result, Err(Error::Metadata(_))));
    }

    #[test]
    fn missing_fields_are_tolerated() {
        let graph = extract_graph(&page(&[r#"{"@graph": []}"#])).unwrap();
        assert_eq!(graph.name, None);
        assert_eq!(graph.identifier, None);
        assert_eq!(graph.unique_identifier(), None);
    }

    #[test]
    fn multiple_payloads_merge_in_order() {
        let html = page(&[
            r##"{"name": "First", "@graph": [{"@id": "#a", "@type": "oer:Activity"}]}"##,
            r##"{"name": "Second", "identifier": 7, "@graph": [{"@id": "#b", "@type": "oer:Activity"}]}"##,
        ]);
        let graph = extract_graph(&html).unwrap();

        assert_eq!(graph.name.as_deref(), Some("First"));
        assert_eq!(graph.identifier.as_deref(), Some("7"));
        let ids: Vec<_> = graph.activities().filter_map(GraphNode::section_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn value_objects_are_literals() {
        let html = page(&[r#"{"name": {"@value": "Chem", "@language": "en"}}"#]);
        let graph = extract_graph(&html).unwrap();
        assert_eq!(graph.name.as_deref(), Some("Chem"));
    }

    #[test]
    fn section_id_handles_absolute_iris() {
        let node = GraphNode::new(Some("http://example.org/doc#part-2"), &[ACTIVITY_TYPE]);
        assert_eq!(node.section_id(), Some("part-2"));
        let bare = GraphNode::new(Some("plain"), &[]);
        assert_eq!(bare.section_id(), Some("plain"));
        let empty = GraphNode::new(Some("#"), &[]);
        assert_eq!(empty.section_id(), None);
        let inner_hash = GraphNode::new(Some("#a#b"), &[ACTIVITY_TYPE]);
        assert_eq!(inner_hash.section_id(), Some("a#b"));
        let absolute_inner = GraphNode::new(Some("http://example.org/doc#a#b"), &[]);
        assert_eq!(absolute_inner.section_id(), Some("a#b"));
    }

    #[test]
    fn compact_iri_without_prefix_is_unchanged() {
        let graph = LinkedDataGraph::default();
        assert_eq!(graph.expand("oer:Activity"), "oer:Activity");
        assert_eq!(graph.expand("http://x.org/A"), "http://x.org/A");
    }
}
