//! Metadata extraction module.
//!
//! The only metadata source in an OCX document is its embedded JSON-LD.
//! Document-level HTML `<meta>` tags are ignored.

pub mod json_ld;

pub use json_ld::{
    extract_graph, extract_graph_from_document, GraphNode, LinkedDataGraph, ACTIVITY_TYPE,
};
