//! Owned element tree.
//!
//! `dom_query` nodes borrow their document, so sections selected for the
//! NIMAS output are deep-copied into this small owned tree. The copy is
//! detached from the working document: later DOM mutations do not reach it,
//! and the style transform can walk it without holding a borrow.

use std::borrow::Cow;
use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::dom::{self, NodeRef, Selection};
use crate::error::{Error, Result};

/// A node in an owned element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with attributes and children.
    Element(Element),
    /// A run of character data.
    Text(String),
}

/// An owned element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    /// Attributes in source order.
    pub attributes: Vec<(String, String)>,
    /// Child nodes in source order.
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create an element holding a single text child.
    #[must_use]
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut el = Self::new(name);
        el.children.push(Node::Text(text.into()));
        el
    }

    /// Deep-copy the first node of a selection. `None` if the selection is
    /// empty or does not start with an element.
    #[must_use]
    pub fn from_selection(sel: &Selection) -> Option<Self> {
        sel.nodes().first().and_then(Self::from_node)
    }

    /// Deep-copy a DOM element and all of its element and text descendants.
    /// Comments and processing instructions are not copied.
    #[must_use]
    pub fn from_node(node: &NodeRef) -> Option<Self> {
        let name = dom::node_tag_name(node)?;
        let mut el = Self {
            name,
            attributes: dom::node_attributes(node),
            children: Vec::new(),
        };
        for child in node.children() {
            if child.is_element() {
                if let Some(copy) = Self::from_node(&child) {
                    el.children.push(Node::Element(copy));
                }
            } else if child.is_text() {
                el.push_text(&child.text());
            }
        }
        Some(el)
    }

    /// Append a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append text, merging with a trailing text node.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    /// Attribute value by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// All descendant elements in document order (self excluded).
    #[must_use]
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// Serialize the element as XML.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let start = self.start_tag();
        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(el) => el.write_xml(writer)?,
                Node::Text(text) => writer.write_event(Event::Text(BytesText::new(&xml_chars(text))))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    /// Serialize with two-space indentation.
    ///
    /// Only elements whose children are all elements are indented; anything
    /// holding text is written exactly as stored, so document content never
    /// gains whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn write_pretty<W: Write>(&self, writer: &mut Writer<W>, depth: usize) -> Result<()> {
        let mixed = self.children.iter().any(|c| matches!(c, Node::Text(_)));
        if self.children.is_empty() || mixed {
            return self.write_xml(writer);
        }

        writer.write_event(Event::Start(self.start_tag()))?;
        let inner = format!("\n{}", "  ".repeat(depth + 1));
        for child in self.child_elements() {
            writer.write_event(Event::Text(BytesText::new(&inner)))?;
            child.write_pretty(writer, depth + 1)?;
        }
        let outer = format!("\n{}", "  ".repeat(depth));
        writer.write_event(Event::Text(BytesText::new(&outer)))?;
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    fn start_tag(&self) -> BytesStart<'_> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), xml_chars(v).as_ref()));
        }
        start
    }

    /// Parse an XML document into its root element.
    ///
    /// Whitespace around text is trimmed and whitespace-only text dropped;
    /// comments, processing instructions and the doctype are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Xml`] for malformed XML and
    /// [`Error::TemplateStructure`] for documents without exactly one root.
    pub fn parse_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => attach(&mut stack, &mut root, element_from_start(&e)?)?,
                Event::End(_) => {
                    if let Some(done) = stack.pop() {
                        attach(&mut stack, &mut root, done)?;
                    }
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.push_text(&String::from_utf8_lossy(t.as_ref()));
                    }
                }
                Event::CData(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.push_text(&String::from_utf8_lossy(t.as_ref()));
                    }
                }
                Event::GeneralRef(r) => {
                    let entity = String::from_utf8_lossy(r.as_ref());
                    let resolved = resolve_entity(&entity).ok_or_else(|| {
                        Error::TemplateStructure(format!("unknown entity '&{entity};'"))
                    })?;
                    if let Some(top) = stack.last_mut() {
                        top.push_text(&resolved);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or_else(|| Error::TemplateStructure("XML document has no root element".to_string()))
    }
}

/// Drop characters outside the XML 1.0 `Char` production.
///
/// HTML parsers keep C0 controls such as `&#1;` or a form feed, but no XML
/// document may contain them, escaped or not.
#[must_use]
pub fn xml_chars(s: &str) -> Cow<'_, str> {
    if s.chars().all(is_xml_char) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

fn element_from_start(e: &BytesStart) -> Result<Element> {
    let mut el = Element::new(String::from_utf8_lossy(e.name().as_ref()));
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|e| Error::TemplateStructure(format!("attribute '{key}': {e}")))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push(el);
    } else if root.is_none() {
        *root = Some(el);
    } else {
        return Err(Error::TemplateStructure("XML document has more than one root element".to_string()));
    }
    Ok(())
}

/// Predefined XML entities and character references.
fn resolve_entity(name: &str) -> Option<String> {
    let named = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.to_string());
    }
    let num = name.strip_prefix('#')?;
    let code = match num.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => num.parse().ok()?,
    };
    char::from_u32(code).map(String::from)
}

fn collect_descendants<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    for child in el.child_elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

/// Builders and accessors used by unit tests across the crate.
#[cfg(test)]
impl Element {
    pub(crate) fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name.to_string(), value));
        }
    }
}

impl Element {
    pub(crate) fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Element(e) => collect_text(e, out),
            Node::Text(t) => out.push_str(t),
        }
    }
}
