//! Style transform.
//!
//! The NIMAS XML is produced by a declarative ruleset applied to the
//! intermediate `{title, sections}` document. The ruleset is an external
//! JSON artifact:
//!
//! ```json
//! {
//!   "doctype": "dtbook PUBLIC \"...\" \"...\"",
//!   "skeleton": ["<dtbook>", "<bodymatter><apply-sections/></bodymatter>", "</dtbook>"],
//!   "max_depth": 6,
//!   "default_attributes": ["id", "class"],
//!   "rules": [
//!     { "match": "section", "rename": "level{depth}" },
//!     { "match": "img", "wrap": "imggroup", "attributes": ["id", "src", "alt"] },
//!     { "match": "hr", "action": "drop" }
//!   ]
//! }
//! ```
//!
//! The skeleton is an XML document in which `<apply-title/>` is replaced by
//! the title text, `<apply-sections/>` by the transformed sections, and
//! `{title}` is substituted in attribute values and text.
//!
//! Each element of a section is handled by the rule matching its name, or
//! copied with `default_attributes` if none matches. `{depth}` in a rename
//! counts the enclosing elements whose rule also renames with `{depth}`,
//! starting at 1 and capped at `max_depth`.

use std::collections::HashMap;

use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::etree::{Element, Node};

const TITLE_MARKER: &str = "apply-title";
const SECTIONS_MARKER: &str = "apply-sections";
const DEFAULT_MAX_DEPTH: usize = 6;

/// Turns the intermediate document into serialized NIMAS XML.
pub trait StyleTransform {
    /// Transform a `<root><title/><sections/></root>` tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the input does not have the expected shape or
    /// serialization fails.
    fn transform(&self, input: &Element) -> Result<String>;
}

/// What a rule does with a matched element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Emit the element (possibly renamed or wrapped) and its content.
    #[default]
    Copy,
    /// Emit the content without the element.
    Unwrap,
    /// Emit nothing.
    Drop,
}

/// A rule for one element name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Element name the rule applies to.
    #[serde(rename = "match")]
    pub element: String,
    #[serde(default)]
    pub action: Action,
    /// Output name; may contain `{depth}`.
    #[serde(default)]
    pub rename: Option<String>,
    /// Attributes to keep. Falls back to the stylesheet default.
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    /// Element to wrap the output in.
    #[serde(default)]
    pub wrap: Option<String>,
}

impl Rule {
    fn nests(&self) -> bool {
        self.rename.as_deref().is_some_and(|r| r.contains("{depth}"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStylesheet {
    #[serde(default)]
    doctype: Option<String>,
    skeleton: Vec<String>,
    #[serde(default)]
    max_depth: Option<usize>,
    #[serde(default)]
    default_attributes: Vec<String>,
    #[serde(default)]
    rules: Vec<Rule>,
}

/// A parsed ruleset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    doctype: Option<String>,
    skeleton: Element,
    max_depth: usize,
    default_attributes: Vec<String>,
    rules: HashMap<String, Rule>,
}

impl Stylesheet {
    /// Parse a JSON ruleset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateStructure`] if the JSON does not describe a
    /// ruleset or the skeleton has no `<apply-sections/>` marker, and
    /// [`Error::Xml`] if the skeleton is not well-formed.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawStylesheet = serde_json::from_str(json)
            .map_err(|e| Error::TemplateStructure(format!("stylesheet: {e}")))?;

        let skeleton = Element::parse_xml(&raw.skeleton.join("\n"))?;
        let has_marker = skeleton.descendants().iter().any(|e| e.name == SECTIONS_MARKER);
        if !has_marker {
            return Err(Error::TemplateStructure(format!(
                "stylesheet skeleton has no <{SECTIONS_MARKER}/>"
            )));
        }

        let rules = raw
            .rules
            .into_iter()
            .map(|rule| (rule.element.to_ascii_lowercase(), rule))
            .collect();

        Ok(Self {
            doctype: raw.doctype,
            skeleton,
            max_depth: raw.max_depth.unwrap_or(DEFAULT_MAX_DEPTH).max(1),
            default_attributes: raw.default_attributes,
            rules,
        })
    }

    fn apply(&self, el: &Element, depth: usize, out: &mut Vec<Node>) {
        let rule = self.rules.get(&el.name);
        let action = rule.map_or(Action::Copy, |r| r.action);
        let depth = depth + usize::from(rule.is_some_and(Rule::nests));

        match action {
            Action::Drop => {}
            Action::Unwrap => self.apply_children(el, depth, out),
            Action::Copy => {
                let name = match rule.and_then(|r| r.rename.as_deref()) {
                    Some(rename) => rename.replace("{depth}", &depth.clamp(1, self.max_depth).to_string()),
                    None => el.name.clone(),
                };
                let keep = rule
                    .and_then(|r| r.attributes.as_ref())
                    .unwrap_or(&self.default_attributes);

                let mut copy = Element::new(name);
                copy.attributes = el
                    .attributes
                    .iter()
                    .filter(|(k, _)| keep.contains(k))
                    .cloned()
                    .collect();
                self.apply_children(el, depth, &mut copy.children);

                match rule.and_then(|r| r.wrap.as_deref()) {
                    Some(wrapper) => {
                        let mut outer = Element::new(wrapper);
                        outer.push(copy);
                        out.push(Node::Element(outer));
                    }
                    None => out.push(Node::Element(copy)),
                }
            }
        }
    }

    fn apply_children(&self, el: &Element, depth: usize, out: &mut Vec<Node>) {
        for child in &el.children {
            match child {
                Node::Element(e) => self.apply(e, depth, out),
                Node::Text(t) => push_text(out, t),
            }
        }
    }
}

impl StyleTransform for Stylesheet {
    fn transform(&self, input: &Element) -> Result<String> {
        let title = input
            .child_elements()
            .find(|e| e.name == "title")
            .map(Element::text)
            .unwrap_or_default();
        let sections = input
            .child_elements()
            .find(|e| e.name == "sections")
            .ok_or_else(|| Error::TemplateStructure("transform input has no <sections>".to_string()))?;

        let mut body = Vec::new();
        for section in sections.child_elements() {
            self.apply(section, 0, &mut body);
        }
        let root = instantiate(&self.skeleton, &title, &body);

        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Text(BytesText::new("\n")))?;
        if let Some(doctype) = &self.doctype {
            writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?;
            writer.write_event(Event::Text(BytesText::new("\n")))?;
        }
        root.write_pretty(&mut writer, 0)?;
        writer.write_event(Event::Text(BytesText::new("\n")))?;

        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }
}

fn instantiate(template: &Element, title: &str, body: &[Node]) -> Element {
    let mut el = Element::new(template.name.as_str());
    el.attributes = template
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.replace("{title}", title)))
        .collect();

    for child in &template.children {
        match child {
            Node::Element(e) if e.name == TITLE_MARKER => el.push_text(title),
            Node::Element(e) if e.name == SECTIONS_MARKER => {
                for node in body {
                    match node {
                        Node::Element(section) => el.push(section.clone()),
                        Node::Text(t) => el.push_text(t),
                    }
                }
            }
            Node::Element(e) => el.push(instantiate(e, title, body)),
            Node::Text(t) => el.push_text(&t.replace("{title}", title)),
        }
    }
    el
}

fn push_text(out: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(Node::Text(text.to_string()));
    }
}
