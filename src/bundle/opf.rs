//! OPF Metadata & Manifest Builder
//!
//! The OPF template is streamed through `quick-xml` and rewritten on the fly,
//! so everything the builder does not touch (doctype, namespaces, comments,
//! indentation, extra metadata) survives unchanged:
//!
//! - the root's `unique-identifier` is set;
//! - the Dublin-Core fields inside `dc-metadata` get their values;
//! - the main XML item and the cover item get their `href`, or the cover item
//!   is dropped when there is no cover;
//! - one item per image is appended to the manifest.

use std::path::Path;

use chrono::NaiveDate;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::bundle::images::{self, ImageManifest};
use crate::bundle::xml::PLACEHOLDER;
use crate::error::{Error, Result};
use crate::etree::xml_chars;
use crate::metadata::LinkedDataGraph;

/// Manifest item id of the NIMAS XML file.
pub const MAIN_ITEM_ID: &str = "xml";
/// Manifest item id of the cover PDF.
pub const COVER_ITEM_ID: &str = "cover";

/// Dublin-Core fields the template must provide, by local name.
pub const DC_FIELDS: [&str; 9] = [
    "Title",
    "Creator",
    "Publisher",
    "Date",
    "Identifier",
    "Language",
    "Rights",
    "Source",
    "Subject",
];

/// Values for the Dublin-Core block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DublinCore {
    pub title: String,
    pub creator: String,
    pub publisher: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub identifier: String,
    /// Set as the `id` attribute of `dc:Identifier`.
    pub unique_identifier: String,
    pub language: String,
    pub rights: String,
    pub source: String,
    pub subject: String,
}

impl DublinCore {
    /// Fill the block from the graph.
    ///
    /// `Creator`, `Publisher`, `Rights` and `Source` are not carried by OCX
    /// metadata and are set to `N/A`.
    #[must_use]
    pub fn from_graph(graph: &LinkedDataGraph, date: NaiveDate) -> Self {
        let name = graph
            .name
            .as_deref()
            .map_or_else(|| PLACEHOLDER.to_string(), |n| xml_chars(n).into_owned());
        let identifier = match graph.identifier.as_deref() {
            Some(id) => xml_chars(id).into_owned(),
            None => {
                tracing::warn!("graph has no identifier, using placeholder");
                PLACEHOLDER.to_string()
            }
        };

        Self {
            title: name.clone(),
            creator: PLACEHOLDER.to_string(),
            publisher: PLACEHOLDER.to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            unique_identifier: format!("{identifier}-NIMAS"),
            identifier,
            language: "en".to_string(),
            rights: PLACEHOLDER.to_string(),
            source: PLACEHOLDER.to_string(),
            subject: name,
        }
    }

    fn value(&self, field: &str) -> Option<&str> {
        let value = match field {
            "Title" => &self.title,
            "Creator" => &self.creator,
            "Publisher" => &self.publisher,
            "Date" => &self.date,
            "Identifier" => &self.identifier,
            "Language" => &self.language,
            "Rights" => &self.rights,
            "Source" => &self.source,
            "Subject" => &self.subject,
            _ => return None,
        };
        Some(value)
    }
}

/// A manifest entry for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: &'static str,
}

/// Files the OPF manifest points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    /// File name of the NIMAS XML.
    pub xml_href: String,
    /// File name of the cover, if one is bundled.
    pub cover_href: Option<String>,
    /// Image items in manifest order.
    pub images: Vec<ManifestItem>,
}

impl PackageManifest {
    /// Build manifest entries for the bundle.
    ///
    /// Image ids are file names stripped to ASCII alphanumerics; clashes with
    /// each other or with the fixed item ids get a numeric suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedImageType`] for the first image whose
    /// extension has no known media type.
    pub fn new(xml_href: impl Into<String>, cover_href: Option<String>, manifest: &ImageManifest) -> Result<Self> {
        let mut taken: Vec<String> = vec![MAIN_ITEM_ID.to_string(), COVER_ITEM_ID.to_string()];
        let mut images = Vec::with_capacity(manifest.len());

        for path in manifest {
            let media_type = images::media_type(Path::new(path))?;
            let mut base = images::manifest_id(path);
            if base.is_empty() {
                base = "image".to_string();
            }
            let mut id = base.clone();
            let mut n = 2;
            while taken.contains(&id) {
                id = format!("{base}{n}");
                n += 1;
            }
            taken.push(id.clone());
            images.push(ManifestItem {
                id,
                href: path.clone(),
                media_type,
            });
        }

        Ok(Self {
            xml_href: xml_href.into(),
            cover_href,
            images,
        })
    }
}

/// Rewrite the OPF template.
///
/// # Errors
///
/// Returns [`Error::TemplateStructure`] if the template has no
/// `dc-metadata` element, lacks one of [`DC_FIELDS`] inside it, or has no
/// `manifest`; [`Error::Xml`] if it is not well-formed.
pub fn build_opf(template: &str, dc: &DublinCore, manifest: &PackageManifest) -> Result<String> {
    let mut reader = Reader::from_str(template);
    let mut writer = Writer::new(Vec::with_capacity(template.len() + manifest.images.len() * 80));
    let mut state = RewriteState::default();

    loop {
        let event = reader.read_event()?;
        if state.skip_depth > 0 {
            match event {
                Event::Start(_) => state.skip_depth += 1,
                Event::End(e) => {
                    state.skip_depth -= 1;
                    if state.skip_depth == 0 && state.close_skipped {
                        writer.write_event(Event::End(e))?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                let e = state.rewrite_root(e, dc)?;
                match local_name(&e).as_str() {
                    "dc-metadata" => {
                        state.seen_dc_metadata = true;
                        state.in_dc_metadata = true;
                        writer.write_event(Event::Start(e))?;
                    }
                    "manifest" => {
                        state.seen_manifest = true;
                        state.in_manifest = true;
                        writer.write_event(Event::Start(e))?;
                    }
                    field if state.in_dc_metadata && DC_FIELDS.contains(&field) => {
                        let field = field.to_string();
                        write_dc_field(&mut writer, e, &field, dc)?;
                        state.fields_written.push(field);
                        state.skip_depth = 1;
                        state.close_skipped = true;
                    }
                    "item" if state.in_manifest => match rewrite_item(e, manifest)? {
                        Some(item) => {
                            state.flush_whitespace(&mut writer)?;
                            writer.write_event(Event::Start(item))?;
                        }
                        None => {
                            state.pending_ws = None;
                            state.skip_depth = 1;
                            state.close_skipped = false;
                        }
                    },
                    _ => {
                        state.flush_whitespace(&mut writer)?;
                        writer.write_event(Event::Start(e))?;
                    }
                }
            }
            Event::Empty(e) => {
                let e = state.rewrite_root(e, dc)?;
                match local_name(&e).as_str() {
                    "dc-metadata" => {
                        state.seen_dc_metadata = true;
                        writer.write_event(Event::Empty(e))?;
                    }
                    "manifest" => {
                        // Empty manifest: open it so images can be appended
                        state.seen_manifest = true;
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(e))?;
                        write_image_items(&mut writer, manifest, "\n    ")?;
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                    field if state.in_dc_metadata && DC_FIELDS.contains(&field) => {
                        let field = field.to_string();
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        write_dc_field(&mut writer, e, &field, dc)?;
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                        state.fields_written.push(field);
                    }
                    "item" if state.in_manifest => match rewrite_item(e, manifest)? {
                        Some(item) => {
                            if let Some(ws) = &state.pending_ws {
                                state.item_indent = Some(ws.clone());
                            }
                            state.flush_whitespace(&mut writer)?;
                            writer.write_event(Event::Empty(item))?;
                        }
                        None => state.pending_ws = None,
                    },
                    _ => {
                        state.flush_whitespace(&mut writer)?;
                        writer.write_event(Event::Empty(e))?;
                    }
                }
            }
            Event::End(e) => {
                match String::from_utf8_lossy(e.local_name().as_ref()).as_ref() {
                    "dc-metadata" => state.in_dc_metadata = false,
                    "manifest" if state.in_manifest => {
                        let indent = state.item_indent.clone().unwrap_or_else(|| "\n    ".to_string());
                        write_image_items(&mut writer, manifest, &indent)?;
                        state.in_manifest = false;
                    }
                    _ => {}
                }
                state.flush_whitespace(&mut writer)?;
                writer.write_event(Event::End(e))?;
            }
            Event::Text(t) if state.in_manifest => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                if text.trim().is_empty() {
                    state.flush_whitespace(&mut writer)?;
                    state.pending_ws = Some(text);
                } else {
                    state.flush_whitespace(&mut writer)?;
                    writer.write_event(Event::Text(t))?;
                }
            }
            Event::Eof => break,
            other => {
                state.flush_whitespace(&mut writer)?;
                writer.write_event(other)?;
            }
        }
    }

    if !state.seen_dc_metadata {
        return Err(Error::TemplateStructure("OPF template has no dc-metadata element".to_string()));
    }
    let missing: Vec<&str> = DC_FIELDS
        .iter()
        .copied()
        .filter(|f| !state.fields_written.iter().any(|w| w == f))
        .collect();
    if !missing.is_empty() {
        return Err(Error::TemplateStructure(format!(
            "OPF dc-metadata lacks {}",
            missing.join(", ")
        )));
    }
    if !state.seen_manifest {
        return Err(Error::TemplateStructure("OPF template has no manifest element".to_string()));
    }

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

#[derive(Default)]
struct RewriteState {
    root_seen: bool,
    seen_dc_metadata: bool,
    in_dc_metadata: bool,
    seen_manifest: bool,
    in_manifest: bool,
    fields_written: Vec<String>,
    /// Nesting depth of an element whose content is being replaced or dropped.
    skip_depth: usize,
    /// Whether the skipped element's end tag is written.
    close_skipped: bool,
    /// Whitespace before the next manifest child, held back so a dropped item
    /// takes its line with it.
    pending_ws: Option<String>,
    item_indent: Option<String>,
}

impl RewriteState {
    fn rewrite_root<'a>(&mut self, e: BytesStart<'a>, dc: &DublinCore) -> Result<BytesStart<'a>> {
        if self.root_seen {
            return Ok(e);
        }
        self.root_seen = true;
        with_attribute(e, "unique-identifier", &dc.unique_identifier)
    }

    fn flush_whitespace(&mut self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        if let Some(ws) = self.pending_ws.take() {
            writer.write_event(Event::Text(BytesText::from_escaped(ws)))?;
        }
        Ok(())
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Copy `e` with one attribute replaced in place, or appended if absent.
fn with_attribute<'a>(e: BytesStart<'a>, key: &str, value: &str) -> Result<BytesStart<'a>> {
    let mut out = e.clone();
    out.clear_attributes();
    let mut replaced = false;
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            out.push_attribute((key, value));
            replaced = true;
        } else {
            out.push_attribute(attr);
        }
    }
    if !replaced {
        out.push_attribute((key, value));
    }
    Ok(out)
}

fn attribute_value(e: &BytesStart, key: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            let value = quick_xml::escape::unescape(&raw)
                .map_err(|err| Error::TemplateStructure(format!("attribute '{key}': {err}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn write_dc_field(writer: &mut Writer<Vec<u8>>, start: BytesStart, field: &str, dc: &DublinCore) -> Result<()> {
    let start = if field == "Identifier" {
        with_attribute(start, "id", &dc.unique_identifier)?
    } else {
        start
    };
    writer.write_event(Event::Start(start))?;
    if let Some(value) = dc.value(field) {
        writer.write_event(Event::Text(BytesText::new(value)))?;
    }
    Ok(())
}

/// Point the fixed items at their files. `None` drops the item.
fn rewrite_item<'a>(e: BytesStart<'a>, manifest: &PackageManifest) -> Result<Option<BytesStart<'a>>> {
    match attribute_value(&e, "id")?.as_deref() {
        Some(MAIN_ITEM_ID) => with_attribute(e, "href", &manifest.xml_href).map(Some),
        Some(COVER_ITEM_ID) => match &manifest.cover_href {
            Some(href) => with_attribute(e, "href", href).map(Some),
            None => Ok(None),
        },
        _ => Ok(Some(e)),
    }
}

fn write_image_items(writer: &mut Writer<Vec<u8>>, manifest: &PackageManifest, indent: &str) -> Result<()> {
    for item in &manifest.images {
        writer.write_event(Event::Text(BytesText::from_escaped(indent)))?;
        let mut el = BytesStart::new("item");
        el.push_attribute(("id", item.id.as_str()));
        el.push_attribute(("href", item.href.as_str()));
        el.push_attribute(("media-type", item.media_type));
        writer.write_event(Event::Empty(el))?;
    }
    Ok(())
}
