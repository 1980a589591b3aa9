//! # ocx-nimas
//!
//! Converts OCX course documents (HTML with embedded JSON-LD) into NIMAS
//! bundles: a DTBook XML file, an OPF package file, an `images/` directory
//! and, optionally, a zip archive of all of them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use ocx_nimas::{Converter, GenerateOptions};
//!
//! let html = std::fs::read_to_string("lesson.html")?;
//! let converter = Converter::new(&html)?;
//! let report = converter.generate(Path::new("out"), &GenerateOptions {
//!     zip: true,
//!     ..GenerateOptions::default()
//! })?;
//! for err in &report.image_errors {
//!     eprintln!("{err}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Pipeline
//!
//! - **Metadata**: the JSON-LD graph supplies the title, identifier and the
//!   ordered list of `oer:Activity` sections.
//! - **Sanitizing**: markup is reduced to an allow-list of elements and
//!   attributes.
//! - **Normalizing**: section headings move up one level and `ul`/`ol`
//!   become `<list type="...">`.
//! - **Bundling**: images are fetched into `images/`, the activity sections
//!   go through a declarative style transform into DTBook, and the OPF
//!   template is filled with Dublin-Core metadata and a manifest.

mod converter;
mod error;
mod options;

/// DOM operations adapter over `dom_query`.
pub mod dom;

/// Owned element tree for section copies and templates.
pub mod etree;

/// JSON-LD metadata extraction.
pub mod metadata;

/// Allow-list HTML sanitizer.
pub mod sanitizer;

/// Heading and list normalization.
pub mod normalize;

/// URL utilities for image sources.
pub mod url_utils;

/// Character encoding detection and transcoding.
pub mod encoding;

/// Images, NIMAS XML, OPF and zip output.
pub mod bundle;

// Public API - re-exports
pub use bundle::{ImageFetcher, ImageManifest, Templates};
pub use converter::{Converter, GenerateReport};
pub use error::{Error, Result};
pub use metadata::{extract_graph, LinkedDataGraph};
pub use options::GenerateOptions;

use std::path::Path;

/// Convert an OCX file on disk.
///
/// The input is decoded by its declared charset. Unless `options.base_dir`
/// is set, relative local image paths are read from the input's directory.
///
/// # Errors
///
/// Returns [`Error::Io`] if the input cannot be read, and any error of
/// [`Converter::new`] or [`Converter::generate`].
pub fn convert_file(input: &Path, output_root: &Path, options: &GenerateOptions) -> Result<GenerateReport> {
    let bytes = std::fs::read(input)?;
    let converter = Converter::from_bytes(&bytes)?;

    if options.base_dir.is_some() {
        return converter.generate(output_root, options);
    }
    let options = GenerateOptions {
        base_dir: input.parent().map(Path::to_path_buf),
        ..options.clone()
    };
    converter.generate(output_root, &options)
}
