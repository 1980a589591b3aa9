//! Error types for ocx-nimas.
//!
//! Most variants are fatal for the document being converted. The exception is
//! [`Error::ImageFetch`]: a single image that cannot be fetched does not abort
//! [`Converter::generate`](crate::Converter::generate). Those errors are
//! collected in [`GenerateReport::image_errors`](crate::GenerateReport) so the
//! caller decides whether the bundle is good enough.

use std::path::PathBuf;

/// Error type for conversion operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The embedded JSON-LD is missing or malformed.
    #[error("JSON-LD metadata error: {0}")]
    Metadata(String),

    /// An external template does not have the expected structure.
    #[error("template structure error: {0}")]
    TemplateStructure(String),

    /// The JSON-LD graph names an activity with no matching `<section>`.
    #[error("no <section id=\"{id}\"> found for activity in JSON-LD graph")]
    MissingSection {
        /// Section id with the leading `#` removed.
        id: String,
    },

    /// A referenced image could not be fetched or written.
    #[error("failed to fetch image '{src}': {reason}")]
    ImageFetch {
        /// Original `src` value of the `<img>` element.
        src: String,
        /// Human readable cause.
        reason: String,
    },

    /// An image has an extension without a known OPF media type.
    #[error("unsupported image type '{extension}' for {path:?} (expected png, jpg, jpeg or svg)")]
    UnsupportedImageType {
        /// Relative bundle path of the image.
        path: PathBuf,
        /// Lowercased extension, empty when the file has none.
        extension: String,
    },

    /// A [`GenerateOptions`](crate::GenerateOptions) value is unusable.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML reading or writing failed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Writing the zip archive failed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    pub(crate) fn image_fetch(src: impl Into<String>, reason: impl ToString) -> Self {
        Self::ImageFetch {
            src: src.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the error should not abort the conversion.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ImageFetch { .. })
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(quick_xml::Error::from(err))
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;
