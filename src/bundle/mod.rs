//! Bundle Builder
//!
//! Everything written to the output root: resolved images, the NIMAS XML,
//! the OPF package file and the optional zip archive.

pub mod fetch;
pub mod images;
pub mod opf;
pub mod package;
pub mod stylesheet;
pub mod templates;
pub mod xml;

pub use fetch::{DefaultFetcher, FetchedImage, ImageFetcher, ImageSource};
pub use images::{ImageManifest, IMAGES_DIR};
pub use opf::{DublinCore, PackageManifest};
pub use stylesheet::{StyleTransform, Stylesheet};
pub use templates::Templates;
pub use xml::IntermediateDocument;
