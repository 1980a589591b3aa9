//! OCX to NIMAS conversion.
//!
//! A [`Converter`] is built once per input document. Construction extracts
//! the JSON-LD graph from the raw HTML and sanitizes the markup; each
//! [`Converter::generate`] call then works on its own freshly parsed copy of
//! the sanitized document, in this order:
//!
//! 1. resolve images (check types, rewrite `src`, fetch missing files)
//! 2. renormalize section headings
//! 3. retag lists
//! 4. build the NIMAS XML
//! 5. build the OPF
//! 6. copy the cover, write XML and OPF
//! 7. zip, if requested
//!
//! Steps 4 and 5 happen entirely in memory, so a fatal error there leaves no
//! XML or OPF file behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use url::Url;

use crate::bundle::fetch::{DefaultFetcher, ImageFetcher};
use crate::bundle::images::{self, ImageManifest, ResolveSettings};
use crate::bundle::opf::{self, DublinCore, PackageManifest};
use crate::bundle::stylesheet::StyleTransform;
use crate::bundle::templates::Templates;
use crate::bundle::package;
use crate::bundle::xml::IntermediateDocument;
use crate::dom;
use crate::encoding;
use crate::error::{Error, Result};
use crate::metadata::{self, LinkedDataGraph};
use crate::normalize;
use crate::options::GenerateOptions;
use crate::sanitizer;

/// What one [`Converter::generate`] call produced.
#[derive(Debug)]
pub struct GenerateReport {
    /// Serialized NIMAS XML.
    pub xml: String,
    /// Serialized OPF.
    pub opf: String,
    pub xml_path: PathBuf,
    pub opf_path: PathBuf,
    /// Copied cover file, if a cover was given.
    pub cover_path: Option<PathBuf>,
    /// Zip archive, if packaging was requested.
    pub zip_path: Option<PathBuf>,
    /// Every image referenced by the document.
    pub images: ImageManifest,
    /// Number of images downloaded or copied in this run.
    pub fetched: usize,
    /// Images that could not be fetched. Their `src` still points into
    /// `images/`, so the bundle is incomplete while this is non-empty.
    pub image_errors: Vec<Error>,
}

impl GenerateReport {
    /// `true` if every referenced image is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.image_errors.is_empty()
    }
}

/// Converts one OCX document into a NIMAS bundle.
pub struct Converter {
    graph: LinkedDataGraph,
    sanitized: String,
    templates: Templates,
    fetcher: Option<Box<dyn ImageFetcher>>,
}

impl Converter {
    /// Extract metadata from `input_html` and sanitize it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metadata`] if the document has no usable JSON-LD.
    /// Nothing is written in that case.
    pub fn new(input_html: &str) -> Result<Self> {
        let graph = metadata::extract_graph(input_html)?;
        let sanitized = sanitizer::sanitize(input_html);
        tracing::debug!(
            nodes = graph.nodes().len(),
            activities = graph.activities().count(),
            bytes = sanitized.len(),
            "loaded OCX document"
        );

        Ok(Self {
            graph,
            sanitized,
            templates: Templates::default(),
            fetcher: None,
        })
    }

    /// Like [`Converter::new`], decoding raw bytes by their declared charset.
    ///
    /// # Errors
    ///
    /// See [`Converter::new`].
    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        Self::new(&encoding::decode_document(input))
    }

    /// Use other OPF and stylesheet templates.
    #[must_use]
    pub fn with_templates(mut self, templates: Templates) -> Self {
        self.templates = templates;
        self
    }

    /// Use a custom image fetcher instead of HTTP and the filesystem.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: impl ImageFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// The document's linked data.
    #[must_use]
    pub fn graph(&self) -> &LinkedDataGraph {
        &self.graph
    }

    /// `{identifier}-NIMAS`.
    #[must_use]
    pub fn unique_identifier(&self) -> Option<String> {
        self.graph.unique_identifier()
    }

    /// The sanitized markup every `generate` call starts from.
    #[must_use]
    pub fn sanitized_html(&self) -> &str {
        &self.sanitized
    }

    /// Produce the bundle under `output_root`.
    ///
    /// Image fetch failures do not abort the run; they are returned in
    /// [`GenerateReport::image_errors`].
    ///
    /// # Errors
    ///
    /// - [`Error::TemplateStructure`] for a broken stylesheet or OPF template
    /// - [`Error::MissingSection`] if an activity has no matching section
    /// - [`Error::UnsupportedImageType`] for images other than png, jpg, jpeg
    ///   and svg
    /// - [`Error::InvalidOption`] for an unparsable `base_url`
    /// - I/O, XML and zip errors
    pub fn generate(&self, output_root: &Path, options: &GenerateOptions) -> Result<GenerateReport> {
        let stylesheet = self.templates.stylesheet()?;
        let base_url = options
            .base_url
            .as_deref()
            .map(|u| Url::parse(u).map_err(|e| Error::InvalidOption(format!("base URL '{u}': {e}"))))
            .transpose()?;
        let (xml_name, opf_name) = options.output_names();
        let cover_name = options.cover_pdf.as_deref().map(file_name).transpose()?;

        let document = dom::parse(&self.sanitized);

        let settings = ResolveSettings {
            output_root: output_root.to_path_buf(),
            force_download: options.force_download,
            base_url,
            base_dir: options.base_dir.clone(),
        };
        let resolution = match &self.fetcher {
            Some(fetcher) => images::resolve_images(&document, &settings, fetcher.as_ref())?,
            None => {
                let fetcher = DefaultFetcher::new(options.fetch_timeout);
                images::resolve_images(&document, &settings, &fetcher)?
            }
        };

        normalize::renormalize_headings(&document);
        normalize::retag_lists(&document);

        let intermediate = IntermediateDocument::build(&self.graph, &document)?;
        let xml = stylesheet.transform(&intermediate.to_element())?;

        let manifest = PackageManifest::new(xml_name.as_str(), cover_name.clone(), &resolution.manifest)?;
        let dc = DublinCore::from_graph(&self.graph, options.effective_date());
        let opf = opf::build_opf(&self.templates.opf, &dc, &manifest)?;

        fs::create_dir_all(output_root)?;
        let cover_path = match (&options.cover_pdf, &cover_name) {
            (Some(source), Some(name)) => Some(copy_cover(source, &output_root.join(name))?),
            _ => None,
        };
        let xml_path = output_root.join(&xml_name);
        let opf_path = output_root.join(&opf_name);
        write_atomic(&xml_path, xml.as_bytes())?;
        write_atomic(&opf_path, opf.as_bytes())?;

        let zip_path = if options.zip {
            let stem = Path::new(&xml_name)
                .file_stem()
                .map_or_else(|| xml_name.clone(), |s| s.to_string_lossy().into_owned());
            let zip_path = output_root.join(format!("{stem}.zip"));

            let mut entries = vec![xml_name.clone(), opf_name.clone()];
            entries.extend(cover_name);
            entries.extend(resolution.manifest.iter().map(str::to_string));
            package::write_zip(&zip_path, output_root, &entries)?;
            Some(zip_path)
        } else {
            None
        };

        Ok(GenerateReport {
            xml,
            opf,
            xml_path,
            opf_path,
            cover_path,
            zip_path,
            images: resolution.manifest,
            fetched: resolution.fetched,
            image_errors: resolution.errors,
        })
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("graph", &self.graph)
            .field("custom_fetcher", &self.fetcher.is_some())
            .finish_non_exhaustive()
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidOption(format!("cover path {} has no file name", path.display())))
}

/// Write through a temporary file in the same directory.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "wrote");
    Ok(())
}

fn copy_cover(source: &Path, target: &Path) -> Result<PathBuf> {
    let same = match (fs::canonicalize(source), fs::canonicalize(target)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if !same {
        fs::copy(source, target)?;
        tracing::info!(path = %target.display(), "copied cover");
    }
    Ok(target.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::fetch::{FetchedImage, ImageSource};

    struct Bytes;

    impl ImageFetcher for Bytes {
        fn fetch(&self, _src: &str, _source: &ImageSource) -> Result<FetchedImage> {
            Ok(FetchedImage::from_bytes(vec![0x89, b'P', b'N', b'G']))
        }
    }

    const DOC: &str = r##"<html><head>
<script type="application/ld+json">{"name":"Bio 101","identifier":"abc123","@graph":[{"@id":"#sec1","@type":"oer:Activity"}]}</script>
</head><body>
<section id="sec1"><h2>Cells</h2><ul><li>one</li></ul><img src="https://ex.com/a/b.png" alt="B"></section>
</body></html>"##;

    #[test]
    fn construction_requires_metadata() {
        assert!(matches!(Converter::new("<p>no metadata</p>"), Err(Error::Metadata(_))));
    }

    #[test]
    fn graph_and_identifier_are_exposed() {
        let converter = Converter::new(DOC).unwrap();
        assert_eq!(converter.graph().name.as_deref(), Some("Bio 101"));
        assert_eq!(converter.unique_identifier().as_deref(), Some("abc123-NIMAS"));
        assert!(!converter.sanitized_html().contains("<script"));
    }

    #[test]
    fn generate_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(DOC)
            .unwrap()
            .with_fetcher(Bytes);
        let options = GenerateOptions {
            xml_filename: Some("book.xml".to_string()),
            opf_filename: Some("book.opf".to_string()),
            ..GenerateOptions::default()
        };

        let first = converter.generate(dir.path(), &options).unwrap();
        let second = converter.generate(dir.path(), &options).unwrap();

        assert_eq!(first.xml, second.xml);
        assert_eq!(first.fetched, 1);
        assert_eq!(second.fetched, 0);
        assert!(second.xml.contains(r#"src="images/a-b.png""#));
    }

    #[test]
    fn bad_base_url_is_rejected_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(DOC).unwrap();
        let options = GenerateOptions {
            base_url: Some("not a url".to_string()),
            ..GenerateOptions::default()
        };

        let result = converter.generate(dir.path(), &options);

        assert!(matches!(result, Err(Error::InvalidOption(_))));
        assert_eq!(std::fs::read_dir(dir.path()).map(Iterator::count).unwrap_or(0), 0);
    }
}
