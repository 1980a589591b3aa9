//! Image Resolver
//!
//! Every `<img>` in the working document is pointed at a file under the
//! bundle's `images/` directory and recorded in an [`ImageManifest`]. Image
//! bytes are fetched unless the destination already exists.
//!
//! File names come from a legacy flattening rule kept for compatibility with
//! existing bundles: the URL path has `/` replaced by `-` and then loses its
//! first `-`. Distinct paths can therefore collide (`/a/b-c.png` and
//! `/a-b/c.png` both become `a-b-c.png`).

use std::path::{Path, PathBuf};

use dom_query::Document;
use url::Url;

use crate::bundle::fetch::{ImageFetcher, ImageSource};
use crate::dom;
use crate::error::{Error, Result};
use crate::url_utils;

/// Bundle sub-directory holding images.
pub const IMAGES_DIR: &str = "images";

/// Flatten an image URL into a bundle file name.
///
/// # Examples
///
/// ```
/// use ocx_nimas::bundle::images::flatten_image_path;
///
/// assert_eq!(flatten_image_path("https://ex.com/a/b-c.png"), "a-b-c.png");
/// assert_eq!(flatten_image_path("img/x.jpg"), "imgx.jpg");
/// ```
#[must_use]
pub fn flatten_image_path(src: &str) -> String {
    url_utils::url_path(src).replace('/', "-").replacen('-', "", 1)
}

/// OPF media type for an image, from its extension.
///
/// # Errors
///
/// Returns [`Error::UnsupportedImageType`] for anything but png, jpg, jpeg
/// and svg.
pub fn media_type(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "svg" => Ok("image/svg+xml"),
        _ => Err(Error::UnsupportedImageType {
            path: path.to_path_buf(),
            extension,
        }),
    }
}

/// Manifest id for an image: its file name without non-alphanumerics.
#[must_use]
pub fn manifest_id(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Ordered, duplicate-free list of bundle-relative image paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageManifest {
    paths: Vec<String>,
}

impl ImageManifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path. Returns `false` if it was already present.
    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if self.paths.contains(&path) {
            return false;
        }
        self.paths.push(path);
        true
    }

    /// Paths in first-reference order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Whether `path` has been recorded.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Number of distinct images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// `true` if no image was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<'a> IntoIterator for &'a ImageManifest {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

/// Settings for one resolver run.
#[derive(Debug, Clone, Default)]
pub struct ResolveSettings {
    /// Bundle output root; images land in `<root>/images`.
    pub output_root: PathBuf,
    /// Fetch even if the destination exists.
    pub force_download: bool,
    /// Base for relative sources.
    pub base_url: Option<Url>,
    /// Directory for relative local sources.
    pub base_dir: Option<PathBuf>,
}

/// Outcome of resolving a document's images.
#[derive(Debug, Default)]
pub struct ImageResolution {
    /// Every referenced image.
    pub manifest: ImageManifest,
    /// Number of images actually fetched.
    pub fetched: usize,
    /// Per-image failures ([`Error::ImageFetch`]). The `src` of a failed image
    /// is still rewritten.
    pub errors: Vec<Error>,
}

/// Rewrite every `<img src>` to its bundle path and fetch missing files.
///
/// Image types are checked for the whole document before the first fetch.
///
/// # Errors
///
/// Returns [`Error::UnsupportedImageType`] if any image is not png, jpg,
/// jpeg or svg. Nothing is fetched and no `src` is rewritten in that case.
/// Fetch failures are not errors; they are collected in
/// [`ImageResolution::errors`].
pub fn resolve_images(
    doc: &Document,
    settings: &ResolveSettings,
    fetcher: &dyn ImageFetcher,
) -> Result<ImageResolution> {
    let images = dom::query_all(&doc.select("html"), "img");
    for src in images.iter().filter_map(|img| dom::get_attribute(img, "src")) {
        let file_name = flatten_image_path(&src);
        if !file_name.is_empty() {
            media_type(Path::new(&file_name))?;
        }
    }

    let mut resolution = ImageResolution::default();
    let images_root = settings.output_root.join(IMAGES_DIR);

    for img in images {
        let Some(src) = dom::get_attribute(&img, "src") else {
            continue;
        };
        let file_name = flatten_image_path(&src);
        if file_name.is_empty() {
            resolution
                .errors
                .push(Error::image_fetch(&src, "image URL has no path"));
            continue;
        }

        let relative = format!("{IMAGES_DIR}/{file_name}");
        dom::set_attribute(&img, "src", &relative);
        if !resolution.manifest.insert(relative.as_str()) {
            continue;
        }

        let target = images_root.join(&file_name);
        if target.exists() && !settings.force_download {
            tracing::debug!(path = %target.display(), "image already present, skipping fetch");
            continue;
        }

        match fetch_one(&src, &target, settings, fetcher) {
            Ok(bytes) => {
                resolution.fetched += 1;
                tracing::debug!(%src, path = %target.display(), bytes, "fetched image");
            }
            Err(err) => {
                tracing::warn!("{err}");
                resolution.errors.push(err);
            }
        }
    }

    tracing::debug!(
        images = resolution.manifest.len(),
        fetched = resolution.fetched,
        failed = resolution.errors.len(),
        "resolved images"
    );
    Ok(resolution)
}

fn fetch_one(
    src: &str,
    target: &Path,
    settings: &ResolveSettings,
    fetcher: &dyn ImageFetcher,
) -> Result<u64> {
    let source = ImageSource::resolve(src, settings.base_url.as_ref(), settings.base_dir.as_deref())?;
    let image = fetcher.fetch(src, &source)?;
    image
        .write_to(target)
        .map_err(|e| Error::image_fetch(src, format!("writing {}: {e}", target.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::fetch::FetchedImage;
    use std::cell::RefCell;

    /// Serves fixed bytes and records every request.
    #[derive(Default)]
    struct StubFetcher {
        requests: RefCell<Vec<String>>,
        fail: bool,
    }

    impl ImageFetcher for StubFetcher {
        fn fetch(&self, src: &str, _source: &ImageSource) -> Result<FetchedImage> {
            self.requests.borrow_mut().push(src.to_string());
            if self.fail {
                return Err(Error::image_fetch(src, "stub failure"));
            }
            Ok(FetchedImage::from_bytes(b"img".to_vec()))
        }
    }

    fn settings(root: &Path) -> ResolveSettings {
        ResolveSettings {
            output_root: root.to_path_buf(),
            ..ResolveSettings::default()
        }
    }

    #[test]
    fn flattening_follows_legacy_rule() {
        assert_eq!(flatten_image_path("https://ex.com/a/b-c.png"), "a-b-c.png");
        assert_eq!(flatten_image_path("https://ex.com/a/b/c.png?x=1"), "a-b-c.png");
        assert_eq!(flatten_image_path("/c.png"), "c.png");
        assert_eq!(flatten_image_path("c.png"), "c.png");
    }

    #[test]
    fn golden_manifest_entry_and_id() {
        let path = format!("{IMAGES_DIR}/{}", flatten_image_path("https://ex.com/a/b-c.png"));
        assert_eq!(path, "images/a-b-c.png");
        assert_eq!(manifest_id(&path), "abcpng");
    }

    #[test]
    fn media_types() {
        assert_eq!(media_type(Path::new("images/a.PNG")).ok(), Some("image/png"));
        assert_eq!(media_type(Path::new("images/a.jpeg")).ok(), Some("image/jpeg"));
        assert_eq!(media_type(Path::new("images/a.svg")).ok(), Some("image/svg+xml"));
        assert!(matches!(
            media_type(Path::new("images/a.gif")),
            Err(Error::UnsupportedImageType { ref extension, .. }) if extension == "gif"
        ));
        assert!(media_type(Path::new("images/noext")).is_err());
    }

    #[test]
    fn manifest_dedupes_in_first_seen_order() {
        let mut manifest = ImageManifest::new();
        assert!(manifest.insert("images/b.png"));
        assert!(manifest.insert("images/a.png"));
        assert!(!manifest.insert("images/b.png"));
        assert_eq!(manifest.iter().collect::<Vec<_>>(), vec!["images/b.png", "images/a.png"]);
    }

    #[test]
    fn rewrites_sources_and_fetches_each_image_once() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dom::parse(
            r#"<img src="https://ex.com/a/b.png"><img src="https://ex.com/a/b.png"><img src="https://ex.com/c.svg">"#,
        );
        let fetcher = StubFetcher::default();

        let res = resolve_images(&doc, &settings(dir.path()), &fetcher).unwrap();

        assert_eq!(res.manifest.iter().collect::<Vec<_>>(), vec!["images/a-b.png", "images/c.svg"]);
        assert_eq!(res.fetched, 2);
        assert_eq!(fetcher.requests.borrow().len(), 2);
        assert!(dir.path().join("images/a-b.png").exists());
        let srcs: Vec<_> = dom::query_all(&doc.select("html"), "img")
            .iter()
            .filter_map(|i| dom::get_attribute(i, "src"))
            .collect();
        assert_eq!(srcs, vec!["images/a-b.png", "images/a-b.png", "images/c.svg"]);
    }

    #[test]
    fn existing_files_are_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(IMAGES_DIR)).unwrap();
        std::fs::write(dir.path().join("images/x.png"), b"old").unwrap();

        let doc = dom::parse(r#"<img src="/x.png">"#);
        let fetcher = StubFetcher::default();
        let res = resolve_images(&doc, &settings(dir.path()), &fetcher).unwrap();
        assert_eq!(res.fetched, 0);
        assert!(fetcher.requests.borrow().is_empty());

        let doc = dom::parse(r#"<img src="/x.png">"#);
        let forced = ResolveSettings {
            force_download: true,
            ..settings(dir.path())
        };
        let res = resolve_images(&doc, &forced, &fetcher).unwrap();
        assert_eq!(res.fetched, 1);
        assert_eq!(std::fs::read(dir.path().join("images/x.png")).ok(), Some(b"img".to_vec()));
    }

    #[test]
    fn failures_are_reported_and_src_still_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dom::parse(r#"<img src="https://ex.com/missing.png">"#);
        let fetcher = StubFetcher {
            fail: true,
            ..StubFetcher::default()
        };

        let res = resolve_images(&doc, &settings(dir.path()), &fetcher).unwrap();

        assert_eq!(res.errors.len(), 1);
        assert!(res.errors[0].is_recoverable());
        assert!(res.manifest.contains("images/missing.png"));
        assert_eq!(dom::get_attribute(&doc.select("img"), "src").as_deref(), Some("images/missing.png"));
    }

    #[test]
    fn unsupported_type_stops_before_any_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dom::parse(r#"<img src="https://ex.com/a.png"><img src="https://ex.com/b.gif">"#);
        let fetcher = StubFetcher::default();

        let res = resolve_images(&doc, &settings(dir.path()), &fetcher);

        assert!(matches!(res, Err(Error::UnsupportedImageType { ref extension, .. }) if extension == "gif"));
        assert!(fetcher.requests.borrow().is_empty());
        assert!(!dir.path().join(IMAGES_DIR).exists());
        assert_eq!(dom::get_attribute(&doc.select("img"), "src").as_deref(), Some("https://ex.com/a.png"));
    }

    #[test]
    fn images_without_src_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dom::parse(r#"<img alt="decorative">"#);
        let res = resolve_images(&doc, &settings(dir.path()), &StubFetcher::default()).unwrap();
        assert!(res.manifest.is_empty());
        assert!(res.errors.is_empty());
    }
}
