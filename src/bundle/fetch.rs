//! Image fetching.
//!
//! The resolver does not care where bytes come from: every source is turned
//! into a [`FetchedImage`], a reader paired with the number of bytes it will
//! yield. Remote sources go through a blocking HTTP client with a timeout,
//! local sources are opened from disk.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::url_utils;

/// Connect timeout used when the overall fetch timeout is longer.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where an image's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// An `http`/`https` URL.
    Remote(Url),
    /// A file on the local filesystem.
    Local(PathBuf),
}

impl ImageSource {
    /// Classify an `<img src>` value.
    ///
    /// `http(s)` URLs are remote and `file://` URLs are local. Relative
    /// references are joined to `base_url` when one is given; otherwise they
    /// are treated as paths under `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImageFetch`] for empty sources and for schemes that
    /// cannot be fetched (`data:`, `ftp:`, ...).
    pub fn resolve(src: &str, base_url: Option<&Url>, base_dir: Option<&Path>) -> Result<Self> {
        let trimmed = src.trim();
        if trimmed.is_empty() {
            return Err(Error::image_fetch(src, "empty image source"));
        }

        if url_utils::has_scheme(trimmed) || base_url.is_some() {
            let url = url_utils::create_absolute_url(trimmed, base_url)
                .ok_or_else(|| Error::image_fetch(src, "not a valid URL"))?;
            return Self::from_url(src, url);
        }

        let relative = url_utils::url_path(trimmed);
        let path = match base_dir {
            Some(dir) => dir.join(relative),
            None => PathBuf::from(relative),
        };
        Ok(Self::Local(path))
    }

    fn from_url(src: &str, url: Url) -> Result<Self> {
        match url.scheme() {
            "http" | "https" => Ok(Self::Remote(url)),
            "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| Error::image_fetch(src, "file URL has no local path")),
            other => Err(Error::image_fetch(src, format!("unsupported URL scheme '{other}'"))),
        }
    }
}

/// A byte stream with a known final length.
pub struct FetchedImage {
    reader: Box<dyn Read>,
    len: u64,
}

impl FetchedImage {
    /// Wrap a reader that will yield exactly `len` bytes.
    pub fn new(reader: impl Read + 'static, len: u64) -> Self {
        Self {
            reader: Box::new(reader),
            len,
        }
    }

    /// Wrap an in-memory buffer.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        Self::new(Cursor::new(bytes), len)
    }

    /// Announced length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// `true` if the stream is announced empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write the stream to `path`, creating parent directories.
    ///
    /// Bytes go to a temporary file next to `path` that is only moved into
    /// place once the announced length has been written, so a failed fetch
    /// never leaves a truncated image behind.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing fails or the stream length does not
    /// match the announced length.
    pub fn write_to(self, path: &Path) -> io::Result<u64> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        // One extra byte so an over-long stream is detected
        let written = io::copy(&mut self.reader.take(self.len + 1), tmp.as_file_mut())?;
        if written != self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected {} bytes, received {written}", self.len),
            ));
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(written)
    }
}

impl std::fmt::Debug for FetchedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedImage").field("len", &self.len).finish_non_exhaustive()
    }
}

/// Capability to fetch image bytes.
///
/// Implementations report every failure as [`Error::ImageFetch`].
pub trait ImageFetcher {
    /// Open `source` for reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImageFetch`] if the source cannot be read.
    fn fetch(&self, src: &str, source: &ImageSource) -> Result<FetchedImage>;
}

/// Default fetcher: blocking HTTP for remote sources, the filesystem for
/// local ones.
pub struct DefaultFetcher {
    client: Option<reqwest::blocking::Client>,
    timeout: Duration,
}

impl DefaultFetcher {
    /// Create a fetcher whose HTTP requests give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = match reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .build()
        {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("failed to build HTTP client, remote images will fail: {e}");
                None
            }
        };
        Self { client, timeout }
    }

    fn fetch_remote(&self, src: &str, url: &Url) -> Result<FetchedImage> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::image_fetch(src, "HTTP client unavailable"))?;

        let response = client.get(url.as_str()).send().map_err(|e| self.http_error(src, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::image_fetch(src, format!("HTTP {status}")));
        }

        match response.content_length() {
            Some(len) => Ok(FetchedImage::new(response, len)),
            None => {
                // Chunked response: buffer it to learn the length
                let bytes = response.bytes().map_err(|e| self.http_error(src, &e))?;
                Ok(FetchedImage::from_bytes(bytes.to_vec()))
            }
        }
    }

    fn http_error(&self, src: &str, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::image_fetch(src, format!("timed out after {}s", self.timeout.as_secs()))
        } else {
            Error::image_fetch(src, err)
        }
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(crate::options::DEFAULT_FETCH_TIMEOUT)
    }
}

impl ImageFetcher for DefaultFetcher {
    fn fetch(&self, src: &str, source: &ImageSource) -> Result<FetchedImage> {
        match source {
            ImageSource::Remote(url) => self.fetch_remote(src, url),
            ImageSource::Local(path) => {
                let file = File::open(path)
                    .map_err(|e| Error::image_fetch(src, format!("{}: {e}", path.display())))?;
                let len = file
                    .metadata()
                    .map_err(|e| Error::image_fetch(src, e))?
                    .len();
                Ok(FetchedImage::new(file, len))
            }
        }
    }
}
