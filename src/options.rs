//! Configuration options for bundle generation.
//!
//! The `GenerateOptions` struct controls where output files are named, whether
//! images are re-downloaded, and whether a zip archive is produced.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

/// Default timeout for a single image fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration options for [`Converter::generate`](crate::Converter::generate).
///
/// All fields are public for easy configuration. Use `Default::default()`
/// for standard settings.
///
/// # Example
///
/// ```rust
/// use ocx_nimas::GenerateOptions;
///
/// let options = GenerateOptions {
///     zip: true,
///     xml_filename: Some("g6.wc.sp.ocx.xml".into()),
///     ..GenerateOptions::default()
/// };
/// assert!(!options.force_download);
/// ```
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Fetch images again even when the destination file already exists.
    ///
    /// Default: `false`
    pub force_download: bool,

    /// File name of the NIMAS XML output, relative to the output root.
    ///
    /// Default: `None` (current Unix timestamp + `.xml`)
    pub xml_filename: Option<String>,

    /// File name of the OPF package, relative to the output root.
    ///
    /// Default: `None` (current Unix timestamp + `.opf`)
    pub opf_filename: Option<String>,

    /// Cover PDF copied into the bundle and referenced from the manifest.
    ///
    /// Default: `None` (the cover item is dropped from the manifest)
    pub cover_pdf: Option<PathBuf>,

    /// Also write `<xml base name>.zip` with every produced file.
    ///
    /// Default: `false`
    pub zip: bool,

    /// Base URL that relative image sources are resolved against.
    ///
    /// Default: `None`
    pub base_url: Option<String>,

    /// Directory that relative local image paths are read from.
    ///
    /// Default: `None` (process working directory)
    pub base_dir: Option<PathBuf>,

    /// Upper bound for a single image fetch.
    ///
    /// Default: 30 seconds
    pub fetch_timeout: Duration,

    /// Dublin-Core `Date` written to the OPF.
    ///
    /// Default: `None` (today, local time)
    pub date: Option<NaiveDate>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            force_download: false,
            xml_filename: None,
            opf_filename: None,
            cover_pdf: None,
            zip: false,
            base_url: None,
            base_dir: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            date: None,
        }
    }
}

impl GenerateOptions {
    /// Output file names, falling back to a shared Unix timestamp.
    pub(crate) fn output_names(&self) -> (String, String) {
        let stamp = chrono::Utc::now().timestamp();
        let xml = self
            .xml_filename
            .clone()
            .unwrap_or_else(|| format!("{stamp}.xml"));
        let opf = self
            .opf_filename
            .clone()
            .unwrap_or_else(|| format!("{stamp}.opf"));
        (xml, opf)
    }

    /// Date for the Dublin-Core `Date` field.
    pub(crate) fn effective_date(&self) -> NaiveDate {
        self.date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}
