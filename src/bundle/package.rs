//! Bundle Packager
//!
//! Zips already-written bundle files. Entries are addressed by their path
//! relative to the output root; the originals are only read.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;

/// Archive `entries` (paths relative to `root`) into `zip_path`.
///
/// Entries whose file does not exist, such as images whose fetch failed, are
/// skipped with a warning. The archive is assembled in a temporary file and
/// moved into place once complete.
///
/// Returns the entries actually archived.
///
/// # Errors
///
/// Returns an error if an existing entry cannot be read or the archive cannot
/// be written.
pub fn write_zip(zip_path: &Path, root: &Path, entries: &[String]) -> Result<Vec<String>> {
    let parent = zip_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let tmp = tempfile::NamedTempFile::new_in(&parent)?;

    let mut zip = ZipWriter::new(BufWriter::new(tmp.as_file()));
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut archived = Vec::with_capacity(entries.len());
    for entry in entries {
        let source = root.join(entry);
        let mut file = match File::open(&source) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(entry = %entry, "not on disk, left out of the zip");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        zip.start_file(entry.as_str(), deflated)?;
        io::copy(&mut file, &mut zip)?;
        archived.push(entry.clone());
    }

    let mut buffered = zip.finish()?;
    io::Write::flush(&mut buffered)?;
    drop(buffered);
    tmp.persist(zip_path).map_err(|e| e.error)?;

    tracing::info!(path = %zip_path.display(), entries = archived.len(), "wrote zip bundle");
    Ok(archived)
}
