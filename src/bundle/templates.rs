//! Template configuration.
//!
//! The OPF skeleton and the style-transform ruleset are fixed artifacts
//! shipped in `templates/`. They are embedded as defaults and can be
//! replaced per converter.

use std::fs;
use std::path::Path;

use crate::bundle::stylesheet::Stylesheet;
use crate::error::Result;

/// Embedded OPF package skeleton.
pub const DEFAULT_OPF: &str = include_str!("../../templates/ocx2nimas.opf");
/// Embedded style-transform ruleset.
pub const DEFAULT_STYLESHEET: &str = include_str!("../../templates/ocx2nimas.json");

/// Template texts used by one converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    /// OPF skeleton XML.
    pub opf: String,
    /// Style-transform ruleset JSON.
    pub stylesheet: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new(DEFAULT_OPF, DEFAULT_STYLESHEET)
    }
}

impl Templates {
    #[must_use]
    pub fn new(opf: impl Into<String>, stylesheet: impl Into<String>) -> Self {
        Self {
            opf: opf.into(),
            stylesheet: stylesheet.into(),
        }
    }

    /// Load replacements from disk; `None` keeps the embedded artifact.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if a given file cannot be read.
    pub fn from_paths(opf: Option<&Path>, stylesheet: Option<&Path>) -> Result<Self> {
        let opf = match opf {
            Some(path) => fs::read_to_string(path)?,
            None => DEFAULT_OPF.to_string(),
        };
        let stylesheet = match stylesheet {
            Some(path) => fs::read_to_string(path)?,
            None => DEFAULT_STYLESHEET.to_string(),
        };
        Ok(Self { opf, stylesheet })
    }

    /// Parse the ruleset.
    ///
    /// # Errors
    ///
    /// See [`Stylesheet::from_json`].
    pub fn stylesheet(&self) -> Result<Stylesheet> {
        Stylesheet::from_json(&self.stylesheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_templates_parse() {
        let templates = Templates::default();
        assert!(templates.stylesheet().is_ok());
        assert!(templates.opf.contains("dc-metadata"));
    }

    #[test]
    fn from_paths_overrides_only_given_files() {
        let dir = tempfile::tempdir().unwrap();
        let opf = dir.path().join("custom.opf");
        std::fs::write(&opf, "<package/>").unwrap();

        let templates = Templates::from_paths(Some(&opf), None).unwrap();
        assert_eq!(templates.opf, "<package/>");
        assert_eq!(templates.stylesheet, DEFAULT_STYLESHEET);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Templates::from_paths(None, Some(Path::new("/no/such/sheet.json")));
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
