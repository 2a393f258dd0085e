//! Core metadata (`METADATA` / `PKG-INFO`) header parsing.

use serde::{Deserialize, Serialize};

use wheelhouse_core::{Constraint, Requirement};
use wheelhouse_util::errors::WheelhouseError;

/// The fields of a distribution's core metadata that resolution needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub requires_dist: Vec<String>,
}

impl CoreMetadata {
    /// Parse the RFC 822 style header block. The message body, if any, is ignored.
    pub fn parse(content: &str) -> Self {
        let mut meta = Self::default();
        let mut headers: Vec<(String, String)> = Vec::new();
        for line in content.lines() {
            if line.is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }
        for (key, value) in headers {
            match key.as_str() {
                "name" => meta.name = value,
                "version" => meta.version = value,
                "requires-python" if !value.is_empty() => meta.requires_python = Some(value),
                "requires-dist" => meta.requires_dist.push(value),
                _ => {}
            }
        }
        meta
    }

    pub fn requirements(&self) -> Result<Vec<Requirement>, WheelhouseError> {
        self.requires_dist.iter().map(|r| Requirement::parse(r)).collect()
    }

    /// `Requires-Python`, tolerating malformed values the way installers do.
    pub fn requires_python_constraint(&self) -> Option<Constraint> {
        parse_requires_python(self.requires_python.as_deref())
    }
}

/// Parse a `requires_python` value; malformed values are ignored with a warning.
pub fn parse_requires_python(value: Option<&str>) -> Option<Constraint> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    match Constraint::parse(value) {
        Ok(constraint) => Some(constraint),
        Err(e) => {
            tracing::warn!("ignoring malformed requires_python `{value}`: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = "Metadata-Version: 2.1
Name: requests
Version: 2.31.0
Summary: Python HTTP for Humans.
Requires-Python: >=3.7
Requires-Dist: charset-normalizer (<4,>=2)
Requires-Dist: idna (<4,>=2.5)
Requires-Dist: PySocks (!=1.5.7,>=1.5.6) ; extra == 'socks'
Description-Content-Type: text/markdown

# Requests
Requires-Dist: not-a-header
";

    #[test]
    fn headers_before_body() {
        let meta = CoreMetadata::parse(METADATA);
        assert_eq!(meta.name, "requests");
        assert_eq!(meta.version, "2.31.0");
        assert_eq!(meta.requires_python.as_deref(), Some(">=3.7"));
        assert_eq!(meta.requires_dist.len(), 3);
        let reqs = meta.requirements().unwrap();
        assert_eq!(reqs[2].name.as_str(), "pysocks");
        assert!(reqs[2].marker.is_some());
    }

    #[test]
    fn continuation_lines_are_folded() {
        let meta = CoreMetadata::parse("Name: pkg\nSummary: first\n  second\nVersion: 1.0\n");
        assert_eq!(meta.version, "1.0");
    }

    #[test]
    fn malformed_requires_python_is_ignored() {
        assert!(parse_requires_python(Some(">=3.6.*")).is_none());
        assert!(parse_requires_python(Some("")).is_none());
        assert!(parse_requires_python(Some(">=3.8")).is_some());
    }
}
