use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use wheelhouse_util::errors::WheelhouseError;

use crate::marker::{MarkerEnvironment, MarkerTree};
use crate::name::{normalize, PackageName};
use crate::specifier::Constraint;
use crate::version::Version;

/// A PEP 508 dependency declaration: `name[extras] constraint ; marker`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Requirement {
    pub name: PackageName,
    pub extras: BTreeSet<String>,
    pub constraint: Constraint,
    pub marker: Option<MarkerTree>,
}

impl Requirement {
    /// Unconstrained requirement on `name`.
    pub fn any(name: PackageName) -> Self {
        Self {
            name,
            extras: BTreeSet::new(),
            constraint: Constraint::any(),
            marker: None,
        }
    }

    /// `name==version`.
    pub fn pinned(name: PackageName, version: Version) -> Self {
        Self {
            constraint: Constraint::exactly(version),
            ..Self::any(name)
        }
    }

    /// Parse a requirement string.
    ///
    /// Direct references (`name @ url`) are not supported: wheels built from
    /// source enter the closure as local candidates instead.
    pub fn parse(input: &str) -> Result<Self, WheelhouseError> {
        let invalid = |reason: String| WheelhouseError::InvalidRequirement {
            requirement: input.to_string(),
            reason,
        };

        let (body, marker_text) = match input.split_once(';') {
            Some((body, marker)) => (body, Some(marker.trim())),
            None => (input, None),
        };
        let body = body.trim();
        if body.is_empty() {
            return Err(invalid("missing package name".into()));
        }

        let name_end = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(body.len());
        let raw_name = &body[..name_end];
        if !PackageName::is_valid(raw_name) {
            return Err(invalid(format!("`{raw_name}` is not a valid package name")));
        }
        let mut rest = body[name_end..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| invalid("unclosed `[` in extras".into()))?;
            for extra in after[..close].split(',') {
                let extra = extra.trim();
                if extra.is_empty() {
                    continue;
                }
                if !PackageName::is_valid(extra) {
                    return Err(invalid(format!("`{extra}` is not a valid extra name")));
                }
                extras.insert(normalize(extra));
            }
            rest = after[close + 1..].trim_start();
        }

        if rest.starts_with('@') {
            return Err(invalid("direct URL references are not supported".into()));
        }

        let spec_text = match rest.strip_prefix('(') {
            Some(inner) => inner
                .strip_suffix(')')
                .ok_or_else(|| invalid("unclosed `(` around version specifiers".into()))?,
            None => rest,
        };
        let constraint = Constraint::parse(spec_text).map_err(invalid)?;

        let marker = match marker_text {
            Some("") => return Err(invalid("empty environment marker".into())),
            Some(text) => Some(MarkerTree::parse(text).map_err(invalid)?),
            None => None,
        };

        Ok(Self {
            name: PackageName::new(raw_name),
            extras,
            constraint,
            marker,
        })
    }

    /// Whether this requirement is in force for `env` when the depending
    /// package was requested with `extras`.
    pub fn applies_to(&self, env: &MarkerEnvironment, extras: &BTreeSet<String>) -> bool {
        self.marker
            .as_ref()
            .map_or(true, |marker| marker.evaluate(env, extras))
    }
}

impl FromStr for Requirement {
    type Err = WheelhouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if !self.constraint.is_any() {
            // Clauses without separators so that the line reads as pip expects.
            let clauses: Vec<String> = self.constraint.clauses().map(ToString::to_string).collect();
            f.write_str(&clauses.join(","))?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {marker}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_form() {
        let req =
            Requirement::parse("Requests[Socks, security] >=2.28,<3 ; python_version >= '3.8'")
                .unwrap();
        assert_eq!(req.name.as_str(), "requests");
        assert_eq!(
            req.extras,
            BTreeSet::from(["security".to_string(), "socks".to_string()])
        );
        assert_eq!(req.constraint, Constraint::parse(">=2.28, <3").unwrap());
        assert!(req.marker.is_some());
    }

    #[test]
    fn bare_name() {
        let req = Requirement::parse("six").unwrap();
        assert!(req.constraint.is_any());
        assert!(req.extras.is_empty());
        assert!(req.marker.is_none());
    }

    #[test]
    fn parenthesized_specifiers() {
        let req = Requirement::parse("pytest (>=6) ; extra == 'test'").unwrap();
        assert_eq!(req.constraint, Constraint::parse(">=6").unwrap());
    }

    #[test]
    fn rejections() {
        for bad in
            ["", ">=1.0", "pkg >=", "pkg @ https://x/pkg.whl", "pkg[extra", "pkg;", "pkg 1.0"]
        {
            assert!(
                matches!(Requirement::parse(bad), Err(WheelhouseError::InvalidRequirement { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn pinned_display() {
        let req = Requirement::pinned(PackageName::new("Foo_Bar"), Version::parse("1.2").unwrap());
        assert_eq!(req.to_string(), "foo-bar==1.2");
    }
}
