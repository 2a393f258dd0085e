use std::path::Path;

use wheelhouse_util::errors::WheelhouseError;

use crate::requirement::Requirement;

/// A pinned `requirements.txt`: one requirement per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrozenRequirements {
    pub requirements: Vec<Requirement>,
}

impl FrozenRequirements {
    pub fn new(requirements: impl IntoIterator<Item = Requirement>) -> Self {
        Self {
            requirements: requirements.into_iter().collect(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for req in &self.requirements {
            out.push_str(&req.to_string());
            out.push('\n');
        }
        out
    }

    /// Write atomically to `path`.
    pub fn write_to(&self, path: &Path) -> miette::Result<()> {
        wheelhouse_util::fs::write_atomic(path, self.render().as_bytes()).map_err(|e| {
            WheelhouseError::Generic {
                message: format!("Failed to write {}: {e}", path.display()),
            }
        })?;
        Ok(())
    }

    /// Read a requirements file, skipping blank lines and `#` comments.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WheelhouseError::Generic {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Ok(Self::parse(&content)?)
    }

    pub fn parse(content: &str) -> Result<Self, WheelhouseError> {
        let requirements = content
            .lines()
            .map(|line| line.split_once(" #").map_or(line, |(req, _)| req).trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Requirement::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { requirements })
    }
}
