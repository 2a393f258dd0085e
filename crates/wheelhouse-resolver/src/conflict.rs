//! Reporting of selections that had to be revised during resolution.

use std::fmt;

use wheelhouse_core::{Constraint, PackageName, Target, Version};

/// Every package that was re-selected because a later demand narrowed its
/// constraint past the version first picked.
#[derive(Debug, Clone, Default)]
pub struct ReselectionReport {
    pub reselections: Vec<Reselection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reselection {
    pub package: PackageName,
    pub target: Target,
    pub from: Version,
    pub to: Version,
    /// The accumulated constraint that ruled out `from`.
    pub constraint: Constraint,
}

impl ReselectionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, reselection: Reselection) {
        self.reselections.push(reselection);
    }

    pub fn extend(&mut self, reselections: impl IntoIterator<Item = Reselection>) {
        self.reselections.extend(reselections);
    }

    pub fn is_empty(&self) -> bool {
        self.reselections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reselections.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reselection> {
        self.reselections.iter()
    }
}

impl fmt::Display for ReselectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reselections.is_empty() {
            return write!(f, "No re-selections.");
        }
        writeln!(f, "Re-selections ({}):", self.reselections.len())?;
        for r in &self.reselections {
            writeln!(f, "  {r}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Reselection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: {} -> {} (now constrained to `{}`)",
            self.package, self.target, self.from, self.to, self.constraint
        )
    }
}
