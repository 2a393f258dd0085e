//! Version specifiers and intersected constraints.
//!
//! A [`Constraint`] is an immutable set of [`Specifier`] clauses. Intersecting
//! two constraints unions their clause sets, so "did the constraint on this
//! package change?" is a plain equality check.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::version::Version;

/// Comparison operator of a single specifier clause.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
    LessEqual,
    Less,
    Compatible,
    Arbitrary,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
            Self::LessEqual => "<=",
            Self::Less => "<",
            Self::Compatible => "~=",
            Self::Arbitrary => "===",
        }
    }

    /// Split a leading operator off `s`. Longest match first.
    pub(crate) fn split_prefix(s: &str) -> Option<(Self, &str)> {
        const OPS: [(&str, Operator); 8] = [
            ("===", Operator::Arbitrary),
            ("~=", Operator::Compatible),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            ("<=", Operator::LessEqual),
            (">=", Operator::GreaterEqual),
            ("<", Operator::Less),
            (">", Operator::Greater),
        ];
        OPS.iter()
            .find_map(|(text, op)| s.strip_prefix(text).map(|rest| (*op, rest)))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One clause such as `>=1.2`, `==3.*` or `~=2.2`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Specifier {
    op: Operator,
    version: Version,
    wildcard: bool,
}

impl Specifier {
    pub fn new(op: Operator, version: Version) -> Self {
        Self {
            op,
            version,
            wildcard: false,
        }
    }

    /// `==version` without a wildcard.
    pub fn exact(version: Version) -> Self {
        Self::new(Operator::Equal, version)
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Parse a single clause such as `>= 1.0` or `== 2.*`.
    pub fn parse(clause: &str) -> Result<Self, String> {
        let clause = clause.trim();
        let (op, rest) = Operator::split_prefix(clause)
            .ok_or_else(|| format!("`{clause}` does not start with a comparison operator"))?;
        let rest = rest.trim();
        let (text, wildcard) = match rest.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (rest, false),
        };
        if wildcard && !matches!(op, Operator::Equal | Operator::NotEqual) {
            return Err(format!("`{clause}`: `.*` is only allowed with `==` and `!=`"));
        }
        let version = Version::parse(text)?;
        if op == Operator::Compatible && version.release().len() < 2 {
            return Err(format!("`{clause}`: `~=` needs at least two release segments"));
        }
        if version.has_local()
            && !matches!(op, Operator::Equal | Operator::NotEqual | Operator::Arbitrary)
        {
            return Err(format!("`{clause}`: local versions are only allowed with `==` and `!=`"));
        }
        Ok(Self {
            op,
            version,
            wildcard,
        })
    }

    /// Whether `candidate` satisfies this clause.
    pub fn contains(&self, candidate: &Version) -> bool {
        let spec = &self.version;
        match self.op {
            Operator::Equal if self.wildcard => prefix_match(spec, candidate),
            Operator::NotEqual if self.wildcard => !prefix_match(spec, candidate),
            Operator::Equal => equal_ignoring_local(spec, candidate),
            Operator::NotEqual => !equal_ignoring_local(spec, candidate),
            Operator::GreaterEqual => candidate.without_local() >= *spec,
            Operator::LessEqual => candidate.without_local() <= *spec,
            Operator::Less => {
                let public = candidate.without_local();
                public < *spec
                    && (spec.is_prerelease()
                        || !public.is_prerelease()
                        || !same_release(&public, spec))
            }
            Operator::Greater => {
                let public = candidate.without_local();
                public > *spec
                    && (spec.is_postrelease()
                        || !public.is_postrelease()
                        || !same_release(&public, spec))
                    && !(candidate.has_local() && public == *spec)
            }
            Operator::Compatible => {
                let release = spec.release();
                let prefix = Version::from_release(&release[..release.len() - 1]);
                candidate.without_local() >= *spec && prefix_match(&prefix, candidate)
            }
            Operator::Arbitrary => candidate.to_string().eq_ignore_ascii_case(&spec.to_string()),
        }
    }

    /// Whether this clause explicitly opts into pre-releases (`>=1.0b1`).
    pub fn mentions_prerelease(&self) -> bool {
        self.op != Operator::NotEqual && self.version.is_prerelease()
    }
}

impl FromStr for Specifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

fn equal_ignoring_local(spec: &Version, candidate: &Version) -> bool {
    if spec.has_local() {
        spec == candidate
    } else {
        *spec == candidate.without_local()
    }
}

/// Same epoch and release (zero padded), ignoring pre/post/dev/local.
fn same_release(a: &Version, b: &Version) -> bool {
    a.epoch() == b.epoch()
        && padded_eq(a.release(), b.release(), a.release().len().max(b.release().len()))
}

/// `==1.2.*` matching: the candidate's release starts with the specifier's release.
fn prefix_match(spec: &Version, candidate: &Version) -> bool {
    spec.epoch() == candidate.epoch()
        && padded_eq(spec.release(), candidate.release(), spec.release().len())
}

fn padded_eq(a: &[u64], b: &[u64], len: usize) -> bool {
    (0..len).all(|i| a.get(i).copied().unwrap_or(0) == b.get(i).copied().unwrap_or(0))
}

/// An intersection of specifier clauses. The empty set accepts every version.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Constraint {
    clauses: BTreeSet<Specifier>,
}

impl Constraint {
    /// The unconstrained set.
    pub fn any() -> Self {
        Self::default()
    }

    /// Parse a comma separated clause list. Blank input is [`Constraint::any`].
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut clauses = BTreeSet::new();
        for clause in spec.split(',') {
            if clause.trim().is_empty() {
                if spec.trim().is_empty() {
                    continue;
                }
                return Err(format!("empty clause in `{}`", spec.trim()));
            }
            clauses.insert(Specifier::parse(clause)?);
        }
        Ok(Self { clauses })
    }

    /// `==version`.
    pub fn exactly(version: Version) -> Self {
        Self {
            clauses: BTreeSet::from([Specifier::exact(version)]),
        }
    }

    pub fn is_any(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Specifier> {
        self.clauses.iter()
    }

    /// Both constraints at once.
    #[must_use]
    pub fn intersect(&self, other: &Constraint) -> Constraint {
        let mut clauses = self.clauses.clone();
        clauses.extend(other.clauses.iter().cloned());
        Constraint { clauses }
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.clauses.iter().all(|c| c.contains(version))
    }

    /// Pre-releases are admitted when any clause names one explicitly.
    pub fn allows_prereleases(&self) -> bool {
        self.clauses.iter().any(Specifier::mentions_prerelease)
    }
}

impl FromStr for Constraint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(", "))
    }
}
