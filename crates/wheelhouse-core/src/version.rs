//! PEP 440 version parsing and ordering.
//!
//! A version is `[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`. Parsing is
//! lenient in the same places pip is: case-insensitive, optional leading `v`,
//! `-`/`_`/`.` separators, alternate spellings (`alpha`, `c`, `pre`, `rev`,
//! `r`), implicit numbers, and the `1.0-1` implicit post-release form.
//!
//! Ordering:
//! - epoch, then release with trailing zeros ignored (`1.0 == 1.0.0`)
//! - `X.devN` < `XaN` < `XbN` < `XrcN` < `X` < `X.postN`
//! - a local label sorts after the same public version

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A parsed PEP 440 version.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

/// Pre-release phase, in PEP 440 order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
enum LocalSegment {
    // Strings sort before numbers within a local label.
    Text(String),
    Numeric(u64),
}

/// Where `pre` lands in the comparison key.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd)]
enum PreKey {
    DevOfFinal,
    Pre(PreKind, u64),
    Final,
}

impl Version {
    /// Parse a version string, returning a human readable reason on failure.
    pub fn parse(version: &str) -> Result<Self, String> {
        Parser::new(version).parse()
    }

    /// Construct a plain release version such as `3.10` from its segments.
    pub fn from_release(release: &[u64]) -> Self {
        Self {
            epoch: 0,
            release: release.to_vec(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// `true` for alpha/beta/rc and developmental releases.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// The same version with any `+local` label removed.
    pub fn without_local(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Release segments with trailing zeros dropped, used for equality.
    fn trimmed_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |i| i + 1);
        &self.release[..end]
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOfFinal,
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
            (None, _, _) => PreKey::Final,
        }
    }

    fn dev_key(&self) -> (bool, u64) {
        (self.dev.is_none(), self.dev.unwrap_or(0))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.trimmed_release().cmp(other.trimmed_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.trimmed_release().hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Normalized PEP 440 form, e.g. `1.0rc1.post2.dev3+ubuntu.1`.
impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        f.write_str(&release.join("."))?;
        if let Some((kind, n)) = self.pre {
            let tag = match kind {
                PreKind::Alpha => "a",
                PreKind::Beta => "b",
                PreKind::Rc => "rc",
            };
            write!(f, "{tag}{n}")?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        if !self.local.is_empty() {
            let local: Vec<String> = self
                .local
                .iter()
                .map(|seg| match seg {
                    LocalSegment::Text(s) => s.clone(),
                    LocalSegment::Numeric(n) => n.to_string(),
                })
                .collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

struct Parser<'a> {
    input: &'a str,
    s: Vec<u8>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let lowered = input.trim().to_ascii_lowercase();
        let stripped = lowered.strip_prefix('v').unwrap_or(&lowered).to_string();
        Self {
            input,
            s: stripped.into_bytes(),
            pos: 0,
        }
    }

    fn error(&self, what: &str) -> String {
        format!("invalid version `{}`: {what}", self.input.trim())
    }

    fn parse(mut self) -> Result<Version, String> {
        if self.s.is_empty() {
            return Err(self.error("empty version"));
        }

        let (public_end, local) = match self.s.iter().position(|&b| b == b'+') {
            Some(idx) => (idx, Some(self.parse_local(idx + 1)?)),
            None => (self.s.len(), None),
        };
        self.s.truncate(public_end);

        let mut epoch = 0;
        let first = self.number();
        let release_start = if self.peek() == Some(b'!') {
            epoch = first.ok_or_else(|| self.error("epoch must be numeric"))?;
            self.pos += 1;
            self.number()
        } else {
            first
        };
        let mut release =
            vec![release_start.ok_or_else(|| self.error("expected a release number"))?];
        while self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            if let Some(n) = self.number() {
                release.push(n);
            }
        }

        let pre = self.pre_release();
        let post = self.post_release();
        let dev = self.dev_release();

        if self.pos != self.s.len() {
            let rest = String::from_utf8_lossy(&self.s[self.pos..]).to_string();
            return Err(self.error(&format!("unexpected trailing `{rest}`")));
        }

        Ok(Version {
            epoch,
            release,
            pre,
            post,
            dev,
            local: local.unwrap_or_default(),
        })
    }

    fn parse_local(&self, start: usize) -> Result<Vec<LocalSegment>, String> {
        let label = String::from_utf8_lossy(&self.s[start..]).to_string();
        let mut segments = Vec::new();
        for part in label.split(['.', '-', '_']) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(self.error("malformed local version label"));
            }
            segments.push(match part.parse::<u64>() {
                Ok(n) => LocalSegment::Numeric(n),
                Err(_) => LocalSegment::Text(part.to_string()),
            });
        }
        Ok(segments)
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.s.get(self.pos + offset).copied()
    }

    fn number(&mut self) -> Option<u64> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        std::str::from_utf8(&self.s[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
    }

    fn skip_separator(&mut self) {
        if matches!(self.peek(), Some(b'.' | b'-' | b'_')) {
            self.pos += 1;
        }
    }

    /// Consume the first keyword in `words` found at the cursor.
    fn keyword(&mut self, words: &[&str]) -> Option<usize> {
        let rest = &self.s[self.pos..];
        for (i, word) in words.iter().enumerate() {
            if rest.starts_with(word.as_bytes()) {
                self.pos += word.len();
                return Some(i);
            }
        }
        None
    }

    /// `[sep] keyword [sep] [N]`, rewinding if the keyword is absent.
    fn tagged_number(&mut self, words: &[&str]) -> Option<(usize, u64)> {
        let saved = self.pos;
        self.skip_separator();
        match self.keyword(words) {
            Some(idx) => {
                let before_sep = self.pos;
                self.skip_separator();
                let n = match self.number() {
                    Some(n) => n,
                    None => {
                        self.pos = before_sep;
                        0
                    }
                };
                Some((idx, n))
            }
            None => {
                self.pos = saved;
                None
            }
        }
    }

    fn pre_release(&mut self) -> Option<(PreKind, u64)> {
        const WORDS: [&str; 8] = ["alpha", "beta", "preview", "pre", "rc", "a", "b", "c"];
        let (idx, n) = self.tagged_number(&WORDS)?;
        let kind = match WORDS[idx] {
            "alpha" | "a" => PreKind::Alpha,
            "beta" | "b" => PreKind::Beta,
            _ => PreKind::Rc,
        };
        Some((kind, n))
    }

    fn post_release(&mut self) -> Option<u64> {
        if self.peek() == Some(b'-') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            return self.number();
        }
        self.tagged_number(&["post", "rev", "r"]).map(|(_, n)| n)
    }

    fn dev_release(&mut self) -> Option<u64> {
        self.tagged_number(&["dev"]).map(|(_, n)| n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn basic_ordering() {
        assert!(v("1.0") < v("2.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.1") < v("1.1.0"));
        assert!(v("1.9") < v("1.10"));
    }

    #[test]
    fn trailing_zeros_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("2"), v("2.0.0.0"));
    }

    #[test]
    fn phase_ordering() {
        let ordered = [
            "1.0.dev0", "1.0a1", "1.0a2.dev1", "1.0a2", "1.0b1", "1.0rc1", "1.0", "1.0.post1.dev0",
            "1.0.post1", "1.0+local", "1.1.dev0",
        ];
        // 1.0+local sorts after 1.0 but before 1.0.post1
        let mut versions: Vec<Version> = ordered.iter().map(|s| v(s)).collect();
        versions.sort();
        let sorted: Vec<String> = versions.iter().map(|x| x.to_string()).collect();
        assert_eq!(
            sorted,
            vec![
                "1.0.dev0", "1.0a1", "1.0a2.dev1", "1.0a2", "1.0b1", "1.0rc1", "1.0", "1.0+local",
                "1.0.post1.dev0", "1.0.post1", "1.1.dev0",
            ]
        );
    }

    #[test]
    fn epoch_dominates() {
        assert!(v("1!0.1") > v("2024.1"));
    }

    #[test]
    fn lenient_spellings_normalize() {
        assert_eq!(v("1.0-ALPHA.1").to_string(), "1.0a1");
        assert_eq!(v("1.0c3").to_string(), "1.0rc3");
        assert_eq!(v("v2.0-1").to_string(), "2.0.post1");
        assert_eq!(v("1.0.rev2").to_string(), "1.0.post2");
        assert_eq!(v("1.0dev").to_string(), "1.0.dev0");
        assert_eq!(v("1.0_preview2").to_string(), "1.0rc2");
    }

    #[test]
    fn local_labels() {
        let local = v("1.0+ubuntu-1");
        assert!(local.has_local());
        assert_eq!(local.to_string(), "1.0+ubuntu.1");
        assert_eq!(local.without_local(), v("1.0"));
        assert!(v("1.0+abc") < v("1.0+1"));
    }

    #[test]
    fn prerelease_flags() {
        assert!(v("1.0rc1").is_prerelease());
        assert!(v("1.0.dev3").is_prerelease());
        assert!(!v("1.0.post1").is_prerelease());
        assert!(v("1.0.post1").is_postrelease());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("abc").is_err());
        assert!(Version::parse("1.0-foo").is_err());
        assert!(Version::parse("1.0+").is_err());
    }

    #[test]
    fn hash_agrees_with_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(v("1.0"));
        assert!(set.contains(&v("1.0.0")));
    }
}
