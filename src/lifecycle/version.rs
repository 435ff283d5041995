//! Semantic Versions
//!
//! Ordering for entity version strings. Accepts an optional leading `v` and the
//! `1` / `1.2` shorthands; build metadata is ignored. Strings that do not parse
//! sort below every valid version and compare equal to each other.

use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;

lazy_static! {
    static ref SEMVER_REGEX: Regex = Regex::new(
        r"^v?(0|[1-9]\d*)(?:\.(0|[1-9]\d*))?(?:\.(0|[1-9]\d*))?(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$"
    )
    .expect("semver regex is valid");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Identifier {
    Numeric(u64),
    Alpha(String),
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            (Identifier::Numeric(_), Identifier::Alpha(_)) => Ordering::Less,
            (Identifier::Alpha(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::Alpha(a), Identifier::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pre: Vec<Identifier>,
}

impl SemVer {
    pub fn parse(input: &str) -> Option<Self> {
        let caps = SEMVER_REGEX.captures(input.trim())?;
        let minor = caps.get(2);
        let patch = caps.get(3);
        let shorthand = minor.is_none() || patch.is_none();
        // Shorthands may not carry a pre-release or build suffix.
        if shorthand && (caps.get(4).is_some() || caps.get(5).is_some()) {
            return None;
        }
        if minor.is_none() && patch.is_some() {
            return None;
        }

        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = match minor {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let patch = match patch {
            Some(p) => p.as_str().parse().ok()?,
            None => 0,
        };

        let mut pre = Vec::new();
        if let Some(pre_release) = caps.get(4) {
            for ident in pre_release.as_str().split('.') {
                if ident.bytes().all(|b| b.is_ascii_digit()) {
                    if ident.len() > 1 && ident.starts_with('0') {
                        return None;
                    }
                    pre.push(Identifier::Numeric(ident.parse().ok()?));
                } else {
                    pre.push(Identifier::Alpha(ident.to_string()));
                }
            }
        }

        Some(Self { major, minor, patch, pre })
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A pre-release sorts below the release it precedes.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compares two version strings by semantic-version precedence.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (SemVer::parse(a), SemVer::parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_not_lexicographic() {
        assert_eq!(compare("1.10.0", "1.2.0"), Ordering::Greater);
        assert_eq!(compare("v1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare("2.0.0", "10.0.0"), Ordering::Less);
    }

    #[test]
    fn test_shorthand_and_prefix() {
        assert_eq!(compare("v1", "1.0.0"), Ordering::Equal);
        assert_eq!(compare("1.2", "1.2.0"), Ordering::Equal);
        assert!(SemVer::parse("1.2-rc.1").is_none());
    }

    #[test]
    fn test_prerelease_precedence() {
        assert_eq!(compare("1.0.0-alpha", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1.0.0-alpha.1", "1.0.0-alpha"), Ordering::Greater);
        assert_eq!(compare("1.0.0-alpha.2", "1.0.0-alpha.10"), Ordering::Less);
        assert_eq!(compare("1.0.0-2", "1.0.0-beta"), Ordering::Less);
        assert_eq!(compare("1.0.0+build.5", "1.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_invalid_sorts_lowest() {
        assert!(SemVer::parse("01.0.0").is_none());
        assert!(SemVer::parse("latest").is_none());
        assert_eq!(compare("latest", "0.0.1"), Ordering::Less);
        assert_eq!(compare("latest", "nightly"), Ordering::Equal);
    }
}
