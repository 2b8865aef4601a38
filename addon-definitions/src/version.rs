//! Semver-ish version normalization, descending ordering, and range
//! satisfaction (spec.md §4.5, §8).
//!
//! Accepts `vX.Y.Z`, `X.Y.Z`, `X.Y`, `X`, pre-release suffixes
//! (`-alpha.N`, `-beta.N`, `-rc.N`, or any dot-separated identifier list)
//! and build metadata (`+N`). Non-semver strings normalize to `None` and are
//! silently dropped from sorted lists rather than erroring -- see
//! `sort_descending`.

use regex::Regex;
use semver::{Identifier, Version};

/// Strip a leading `v`/`V`, split off build metadata and pre-release, pad
/// the numeric core to three segments, and build a `semver::Version`.
///
/// Returns `None` if the input isn't semver-ish at all (non-numeric core
/// segments, empty core, more than three numeric segments).
pub fn normalize(raw: &str) -> Option<Version> {
    let s = raw.trim();
    let s = s.strip_prefix('v').or_else(|| s.strip_prefix('V')).unwrap_or(s);
    if s.is_empty() {
        return None;
    }

    // split off build metadata first (everything after the first '+')
    let (rest, build_raw) = match s.find('+') {
        Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
        None => (s, None),
    };
    // then pre-release (everything after the first '-')
    let (core, pre_raw) = match rest.find('-') {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };

    let segments: Vec<&str> = core.split('.').collect();
    if segments.is_empty() || segments.len() > 3 {
        return None;
    }
    let digits_re = Regex::new(r"^[0-9]+$").unwrap();
    let mut nums = Vec::with_capacity(3);
    for seg in &segments {
        if seg.is_empty() || !digits_re.is_match(seg) {
            return None;
        }
        nums.push(seg.parse::<u64>().ok()?);
    }
    while nums.len() < 3 {
        nums.push(0);
    }

    let pre = match pre_raw {
        Some(p) if !p.is_empty() => parse_identifiers(p)?,
        Some(_) => return None, // trailing bare '-' with nothing after it
        None => Vec::new(),
    };
    let build = match build_raw {
        Some(b) if !b.is_empty() => parse_identifiers(b)?,
        Some(_) => return None,
        None => Vec::new(),
    };

    Some(Version { major: nums[0], minor: nums[1], patch: nums[2], pre, build })
}

fn parse_identifiers(raw: &str) -> Option<Vec<Identifier>> {
    let int_re = Regex::new(r"^[0-9]+$").unwrap();
    let ident_re = Regex::new(r"^[0-9A-Za-z-]+$").unwrap();
    let mut out = Vec::new();
    for part in raw.split('.') {
        if part.is_empty() || !ident_re.is_match(part) {
            return None;
        }
        if int_re.is_match(part) {
            out.push(Identifier::Numeric(part.parse().ok()?));
        } else {
            out.push(Identifier::AlphaNumeric(part.to_string()));
        }
    }
    Some(out)
}

/// Two versions are "equal" for range purposes when their precedence
/// triple and pre-release identifiers match; build metadata never
/// participates in equality or ordering, per the semver spec.
fn version_eq(a: &Version, b: &Version) -> bool {
    a.major == b.major && a.minor == b.minor && a.patch == b.patch && a.pre == b.pre
}

/// Sort semver-ish strings in descending precedence order, dropping any
/// entry that doesn't parse. The output is the *normalized* string form,
/// not verbatim input (spec.md §8: `["v1.0.0","1.1","2"] -> ["2.0.0","1.1.0","1.0.0"]`).
pub fn sort_descending<S: AsRef<str>>(versions: &[S]) -> Vec<String> {
    let mut parsed: Vec<Version> = versions.iter().filter_map(|v| normalize(v.as_ref())).collect();
    parsed.sort_by(|a, b| b.cmp(a));
    parsed.into_iter().map(|v| v.to_string()).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

struct Comparator {
    op: Op,
    version: Version,
}

/// A parsed dependency range: a conjunction (AND) of comparators,
/// `>=1.2.3, <2.0.0` style. An empty range always matches (spec.md §4.5,
/// §4.6 case 1).
pub struct Range {
    comparators: Vec<Comparator>,
}

impl Range {
    pub fn parse(raw: &str) -> Option<Range> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Some(Range { comparators: Vec::new() });
        }
        let mut comparators = Vec::new();
        for clause in raw.split(',') {
            let clause = clause.trim();
            if clause.is_empty() {
                return None;
            }
            let (op, rest) = if let Some(r) = clause.strip_prefix(">=") {
                (Op::Gte, r)
            } else if let Some(r) = clause.strip_prefix("<=") {
                (Op::Lte, r)
            } else if let Some(r) = clause.strip_prefix('>') {
                (Op::Gt, r)
            } else if let Some(r) = clause.strip_prefix('<') {
                (Op::Lt, r)
            } else if let Some(r) = clause.strip_prefix('=') {
                (Op::Eq, r)
            } else {
                (Op::Eq, clause)
            };
            let version = normalize(rest.trim())?;
            comparators.push(Comparator { op, version });
        }
        Some(Range { comparators })
    }

    pub fn is_empty(&self) -> bool {
        self.comparators.is_empty()
    }

    /// Whether `candidate` satisfies every comparator in this range, with
    /// the pre-release carve-out from spec.md §4.5: a pre-release
    /// candidate only ever satisfies a range that has at least one
    /// comparator naming a pre-release of the exact same `M.m.p`.
    pub fn satisfies(&self, candidate: &Version) -> bool {
        if self.comparators.is_empty() {
            return true;
        }
        if !candidate.pre.is_empty() {
            let allowed = self.comparators.iter().any(|c| {
                !c.version.pre.is_empty()
                    && c.version.major == candidate.major
                    && c.version.minor == candidate.minor
                    && c.version.patch == candidate.patch
            });
            if !allowed {
                return false;
            }
        }
        self.comparators.iter().all(|c| match c.op {
            Op::Gt => candidate > &c.version,
            Op::Gte => candidate > &c.version || version_eq(candidate, &c.version),
            Op::Lt => candidate < &c.version,
            Op::Lte => candidate < &c.version || version_eq(candidate, &c.version),
            Op::Eq => version_eq(candidate, &c.version),
        })
    }
}

/// Convenience entry point used by the resolver and the platform check:
/// parse both sides and evaluate satisfaction. Returns `false` (rather
/// than erroring) on unparseable input, matching the "non-semver strings
/// are discarded, not an error" policy used for sorting.
pub fn satisfies(actual: &str, require: &str) -> bool {
    let (Some(v), Some(r)) = (normalize(actual), Range::parse(require)) else { return false };
    r.satisfies(&v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_descending_and_drops_invalid() {
        let out = sort_descending(&["1.2.3", "1.2.3-rc.1", "1.0.0+1", "1.0.0-alpha"]);
        assert_eq!(out, vec!["1.2.3", "1.2.3-rc.1", "1.0.0+1", "1.0.0-alpha"]);

        let out = sort_descending(&["v1.0.0", "1.1", "2"]);
        assert_eq!(out, vec!["2.0.0", "1.1.0", "1.0.0"]);

        let out = sort_descending(&["2.0.0", "1a", "b", "1,2", "1.0.0"]);
        assert_eq!(out, vec!["2.0.0", "1.0.0"]);
    }

    #[test]
    fn range_satisfaction_examples() {
        assert!(satisfies("v1.2.1", "<=v1.2.1"));
        assert!(satisfies("1.3.0-beta.1", ">=v1.3.0-alpha.1"));
        assert!(!satisfies("1.5.0-rc.2", ">=1.5.0"));
    }

    #[test]
    fn empty_range_matches_anything() {
        assert!(satisfies("9.9.9", ""));
    }

    #[test]
    fn conjunction_requires_all_clauses() {
        assert!(satisfies("1.3.0", ">=1.2.3, <2.0.0"));
        assert!(!satisfies("2.0.0", ">=1.2.3, <2.0.0"));
    }
}
