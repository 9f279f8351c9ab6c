//! Version ranges as they appear in package manifests.
//!
//! Registry manifests use the npm range dialect (`^1.2.0`, `~1.2`, `1.x`,
//! `>=1.0.0 <2.0.0`, `1.0.0 - 2.0.0`, `a || b`), which differs from the Cargo
//! dialect the `semver` crate parses: a bare `1.2.3` means *exactly* that
//! version, comparators are separated by whitespace rather than commas, and
//! `||` joins alternatives. [`Range`] rewrites each alternative into a
//! `semver::VersionReq` and matches a version if any alternative does.

use std::fmt;

use semver::{Version, VersionReq};

use crate::error::Error;

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '~', '^'];

/// A parsed version range. Displays as the text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl Range {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let alternatives = raw
            .split("||")
            .map(|set| parse_comparator_set(set.trim()))
            .collect::<Result<Vec<_>, String>>()
            .map_err(|reason| Error::InvalidRange {
                range: raw.to_string(),
                reason,
            })?;

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// Check whether `version` falls inside any alternative of this range.
    pub fn satisfies(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Same as [`Range::satisfies`] for a version string; unparseable versions never match.
    pub fn satisfies_str(&self, version: &str) -> bool {
        parse_version(version).is_some_and(|v| self.satisfies(&v))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Return the highest of `versions` satisfying `range`, by semver precedence.
///
/// Version strings that do not parse as semver are skipped rather than
/// failing the whole selection; the registry occasionally carries such junk.
pub fn max_satisfying<'a, I>(versions: I, range: &Range) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|raw| parse_version(raw).map(|v| (v, raw)))
        .filter(|(v, _)| range.satisfies(v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw)
}

/// Parse a published version, tolerating a leading `v`.
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

fn parse_comparator_set(set: &str) -> Result<VersionReq, String> {
    if is_any(set) {
        return Ok(VersionReq::STAR);
    }

    if let Some((low, high)) = set.split_once(" - ") {
        let translated = format!(
            ">={}, <={}",
            strip_v(low.trim()),
            strip_v(high.trim())
        );
        return VersionReq::parse(&translated).map_err(|e| e.to_string());
    }

    let comparators = split_comparators(set)
        .iter()
        .map(|c| translate_comparator(c))
        .collect::<Vec<_>>();

    VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())
}

/// Empty, `latest`, or wildcards in every position (`*`, `x.x.x`, `*.*`).
fn is_any(set: &str) -> bool {
    set.is_empty()
        || set.eq_ignore_ascii_case("latest")
        || set.split('.').all(|part| matches!(part, "*" | "x" | "X"))
}

/// Split on whitespace, re-attaching operators written apart from their
/// version (`>= 1.2.0`).
fn split_comparators(set: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in set.split_whitespace() {
        if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            pending_op.push_str(token);
            continue;
        }
        out.push(format!("{}{}", pending_op, token));
        pending_op.clear();
    }

    if !pending_op.is_empty() {
        out.push(pending_op);
    }
    out
}

fn translate_comparator(comparator: &str) -> String {
    let split_at = comparator
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(comparator.len());
    let (op, version) = comparator.split_at(split_at);
    let version = strip_v(version);

    if !op.is_empty() {
        return format!("{}{}", op, version);
    }

    // A bare version pins exactly; a bare partial one ("1.2") is an x-range,
    // which `=` expresses in the Cargo dialect. Wildcards already parse bare.
    if version.contains(['x', 'X', '*']) {
        version.to_string()
    } else {
        format!("={}", version)
    }
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}
