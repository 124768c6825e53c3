//! Name normalization and token-order matching
//!
//! A query (first, last) becomes one or two variants: first-then-last and,
//! when both tokens are present, last-then-first. A variant matches a stored
//! name when its head token occurs in the normalized stored name and its tail
//! token occurs anywhere after that. Lists are scanned in identifier order and
//! names in stored order; the first hit wins.

use crate::domain::types::{
    DateOfBirth, DobRecord, ListEntries, MatchResult, SanctionList, SanctionsDocument,
};
use serde::Deserialize;
use smallvec::SmallVec;
use tracing::debug;

/// How date-of-birth-aware lists decide the verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictPolicy {
    /// Any name-level match is a hit; the date check is computed but not required
    #[default]
    NameOnly,
    /// On date-of-birth-aware lists, a resolved date that is not on record skips the entry
    RequireDob,
}

impl VerdictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictPolicy::NameOnly => "name_only",
            VerdictPolicy::RequireDob => "require_dob",
        }
    }
}

/// A screening query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameQuery {
    pub first: String,
    pub last: String,
    pub dob: Option<DateOfBirth>,
}

impl NameQuery {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self { first: first.into(), last: last.into(), dob: None }
    }

    pub fn with_dob(mut self, dob: impl Into<DateOfBirth>) -> Self {
        self.dob = Some(dob.into());
        self
    }
}

/// One token-order pattern: `head`, then anything, then `tail`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    head: String,
    tail: String,
}

impl Variant {
    /// True if `head` occurs in `candidate` and `tail` occurs after it.
    /// Both inputs are expected to be normalized.
    pub fn matches(&self, candidate: &str) -> bool {
        match candidate.find(self.head.as_str()) {
            // Leftmost head leaves the most room for the tail
            Some(pos) => candidate[pos + self.head.len()..].contains(self.tail.as_str()),
            None => false,
        }
    }
}

/// Uppercase, then keep alphabetic characters only
pub fn normalize(name: &str) -> String {
    name.chars().flat_map(char::to_uppercase).filter(|c| c.is_alphabetic()).collect()
}

/// Build the query variants for a first/last pair
pub fn variants(first: &str, last: &str) -> SmallVec<[Variant; 2]> {
    let first = normalize(first);
    let last = normalize(last);
    let mut out = SmallVec::new();

    if first.is_empty() && last.is_empty() {
        return out;
    }
    let reversed = (!first.is_empty() && !last.is_empty())
        .then(|| Variant { head: last.clone(), tail: first.clone() });
    out.push(Variant { head: first, tail: last });
    out.extend(reversed);
    out
}

/// Scan the document for the first entry matching `query`
pub fn check(doc: &SanctionsDocument, query: &NameQuery, policy: VerdictPolicy) -> MatchResult {
    let variants = variants(&query.first, &query.last);
    if variants.is_empty() {
        debug!("match_query_empty");
        return MatchResult::no_match();
    }
    let dob_epoch = query.dob.as_ref().and_then(DateOfBirth::to_epoch);

    for (list_id, list) in doc {
        if let Some(result) = scan_list(list_id, list, &variants, dob_epoch, policy) {
            return result;
        }
    }
    MatchResult::no_match()
}

/// Boolean form of `check`
pub fn is_sanctioned(doc: &SanctionsDocument, query: &NameQuery, policy: VerdictPolicy) -> bool {
    check(doc, query, policy).matched
}

fn scan_list(
    list_id: &str,
    list: &SanctionList,
    variants: &[Variant],
    dob_epoch: Option<i64>,
    policy: VerdictPolicy,
) -> Option<MatchResult> {
    match &list.entries {
        ListEntries::Plain(names) => names
            .iter()
            .find(|name| name_matches(name, variants))
            .map(|name| MatchResult::hit(list_id, name, None)),
        ListEntries::DobAware(records) => {
            for (name, record) in records {
                if !name_matches(name, variants) {
                    continue;
                }
                let dob_matched = dob_epoch.map(|epoch| record_has_dob(record, epoch));
                debug!(list = %list_id, name = %name, dob_matched = ?dob_matched, "match_dob_check");

                if policy == VerdictPolicy::RequireDob && dob_matched == Some(false) {
                    continue;
                }
                return Some(MatchResult::hit(list_id, name, dob_matched));
            }
            None
        }
    }
}

fn name_matches(stored: &str, variants: &[Variant]) -> bool {
    let normalized = normalize(stored);
    // Names with no letters never match
    !normalized.is_empty() && variants.iter().any(|v| v.matches(&normalized))
}

fn record_has_dob(record: &DobRecord, epoch: i64) -> bool {
    record.dob_epoch.contains(&epoch)
}
