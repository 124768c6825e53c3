//! Shared types for sanctions screening
//!
//! The persisted document is a map of list identifier to `SanctionList`.
//! A list's entries are either a plain ordered name sequence or a
//! name-keyed map carrying known dates of birth.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Full persisted state: list identifier -> list, iterated in sorted order
pub type SanctionsDocument = BTreeMap<String, SanctionList>;

/// Kind of a sanctions list, fixed per list identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Plain,
    DobAware,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Plain => "plain",
            ListKind::DobAware => "dob_aware",
        }
    }
}

/// Per-name record of a date-of-birth-aware list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DobRecord {
    /// Known dates of birth as epoch seconds
    #[serde(default)]
    pub dob_epoch: BTreeSet<i64>,
}

impl DobRecord {
    pub fn new(epochs: impl IntoIterator<Item = i64>) -> Self {
        Self { dob_epoch: epochs.into_iter().collect() }
    }
}

/// Entries of a list. A JSON array loads as `Plain`, a JSON object as `DobAware`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListEntries {
    Plain(Vec<String>),
    DobAware(BTreeMap<String, DobRecord>),
}

impl ListEntries {
    pub fn kind(&self) -> ListKind {
        match self {
            ListEntries::Plain(_) => ListKind::Plain,
            ListEntries::DobAware(_) => ListKind::DobAware,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ListEntries::Plain(names) => names.len(),
            ListEntries::DobAware(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One named watch list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionList {
    /// Epoch seconds of the last content change of this list
    pub updated: i64,
    pub entries: ListEntries,
}

impl SanctionList {
    pub fn plain<I, S>(updated: i64, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { updated, entries: ListEntries::Plain(names.into_iter().map(Into::into).collect()) }
    }

    pub fn dob_aware<I, S>(updated: i64, records: I) -> Self
    where
        I: IntoIterator<Item = (S, DobRecord)>,
        S: Into<String>,
    {
        Self {
            updated,
            entries: ListEntries::DobAware(
                records.into_iter().map(|(name, record)| (name.into(), record)).collect(),
            ),
        }
    }

    pub fn kind(&self) -> ListKind {
        self.entries.kind()
    }
}

/// Outcome of screening one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Date check outcome, only for date-of-birth-aware lists with a resolvable date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob_matched: Option<bool>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self::default()
    }

    pub fn hit(list: &str, name: &str, dob_matched: Option<bool>) -> Self {
        Self {
            matched: true,
            list: Some(list.to_string()),
            name: Some(name.to_string()),
            dob_matched,
        }
    }
}

/// Accepted text layouts for a date of birth, tried in order.
/// The year must be written with four digits.
const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y%m%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
];

/// A caller-supplied date of birth
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateOfBirth {
    Date(NaiveDate),
    /// Already resolved epoch seconds
    Epoch(i64),
    Text(String),
}

impl DateOfBirth {
    /// Resolve to epoch seconds (midnight UTC for calendar dates).
    /// Returns None when the text form cannot be parsed.
    pub fn to_epoch(&self) -> Option<i64> {
        match self {
            DateOfBirth::Date(date) => Some(midnight_epoch(*date)),
            DateOfBirth::Epoch(epoch) => Some(*epoch),
            DateOfBirth::Text(text) => {
                let parsed = parse_date_text(text.trim());
                if parsed.is_none() {
                    debug!(dob = %text, "dob_unparsable");
                }
                parsed.map(midnight_epoch)
            }
        }
    }
}

impl From<NaiveDate> for DateOfBirth {
    fn from(date: NaiveDate) -> Self {
        DateOfBirth::Date(date)
    }
}

impl From<i64> for DateOfBirth {
    fn from(epoch: i64) -> Self {
        DateOfBirth::Epoch(epoch)
    }
}

impl From<&str> for DateOfBirth {
    fn from(text: &str) -> Self {
        DateOfBirth::Text(text.to_string())
    }
}

impl From<String> for DateOfBirth {
    fn from(text: String) -> Self {
        DateOfBirth::Text(text)
    }
}

fn midnight_epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::default()).and_utc().timestamp()
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| {
            NaiveDate::parse_from_str(text, fmt).ok().filter(|date| has_full_year(text, date))
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

/// chrono's `%Y` also takes 1-3 digit years; "03/04/05" must not become year 3
fn has_full_year(text: &str, date: &NaiveDate) -> bool {
    text.contains(&format!("{:04}", date.year()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_shape_selects_kind() {
        let json = r#"{
            "ofac": {"updated": 10, "entries": ["Jon Snow"]},
            "uk": {"updated": 20, "entries": {"Jane Doe": {"dob_epoch": [123456]}}}
        }"#;
        let doc: SanctionsDocument = serde_json::from_str(json).unwrap();

        assert_eq!(doc["ofac"].kind(), ListKind::Plain);
        assert_eq!(doc["uk"].kind(), ListKind::DobAware);
        match &doc["uk"].entries {
            ListEntries::DobAware(records) => {
                assert!(records["Jane Doe"].dob_epoch.contains(&123456));
            }
            other => panic!("unexpected entries: {other:?}"),
        }
    }

    #[test]
    fn test_match_result_omits_absent_fields() {
        let json = serde_json::to_string(&MatchResult::no_match()).unwrap();
        assert_eq!(json, r#"{"matched":false}"#);

        let hit = MatchResult::hit("L1", "Jon Snow", None);
        let value: serde_json::Value = serde_json::to_value(&hit).unwrap();
        assert_eq!(value["list"], "L1");
        assert_eq!(value["name"], "Jon Snow");
        assert!(value.get("dob_matched").is_none());
    }

    #[test]
    fn test_dob_resolves_common_layouts() {
        let expected = midnight_epoch(NaiveDate::from_ymd_opt(1980, 3, 14).unwrap());
        let layouts = [
            "1980-03-14",
            "1980/03/14",
            "14/03/1980",
            "14.03.1980",
            "19800314",
            "14 March 1980",
            "14 Mar 1980",
            "March 14, 1980",
        ];
        for text in layouts {
            assert_eq!(DateOfBirth::from(text).to_epoch(), Some(expected), "layout {text}");
        }
        assert_eq!(DateOfBirth::from("1980-03-14T08:30:00Z").to_epoch(), Some(expected));
    }

    #[test]
    fn test_dob_unparsable_is_none() {
        assert_eq!(DateOfBirth::from("not a date").to_epoch(), None);
        assert_eq!(DateOfBirth::from("").to_epoch(), None);
        assert_eq!(DateOfBirth::from("1980-13-45").to_epoch(), None);
    }

    #[test]
    fn test_dob_short_year_is_unparsable() {
        for text in ["03/04/05", "14.03.80", "5-03-14", "14 Mar 80"] {
            assert_eq!(DateOfBirth::from(text).to_epoch(), None, "input {text}");
        }
        let year_five = NaiveDate::from_ymd_opt(5, 4, 3).unwrap();
        assert_eq!(DateOfBirth::from("03/04/0005").to_epoch(), Some(midnight_epoch(year_five)));
    }

    #[test]
    fn test_dob_epoch_passthrough() {
        assert_eq!(DateOfBirth::Epoch(999).to_epoch(), Some(999));
        let date = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(DateOfBirth::from(date).to_epoch(), Some(86_400));
    }
}
