//! Filter engine.
//!
//! A [`FilterDescriptor`] is a conjunction of independent predicates. Any
//! predicate left unset passes every record through. A record missing a field
//! that an active predicate needs is excluded.

use crate::record::{FieldValue, Record, Records};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Inclusive calendar-date range over one date field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Date field the range applies to
    pub field: String,
    /// Earliest accepted date; `None` is unbounded
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// Latest accepted date; `None` is unbounded
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Create an unbounded range over `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            start: None,
            end: None,
        }
    }

    /// Set the lower bound.
    pub fn from(mut self, start: NaiveDate) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the upper bound.
    pub fn until(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    /// Whether neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    /// Free-text search term
    #[serde(default)]
    pub search: Option<String>,
    /// Fields the search term is matched against
    #[serde(default)]
    pub search_fields: Vec<String>,
    /// Allowed values per field (OR within a field, AND across fields)
    #[serde(default)]
    pub allowed: BTreeMap<String, BTreeSet<String>>,
    /// Optional date range
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

impl FilterDescriptor {
    /// Create a pass-through filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search term.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Set the fields searched by the search term.
    pub fn search_in<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict `field` to the given values.
    pub fn allow<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_allowed(field, values);
        self
    }

    /// Set the date range.
    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Replace the allowed-value set for `field`. An empty set removes the
    /// constraint.
    pub fn set_allowed<I, S>(&mut self, field: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let field = field.into();
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.allowed.remove(&field);
        } else {
            self.allowed.insert(field, values);
        }
    }

    /// The active search term, if non-empty.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.is_empty())
    }

    /// The active date range, if bounded.
    pub fn active_date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref().filter(|r| !r.is_unbounded())
    }

    /// Whether every record passes.
    pub fn is_pass_through(&self) -> bool {
        self.search_term().is_none()
            && self.allowed.values().all(BTreeSet::is_empty)
            && self.active_date_range().is_none()
    }

    /// Test a single record.
    pub fn matches<R: Record>(&self, record: &R) -> bool {
        self.matches_search(record) && self.matches_allowed(record) && self.matches_dates(record)
    }

    fn matches_search<R: Record>(&self, record: &R) -> bool {
        let Some(term) = self.search_term() else {
            return true;
        };
        let needle = term.to_lowercase();
        self.search_fields.iter().any(|key| {
            record
                .field(key)
                .is_some_and(|v| v.contains_lowercase(&needle))
        })
    }

    fn matches_allowed<R: Record>(&self, record: &R) -> bool {
        self.allowed.iter().all(|(key, values)| {
            if values.is_empty() {
                return true;
            }
            match record.field(key) {
                Some(FieldValue::Tags(tags)) => tags.iter().any(|t| values.contains(t)),
                Some(value) => values.contains(&value.to_string()),
                None => false,
            }
        })
    }

    fn matches_dates<R: Record>(&self, record: &R) -> bool {
        let Some(range) = self.active_date_range() else {
            return true;
        };
        match record.field(&range.field).and_then(|v| v.timestamp()) {
            Some(ts) => range.contains(ts.date()),
            None => false,
        }
    }
}

/// Apply `config` to `records`.
///
/// Relative order is preserved. A pass-through descriptor hands back the
/// input collection itself.
pub fn filter<R: Record>(records: &Records<R>, config: &FilterDescriptor) -> Records<R> {
    if config.is_pass_through() {
        return Arc::clone(records);
    }
    if config.search_term().is_some() && config.search_fields.is_empty() {
        tracing::warn!("search term set but no searchable fields are configured");
    }

    let kept: Vec<R> = records
        .iter()
        .filter(|r| config.matches(*r))
        .cloned()
        .collect();

    tracing::trace!(input = records.len(), output = kept.len(), "filtered records");
    kept.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MapRecord;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn records() -> Records<MapRecord> {
        vec![
            MapRecord::new("1")
                .with("name", "Bob")
                .with("status", FieldValue::enumeration("Done"))
                .with("start", FieldValue::date("2024-01-10")),
            MapRecord::new("2")
                .with("name", "Amy")
                .with("status", FieldValue::enumeration("Open"))
                .with("start", FieldValue::date("2024-02-01T08:00:00Z")),
            MapRecord::new("3")
                .with("name", "Samuel")
                .with("start", FieldValue::date("garbage")),
        ]
        .into()
    }

    fn ids(records: &Records<MapRecord>) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_pass_through_returns_same_collection() {
        let input = records();
        let out = filter(&input, &FilterDescriptor::new().search(""));
        assert!(Arc::ptr_eq(&input, &out));
    }

    #[test]
    fn test_search_case_insensitive() {
        let f = FilterDescriptor::new().search("AM").search_in(["name"]);
        assert_eq!(ids(&filter(&records(), &f)), vec!["2", "3"]);
    }

    #[test]
    fn test_search_without_fields_matches_nothing() {
        let f = FilterDescriptor::new().search("a");
        assert!(filter(&records(), &f).is_empty());
    }

    #[test]
    fn test_allowed_values_missing_field_fails_closed() {
        let f = FilterDescriptor::new().allow("status", ["Done", "Open"]);
        assert_eq!(ids(&filter(&records(), &f)), vec!["1", "2"]);
    }

    #[test]
    fn test_empty_allowed_set_is_no_constraint() {
        let mut f = FilterDescriptor::new().allow("status", ["Done"]);
        f.set_allowed("status", Vec::<String>::new());
        assert!(f.is_pass_through());
    }

    #[test]
    fn test_allowed_tags_any_match() {
        let input: Records<MapRecord> = vec![
            MapRecord::new("a").with("tags", FieldValue::tags(["ui", "bug"])),
            MapRecord::new("b").with("tags", FieldValue::tags(["docs"])),
        ]
        .into();
        let f = FilterDescriptor::new().allow("tags", ["bug"]);
        assert_eq!(ids(&filter(&input, &f)), vec!["a"]);
    }

    #[test]
    fn test_date_range_inclusive_and_unparsable_excluded() {
        let f = FilterDescriptor::new()
            .date_range(DateRange::new("start").from(date("2024-01-10")).until(date("2024-02-01")));
        assert_eq!(ids(&filter(&records(), &f)), vec!["1", "2"]);

        let f = FilterDescriptor::new().date_range(DateRange::new("start").from(date("2024-01-11")));
        assert_eq!(ids(&filter(&records(), &f)), vec!["2"]);
    }

    #[test]
    fn test_unbounded_date_range_passes() {
        let f = FilterDescriptor::new().date_range(DateRange::new("start"));
        assert!(f.is_pass_through());
    }

    #[test]
    fn test_predicates_are_anded() {
        let f = FilterDescriptor::new()
            .search("a")
            .search_in(["name"])
            .allow("status", ["Open"]);
        assert_eq!(ids(&filter(&records(), &f)), vec!["2"]);
    }
}
