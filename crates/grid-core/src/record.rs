//! Record model and the record store.
//!
//! Records are handed to the engine as shared, immutable slices
//! ([`Records`]). Every stage that "changes" the collection builds a new
//! slice instead, so downstream caches can compare inputs by pointer.

use crate::error::GridResult;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Shared, immutable record collection.
pub type Records<R> = Arc<[R]>;

/// Semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Enum,
    Date,
    Number,
    Tags,
}

/// A single field value read off a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free text
    Text(String),
    /// One value out of a closed set
    Enum(String),
    /// ISO-8601 date or date-time, kept raw and parsed on demand
    Date(String),
    /// Numeric value
    Number(f64),
    /// Tag list
    Tags(Vec<String>),
}

impl FieldValue {
    /// Create a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create an enum value.
    pub fn enumeration(s: impl Into<String>) -> Self {
        Self::Enum(s.into())
    }

    /// Create a date value.
    pub fn date(s: impl Into<String>) -> Self {
        Self::Date(s.into())
    }

    /// Create a number value.
    pub fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Create a tag list value.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Tags(tags.into_iter().map(Into::into).collect())
    }

    /// The semantic kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text(_) => FieldKind::Text,
            Self::Enum(_) => FieldKind::Enum,
            Self::Date(_) => FieldKind::Date,
            Self::Number(_) => FieldKind::Number,
            Self::Tags(_) => FieldKind::Tags,
        }
    }

    /// Borrow the string payload of text-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Enum(s) | Self::Date(s) => Some(s),
            _ => None,
        }
    }

    /// Case-insensitive substring match. `needle` must already be lowercase.
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        match self {
            Self::Text(s) | Self::Enum(s) | Self::Date(s) => s.to_lowercase().contains(needle),
            Self::Tags(tags) => tags.iter().any(|t| t.to_lowercase().contains(needle)),
            Self::Number(_) => self.to_string().contains(needle),
        }
    }

    /// Parsed timestamp for date values. `None` for other kinds or bad input.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(raw) => parse_timestamp(raw),
            _ => None,
        }
    }
}

/// Parse an ISO-8601 date or date-time.
///
/// Accepts RFC 3339 (`2024-01-15T09:30:00Z`), naive date-times and plain
/// dates (`2024-01-15`, read as midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Enum(s) | Self::Date(s) => write!(f, "{}", s),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Self::Tags(tags) => write!(f, "{}", tags.join(", ")),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(tags: Vec<String>) -> Self {
        Self::Tags(tags)
    }
}

/// Declared field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: String,
    pub kind: FieldKind,
}

/// The set of fields a record type exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            key: key.into(),
            kind,
        });
        self
    }

    /// Kind of the named field, if declared.
    pub fn kind_of(&self, key: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.key == key).map(|f| f.kind)
    }

    /// Whether the named field is declared.
    pub fn contains(&self, key: &str) -> bool {
        self.kind_of(key).is_some()
    }

    /// All declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// A shallow set of field changes.
///
/// `None` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    changes: BTreeMap<String, Option<FieldValue>>,
}

impl Patch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.changes.insert(key.into(), Some(value.into()));
        self
    }

    /// Clear an optional field.
    pub fn clear(mut self, key: impl Into<String>) -> Self {
        self.changes.insert(key.into(), None);
        self
    }

    /// Look up a change.
    pub fn get(&self, key: &str) -> Option<&Option<FieldValue>> {
        self.changes.get(key)
    }

    /// Iterate over changes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&FieldValue>)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// An application record the grid can query.
pub trait Record: Clone {
    /// Stable unique identifier.
    fn id(&self) -> &str;

    /// Read a field. `None` means the field is missing or unset.
    fn field(&self, key: &str) -> Option<FieldValue>;

    /// Merge `patch` into this record. Unspecified fields stay as they are;
    /// changes the record type cannot hold are ignored.
    fn apply_patch(&mut self, patch: &Patch);
}

/// A schemaless record backed by a field map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapRecord {
    pub id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl MapRecord {
    /// Create an empty record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Build a record from a flat JSON object.
    ///
    /// Declared fields are coerced to their schema kind; undeclared fields are
    /// inferred (strings as text, numbers as numbers, string arrays as tags).
    /// Returns `None` when the object has no string `id`.
    pub fn from_json(value: &serde_json::Value, schema: &Schema) -> Option<Self> {
        let obj = value.as_object()?;
        let id = match obj.get("id")? {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let mut record = Self::new(id);
        for (key, raw) in obj {
            if key == "id" {
                continue;
            }
            let value = match schema.kind_of(key) {
                Some(kind) => coerce_json(raw, kind),
                None => infer_json(raw),
            };
            if let Some(value) = value {
                record.fields.insert(key.clone(), value);
            }
        }
        Some(record)
    }
}

impl MapRecord {
    /// Parse a JSON array of flat objects. Entries without an id are skipped.
    pub fn batch_from_json(text: &str, schema: &Schema) -> GridResult<Vec<Self>> {
        let values: Vec<serde_json::Value> = serde_json::from_str(text)?;
        let total = values.len();
        let records: Vec<Self> = values
            .iter()
            .filter_map(|v| Self::from_json(v, schema))
            .collect();
        if records.len() < total {
            tracing::debug!(skipped = total - records.len(), "json rows without an id");
        }
        Ok(records)
    }
}

fn coerce_json(raw: &serde_json::Value, kind: FieldKind) -> Option<FieldValue> {
    use serde_json::Value;
    match (kind, raw) {
        (_, Value::Null) => None,
        (FieldKind::Text, Value::String(s)) => Some(FieldValue::Text(s.clone())),
        (FieldKind::Enum, Value::String(s)) => Some(FieldValue::Enum(s.clone())),
        (FieldKind::Date, Value::String(s)) => Some(FieldValue::Date(s.clone())),
        (FieldKind::Number, Value::Number(n)) => n.as_f64().map(FieldValue::Number),
        (FieldKind::Tags, Value::Array(items)) => Some(FieldValue::Tags(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )),
        (FieldKind::Text, other) => Some(FieldValue::Text(other.to_string())),
        (FieldKind::Date, other) => Some(FieldValue::Date(other.to_string())),
        _ => None,
    }
}

fn infer_json(raw: &serde_json::Value) -> Option<FieldValue> {
    use serde_json::Value;
    match raw {
        Value::Null => None,
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
        Value::Array(_) => coerce_json(raw, FieldKind::Tags),
        Value::Object(_) => Some(FieldValue::Text(raw.to_string())),
    }
}

impl Record for MapRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).cloned()
    }

    fn apply_patch(&mut self, patch: &Patch) {
        for (key, value) in patch.iter() {
            match value {
                Some(v) => {
                    self.fields.insert(key.to_string(), v.clone());
                }
                None => {
                    self.fields.remove(key);
                }
            }
        }
    }
}

/// Outcome of appending a fetched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendReport {
    /// Records added to the store
    pub appended: usize,
    /// Records dropped because their id was already present
    pub skipped_duplicates: usize,
}

/// Owner of the current record collection.
///
/// The store never edits a collection in place: every change swaps in a new
/// [`Records`] and bumps the revision.
#[derive(Debug, Clone)]
pub struct RecordStore<R> {
    records: Records<R>,
    revision: u64,
}

impl<R: Record> Default for RecordStore<R> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<R: Record> RecordStore<R> {
    /// Create a store from an initial collection.
    pub fn new(records: Vec<R>) -> Self {
        Self {
            records: records.into(),
            revision: 0,
        }
    }

    /// Current collection (shared).
    pub fn records(&self) -> Records<R> {
        Arc::clone(&self.records)
    }

    /// Number of loaded records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Revision counter, bumped on every effective change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Find a record by id.
    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Swap in a new collection. Passing the current collection back is a
    /// no-op.
    pub fn replace(&mut self, records: Records<R>) {
        if Arc::ptr_eq(&self.records, &records) {
            return;
        }
        self.records = records;
        self.revision += 1;
    }

    /// Append a fetched batch, dropping records whose id is already loaded
    /// (including repeats inside the batch itself).
    pub fn append_batch(&mut self, batch: Vec<R>) -> AppendReport {
        let mut report = AppendReport::default();
        if batch.is_empty() {
            return report;
        }

        let mut next: Vec<R> = Vec::with_capacity(self.records.len() + batch.len());
        next.extend(self.records.iter().cloned());
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.id().to_string()).collect();

        for record in batch {
            if seen.insert(record.id().to_string()) {
                next.push(record);
                report.appended += 1;
            } else {
                report.skipped_duplicates += 1;
            }
        }

        if report.skipped_duplicates > 0 {
            tracing::debug!(
                skipped = report.skipped_duplicates,
                "dropped records with ids already present in the store"
            );
        }

        if report.appended > 0 {
            self.records = next.into();
            self.revision += 1;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_from_json() {
        let schema = Schema::new().field("due", FieldKind::Date);
        let records = MapRecord::batch_from_json(
            r#"[{"id": "a", "due": "2024-01-01", "n": 3}, {"name": "no id"}]"#,
            &schema,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("due"), Some(FieldValue::date("2024-01-01")));
        assert_eq!(records[0].field("n"), Some(FieldValue::number(3.0)));

        let err = MapRecord::batch_from_json("{", &schema).unwrap_err();
        assert!(matches!(err, crate::GridError::Json(_)));
    }

    #[test]
    fn test_field_display() {
        assert_eq!(FieldValue::text("hello").to_string(), "hello");
        assert_eq!(FieldValue::number(42.0).to_string(), "42");
        assert_eq!(FieldValue::number(2.5).to_string(), "2.5");
        assert_eq!(FieldValue::tags(["a", "b"]).to_string(), "a, b");
    }

    #[test]
    fn test_contains_lowercase() {
        assert!(FieldValue::text("Amy Pond").contains_lowercase("amy"));
        assert!(!FieldValue::text("Bob").contains_lowercase("amy"));
        assert!(FieldValue::tags(["Backend", "API"]).contains_lowercase("api"));
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2024-01-15").is_some());
        assert!(parse_timestamp("2024-01-15T09:30:00Z").is_some());
        assert!(parse_timestamp("2024-01-15T09:30:00").is_some());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("2024-13-45").is_none());

        let day = parse_timestamp("2024-01-15").unwrap();
        let later = parse_timestamp("2024-01-15T00:00:01Z").unwrap();
        assert!(day < later);
    }

    #[test]
    fn test_patch_merge_preserves_other_fields() {
        let mut record = MapRecord::new("1")
            .with("name", "Bob")
            .with("status", FieldValue::enumeration("Done"));
        record.apply_patch(&Patch::new().set("status", FieldValue::enumeration("Closed")));

        assert_eq!(record.field("name"), Some(FieldValue::text("Bob")));
        assert_eq!(record.field("status"), Some(FieldValue::enumeration("Closed")));
    }

    #[test]
    fn test_patch_clear() {
        let mut record = MapRecord::new("1").with("progress", 50.0);
        record.apply_patch(&Patch::new().clear("progress"));
        assert_eq!(record.field("progress"), None);
    }

    #[test]
    fn test_map_record_from_json() {
        let schema = Schema::new()
            .field("status", FieldKind::Enum)
            .field("due", FieldKind::Date);
        let json = serde_json::json!({
            "id": 7,
            "name": "Ship it",
            "status": "Open",
            "due": "2024-03-01",
            "score": 3.5,
            "labels": ["x", "y"],
            "owner": null
        });

        let record = MapRecord::from_json(&json, &schema).unwrap();
        assert_eq!(record.id(), "7");
        assert_eq!(record.field("status"), Some(FieldValue::enumeration("Open")));
        assert_eq!(record.field("due"), Some(FieldValue::date("2024-03-01")));
        assert_eq!(record.field("score"), Some(FieldValue::number(3.5)));
        assert_eq!(record.field("labels"), Some(FieldValue::tags(["x", "y"])));
        assert_eq!(record.field("owner"), None);
    }

    #[test]
    fn test_map_record_requires_id() {
        let json = serde_json::json!({ "name": "orphan" });
        assert!(MapRecord::from_json(&json, &Schema::new()).is_none());
    }

    #[test]
    fn test_store_append_skips_duplicate_ids() {
        let mut store = RecordStore::new(vec![MapRecord::new("1"), MapRecord::new("2")]);
        let report = store.append_batch(vec![
            MapRecord::new("2"),
            MapRecord::new("3"),
            MapRecord::new("3"),
        ]);

        assert_eq!(report.appended, 1);
        assert_eq!(report.skipped_duplicates, 2);
        assert_eq!(store.len(), 3);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_store_append_all_duplicates_keeps_collection() {
        let mut store = RecordStore::new(vec![MapRecord::new("1")]);
        let before = store.records();
        store.append_batch(vec![MapRecord::new("1")]);
        assert!(Arc::ptr_eq(&before, &store.records()));
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_store_replace_same_collection_is_noop() {
        let mut store = RecordStore::new(vec![MapRecord::new("1")]);
        store.replace(store.records());
        assert_eq!(store.revision(), 0);

        store.replace(Arc::from(Vec::<MapRecord>::new()));
        assert_eq!(store.revision(), 1);
        assert!(store.is_empty());
    }
}
