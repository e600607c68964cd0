//! Sort engine.
//!
//! One active sort key at a time. Comparison follows the value kind:
//! collated text, parsed dates, numeric numbers. Sorting is stable and the
//! descending order is the exact reverse comparator of the ascending one.

use crate::record::{FieldValue, Record, Records};

use chrono::NaiveDateTime;
use icu_collator::options::CollatorOptions;
use icu_collator::{Collator, CollatorBorrowed};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

/// Sort direction for columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl SortDirection {
    /// Toggle the sort direction.
    pub fn toggle(&self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    /// Header arrow for this direction.
    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Ascending => "\u{2191}",
            Self::Descending => "\u{2193}",
        }
    }

    fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            Self::Ascending => ord,
            Self::Descending => ord.reverse(),
        }
    }
}

/// The active sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub key: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortDescriptor {
    /// Ascending sort on `key`.
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending sort on `key`.
    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Header-click transition: the same key flips direction, a different
    /// key starts ascending.
    pub fn toggle(current: Option<&SortDescriptor>, key: &str) -> SortDescriptor {
        match current {
            Some(cur) if cur.key == key => SortDescriptor {
                key: cur.key.clone(),
                direction: cur.direction.toggle(),
            },
            _ => SortDescriptor::ascending(key),
        }
    }
}

/// Text ordering: locale collation when collation data is available,
/// case-folded ordinal otherwise.
enum TextOrder {
    Collated(CollatorBorrowed<'static>),
    Folded,
}

static TEXT_ORDER: OnceLock<TextOrder> = OnceLock::new();

impl TextOrder {
    /// Process-wide ordering, built on first use.
    fn shared() -> &'static TextOrder {
        TEXT_ORDER.get_or_init(TextOrder::new)
    }

    fn new() -> Self {
        match Collator::try_new(Default::default(), CollatorOptions::default()) {
            Ok(collator) => Self::Collated(collator),
            Err(e) => {
                tracing::warn!(error = %e, "collation data unavailable, using case-folded order");
                Self::Folded
            }
        }
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Collated(collator) => collator.compare(a, b),
            Self::Folded => a
                .to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b)),
        }
    }
}

/// Precomputed comparison key for one record.
#[derive(Debug)]
enum SortKey {
    /// Field absent or unset
    Missing,
    Number(f64),
    /// Date field; `None` when unparsable
    Date(Option<NaiveDateTime>),
    Text(String),
}

impl SortKey {
    fn from_field(value: Option<FieldValue>) -> Self {
        match value {
            None => Self::Missing,
            Some(FieldValue::Number(n)) => Self::Number(n),
            Some(v @ FieldValue::Date(_)) => {
                let ts = v.timestamp();
                if ts.is_none() {
                    tracing::debug!(value = %v, "unparsable date sorts last");
                }
                Self::Date(ts)
            }
            Some(FieldValue::Text(s)) | Some(FieldValue::Enum(s)) => Self::Text(s),
            Some(v @ FieldValue::Tags(_)) => Self::Text(v.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Missing => 0,
            Self::Number(_) => 1,
            Self::Date(_) => 2,
            Self::Text(_) => 3,
        }
    }

    fn compare(&self, other: &Self, text: &TextOrder) -> Ordering {
        match (self, other) {
            (Self::Missing, Self::Missing) => Ordering::Equal,
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Date(a), Self::Date(b)) => match (a, b) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            (Self::Text(a), Self::Text(b)) => text.compare(a, b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Sort `records` by `config`.
///
/// `None` hands back the input unchanged. Otherwise a new collection is
/// built; the input is never touched.
pub fn sort<R: Record>(records: &Records<R>, config: Option<&SortDescriptor>) -> Records<R> {
    let Some(config) = config else {
        return Arc::clone(records);
    };

    let text = TextOrder::shared();
    let mut keyed: Vec<(usize, SortKey)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (i, SortKey::from_field(r.field(&config.key))))
        .collect();

    // slice::sort_by is stable, so equal keys keep their incoming order.
    keyed.sort_by(|(_, a), (_, b)| config.direction.apply(a.compare(b, text)));

    tracing::trace!(key = %config.key, direction = ?config.direction, len = records.len(), "sorted records");
    keyed
        .into_iter()
        .map(|(i, _)| records[i].clone())
        .collect::<Vec<_>>()
        .into()
}
