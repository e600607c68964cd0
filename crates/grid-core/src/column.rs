//! Column descriptors.

use crate::error::{GridError, GridResult};
use crate::record::{FieldKind, Record, Schema};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Host-supplied cell renderer: `(record, row_index) -> display text`.
pub type RenderFn<R> = Arc<dyn Fn(&R, usize) -> String + Send + Sync>;

/// Column width specification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnWidth {
    /// Fixed width in pixels (or cells, for terminal hosts)
    Fixed(u16),
    /// Percentage of available width
    Percentage(f32),
    /// Flexible width with relative weight
    Flex(u16),
}

impl Default for ColumnWidth {
    fn default() -> Self {
        Self::Flex(1)
    }
}

/// Column definition.
pub struct Column<R> {
    /// Field key this column reads
    pub key: String,
    /// Header text
    pub header: String,
    /// Width specification
    pub width: ColumnWidth,
    /// Whether clicking the header sorts by this column
    pub sortable: bool,
    /// Whether this column takes part in field filters
    pub filterable: bool,
    /// Pinned to the leading edge when scrolling horizontally
    pub sticky: bool,
    /// Custom renderer; `None` stringifies the raw field value
    pub render: Option<RenderFn<R>>,
}

impl<R> Clone for Column<R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            header: self.header.clone(),
            width: self.width,
            sortable: self.sortable,
            filterable: self.filterable,
            sticky: self.sticky,
            render: self.render.clone(),
        }
    }
}

impl<R> fmt::Debug for Column<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("key", &self.key)
            .field("header", &self.header)
            .field("width", &self.width)
            .field("sortable", &self.sortable)
            .field("filterable", &self.filterable)
            .field("sticky", &self.sticky)
            .field("render", &self.render.is_some())
            .finish()
    }
}

impl<R> Column<R> {
    /// Create a column backed by a record field.
    pub fn new(key: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
            width: ColumnWidth::default(),
            sortable: false,
            filterable: false,
            sticky: false,
            render: None,
        }
    }

    /// Create a computed column. Synthetic columns are never sorted or
    /// filtered.
    pub fn synthetic(
        key: impl Into<String>,
        header: impl Into<String>,
        render: impl Fn(&R, usize) -> String + Send + Sync + 'static,
    ) -> Self {
        Self::new(key, header).render(render)
    }

    /// Set the column width.
    pub fn width(mut self, width: ColumnWidth) -> Self {
        self.width = width;
        self
    }

    /// Set whether the column is sortable.
    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    /// Set whether the column is filterable.
    pub fn filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    /// Set whether the column is sticky.
    pub fn sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    /// Set a custom renderer.
    pub fn render(mut self, f: impl Fn(&R, usize) -> String + Send + Sync + 'static) -> Self {
        self.render = Some(Arc::new(f));
        self
    }
}

impl<R: Record> Column<R> {
    /// Display text for one cell: the custom renderer if present, otherwise
    /// the raw field value. Missing fields render empty.
    pub fn display(&self, record: &R, row_index: usize) -> String {
        match &self.render {
            Some(render) => render(record, row_index),
            None => record
                .field(&self.key)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }
}

/// A validated, ordered set of columns.
pub struct ColumnSet<R> {
    columns: Vec<Column<R>>,
    schema: Schema,
}

impl<R> Clone for ColumnSet<R> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            schema: self.schema.clone(),
        }
    }
}

impl<R> fmt::Debug for ColumnSet<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSet")
            .field("columns", &self.columns)
            .field("schema", &self.schema)
            .finish()
    }
}

impl<R> ColumnSet<R> {
    /// Register columns against a record schema.
    ///
    /// Fails when a key is registered twice, or when a key matches no schema
    /// field and the column carries no render function. Synthetic columns
    /// that were flagged sortable or filterable have both flags cleared.
    pub fn new(columns: Vec<Column<R>>, schema: Schema) -> GridResult<Self> {
        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(columns.len());

        for mut col in columns {
            if !seen.insert(col.key.clone()) {
                return Err(GridError::DuplicateColumnKey(col.key));
            }
            if !schema.contains(&col.key) {
                if col.render.is_none() {
                    tracing::warn!(key = %col.key, "column has no matching field and no renderer");
                    return Err(GridError::UnknownColumnKey(col.key));
                }
                if col.sortable || col.filterable {
                    tracing::warn!(key = %col.key, "synthetic column cannot sort or filter");
                    col.sortable = false;
                    col.filterable = false;
                }
            }
            validated.push(col);
        }

        Ok(Self {
            columns: validated,
            schema,
        })
    }

    /// Columns in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Column<R>> {
        self.columns.iter()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no columns are registered.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look up a column by key.
    pub fn get(&self, key: &str) -> Option<&Column<R>> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// The record schema the columns were validated against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Kind of the field behind `key`.
    pub fn kind_of(&self, key: &str) -> Option<FieldKind> {
        self.schema.kind_of(key)
    }

    /// Whether `key` names a sortable column.
    pub fn is_sortable(&self, key: &str) -> bool {
        self.get(key).is_some_and(|c| c.sortable)
    }

    /// Whether `key` names a filterable column.
    pub fn is_filterable(&self, key: &str) -> bool {
        self.get(key).is_some_and(|c| c.filterable)
    }

    /// Whether `key` is a computed column with no backing field.
    pub fn is_synthetic(&self, key: &str) -> bool {
        self.get(key).is_some() && !self.schema.contains(key)
    }

    /// Resolve column widths for `total_width`, leaving one unit between
    /// columns as a separator.
    pub fn resolve_widths(&self, total_width: u16) -> Vec<u16> {
        let col_count = self.columns.len();
        if col_count == 0 {
            return vec![];
        }

        let separators = col_count.saturating_sub(1);
        let available = (total_width as usize).saturating_sub(separators);

        let mut widths = vec![0u16; col_count];
        let mut remaining = available;
        let mut total_flex: u32 = 0;

        for (i, col) in self.columns.iter().enumerate() {
            match col.width {
                ColumnWidth::Fixed(w) => {
                    let w = w.min(remaining.min(u16::MAX as usize) as u16);
                    widths[i] = w;
                    remaining = remaining.saturating_sub(w as usize);
                }
                ColumnWidth::Percentage(p) => {
                    let w = ((available as f32 * p / 100.0) as usize).min(remaining) as u16;
                    widths[i] = w;
                    remaining = remaining.saturating_sub(w as usize);
                }
                ColumnWidth::Flex(f) => total_flex += f as u32,
            }
        }

        if total_flex > 0 {
            for (i, col) in self.columns.iter().enumerate() {
                if let ColumnWidth::Flex(f) = col.width {
                    widths[i] = (remaining as u64 * f as u64 / total_flex as u64) as u16;
                }
            }
        }

        widths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldValue, MapRecord};

    fn schema() -> Schema {
        Schema::new()
            .field("name", FieldKind::Text)
            .field("status", FieldKind::Enum)
    }

    #[test]
    fn test_column_builder() {
        let col: Column<MapRecord> = Column::new("name", "Name")
            .width(ColumnWidth::Fixed(20))
            .sortable(true)
            .sticky(true);

        assert_eq!(col.header, "Name");
        assert_eq!(col.width, ColumnWidth::Fixed(20));
        assert!(col.sortable);
        assert!(!col.filterable);
        assert!(col.sticky);
    }

    #[test]
    fn test_unknown_column_fails_at_registration() {
        let result = ColumnSet::new(
            vec![Column::<MapRecord>::new("nope", "Nope")],
            schema(),
        );
        assert!(matches!(result, Err(GridError::UnknownColumnKey(k)) if k == "nope"));
    }

    #[test]
    fn test_duplicate_column_fails() {
        let result = ColumnSet::new(
            vec![
                Column::<MapRecord>::new("name", "Name"),
                Column::new("name", "Again"),
            ],
            schema(),
        );
        assert!(matches!(result, Err(GridError::DuplicateColumnKey(_))));
    }

    #[test]
    fn test_synthetic_column_loses_query_flags() {
        let set = ColumnSet::new(
            vec![Column::<MapRecord>::synthetic("actions", "Actions", |_, _| "...".into())
                .sortable(true)
                .filterable(true)],
            schema(),
        )
        .unwrap();

        assert!(set.is_synthetic("actions"));
        assert!(!set.is_sortable("actions"));
        assert!(!set.is_filterable("actions"));
    }

    #[test]
    fn test_display_default_and_custom() {
        let record = MapRecord::new("1").with("name", "Bob");
        let plain: Column<MapRecord> = Column::new("name", "Name");
        let custom: Column<MapRecord> = Column::new("name", "Name")
            .render(|r: &MapRecord, i: usize| format!("{}#{}", r.field("name").unwrap(), i));
        let missing: Column<MapRecord> = Column::new("status", "Status");

        assert_eq!(plain.display(&record, 3), "Bob");
        assert_eq!(custom.display(&record, 3), "Bob#3");
        assert_eq!(missing.display(&record, 0), "");
        assert_eq!(record.field("status"), None::<FieldValue>);
    }

    #[test]
    fn test_resolve_widths() {
        let set = ColumnSet::new(
            vec![
                Column::<MapRecord>::new("name", "Name").width(ColumnWidth::Fixed(10)),
                Column::new("status", "Status").width(ColumnWidth::Flex(1)),
            ],
            schema(),
        )
        .unwrap();

        assert_eq!(set.resolve_widths(31), vec![10, 20]);
        assert_eq!(set.resolve_widths(5), vec![4, 0]);
    }
}
