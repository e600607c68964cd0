//! Query pipeline and host callbacks.
//!
//! [`GridState`] holds every descriptor the host changes between renders.
//! [`Pipeline::run`] derives a [`GridView`] from the current records and
//! state: filter, sort, window, layout. The filter and sort stages keep the
//! last result and reuse it while their input collection (by pointer) and
//! descriptor are unchanged.

use crate::column::ColumnSet;
use crate::config::GridConfig;
use crate::filter::{filter, DateRange, FilterDescriptor};
use crate::layout::{layout_window, Layout, RowPlacement};
use crate::loader::{BatchFetcher, FetchOutcome, LoadMoreCoordinator, LoadTrigger};
use crate::mutation::{self, EditKey, EditOutcome, EditTarget, EditingSession};
use crate::record::{AppendReport, FieldKind, Patch, Record, RecordStore, Records};
use crate::sort::{sort, SortDescriptor};
use crate::window::{window, PageInfo, ViewportWindow};

use chrono::NaiveDate;
use std::sync::Arc;

/// Host-owned grid state.
#[derive(Debug, Clone)]
pub struct GridState {
    pub sort: Option<SortDescriptor>,
    pub filter: FilterDescriptor,
    pub viewport: ViewportWindow,
    pub row_height: u32,
    pub editing: EditingSession,
    pub loader: LoadMoreCoordinator,
    page_size: usize,
    viewport_height: u32,
    overscan: usize,
    inline_edit: bool,
    date_field: Option<String>,
}

impl GridState {
    /// Initial state from configuration.
    pub fn new(config: &GridConfig) -> Self {
        let filter = FilterDescriptor::new().search_in(config.query.searchable_fields.clone());
        Self {
            sort: None,
            filter,
            viewport: config.initial_viewport(),
            row_height: config.window.row_height.max(1),
            editing: EditingSession::new(),
            loader: LoadMoreCoordinator::new(false),
            page_size: config.window.page_size,
            viewport_height: config.window.viewport_height,
            overscan: config.window.overscan,
            inline_edit: config.editing.inline_edit,
            date_field: config.query.date_filter_field.clone(),
        }
    }

    /// Mark whether the data source can deliver more batches.
    pub fn with_more_available(mut self, has_more: bool) -> Self {
        self.loader.set_has_more(has_more);
        self
    }

    fn reset_page(&mut self) {
        if matches!(self.viewport, ViewportWindow::Paged { .. }) {
            self.viewport = ViewportWindow::paged(1, self.page_size);
        }
    }

    /// Header click on `key`. Returns `false` when the column cannot sort.
    pub fn on_sort<R>(&mut self, columns: &ColumnSet<R>, key: &str) -> bool {
        if !columns.is_sortable(key) {
            tracing::warn!(key, "sort ignored, column is not sortable");
            return false;
        }
        let next = SortDescriptor::toggle(self.sort.as_ref(), key);
        tracing::debug!(key, direction = ?next.direction, "sort changed");
        self.sort = Some(next);
        true
    }

    /// Drop the active sort.
    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    /// Replace the allowed values for `field`; empty clears the constraint.
    /// Returns `false` when the column cannot filter.
    pub fn on_filter_change<R, I, S>(&mut self, columns: &ColumnSet<R>, field: &str, values: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !columns.is_filterable(field) {
            tracing::warn!(field, "filter ignored, column is not filterable");
            return false;
        }
        self.filter.set_allowed(field, values);
        self.reset_page();
        true
    }

    /// Set the date range on the configured date field. Both bounds `None`
    /// clears it.
    pub fn on_date_range(&mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) {
        let Some(field) = &self.date_field else {
            tracing::warn!("date range ignored, no date filter field configured");
            return;
        };
        self.filter.date_range = if start.is_none() && end.is_none() {
            None
        } else {
            Some(DateRange {
                field: field.clone(),
                start,
                end,
            })
        };
        self.reset_page();
    }

    /// Set the search term.
    pub fn on_search(&mut self, term: impl Into<String>) {
        let term = term.into();
        self.filter.search = (!term.is_empty()).then_some(term);
        self.reset_page();
    }

    /// Go to `page`. Out-of-range pages are clamped when the window is cut.
    pub fn on_page_change(&mut self, page: usize) {
        self.viewport = ViewportWindow::paged(page, self.page_size);
    }

    /// Change the page size and return to the first page.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.viewport = ViewportWindow::paged(1, self.page_size);
    }

    /// Scroll container moved to `scroll_top`.
    pub fn on_scroll(&mut self, scroll_top: u32) {
        self.viewport = ViewportWindow::from_scroll_offset(
            scroll_top,
            self.viewport_height,
            self.row_height,
            self.overscan,
        );
    }

    /// Scroll so that row `index` is the first visible row.
    pub fn scroll_to_index(&mut self, index: usize) {
        self.viewport = ViewportWindow::scrolled(index, self.visible_rows(), self.overscan);
    }

    /// Resize the scroll container. A scrolled viewport keeps its first row.
    pub fn set_viewport_height(&mut self, height: u32) {
        self.viewport_height = height;
        if let ViewportWindow::Scrolled {
            first_visible_index,
            ..
        } = self.viewport
        {
            self.scroll_to_index(first_visible_index);
        }
    }

    /// Rows that fit in the scroll container.
    pub fn visible_rows(&self) -> usize {
        (self.viewport_height.div_ceil(self.row_height.max(1))) as usize
    }

    /// The loading placeholder is on screen: ask for the next batch.
    pub fn on_load_more<R, F>(
        &mut self,
        view: &GridView<R>,
        fetcher: &mut F,
    ) -> Option<LoadTrigger>
    where
        F: BatchFetcher + ?Sized,
    {
        self.loader.on_layout(&view.layout, view.source_count, fetcher)
    }

    /// A fetched batch arrived.
    pub fn on_batch_loaded<R: Record>(
        &mut self,
        store: &mut RecordStore<R>,
        batch: Vec<R>,
        has_more: bool,
    ) -> AppendReport {
        let report = store.append_batch(batch);
        self.loader.complete(FetchOutcome::Loaded { has_more });
        report
    }

    /// The source sent a fresh copy of the whole collection.
    ///
    /// The store is replaced outright. An open edit on a record that is no
    /// longer present is dropped. An outstanding load-more fetch stays in
    /// flight; its batch is deduplicated on arrival.
    pub fn on_reload<R: Record>(&mut self, store: &mut RecordStore<R>, records: Vec<R>, has_more: bool) {
        store.replace(records.into());
        if let Some(target) = self.editing.target() {
            if store.get(&target.record_id).is_none() {
                tracing::debug!(id = %target.record_id, "edited record gone after reload");
                self.editing.cancel();
            }
        }
        self.loader.set_has_more(has_more);
        tracing::debug!(len = store.len(), has_more, "collection reloaded");
    }

    /// The outstanding fetch failed.
    pub fn on_fetch_failed(&mut self) {
        self.loader.complete(FetchOutcome::Failed);
    }

    /// Merge `patch` into record `id`.
    pub fn on_record_update<R: Record>(&mut self, store: &mut RecordStore<R>, id: &str, patch: &Patch) {
        let next = mutation::update(&store.records(), id, patch);
        store.replace(next);
    }

    /// Delete record `id`. An open edit on that record is dropped.
    pub fn on_record_delete<R: Record>(&mut self, store: &mut RecordStore<R>, id: &str) {
        if self.editing.target().is_some_and(|t| t.record_id == id) {
            self.editing.cancel();
        }
        let next = mutation::delete(&store.records(), id);
        store.replace(next);
    }

    /// Open the inline editor on one cell, seeded with its current text.
    ///
    /// Returns `false` when inline editing is off, the column is computed,
    /// or the record does not exist.
    pub fn begin_edit<R: Record>(
        &mut self,
        store: &RecordStore<R>,
        columns: &ColumnSet<R>,
        id: &str,
        field: &str,
    ) -> bool {
        if !self.inline_edit || columns.get(field).is_none() || columns.is_synthetic(field) {
            return false;
        }
        let Some(record) = store.get(id) else {
            return false;
        };
        let initial = record.field(field).map(|v| v.to_string()).unwrap_or_default();
        if let Some(EditTarget { record_id, field }) = self.editing.begin(id, field, initial) {
            tracing::debug!(%record_id, %field, "open edit replaced");
        }
        true
    }

    /// Route an editor key. A commit is written to the store.
    pub fn on_edit_key<R: Record>(
        &mut self,
        store: &mut RecordStore<R>,
        columns: &ColumnSet<R>,
        key: EditKey,
    ) -> EditOutcome<R> {
        let kind = self
            .editing
            .target()
            .and_then(|t| columns.kind_of(&t.field))
            .unwrap_or(FieldKind::Text);
        let outcome = self.editing.handle_key(key, &store.records(), kind);
        if let EditOutcome::Committed(next) = &outcome {
            store.replace(Arc::clone(next));
        }
        outcome
    }
}

/// One render's worth of derived data.
#[derive(Debug, Clone, PartialEq)]
pub struct GridView<R> {
    /// Positioned rows, loading placeholder included
    pub layout: Layout<R>,
    /// Size of the derived (filtered and sorted) collection
    pub total_count: usize,
    /// Records that passed the filter
    pub filtered_count: usize,
    /// Records loaded before filtering
    pub source_count: usize,
    pub range_start: usize,
    pub range_end: usize,
    /// Page geometry when paged
    pub page_info: Option<PageInfo>,
}

impl<R> GridView<R> {
    pub fn rows(&self) -> &[RowPlacement<R>] {
        &self.layout.rows
    }

    pub fn total_virtual_height(&self) -> u64 {
        self.layout.total_virtual_height
    }

    pub fn placeholder_visible(&self) -> bool {
        self.layout.placeholder_visible()
    }
}

struct Memo<R, D> {
    input: Records<R>,
    descriptor: D,
    output: Records<R>,
}

impl<R, D: PartialEq> Memo<R, D> {
    fn hit(&self, input: &Records<R>, descriptor: &D) -> Option<Records<R>> {
        (Arc::ptr_eq(&self.input, input) && self.descriptor == *descriptor)
            .then(|| Arc::clone(&self.output))
    }
}

/// Derives views, caching the filter and sort stages.
pub struct Pipeline<R> {
    filtered: Option<Memo<R, FilterDescriptor>>,
    sorted: Option<Memo<R, Option<SortDescriptor>>>,
}

impl<R> Default for Pipeline<R> {
    fn default() -> Self {
        Self {
            filtered: None,
            sorted: None,
        }
    }
}

impl<R: Record> Pipeline<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filtered, sorted collection for `records` under `state`.
    pub fn derive(&mut self, records: &Records<R>, state: &GridState) -> (Records<R>, usize) {
        let filtered = match self.filtered.as_ref().and_then(|m| m.hit(records, &state.filter)) {
            Some(hit) => hit,
            None => {
                let output = filter(records, &state.filter);
                self.filtered = Some(Memo {
                    input: Arc::clone(records),
                    descriptor: state.filter.clone(),
                    output: Arc::clone(&output),
                });
                output
            }
        };
        let filtered_count = filtered.len();

        let sorted = match self.sorted.as_ref().and_then(|m| m.hit(&filtered, &state.sort)) {
            Some(hit) => hit,
            None => {
                let output = sort(&filtered, state.sort.as_ref());
                self.sorted = Some(Memo {
                    input: filtered,
                    descriptor: state.sort.clone(),
                    output: Arc::clone(&output),
                });
                output
            }
        };
        (sorted, filtered_count)
    }

    /// Run every stage and lay out the current window.
    pub fn run(&mut self, records: &Records<R>, state: &GridState) -> GridView<R> {
        let (derived, filtered_count) = self.derive(records, state);
        let win = window(&derived, &state.viewport);
        let layout = layout_window(&win, state.row_height, state.loader.has_more());

        GridView {
            total_count: win.total_count,
            filtered_count,
            source_count: records.len(),
            range_start: win.range_start(),
            range_end: win.range_end(),
            page_info: win.page,
            layout,
        }
    }

    /// Drop cached stage results.
    pub fn invalidate(&mut self) {
        self.filtered = None;
        self.sorted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::loader::FetchRequest;
    use crate::record::{FieldValue, MapRecord, Schema};

    fn config() -> GridConfig {
        let mut config = GridConfig::default();
        config.window.page_size = 2;
        config.window.row_height = 10;
        config.query.searchable_fields = vec!["name".into()];
        config.query.date_filter_field = Some("start".into());
        config
    }

    fn columns() -> ColumnSet<MapRecord> {
        ColumnSet::new(
            vec![
                Column::new("name", "Name").sortable(true),
                Column::new("status", "Status").filterable(true),
                Column::synthetic("actions", "", |_: &MapRecord, _| "...".into()),
            ],
            Schema::new()
                .field("name", crate::record::FieldKind::Text)
                .field("status", crate::record::FieldKind::Enum)
                .field("start", crate::record::FieldKind::Date),
        )
        .unwrap()
    }

    fn store() -> RecordStore<MapRecord> {
        RecordStore::new(vec![
            MapRecord::new("1")
                .with("name", "Cleo")
                .with("status", FieldValue::enumeration("Open"))
                .with("start", FieldValue::date("2024-01-01")),
            MapRecord::new("2")
                .with("name", "Amy")
                .with("status", FieldValue::enumeration("Done"))
                .with("start", FieldValue::date("2024-03-01")),
            MapRecord::new("3")
                .with("name", "Bea")
                .with("status", FieldValue::enumeration("Open"))
                .with("start", FieldValue::date("2024-02-01")),
        ])
    }

    fn names(view: &GridView<MapRecord>) -> Vec<String> {
        view.rows()
            .iter()
            .filter_map(|r| r.record())
            .map(|r| r.field("name").map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_run_paged() {
        let store = store();
        let state = GridState::new(&config());
        let view = Pipeline::new().run(&store.records(), &state);

        assert_eq!(names(&view), vec!["Cleo", "Amy"]);
        assert_eq!(view.total_count, 3);
        assert_eq!(view.source_count, 3);
        assert_eq!(view.total_virtual_height(), 30);
        assert_eq!(view.page_info.map(|p| p.page_count), Some(2));
    }

    #[test]
    fn test_sort_toggle_and_ignored_columns() {
        let columns = columns();
        let mut state = GridState::new(&config());

        assert!(state.on_sort(&columns, "name"));
        let view = Pipeline::new().run(&store().records(), &state);
        assert_eq!(names(&view), vec!["Amy", "Bea"]);

        assert!(state.on_sort(&columns, "name"));
        let view = Pipeline::new().run(&store().records(), &state);
        assert_eq!(names(&view), vec!["Cleo", "Bea"]);

        assert!(!state.on_sort(&columns, "status"));
        assert!(!state.on_sort(&columns, "actions"));
        assert!(!state.on_sort(&columns, "missing"));
        assert_eq!(state.sort, Some(SortDescriptor::descending("name")));
    }

    #[test]
    fn test_filter_and_search_reset_page() {
        let columns = columns();
        let mut state = GridState::new(&config());
        state.on_page_change(2);

        assert!(state.on_filter_change(&columns, "status", ["Open"]));
        assert_eq!(state.viewport, ViewportWindow::paged(1, 2));

        state.on_page_change(2);
        state.on_search("e");
        assert_eq!(state.viewport, ViewportWindow::paged(1, 2));

        let view = Pipeline::new().run(&store().records(), &state);
        assert_eq!(names(&view), vec!["Cleo", "Bea"]);
        assert_eq!(view.filtered_count, 2);

        assert!(!state.on_filter_change(&columns, "name", ["Amy"]));
    }

    #[test]
    fn test_date_range_callback() {
        let mut state = GridState::new(&config());
        state.on_date_range(NaiveDate::from_ymd_opt(2024, 1, 15), None);
        let view = Pipeline::new().run(&store().records(), &state);
        assert_eq!(names(&view), vec!["Amy", "Bea"]);

        state.on_date_range(None, None);
        assert!(state.filter.date_range.is_none());
    }

    #[test]
    fn test_memo_reuses_until_input_changes() {
        let mut store = store();
        let mut state = GridState::new(&config());
        state.on_search("a");
        let mut pipeline = Pipeline::new();

        let (first, _) = pipeline.derive(&store.records(), &state);
        let (second, _) = pipeline.derive(&store.records(), &state);
        assert!(Arc::ptr_eq(&first, &second));

        state.on_record_delete(&mut store, "2");
        let (third, _) = pipeline.derive(&store.records(), &state);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_scroll_callbacks() {
        let mut config = config();
        config.window.mode = crate::config::WindowMode::Scrolled;
        config.window.viewport_height = 20;
        config.window.overscan = 0;
        let mut state = GridState::new(&config);

        state.on_scroll(10);
        assert_eq!(state.viewport, ViewportWindow::scrolled(1, 2, 0));
        let view = Pipeline::new().run(&store().records(), &state);
        assert_eq!((view.range_start, view.range_end), (1, 3));
        assert_eq!(view.rows()[0].top_offset, 10);
        assert!(view.page_info.is_none());
    }

    #[test]
    fn test_load_more_flow() {
        let mut store = store();
        let mut config = config();
        config.window.page_size = 10;
        let mut state = GridState::new(&config).with_more_available(true);
        let mut pipeline = Pipeline::new();

        let mut requests = Vec::new();
        let view = pipeline.run(&store.records(), &state);
        assert!(view.placeholder_visible());
        let trigger = state.on_load_more(&view, &mut |r: FetchRequest| requests.push(r));
        assert!(matches!(trigger, Some(LoadTrigger::Requested(r)) if r.loaded == 3));
        assert_eq!(
            state.on_load_more(&view, &mut |r: FetchRequest| requests.push(r)),
            Some(LoadTrigger::AlreadyInFlight)
        );

        let report = state.on_batch_loaded(
            &mut store,
            vec![MapRecord::new("3"), MapRecord::new("4").with("name", "Dot")],
            false,
        );
        assert_eq!((report.appended, report.skipped_duplicates), (1, 1));
        assert!(!state.loader.is_in_flight());

        let view = pipeline.run(&store.records(), &state);
        assert!(!view.placeholder_visible());
        assert_eq!(view.total_count, 4);
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_reload_replaces_collection() {
        let mut store = store();
        let columns = columns();
        let mut state = GridState::new(&config());
        let mut pipeline = Pipeline::new();
        let before = pipeline.run(&store.records(), &state);
        assert_eq!(before.total_count, 3);

        state.begin_edit(&store, &columns, "3", "name");
        state.on_reload(
            &mut store,
            vec![MapRecord::new("1").with("name", "Cleo"), MapRecord::new("2").with("name", "Amy")],
            true,
        );
        assert!(!state.editing.is_editing());
        assert!(state.loader.has_more());
        assert_eq!(store.revision(), 1);

        let after = pipeline.run(&store.records(), &state);
        assert_eq!(after.total_count, 2);
        assert_eq!(names(&after), vec!["Cleo", "Amy"]);
    }

    #[test]
    fn test_inline_edit_flow() {
        let mut store = store();
        let columns = columns();
        let mut state = GridState::new(&config());

        assert!(!state.begin_edit(&store, &columns, "1", "actions"));
        assert!(!state.begin_edit(&store, &columns, "9", "name"));
        assert!(state.begin_edit(&store, &columns, "1", "name"));
        assert_eq!(state.editing.draft(), "Cleo");

        *state.editing.draft_mut() = "Clio".into();
        let outcome = state.on_edit_key(&mut store, &columns, EditKey::Enter);
        assert!(matches!(outcome, EditOutcome::Committed(_)));
        assert_eq!(store.get("1").and_then(|r| r.field("name")), Some(FieldValue::text("Clio")));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_inline_edit_disabled() {
        let mut config = config();
        config.editing.inline_edit = false;
        let mut state = GridState::new(&config);
        assert!(!state.begin_edit(&store(), &columns(), "1", "name"));
    }

    #[test]
    fn test_update_and_delete_callbacks() {
        let mut store = store();
        let mut state = GridState::new(&config());
        let before = store.records();

        state.on_record_update(&mut store, "2", &Patch::new().set("status", FieldValue::enumeration("Open")));
        assert_eq!(before[1].field("status"), Some(FieldValue::enumeration("Done")));
        assert_eq!(store.get("2").and_then(|r| r.field("status")), Some(FieldValue::enumeration("Open")));

        state.begin_edit(&store, &columns(), "2", "name");
        state.on_record_delete(&mut store, "2");
        assert!(!state.editing.is_editing());
        assert_eq!(store.len(), 2);

        state.on_record_delete(&mut store, "missing");
        assert_eq!(store.revision(), 2);
    }
}
