//! Application state and key handling.

use crate::data::{self, FetchMessage, TaskSource};
use chrono::{Local, NaiveDate};
use crossterm::event::{KeyCode, KeyEvent};
use grid_core::{
    default_columns, ColumnSet, ColumnWidth, EditKey, EditOutcome, FetchRequest, FieldValue, GridConfig,
    GridState, GridView, LoadTrigger, Patch, Pipeline, RecordStore, Task, TaskStats, TaskStatus,
    ViewportWindow, WindowMode,
};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
    Edit,
}

pub struct App {
    pub config: GridConfig,
    pub store: RecordStore<Task>,
    pub columns: ColumnSet<Task>,
    pub state: GridState,
    pipeline: Pipeline<Task>,
    pub view: GridView<Task>,
    /// Absolute row index in the derived collection
    pub selected: usize,
    pub selected_column: usize,
    pub input_mode: InputMode,
    pub search_buffer: String,
    /// Index into `TaskStatus::ALL`; `None` shows every status
    pub status_filter: Option<usize>,
    pub from_today: bool,
    pub message: Option<String>,
    pub show_help: bool,
    pub stats: TaskStats,
    /// A full reload is outstanding
    pub reloading: bool,
    source: Arc<TaskSource>,
    tx: mpsc::UnboundedSender<FetchMessage>,
    rx: mpsc::UnboundedReceiver<FetchMessage>,
}

impl App {
    pub fn new(mut config: GridConfig) -> anyhow::Result<Self> {
        if config.query.searchable_fields.is_empty() {
            config.query = Task::query_config();
        }
        // One terminal line per row.
        config.window.row_height = 1;

        // Pixel widths become relative weights on a terminal.
        let columns: Vec<_> = default_columns()
            .into_iter()
            .map(|col| match col.width {
                ColumnWidth::Fixed(px) => col.width(ColumnWidth::Flex((px / 10).max(1))),
                _ => col,
            })
            .collect();
        let columns = ColumnSet::new(columns, Task::schema())?;
        let source = TaskSource::new();
        let first = source.batch_at(0);
        let store = RecordStore::new(first.tasks);
        let state = GridState::new(&config).with_more_available(first.has_more);
        let mut pipeline = Pipeline::new();
        let view = pipeline.run(&store.records(), &state);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(period) = config.refresh.period() {
            tracing::info!(secs = period.as_secs(), "periodic refresh on");
            data::spawn_refresh_timer(tx.clone(), period);
        }

        let mut app = Self {
            config,
            store,
            columns,
            state,
            pipeline,
            view,
            selected: 0,
            selected_column: 0,
            input_mode: InputMode::Normal,
            search_buffer: String::new(),
            status_filter: None,
            from_today: false,
            message: None,
            show_help: false,
            stats: TaskStats::default(),
            reloading: false,
            source,
            tx,
            rx,
        };
        app.refresh();
        Ok(app)
    }

    pub fn can_quit(&self) -> bool {
        self.input_mode == InputMode::Normal
    }

    pub fn is_scrolled(&self) -> bool {
        matches!(self.state.viewport, ViewportWindow::Scrolled { .. })
    }

    /// Table body height changed.
    pub fn resize(&mut self, rows: u16) {
        let rows = u32::from(rows.max(1));
        self.state.set_viewport_height(rows);
        self.refresh();
    }

    /// Re-run the pipeline and request the next batch if the placeholder
    /// is on screen.
    pub fn refresh(&mut self) {
        self.view = self.pipeline.run(&self.store.records(), &self.state);
        self.stats = TaskStats::from_tasks(&self.store.records());
        if self.view.total_count == 0 {
            self.selected = 0;
        } else if self.selected >= self.view.total_count {
            self.selected = self.view.total_count - 1;
            self.follow_selection();
            self.view = self.pipeline.run(&self.store.records(), &self.state);
        }

        let tx = self.tx.clone();
        let source = Arc::clone(&self.source);
        let mut fetcher =
            move |request: FetchRequest| data::spawn_fetch(Arc::clone(&source), tx.clone(), request);
        if let Some(LoadTrigger::Requested(request)) = self.state.on_load_more(&self.view, &mut fetcher) {
            self.message = Some(format!("Loading more (batch {})...", request.sequence));
        }
    }

    /// Drain finished fetches.
    pub fn poll_batches(&mut self) {
        let mut changed = false;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                FetchMessage::Loaded(batch) => {
                    let report = self.state.on_batch_loaded(&mut self.store, batch.tasks, batch.has_more);
                    if report.skipped_duplicates > 0 {
                        tracing::warn!(skipped = report.skipped_duplicates, "duplicate tasks in batch");
                    }
                    self.message = Some(format!("Loaded {} tasks", report.appended));
                }
                FetchMessage::Reloaded(batch) => {
                    self.reloading = false;
                    let count = batch.tasks.len();
                    self.state.on_reload(&mut self.store, batch.tasks, batch.has_more);
                    if self.input_mode == InputMode::Edit && !self.state.editing.is_editing() {
                        self.input_mode = InputMode::Normal;
                    }
                    self.message = Some(format!("Refreshed {} tasks", count));
                }
                FetchMessage::RefreshDue => self.reload(),
                FetchMessage::Failed(reason) => {
                    tracing::warn!(%reason, "batch fetch failed");
                    self.state.on_fetch_failed();
                    self.message = Some(format!("Load failed: {}", reason));
                }
            }
            changed = true;
        }
        if changed {
            self.refresh();
        }
    }

    /// Ask the source for a fresh copy of everything loaded so far.
    pub fn reload(&mut self) {
        if self.reloading {
            return;
        }
        self.reloading = true;
        data::spawn_reload(Arc::clone(&self.source), self.tx.clone(), self.store.len());
        self.message = Some("Refreshing...".to_string());
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.view
            .rows()
            .iter()
            .find(|row| row.index == self.selected)
            .and_then(|row| row.record())
    }

    fn selected_key(&self) -> Option<String> {
        self.columns.iter().nth(self.selected_column).map(|c| c.key.clone())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.show_help {
            self.show_help = false;
            return;
        }

        match self.input_mode {
            InputMode::Normal => {
                self.message = None;
                self.handle_normal_key(key);
            }
            InputMode::Search => self.handle_search_key(key),
            InputMode::Edit => self.handle_edit_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('h') | KeyCode::Left => {
                self.selected_column = self.selected_column.saturating_sub(1);
            }
            KeyCode::Char('l') | KeyCode::Right => {
                self.selected_column = (self.selected_column + 1).min(self.columns.len().saturating_sub(1));
            }
            KeyCode::Char('g') => {
                self.selected = 0;
                self.follow_selection();
                self.refresh();
            }
            KeyCode::Char('G') => {
                self.selected = self.view.total_count.saturating_sub(1);
                self.follow_selection();
                self.refresh();
            }
            KeyCode::PageDown | KeyCode::Char('n') => self.change_page(true),
            KeyCode::PageUp | KeyCode::Char('p') => self.change_page(false),
            KeyCode::Char('s') => self.sort_selected_column(),
            KeyCode::Char('S') => {
                self.state.clear_sort();
                self.refresh();
            }
            KeyCode::Char('f') => self.cycle_status_filter(),
            KeyCode::Char('t') => self.toggle_from_today(),
            KeyCode::Char('v') => self.toggle_window_mode(),
            KeyCode::Char('r') => self.reload(),
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Search;
                self.search_buffer = self.state.filter.search.clone().unwrap_or_default();
            }
            KeyCode::Char('e') | KeyCode::Enter => self.start_edit(),
            KeyCode::Char(' ') => self.cycle_status(),
            KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Esc => self.clear_filters(),
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.input_mode = InputMode::Normal,
            KeyCode::Esc => {
                self.search_buffer.clear();
                self.apply_search();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Backspace => {
                self.search_buffer.pop();
                self.apply_search();
            }
            KeyCode::Char(c) => {
                self.search_buffer.push(c);
                self.apply_search();
            }
            _ => {}
        }
    }

    fn apply_search(&mut self) {
        self.state.on_search(self.search_buffer.clone());
        self.selected = 0;
        self.follow_selection();
        self.refresh();
    }

    fn handle_edit_key(&mut self, key: KeyEvent) {
        let edit_key = match key.code {
            KeyCode::Enter => EditKey::Enter,
            KeyCode::Tab => EditKey::Blur,
            KeyCode::Esc => EditKey::Escape,
            KeyCode::Backspace => {
                self.state.editing.draft_mut().pop();
                return;
            }
            KeyCode::Char(c) => {
                self.state.editing.draft_mut().push(c);
                return;
            }
            _ => return,
        };

        let id = self.state.editing.target().map(|t| t.record_id.clone());
        match self.state.on_edit_key(&mut self.store, &self.columns, edit_key) {
            EditOutcome::Committed(_) => {
                if let Some(task) = id.as_deref().and_then(|id| self.store.get(id)) {
                    self.source.update(task);
                }
                self.message = Some("Saved".to_string());
            }
            EditOutcome::Cancelled => self.message = Some("Edit cancelled".to_string()),
            EditOutcome::Idle => {}
        }
        self.input_mode = InputMode::Normal;
        self.refresh();
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.view.total_count;
        if len == 0 {
            return;
        }
        let next = (self.selected as i64 + delta).clamp(0, len as i64 - 1);
        self.selected = next as usize;
        self.follow_selection();
        self.refresh();
    }

    /// Move the viewport so the selected row is on screen.
    fn follow_selection(&mut self) {
        match self.state.viewport {
            ViewportWindow::Paged { page_size, .. } => {
                let page_size = page_size.max(1);
                self.state.on_page_change(self.selected / page_size + 1);
            }
            ViewportWindow::Scrolled {
                first_visible_index,
                ..
            } => {
                let visible = self.state.visible_rows().max(1);
                if self.selected < first_visible_index {
                    self.state.scroll_to_index(self.selected);
                } else if self.selected >= first_visible_index + visible {
                    self.state.scroll_to_index(self.selected + 1 - visible);
                }
            }
        }
    }

    fn change_page(&mut self, forward: bool) {
        match self.view.page_info {
            Some(info) => {
                let page = if forward { info.next_page() } else { info.previous_page() };
                self.state.on_page_change(page);
                self.selected = (page - 1) * info.page_size;
            }
            None => {
                let step = self.state.visible_rows() as i64;
                let delta = if forward { step } else { -step };
                let len = self.view.total_count as i64;
                self.selected = (self.selected as i64 + delta).clamp(0, (len - 1).max(0)) as usize;
                self.follow_selection();
            }
        }
        self.refresh();
    }

    fn sort_selected_column(&mut self) {
        let Some(key) = self.selected_key() else {
            return;
        };
        if self.state.on_sort(&self.columns, &key) {
            if let Some(sort) = &self.state.sort {
                self.message = Some(format!("Sorted by {} {}", key, sort.direction.arrow()));
            }
            self.refresh();
        } else {
            self.message = Some(format!("{} is not sortable", key));
        }
    }

    fn cycle_status_filter(&mut self) {
        self.status_filter = match self.status_filter {
            None => Some(0),
            Some(i) if i + 1 < TaskStatus::ALL.len() => Some(i + 1),
            Some(_) => None,
        };
        let values: Vec<&str> = self
            .status_filter
            .map(|i| vec![TaskStatus::ALL[i].label()])
            .unwrap_or_default();
        self.state.on_filter_change(&self.columns, "status", values);
        self.message = Some(match self.status_filter {
            Some(i) => format!("Status: {}", TaskStatus::ALL[i].label()),
            None => "Status: all".to_string(),
        });
        self.selected = 0;
        self.refresh();
    }

    fn toggle_from_today(&mut self) {
        self.from_today = !self.from_today;
        let start: Option<NaiveDate> = self.from_today.then(|| Local::now().date_naive());
        self.state.on_date_range(start, None);
        self.message = Some(if self.from_today {
            "Starting today or later".to_string()
        } else {
            "All start dates".to_string()
        });
        self.selected = 0;
        self.refresh();
    }

    fn toggle_window_mode(&mut self) {
        if self.is_scrolled() {
            self.config.window.mode = WindowMode::Paged;
            self.state.on_page_change(1);
            self.message = Some("Paged".to_string());
        } else {
            self.config.window.mode = WindowMode::Scrolled;
            self.state.scroll_to_index(0);
            self.message = Some("Scrolling".to_string());
        }
        self.selected = 0;
        self.refresh();
    }

    fn start_edit(&mut self) {
        let (Some(id), Some(key)) = (self.selected_task().map(|t| t.id.clone()), self.selected_key()) else {
            return;
        };
        if self.state.begin_edit(&self.store, &self.columns, &id, &key) {
            self.input_mode = InputMode::Edit;
        } else {
            self.message = Some(format!("{} cannot be edited here", key));
        }
    }

    fn cycle_status(&mut self) {
        let Some(task) = self.selected_task() else {
            return;
        };
        let id = task.id.clone();
        let next = task.status.cycle();
        self.state.on_record_update(
            &mut self.store,
            &id,
            &Patch::new().set("status", FieldValue::enumeration(next.label())),
        );
        if let Some(task) = self.store.get(&id) {
            self.source.update(task);
        }
        self.message = Some(format!("Status: {}", next.label()));
        self.refresh();
    }

    fn delete_selected(&mut self) {
        let Some(id) = self.selected_task().map(|t| t.id.clone()) else {
            return;
        };
        self.state.on_record_delete(&mut self.store, &id);
        self.source.delete(&id);
        self.message = Some("Task deleted".to_string());
        self.refresh();
    }

    fn clear_filters(&mut self) {
        self.search_buffer.clear();
        self.status_filter = None;
        self.from_today = false;
        self.state.on_search("");
        self.state.on_filter_change(&self.columns, "status", Vec::<String>::new());
        self.state.on_date_range(None, None);
        self.selected = 0;
        self.refresh();
    }
}
