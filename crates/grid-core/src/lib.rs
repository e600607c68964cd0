//! # grid-core
//!
//! Headless data-grid engine: filtering, sorting, windowing and row
//! virtualization over an in-memory record collection.
//!
//! Rendering is left to the host. The crate hands back positioned rows and
//! the host draws them with whatever toolkit it uses.
//!
//! ## Components
//!
//! - [`filter()`] - Search, allowed-value and date-range predicates
//! - [`sort()`] - Stable single-key sort with locale-aware text order
//! - [`window()`] - Paged or scrolled slice with clamping
//! - [`layout()`] - Absolute row positions and the load-more placeholder
//! - [`LoadMoreCoordinator`] - At most one outstanding batch fetch
//! - [`update`] / [`delete`] - Copy-on-write mutations
//! - [`EditingSession`] - Single-cell inline editing
//! - [`Pipeline`] - All stages in order, with per-stage caching
//!
//! ## Data flow
//!
//! Records live in a shared [`Records`] collection. Each stage takes a
//! collection and returns a new one (or the same one, when nothing changed),
//! so earlier snapshots stay valid for as long as someone holds them.

mod column;
mod config;
mod error;
mod filter;
mod layout;
mod loader;
mod mutation;
mod pipeline;
mod record;
mod sort;
mod task;
mod window;

pub use column::{Column, ColumnSet, ColumnWidth, RenderFn};
pub use config::{
    EditingConfig, GridConfig, QueryConfig, RefreshConfig, StyleScheme, WindowConfig, WindowMode,
};
pub use error::{GridError, GridResult};
pub use filter::{filter, DateRange, FilterDescriptor};
pub use layout::{
    layout, layout_window, render_row, CellRenderer, Layout, RenderedRow, RowPlacement, RowSlot,
    TextRenderer,
};
pub use loader::{BatchFetcher, FetchOutcome, FetchRequest, LoadMoreCoordinator, LoadTrigger};
pub use mutation::{delete, update, EditKey, EditOutcome, EditTarget, EditingSession};
pub use pipeline::{GridState, GridView, Pipeline};
pub use record::{
    parse_timestamp, AppendReport, FieldKind, FieldSpec, FieldValue, MapRecord, Patch, Record,
    RecordStore, Records, Schema,
};
pub use sort::{sort, SortDescriptor, SortDirection};
pub use task::{default_columns, short_date, Task, TaskPriority, TaskStats, TaskStatus};
pub use window::{window, PageInfo, ViewportWindow, Window};
