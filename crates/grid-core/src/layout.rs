//! Virtualized render contract.
//!
//! Turns a window into absolutely positioned rows for fixed-height
//! virtualization. Nothing here draws; hosts receive [`RowPlacement`]s and
//! hand each cell to a [`CellRenderer`].

use crate::column::{Column, ColumnSet};
use crate::record::Record;
use crate::window::Window;

/// What occupies a row slot.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSlot<R> {
    /// A loaded record
    Record(R),
    /// Trailing slot shown while more records can be fetched
    Loading,
}

/// One positioned row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPlacement<R> {
    pub slot: RowSlot<R>,
    /// Absolute index in the derived collection
    pub index: usize,
    /// Distance from the top of the scroll container
    pub top_offset: u64,
}

impl<R> RowPlacement<R> {
    /// The record in this slot, if any.
    pub fn record(&self) -> Option<&R> {
        match &self.slot {
            RowSlot::Record(r) => Some(r),
            RowSlot::Loading => None,
        }
    }

    /// Whether this is the loading placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self.slot, RowSlot::Loading)
    }
}

/// Positioned rows plus scroll container geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout<R> {
    pub rows: Vec<RowPlacement<R>>,
    /// Height of the full (virtual) collection, placeholder included
    pub total_virtual_height: u64,
    pub row_height: u32,
}

impl<R> Layout<R> {
    /// Whether the loading placeholder is among the live rows.
    pub fn placeholder_visible(&self) -> bool {
        self.rows.last().is_some_and(RowPlacement::is_placeholder)
    }
}

/// Position `visible` rows starting at absolute index `range_start`.
///
/// With `has_more`, one extra slot is reserved after the last record; it is
/// only placed when the window reaches the end of the collection.
pub fn layout<R: Clone>(
    visible: &[R],
    range_start: usize,
    total_count: usize,
    row_height: u32,
    has_more: bool,
) -> Layout<R> {
    let height = row_height as u64;
    let mut rows: Vec<RowPlacement<R>> = visible
        .iter()
        .enumerate()
        .map(|(local, record)| {
            let index = range_start + local;
            RowPlacement {
                slot: RowSlot::Record(record.clone()),
                index,
                top_offset: index as u64 * height,
            }
        })
        .collect();

    if has_more && range_start + visible.len() >= total_count {
        rows.push(RowPlacement {
            slot: RowSlot::Loading,
            index: total_count,
            top_offset: total_count as u64 * height,
        });
    }

    let slots = total_count as u64 + u64::from(has_more);
    Layout {
        rows,
        total_virtual_height: slots * height,
        row_height,
    }
}

/// Lay out a window.
pub fn layout_window<R: Clone>(window: &Window<R>, row_height: u32, has_more: bool) -> Layout<R> {
    layout(
        window.visible(),
        window.range_start(),
        window.total_count,
        row_height,
        has_more,
    )
}

/// Host rendering collaborator.
pub trait CellRenderer<R> {
    /// Rendered cell type (text, widget, markup...)
    type Cell;

    /// Render one cell.
    fn render_cell(&self, record: &R, column: &Column<R>, row_index: usize) -> Self::Cell;
}

impl<R, C, F> CellRenderer<R> for F
where
    F: Fn(&R, &Column<R>, usize) -> C,
{
    type Cell = C;

    fn render_cell(&self, record: &R, column: &Column<R>, row_index: usize) -> C {
        self(record, column, row_index)
    }
}

/// Plain-text renderer: custom column renderers first, raw values otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl<R: Record> CellRenderer<R> for TextRenderer {
    type Cell = String;

    fn render_cell(&self, record: &R, column: &Column<R>, row_index: usize) -> String {
        column.display(record, row_index)
    }
}

/// A placement with its cells rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedRow<C> {
    Cells {
        index: usize,
        top_offset: u64,
        cells: Vec<C>,
    },
    Loading {
        index: usize,
        top_offset: u64,
    },
}

/// Render every column of one placement.
pub fn render_row<R, Rd>(
    placement: &RowPlacement<R>,
    columns: &ColumnSet<R>,
    renderer: &Rd,
) -> RenderedRow<Rd::Cell>
where
    Rd: CellRenderer<R>,
{
    match &placement.slot {
        RowSlot::Record(record) => RenderedRow::Cells {
            index: placement.index,
            top_offset: placement.top_offset,
            cells: columns
                .iter()
                .map(|col| renderer.render_cell(record, col, placement.index))
                .collect(),
        },
        RowSlot::Loading => RenderedRow::Loading {
            index: placement.index,
            top_offset: placement.top_offset,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldKind, MapRecord, Schema};
    use crate::window::{window, ViewportWindow};

    fn records(n: usize) -> Vec<MapRecord> {
        (0..n)
            .map(|i| MapRecord::new(i.to_string()).with("name", format!("row {}", i)))
            .collect()
    }

    #[test]
    fn test_offsets_are_absolute() {
        let data = records(10);
        let l = layout(&data[4..7], 4, 10, 50, false);

        let offsets: Vec<_> = l.rows.iter().map(|r| (r.index, r.top_offset)).collect();
        assert_eq!(offsets, vec![(4, 200), (5, 250), (6, 300)]);
        assert_eq!(l.total_virtual_height, 500);
        assert!(!l.placeholder_visible());
    }

    #[test]
    fn test_placeholder_reserved_at_end() {
        let data = records(3);
        let l = layout(&data[1..3], 1, 3, 40, true);

        assert_eq!(l.rows.len(), 3);
        assert!(l.placeholder_visible());
        let last = l.rows.last().unwrap();
        assert_eq!((last.index, last.top_offset), (3, 120));
        assert_eq!(l.total_virtual_height, 160);
    }

    #[test]
    fn test_placeholder_not_placed_mid_collection() {
        let data = records(10);
        let l = layout(&data[0..3], 0, 10, 40, true);
        assert!(!l.placeholder_visible());
        assert_eq!(l.total_virtual_height, 440);
    }

    #[test]
    fn test_empty_with_more_shows_only_placeholder() {
        let l = layout::<MapRecord>(&[], 0, 0, 50, true);
        assert_eq!(l.rows.len(), 1);
        assert!(l.placeholder_visible());
    }

    #[test]
    fn test_layout_window_and_render_row() {
        let data: crate::record::Records<MapRecord> = records(5).into();
        let w = window(&data, &ViewportWindow::paged(2, 2));
        let l = layout_window(&w, 10, false);

        let columns = ColumnSet::new(
            vec![
                Column::new("name", "Name"),
                Column::synthetic("pos", "#", |_: &MapRecord, i| format!("#{}", i)),
            ],
            Schema::new().field("name", FieldKind::Text),
        )
        .unwrap();

        let rendered = render_row(&l.rows[0], &columns, &TextRenderer);
        assert_eq!(
            rendered,
            RenderedRow::Cells {
                index: 2,
                top_offset: 20,
                cells: vec!["row 2".to_string(), "#2".to_string()],
            }
        );

        let upper = |r: &MapRecord, c: &Column<MapRecord>, _: usize| c.display(r, 0).to_uppercase();
        match render_row(&l.rows[1], &columns, &upper) {
            RenderedRow::Cells { cells, .. } => assert_eq!(cells[0], "ROW 3"),
            RenderedRow::Loading { .. } => panic!("expected cells"),
        }
    }
}
