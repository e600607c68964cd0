//! Windowing and pagination.
//!
//! A [`ViewportWindow`] asks for a slice of the filtered, sorted collection.
//! Requests outside the collection are clamped, never rejected.

use crate::record::Records;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Requested slice of the derived collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewportWindow {
    /// Fixed-size pages, numbered from 1
    Paged { page_number: usize, page_size: usize },
    /// Scroll position with overscan on both edges
    Scrolled {
        first_visible_index: usize,
        visible_count: usize,
        overscan: usize,
    },
}

impl ViewportWindow {
    /// Paged window.
    pub fn paged(page_number: usize, page_size: usize) -> Self {
        Self::Paged {
            page_number,
            page_size,
        }
    }

    /// Scrolled window.
    pub fn scrolled(first_visible_index: usize, visible_count: usize, overscan: usize) -> Self {
        Self::Scrolled {
            first_visible_index,
            visible_count,
            overscan,
        }
    }

    /// Translate a pixel scroll position into a scrolled window.
    ///
    /// Rows partly visible at either edge count as visible.
    pub fn from_scroll_offset(
        scroll_top: u32,
        viewport_height: u32,
        row_height: u32,
        overscan: usize,
    ) -> Self {
        let row_height = row_height.max(1) as u64;
        let top = scroll_top as u64;
        let bottom = top + viewport_height as u64;
        let first = top / row_height;
        let last = bottom.div_ceil(row_height);
        Self::scrolled(first as usize, (last - first) as usize, overscan)
    }
}

/// Page geometry for a paged window, after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// Current page (1-based, clamped)
    pub page: usize,
    /// Number of pages; at least 1
    pub page_count: usize,
    pub page_size: usize,
    pub total_count: usize,
}

impl PageInfo {
    /// Compute geometry, clamping `requested` into `1..=page_count`.
    pub fn new(requested: usize, page_size: usize, total_count: usize) -> Self {
        let page_size = page_size.max(1);
        let page_count = total_count.div_ceil(page_size).max(1);
        Self {
            page: requested.clamp(1, page_count),
            page_count,
            page_size,
            total_count,
        }
    }

    /// Index range covered by the current page.
    pub fn range(&self) -> Range<usize> {
        let start = ((self.page - 1) * self.page_size).min(self.total_count);
        let end = (start + self.page_size).min(self.total_count);
        start..end
    }

    /// 1-based position of the first row shown; 0 when empty.
    pub fn showing_from(&self) -> usize {
        let range = self.range();
        if range.is_empty() {
            0
        } else {
            range.start + 1
        }
    }

    /// 1-based position of the last row shown; 0 when empty.
    pub fn showing_to(&self) -> usize {
        self.range().end
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }

    /// Previous page, saturating at 1.
    pub fn previous_page(&self) -> usize {
        self.page.saturating_sub(1).max(1)
    }

    /// Next page, saturating at the last page.
    pub fn next_page(&self) -> usize {
        (self.page + 1).min(self.page_count)
    }
}

impl fmt::Display for PageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Showing {} to {} of {} \u{b7} Page {} of {}",
            self.showing_from(),
            self.showing_to(),
            self.total_count,
            self.page,
            self.page_count
        )
    }
}

/// The slice selected by a viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<R> {
    source: Records<R>,
    range: Range<usize>,
    /// Size of the collection the window was cut from
    pub total_count: usize,
    /// Page geometry, for paged windows
    pub page: Option<PageInfo>,
}

impl<R> Window<R> {
    /// Records inside the window.
    pub fn visible(&self) -> &[R] {
        &self.source[self.range.clone()]
    }

    /// First index covered (inclusive).
    pub fn range_start(&self) -> usize {
        self.range.start
    }

    /// Last index covered (exclusive).
    pub fn range_end(&self) -> usize {
        self.range.end
    }

    /// Number of records inside the window.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Cut `viewport` out of `records`.
pub fn window<R>(records: &Records<R>, viewport: &ViewportWindow) -> Window<R> {
    let total_count = records.len();

    let (range, page) = match *viewport {
        ViewportWindow::Paged {
            page_number,
            page_size,
        } => {
            let info = PageInfo::new(page_number, page_size, total_count);
            if info.page != page_number {
                tracing::debug!(requested = page_number, clamped = info.page, "page clamped");
            }
            (info.range(), Some(info))
        }
        ViewportWindow::Scrolled {
            first_visible_index,
            visible_count,
            overscan,
        } => {
            let first = first_visible_index.min(total_count.saturating_sub(1));
            let start = first.saturating_sub(overscan).min(total_count);
            let end = first
                .saturating_add(visible_count)
                .saturating_add(overscan)
                .min(total_count);
            (start..end, None)
        }
    };

    Window {
        source: records.clone(),
        range,
        total_count,
        page,
    }
}
