//! On-demand loading.
//!
//! The coordinator turns "the loading placeholder became visible" into at most
//! one outstanding fetch. Fetching itself belongs to the host's
//! [`BatchFetcher`]; when a batch lands the host appends it to the store,
//! calls [`LoadMoreCoordinator::complete`] and re-runs the pipeline.

use crate::layout::Layout;

/// Parameters handed to the fetch collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    /// Records already loaded; the usual offset for the next batch
    pub loaded: usize,
    /// Sequence number of this request
    pub sequence: u64,
}

/// External data-fetch collaborator. Fire-and-forget.
pub trait BatchFetcher {
    fn fetch_next(&mut self, request: FetchRequest);
}

impl<F> BatchFetcher for F
where
    F: FnMut(FetchRequest),
{
    fn fetch_next(&mut self, request: FetchRequest) {
        self(request)
    }
}

/// Result of a trigger attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTrigger {
    /// A fetch was issued
    Requested(FetchRequest),
    /// A fetch is already outstanding; nothing issued
    AlreadyInFlight,
    /// The source reported no more records; nothing issued
    Exhausted,
}

/// How an outstanding fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Batch delivered; `has_more` tells whether another batch exists
    Loaded { has_more: bool },
    /// Fetch failed; the source is assumed to still have more
    Failed,
}

/// Tracks the in-flight flag and whether the source has more records.
#[derive(Debug, Clone, Default)]
pub struct LoadMoreCoordinator {
    in_flight: bool,
    has_more: bool,
    sequence: u64,
}

impl LoadMoreCoordinator {
    /// Create a coordinator.
    pub fn new(has_more: bool) -> Self {
        Self {
            in_flight: false,
            has_more,
            sequence: 0,
        }
    }

    /// Whether the source reports more records.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether a fetch is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Override the has-more flag (e.g. after a full reload).
    pub fn set_has_more(&mut self, has_more: bool) {
        self.has_more = has_more;
    }

    /// Ask for the next batch. Issues a fetch only when none is outstanding
    /// and the source has more.
    pub fn trigger<F>(&mut self, loaded: usize, fetcher: &mut F) -> LoadTrigger
    where
        F: BatchFetcher + ?Sized,
    {
        if !self.has_more {
            return LoadTrigger::Exhausted;
        }
        if self.in_flight {
            tracing::trace!(loaded, "load-more ignored, fetch already in flight");
            return LoadTrigger::AlreadyInFlight;
        }

        self.in_flight = true;
        self.sequence += 1;
        let request = FetchRequest {
            loaded,
            sequence: self.sequence,
        };
        tracing::debug!(loaded, sequence = request.sequence, "requesting next batch");
        fetcher.fetch_next(request);
        LoadTrigger::Requested(request)
    }

    /// Trigger when the layout shows the loading placeholder. Returns `None`
    /// when the placeholder is off screen.
    pub fn on_layout<R, F>(
        &mut self,
        layout: &Layout<R>,
        loaded: usize,
        fetcher: &mut F,
    ) -> Option<LoadTrigger>
    where
        F: BatchFetcher + ?Sized,
    {
        layout
            .placeholder_visible()
            .then(|| self.trigger(loaded, fetcher))
    }

    /// Record the end of the outstanding fetch. Always clears the in-flight
    /// flag.
    pub fn complete(&mut self, outcome: FetchOutcome) {
        self.in_flight = false;
        match outcome {
            FetchOutcome::Loaded { has_more } => self.has_more = has_more,
            FetchOutcome::Failed => {
                tracing::warn!(sequence = self.sequence, "batch fetch failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::layout;

    #[test]
    fn test_trigger_is_idempotent_while_in_flight() {
        let mut issued = Vec::new();
        let mut fetcher = |req: FetchRequest| issued.push(req);
        let mut coordinator = LoadMoreCoordinator::new(true);

        let first = coordinator.trigger(10, &mut fetcher);
        let second = coordinator.trigger(10, &mut fetcher);
        let third = coordinator.trigger(10, &mut fetcher);

        assert!(matches!(first, LoadTrigger::Requested(r) if r.loaded == 10 && r.sequence == 1));
        assert_eq!(second, LoadTrigger::AlreadyInFlight);
        assert_eq!(third, LoadTrigger::AlreadyInFlight);
        drop(fetcher);
        assert_eq!(issued.len(), 1);
    }

    #[test]
    fn test_complete_clears_flag_on_failure() {
        let mut count = 0;
        let mut fetcher = |_: FetchRequest| count += 1;
        let mut coordinator = LoadMoreCoordinator::new(true);

        coordinator.trigger(0, &mut fetcher);
        coordinator.complete(FetchOutcome::Failed);
        assert!(!coordinator.is_in_flight());
        assert!(coordinator.has_more());

        let again = coordinator.trigger(0, &mut fetcher);
        assert!(matches!(again, LoadTrigger::Requested(r) if r.sequence == 2));
        drop(fetcher);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_exhausted_source_never_fetches() {
        let mut count = 0;
        let mut fetcher = |_: FetchRequest| count += 1;
        let mut coordinator = LoadMoreCoordinator::new(true);

        coordinator.trigger(5, &mut fetcher);
        coordinator.complete(FetchOutcome::Loaded { has_more: false });
        assert_eq!(coordinator.trigger(8, &mut fetcher), LoadTrigger::Exhausted);
        drop(fetcher);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_on_layout_only_when_placeholder_visible() {
        let rows: Vec<u32> = (0..10).collect();
        let mut count = 0;
        let mut fetcher = |_: FetchRequest| count += 1;
        let mut coordinator = LoadMoreCoordinator::new(true);

        let top = layout(&rows[0..3], 0, 10, 20, true);
        assert_eq!(coordinator.on_layout(&top, 10, &mut fetcher), None);

        let bottom = layout(&rows[7..10], 7, 10, 20, true);
        assert!(matches!(
            coordinator.on_layout(&bottom, 10, &mut fetcher),
            Some(LoadTrigger::Requested(_))
        ));
        assert_eq!(
            coordinator.on_layout(&bottom, 10, &mut fetcher),
            Some(LoadTrigger::AlreadyInFlight)
        );
        drop(fetcher);
        assert_eq!(count, 1);
    }
}
