//! Simulated remote task source.
//!
//! The source owns the authoritative task list. Batches and full reloads are
//! produced on tokio tasks after a short delay and delivered over an
//! unbounded channel, the way a paginated HTTP source would. Edits and
//! deletes made in the grid are written back so later fetches agree with
//! what the user sees.

use chrono::{Duration as ChronoDuration, NaiveDate};
use grid_core::{FetchRequest, Task, TaskPriority, TaskStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Records the source starts with.
pub const TOTAL: usize = 240;
/// Records per batch.
pub const BATCH_SIZE: usize = 60;

const LATENCY: Duration = Duration::from_millis(400);

const VERBS: [&str; 6] = ["Draft", "Review", "Ship", "Audit", "Plan", "Fix"];
const OBJECTS: [&str; 6] = ["budget", "release notes", "login flow", "roadmap", "invoices", "search"];
const PHASES: [&str; 5] = ["Planning", "Design", "Build", "Testing", "Release"];
const ASSIGNEES: [&str; 6] = ["Amy", "Bob", "Cleo", "Dev", "\u{c9}mile", "Sam"];

pub struct Batch {
    pub tasks: Vec<Task>,
    pub has_more: bool,
}

pub enum FetchMessage {
    /// Next load-more batch
    Loaded(Batch),
    /// Fresh copy of everything the grid had loaded
    Reloaded(Batch),
    Failed(String),
    /// The refresh timer fired
    RefreshDue,
}

/// Stable id for the `n`th generated task, so a batch fetched twice carries
/// the same ids both times.
fn task_id(n: usize) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("task-grid/{n}").as_bytes()).to_string()
}

fn sample_task(n: usize) -> Task {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    let start = base + ChronoDuration::days((n * 3 % 180) as i64);
    let due = start + ChronoDuration::days(7 + (n % 21) as i64);

    let mut task = Task::new(
        task_id(n),
        format!("{} {}", VERBS[n % VERBS.len()], OBJECTS[(n / VERBS.len()) % OBJECTS.len()]),
    );
    task.status = TaskStatus::ALL[n % TaskStatus::ALL.len()];
    task.reference = format!("TASK-{:04}", n + 1);
    task.phase = PHASES[(n / 2) % PHASES.len()].to_string();
    task.expected_start = start.format("%Y-%m-%d").to_string();
    task.expected_due = due.format("%Y-%m-%d").to_string();
    task.assignee = ASSIGNEES[(n * 7) % ASSIGNEES.len()].to_string();
    task.progress = Some(((n * 13) % 101) as f64);
    task.priority = match n % 4 {
        0 => Some(TaskPriority::High),
        1 => Some(TaskPriority::Medium),
        2 => Some(TaskPriority::Low),
        _ => None,
    };
    if n % 5 == 0 {
        task.tags = vec!["urgent".to_string()];
    }
    task
}

/// Backing store shared between the UI and the fetch tasks.
#[derive(Debug)]
pub struct TaskSource {
    tasks: Mutex<Vec<Task>>,
}

impl TaskSource {
    pub fn new() -> Arc<Self> {
        Self::with_len(TOTAL)
    }

    pub fn with_len(len: usize) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new((0..len).map(sample_task).collect()),
        })
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<Task>> {
        // A panicked writer leaves a whole Vec behind; keep serving it.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    /// The batch starting at `offset`.
    pub fn batch_at(&self, offset: usize) -> Batch {
        let tasks = self.tasks();
        let start = offset.min(tasks.len());
        let end = (offset + BATCH_SIZE).min(tasks.len());
        Batch {
            tasks: tasks[start..end].to_vec(),
            has_more: end < tasks.len(),
        }
    }

    /// The first `count` tasks, rounded up to a whole batch.
    pub fn head(&self, count: usize) -> Batch {
        let tasks = self.tasks();
        let end = count.max(BATCH_SIZE).min(tasks.len());
        Batch {
            tasks: tasks[..end].to_vec(),
            has_more: end < tasks.len(),
        }
    }

    /// Store the grid's copy of a task.
    pub fn update(&self, task: &Task) {
        let mut tasks = self.tasks();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task.clone(),
            None => tracing::debug!(id = %task.id, "update for task the source does not hold"),
        }
    }

    pub fn delete(&self, id: &str) {
        self.tasks().retain(|t| t.id != id);
    }
}

/// Fetch the batch for `request` in the background.
pub fn spawn_fetch(source: Arc<TaskSource>, tx: mpsc::UnboundedSender<FetchMessage>, request: FetchRequest) {
    tokio::spawn(async move {
        tokio::time::sleep(LATENCY).await;
        let message = if request.loaded >= source.len() {
            FetchMessage::Failed(format!("no records past offset {}", request.loaded))
        } else {
            FetchMessage::Loaded(source.batch_at(request.loaded))
        };
        if tx.send(message).is_err() {
            tracing::debug!(sequence = request.sequence, "fetch result dropped, receiver closed");
        }
    });
}

/// Re-read the first `count` tasks in the background.
pub fn spawn_reload(source: Arc<TaskSource>, tx: mpsc::UnboundedSender<FetchMessage>, count: usize) {
    tokio::spawn(async move {
        tokio::time::sleep(LATENCY).await;
        if tx.send(FetchMessage::Reloaded(source.head(count))).is_err() {
            tracing::debug!(count, "reload dropped, receiver closed");
        }
    });
}

/// Send [`FetchMessage::RefreshDue`] every `period` until the receiver goes
/// away.
pub fn spawn_refresh_timer(tx: mpsc::UnboundedSender<FetchMessage>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx.send(FetchMessage::RefreshDue).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_core::{GridConfig, GridState, RecordStore};

    fn references(store: &RecordStore<Task>) -> Vec<String> {
        store.records().iter().map(|t| t.reference.clone()).collect()
    }

    #[test]
    fn test_batches_cover_source() {
        let source = TaskSource::new();
        let first = source.batch_at(0);
        assert_eq!(first.tasks.len(), BATCH_SIZE);
        assert!(first.has_more);

        let last = source.batch_at(TOTAL - BATCH_SIZE);
        assert!(!last.has_more);
        assert!(source.batch_at(TOTAL).tasks.is_empty());
        assert!(source.batch_at(TOTAL + 5).tasks.is_empty());
    }

    #[test]
    fn test_sample_dates_parse() {
        let task = sample_task(3);
        assert_eq!(task.expected_start, "2024-01-10");
        assert!(grid_core::parse_timestamp(&task.expected_due).is_some());
    }

    #[test]
    fn test_ids_are_stable() {
        assert_eq!(sample_task(59).id, sample_task(59).id);
        assert_ne!(sample_task(59).id, sample_task(60).id);
    }

    #[test]
    fn test_delete_then_load_next_batch() {
        let source = TaskSource::new();
        let first = source.batch_at(0);
        let mut store = RecordStore::new(first.tasks);
        let mut state = GridState::new(&GridConfig::default()).with_more_available(first.has_more);

        let victim = store.records()[10].id.clone();
        state.on_record_delete(&mut store, &victim);
        source.delete(&victim);
        assert_eq!(store.len(), BATCH_SIZE - 1);

        let next = source.batch_at(store.len());
        let report = state.on_batch_loaded(&mut store, next.tasks, next.has_more);
        assert_eq!(report.skipped_duplicates, 0);

        let refs = references(&store);
        assert_eq!(refs.iter().filter(|r| r.as_str() == "TASK-0060").count(), 1);
        assert_eq!(refs.iter().filter(|r| r.as_str() == "TASK-0061").count(), 1);
        assert_eq!(refs.last().map(String::as_str), Some("TASK-0120"));
        assert_eq!(store.len(), 2 * BATCH_SIZE - 1);
    }

    #[test]
    fn test_local_delete_overlap_is_dropped() {
        // The source never heard about the delete, so the next batch starts
        // one record early.
        let source = TaskSource::new();
        let first = source.batch_at(0);
        let mut store = RecordStore::new(first.tasks);
        let mut state = GridState::new(&GridConfig::default()).with_more_available(true);

        let victim = store.records()[0].id.clone();
        state.on_record_delete(&mut store, &victim);

        let next = source.batch_at(store.len());
        let report = state.on_batch_loaded(&mut store, next.tasks, next.has_more);
        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(references(&store).iter().filter(|r| r.as_str() == "TASK-0060").count(), 1);
    }

    #[test]
    fn test_edits_survive_reload() {
        let source = TaskSource::with_len(BATCH_SIZE + 10);
        let first = source.batch_at(0);
        let mut store = RecordStore::new(first.tasks);
        let mut state = GridState::new(&GridConfig::default()).with_more_available(first.has_more);

        let mut edited = store.records()[2].clone();
        edited.name = "Renamed".to_string();
        source.update(&edited);
        source.delete(&store.records()[3].id.clone());

        let reload = source.head(store.len());
        assert!(reload.has_more);
        state.on_reload(&mut store, reload.tasks, reload.has_more);
        assert_eq!(store.len(), BATCH_SIZE);
        assert_eq!(store.get(&edited.id).map(|t| t.name.as_str()), Some("Renamed"));
    }
}
