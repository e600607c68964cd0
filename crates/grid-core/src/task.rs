//! Task records for the task-management grid.

use crate::column::{Column, ColumnWidth};
use crate::config::QueryConfig;
use crate::record::{parse_timestamp, FieldKind, FieldValue, Patch, Record, Schema};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    Overdue,
    Blocked,
    #[serde(rename = "In progress")]
    InProgress,
    #[serde(rename = "On hold")]
    OnHold,
    #[default]
    #[serde(rename = "Not started")]
    NotStarted,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Overdue,
        TaskStatus::Blocked,
        TaskStatus::InProgress,
        TaskStatus::OnHold,
        TaskStatus::NotStarted,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Overdue => "Overdue",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::InProgress => "In progress",
            TaskStatus::OnHold => "On hold",
            TaskStatus::NotStarted => "Not started",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Overdue => "!",
            TaskStatus::Blocked => "⊘",
            TaskStatus::InProgress => "◔",
            TaskStatus::OnHold => "‖",
            TaskStatus::NotStarted => "○",
        }
    }

    pub fn from_label(label: &str) -> Option<TaskStatus> {
        Self::ALL.into_iter().find(|s| s.label().eq_ignore_ascii_case(label))
    }

    pub fn cycle(&self) -> TaskStatus {
        match self {
            TaskStatus::NotStarted => TaskStatus::InProgress,
            TaskStatus::InProgress => TaskStatus::OnHold,
            TaskStatus::OnHold => TaskStatus::Blocked,
            TaskStatus::Blocked => TaskStatus::Overdue,
            TaskStatus::Overdue => TaskStatus::NotStarted,
        }
    }
}

/// Task priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn label(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn from_label(label: &str) -> Option<TaskPriority> {
        match label.to_ascii_lowercase().as_str() {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

/// A task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub reference: String,
    pub phase: String,
    pub expected_start: String,
    pub expected_due: String,
    pub assignee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TaskStatus::default(),
            reference: String::new(),
            phase: String::new(),
            expected_start: String::new(),
            expected_due: String::new(),
            assignee: String::new(),
            progress: None,
            priority: None,
            description: None,
            tags: Vec::new(),
        }
    }

    /// Field layout of [`Task`] records.
    pub fn schema() -> Schema {
        Schema::new()
            .field("name", FieldKind::Text)
            .field("status", FieldKind::Enum)
            .field("reference", FieldKind::Text)
            .field("phase", FieldKind::Enum)
            .field("expected_start", FieldKind::Date)
            .field("expected_due", FieldKind::Date)
            .field("assignee", FieldKind::Enum)
            .field("progress", FieldKind::Number)
            .field("priority", FieldKind::Enum)
            .field("description", FieldKind::Text)
            .field("tags", FieldKind::Tags)
    }

    /// Search and date-filter fields used by the task grid.
    pub fn query_config() -> QueryConfig {
        QueryConfig {
            searchable_fields: vec!["name".into(), "assignee".into(), "reference".into()],
            date_filter_field: Some("expected_start".into()),
        }
    }

    /// Whether the due date has passed on `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        parse_timestamp(&self.expected_due).is_some_and(|due| due.date() < today)
    }
}

/// Format a stored date as `15 Jan 2024`; unparsable input is shown as-is.
pub fn short_date(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(ts) => ts.format("%-d %b %Y").to_string(),
        None => raw.to_string(),
    }
}

/// Columns of the task grid.
pub fn default_columns() -> Vec<Column<Task>> {
    vec![
        Column::new("name", "Tasks")
            .width(ColumnWidth::Fixed(250))
            .sortable(true)
            .filterable(true)
            .sticky(true),
        Column::new("status", "Status")
            .width(ColumnWidth::Fixed(120))
            .sortable(true)
            .filterable(true)
            .render(|t: &Task, _| format!("{} {}", t.status.symbol(), t.status.label())),
        Column::new("reference", "Reference")
            .width(ColumnWidth::Fixed(120))
            .sortable(true),
        Column::new("phase", "Phase")
            .width(ColumnWidth::Fixed(140))
            .sortable(true)
            .filterable(true),
        Column::new("expected_start", "Expected start")
            .width(ColumnWidth::Fixed(120))
            .sortable(true)
            .render(|t: &Task, _| short_date(&t.expected_start)),
        Column::new("expected_due", "Expected due")
            .width(ColumnWidth::Fixed(120))
            .sortable(true)
            .render(|t: &Task, _| short_date(&t.expected_due)),
        Column::new("assignee", "Assignee")
            .width(ColumnWidth::Fixed(100))
            .sortable(true)
            .filterable(true)
            .render(|t: &Task, _| {
                let initial = t
                    .assignee
                    .chars()
                    .next()
                    .map(|c| c.to_uppercase().to_string())
                    .unwrap_or_else(|| "?".into());
                format!("({}) {}", initial, t.assignee)
            }),
    ]
}

fn text_of(value: &FieldValue) -> Option<String> {
    value.as_str().map(str::to_string)
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, key: &str) -> Option<FieldValue> {
        match key {
            "id" => Some(FieldValue::text(self.id.clone())),
            "name" => Some(FieldValue::text(self.name.clone())),
            "status" => Some(FieldValue::enumeration(self.status.label())),
            "reference" => Some(FieldValue::text(self.reference.clone())),
            "phase" => Some(FieldValue::enumeration(self.phase.clone())),
            "expected_start" => Some(FieldValue::date(self.expected_start.clone())),
            "expected_due" => Some(FieldValue::date(self.expected_due.clone())),
            "assignee" => Some(FieldValue::enumeration(self.assignee.clone())),
            "progress" => self.progress.map(FieldValue::Number),
            "priority" => self.priority.map(|p| FieldValue::enumeration(p.label())),
            "description" => self.description.clone().map(FieldValue::Text),
            "tags" => Some(FieldValue::Tags(self.tags.clone())),
            _ => None,
        }
    }

    fn apply_patch(&mut self, patch: &Patch) {
        for (key, value) in patch.iter() {
            let applied = match (key, value) {
                ("name", Some(v)) => text_of(v).map(|s| self.name = s).is_some(),
                ("status", Some(v)) => v
                    .as_str()
                    .and_then(TaskStatus::from_label)
                    .map(|s| self.status = s)
                    .is_some(),
                ("reference", Some(v)) => text_of(v).map(|s| self.reference = s).is_some(),
                ("phase", Some(v)) => text_of(v).map(|s| self.phase = s).is_some(),
                ("expected_start", Some(v)) => {
                    text_of(v).map(|s| self.expected_start = s).is_some()
                }
                ("expected_due", Some(v)) => text_of(v).map(|s| self.expected_due = s).is_some(),
                ("assignee", Some(v)) => text_of(v).map(|s| self.assignee = s).is_some(),
                ("progress", Some(FieldValue::Number(n))) => {
                    self.progress = Some(*n);
                    true
                }
                ("progress", None) => {
                    self.progress = None;
                    true
                }
                ("priority", Some(v)) => v
                    .as_str()
                    .and_then(TaskPriority::from_label)
                    .map(|p| self.priority = Some(p))
                    .is_some(),
                ("priority", None) => {
                    self.priority = None;
                    true
                }
                ("description", Some(v)) => {
                    text_of(v).map(|s| self.description = Some(s)).is_some()
                }
                ("description", None) => {
                    self.description = None;
                    true
                }
                ("tags", Some(FieldValue::Tags(tags))) => {
                    self.tags = tags.clone();
                    true
                }
                ("tags", None) => {
                    self.tags.clear();
                    true
                }
                _ => false,
            };
            if !applied {
                tracing::warn!(id = %self.id, field = key, "patch value not applicable to task field");
            }
        }
    }
}

/// Status counts over a task collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub overdue: usize,
    pub blocked: usize,
    pub in_progress: usize,
    pub on_hold: usize,
    pub not_started: usize,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = Self::default();
        for task in tasks {
            stats.total += 1;
            match task.status {
                TaskStatus::Overdue => stats.overdue += 1,
                TaskStatus::Blocked => stats.blocked += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::OnHold => stats.on_hold += 1,
                TaskStatus::NotStarted => stats.not_started += 1,
            }
        }
        stats
    }
}
