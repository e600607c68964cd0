//! Mutation coordinator and inline editing.
//!
//! Mutations are copy-on-write: they return a new collection and leave the
//! input (and every record in it) untouched. Targeting an unknown id is a
//! no-op that hands back the input collection.

use crate::error::{GridError, GridResult};
use crate::record::{FieldKind, FieldValue, Patch, Record, Records};

use std::sync::Arc;

/// Merge `patch` into the record with `id`.
pub fn update<R: Record>(records: &Records<R>, id: &str, patch: &Patch) -> Records<R> {
    let Some(pos) = records.iter().position(|r| r.id() == id) else {
        tracing::debug!(id, "update target not found");
        return Arc::clone(records);
    };
    if patch.is_empty() {
        return Arc::clone(records);
    }

    let mut next: Vec<R> = records.to_vec();
    next[pos].apply_patch(patch);
    tracing::trace!(id, fields = patch.len(), "record updated");
    next.into()
}

/// Remove the record with `id`.
pub fn delete<R: Record>(records: &Records<R>, id: &str) -> Records<R> {
    if !records.iter().any(|r| r.id() == id) {
        tracing::debug!(id, "delete target not found");
        return Arc::clone(records);
    }
    records
        .iter()
        .filter(|r| r.id() != id)
        .cloned()
        .collect::<Vec<_>>()
        .into()
}

/// Convert editor text into a field value of `kind`.
///
/// Blank input clears the field. Input that cannot be read as `kind` (a
/// non-numeric number) is [`GridError::InvalidInput`].
fn value_from_input(kind: FieldKind, input: &str) -> GridResult<Option<FieldValue>> {
    let trimmed = input.trim();
    if trimmed.is_empty() && kind != FieldKind::Text {
        return Ok(None);
    }
    let value = match kind {
        FieldKind::Text => FieldValue::Text(input.to_string()),
        FieldKind::Enum => FieldValue::Enum(trimmed.to_string()),
        FieldKind::Date => FieldValue::Date(trimmed.to_string()),
        FieldKind::Number => FieldValue::Number(trimmed.parse::<f64>().map_err(|_| GridError::InvalidInput {
            kind,
            input: input.to_string(),
        })?),
        FieldKind::Tags => FieldValue::Tags(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        ),
    };
    Ok(Some(value))
}

/// The cell being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditTarget {
    pub record_id: String,
    pub field: String,
}

/// Keys that end an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    /// Commit
    Enter,
    /// Focus left the editor; commit
    Blur,
    /// Discard
    Escape,
}

/// Result of ending an edit.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome<R> {
    /// Draft written back; carries the new collection
    Committed(Records<R>),
    /// Session closed without writing
    Cancelled,
    /// No session was open
    Idle,
}

/// At most one cell in edit mode.
#[derive(Debug, Clone, Default)]
pub struct EditingSession {
    target: Option<EditTarget>,
    draft: String,
}

impl EditingSession {
    /// Create an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter edit mode for a cell, seeding the draft with `initial`.
    ///
    /// Any open edit is dropped without persisting and returned.
    pub fn begin(
        &mut self,
        record_id: impl Into<String>,
        field: impl Into<String>,
        initial: impl Into<String>,
    ) -> Option<EditTarget> {
        let previous = self.target.replace(EditTarget {
            record_id: record_id.into(),
            field: field.into(),
        });
        self.draft = initial.into();
        if let Some(prev) = &previous {
            tracing::trace!(record = %prev.record_id, field = %prev.field, "edit discarded");
        }
        previous
    }

    /// Current target.
    pub fn target(&self) -> Option<&EditTarget> {
        self.target.as_ref()
    }

    /// Check if currently editing.
    pub fn is_editing(&self) -> bool {
        self.target.is_some()
    }

    /// Whether `(record_id, field)` is the cell being edited.
    pub fn is_editing_cell(&self, record_id: &str, field: &str) -> bool {
        self.target
            .as_ref()
            .is_some_and(|t| t.record_id == record_id && t.field == field)
    }

    /// Draft text.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Mutable draft text, for editors that type into it.
    pub fn draft_mut(&mut self) -> &mut String {
        &mut self.draft
    }

    /// Leave edit mode without writing.
    pub fn cancel(&mut self) -> Option<EditTarget> {
        self.draft.clear();
        self.target.take()
    }

    /// Write the draft back as a `kind` value and leave edit mode.
    ///
    /// Unreadable drafts are dropped with a warning and the input collection
    /// is returned.
    pub fn commit<R: Record>(&mut self, records: &Records<R>, kind: FieldKind) -> Records<R> {
        let Some(target) = self.target.take() else {
            return Arc::clone(records);
        };
        let draft = std::mem::take(&mut self.draft);

        let patch = match value_from_input(kind, &draft) {
            Ok(Some(value)) => Patch::new().set(target.field.clone(), value),
            Ok(None) => Patch::new().clear(target.field.clone()),
            Err(e) => {
                tracing::warn!(field = %target.field, error = %e, "edit dropped");
                return Arc::clone(records);
            }
        };
        update(records, &target.record_id, &patch)
    }

    /// Route an editor key: Enter/Blur commit, Escape cancels.
    pub fn handle_key<R: Record>(
        &mut self,
        key: EditKey,
        records: &Records<R>,
        kind: FieldKind,
    ) -> EditOutcome<R> {
        if !self.is_editing() {
            return EditOutcome::Idle;
        }
        match key {
            EditKey::Enter | EditKey::Blur => EditOutcome::Committed(self.commit(records, kind)),
            EditKey::Escape => {
                self.cancel();
                EditOutcome::Cancelled
            }
        }
    }
}
