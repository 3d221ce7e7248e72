//! Batch-edit reconciliation for the dashboard table.
//!
//! A session snapshots the displayed page of records into a per-page edit
//! buffer, accumulates cell edits and soft deletions across page
//! navigation, and reconciles the buffers against the server in one save:
//! all updates fan out concurrently, then all deletions, and the caller
//! re-fetches. Buffered rows are a tagged union (unchanged / modified /
//! deleted) so the save-time partition is a total match rather than a
//! flag check.

pub mod sort;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::try_join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::record;
use crate::errors::ServiceError;

/// Client-side view of one record row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: Uuid,
    pub date: NaiveDate,
    pub product_name: String,
    pub color: String,
    pub amount: Decimal,
    pub unit: Decimal,
}

impl RecordRow {
    pub fn total(&self) -> Decimal {
        self.amount * self.unit
    }

    /// Total as shown outside edit mode: truncated toward zero, never
    /// stored.
    pub fn display_total(&self) -> Decimal {
        self.total().trunc()
    }
}

impl From<record::Model> for RecordRow {
    fn from(model: record::Model) -> Self {
        Self {
            id: model.id,
            date: model.date,
            product_name: model.product_name,
            color: model.color,
            amount: model.amount,
            unit: model.unit,
        }
    }
}

/// A single cell mutation.
#[derive(Debug, Clone)]
pub enum CellEdit {
    Date(NaiveDate),
    ProductName(String),
    Color(String),
    Amount(Decimal),
    Unit(Decimal),
}

/// Explicit session lifecycle, replacing an ambient auth singleton.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated(AuthUser),
}

impl SessionState {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Where the session is in its edit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Viewing,
    Editing,
    Saving,
}

/// One buffered row. `Deleted` keeps the edited fields so an undo can
/// land back on `Modified` when the row had pending edits.
#[derive(Debug, Clone)]
enum BufferedRow {
    Unchanged(RecordRow),
    Modified { baseline: RecordRow, current: RecordRow },
    Deleted { baseline: RecordRow, current: RecordRow },
}

impl BufferedRow {
    fn id(&self) -> Uuid {
        match self {
            BufferedRow::Unchanged(row) => row.id,
            BufferedRow::Modified { current, .. } | BufferedRow::Deleted { current, .. } => {
                current.id
            }
        }
    }

    fn is_deleted(&self) -> bool {
        matches!(self, BufferedRow::Deleted { .. })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditSessionError {
    #[error("sign in before editing")]
    NotAuthenticated,
    #[error("no edit in progress")]
    NotEditing,
    #[error("an edit is already in progress")]
    AlreadyEditing,
    #[error("row {0} is not on this page")]
    RowNotFound(Uuid),
    #[error("row {0} is marked for deletion")]
    RowDeleted(Uuid),
}

/// The update/delete partition produced at save time. A row never appears
/// in both sets: deletions are a distinct variant, not a filtered flag.
#[derive(Debug, Default)]
pub struct SavePlan {
    pub updates: Vec<RecordRow>,
    pub deletes: Vec<Uuid>,
}

impl SavePlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    pub updated: usize,
    pub deleted: usize,
}

/// Whether a topic switch can proceed immediately or must be confirmed
/// because it would discard unsaved edits.
#[derive(Debug, PartialEq, Eq)]
pub enum TopicSwitch {
    Switched,
    NeedsConfirmation,
}

/// Row write seam for the save fan-out.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    async fn update_record(&self, row: &RecordRow) -> Result<(), ServiceError>;
    async fn delete_record(&self, id: Uuid) -> Result<(), ServiceError>;
}

/// Stateful controller for one dashboard visit.
#[derive(Debug)]
pub struct EditSession {
    phase: SessionPhase,
    page_size: u64,
    server_total: u64,
    /// Last-fetched rows per page; the source for buffer copy-in.
    canonical: BTreeMap<u64, Vec<RecordRow>>,
    /// Working copies per page, created on edit entry or first touch.
    buffers: BTreeMap<u64, Vec<BufferedRow>>,
}

impl EditSession {
    pub fn new(page_size: u64) -> Self {
        Self {
            phase: SessionPhase::Viewing,
            page_size: page_size.max(1),
            server_total: 0,
            canonical: BTreeMap::new(),
            buffers: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_editing(&self) -> bool {
        self.phase == SessionPhase::Editing
    }

    /// Record a fetched page. While editing, the page is snapshotted into
    /// a buffer unless one already exists, so edits on other pages
    /// survive navigation.
    pub fn load_page(&mut self, page: u64, rows: Vec<RecordRow>, server_total: u64) {
        self.server_total = server_total;
        if self.phase == SessionPhase::Editing {
            self.buffers
                .entry(page)
                .or_insert_with(|| rows.iter().cloned().map(BufferedRow::Unchanged).collect());
        }
        self.canonical.insert(page, rows);
    }

    /// Enter edit mode, snapshotting every currently loaded page.
    /// Requires an authenticated session; the caller surfaces the login
    /// prompt on failure.
    pub fn begin_editing(&mut self, session: &SessionState) -> Result<(), EditSessionError> {
        if session.user().is_none() {
            return Err(EditSessionError::NotAuthenticated);
        }
        if self.phase != SessionPhase::Viewing {
            return Err(EditSessionError::AlreadyEditing);
        }

        self.buffers = self
            .canonical
            .iter()
            .map(|(page, rows)| {
                (
                    *page,
                    rows.iter().cloned().map(BufferedRow::Unchanged).collect(),
                )
            })
            .collect();
        self.phase = SessionPhase::Editing;
        Ok(())
    }

    /// Apply one cell edit to a buffered row, copying the row in from the
    /// canonical page if the buffer does not hold it yet.
    pub fn edit_cell(
        &mut self,
        page: u64,
        id: Uuid,
        edit: CellEdit,
    ) -> Result<(), EditSessionError> {
        if self.phase != SessionPhase::Editing {
            return Err(EditSessionError::NotEditing);
        }
        let index = self.ensure_buffered(page, id)?;
        let buffer = self
            .buffers
            .get_mut(&page)
            .ok_or(EditSessionError::RowNotFound(id))?;

        let entry = &mut buffer[index];
        match entry {
            BufferedRow::Deleted { current, .. } => {
                return Err(EditSessionError::RowDeleted(current.id))
            }
            BufferedRow::Unchanged(row) => {
                let baseline = row.clone();
                let mut current = row.clone();
                apply_edit(&mut current, edit);
                *entry = BufferedRow::Modified { baseline, current };
            }
            BufferedRow::Modified { current, .. } => {
                apply_edit(current, edit);
            }
        }
        Ok(())
    }

    /// Soft-delete a buffered row. Idempotent: deleting an
    /// already-deleted row leaves it deleted.
    pub fn mark_deleted(&mut self, page: u64, id: Uuid) -> Result<(), EditSessionError> {
        if self.phase != SessionPhase::Editing {
            return Err(EditSessionError::NotEditing);
        }
        let index = self.ensure_buffered(page, id)?;
        let buffer = self
            .buffers
            .get_mut(&page)
            .ok_or(EditSessionError::RowNotFound(id))?;

        let entry = &mut buffer[index];
        *entry = match entry.clone() {
            BufferedRow::Unchanged(row) => BufferedRow::Deleted {
                baseline: row.clone(),
                current: row,
            },
            BufferedRow::Modified { baseline, current }
            | BufferedRow::Deleted { baseline, current } => {
                BufferedRow::Deleted { baseline, current }
            }
        };
        Ok(())
    }

    /// Undo a soft delete, restoring `Modified` when the row still
    /// carries edits and `Unchanged` otherwise. No-op for rows that are
    /// not deleted.
    pub fn undo_delete(&mut self, page: u64, id: Uuid) -> Result<(), EditSessionError> {
        if self.phase != SessionPhase::Editing {
            return Err(EditSessionError::NotEditing);
        }
        let buffer = self
            .buffers
            .get_mut(&page)
            .ok_or(EditSessionError::RowNotFound(id))?;
        let entry = buffer
            .iter_mut()
            .find(|row| row.id() == id)
            .ok_or(EditSessionError::RowNotFound(id))?;

        if let BufferedRow::Deleted { baseline, current } = entry.clone() {
            *entry = if current == baseline {
                BufferedRow::Unchanged(baseline)
            } else {
                BufferedRow::Modified { baseline, current }
            };
        }
        Ok(())
    }

    /// Deleted rows summed across every buffered page.
    pub fn deleted_count(&self) -> u64 {
        self.buffers
            .values()
            .flatten()
            .filter(|row| row.is_deleted())
            .count() as u64
    }

    /// Total shown while editing: server total minus pending deletions.
    pub fn displayed_total(&self) -> u64 {
        self.server_total.saturating_sub(self.deleted_count())
    }

    pub fn displayed_page_count(&self) -> u64 {
        self.displayed_total().div_ceil(self.page_size)
    }

    /// Partition every buffered row into the update and delete sets.
    /// Modified rows whose fields drifted back to the baseline are
    /// skipped.
    pub fn save_plan(&self) -> SavePlan {
        let mut plan = SavePlan::default();
        for row in self.buffers.values().flatten() {
            match row {
                BufferedRow::Unchanged(_) => {}
                BufferedRow::Modified { baseline, current } => {
                    if current != baseline {
                        plan.updates.push(current.clone());
                    }
                }
                BufferedRow::Deleted { current, .. } => plan.deletes.push(current.id),
            }
        }
        plan
    }

    /// Reconcile the buffers against the server: all updates
    /// concurrently, then all deletions concurrently. Any rejection fails
    /// the whole save and keeps the buffers for retry; row mutations that
    /// already landed are not rolled back. On success the buffers clear
    /// and the caller re-fetches the current page.
    pub async fn save<W: RecordWriter>(
        &mut self,
        writer: &W,
    ) -> Result<SaveOutcome, ServiceError> {
        if self.phase != SessionPhase::Editing {
            return Err(ServiceError::ValidationError(
                EditSessionError::NotEditing.to_string(),
            ));
        }

        self.phase = SessionPhase::Saving;
        let plan = self.save_plan();

        let result: Result<(), ServiceError> = async {
            try_join_all(plan.updates.iter().map(|row| writer.update_record(row))).await?;
            try_join_all(plan.deletes.iter().map(|id| writer.delete_record(*id))).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.buffers.clear();
                self.canonical.clear();
                self.phase = SessionPhase::Viewing;
                Ok(SaveOutcome {
                    updated: plan.updates.len(),
                    deleted: plan.deletes.len(),
                })
            }
            Err(err) => {
                self.phase = SessionPhase::Editing;
                Err(err)
            }
        }
    }

    /// Discard every buffer without any server calls.
    pub fn cancel(&mut self) {
        self.buffers.clear();
        self.phase = SessionPhase::Viewing;
    }

    /// A topic switch mid-edit discards unsaved work, so it needs an
    /// explicit confirmation first.
    pub fn request_topic_switch(&mut self) -> TopicSwitch {
        if self.is_editing() {
            TopicSwitch::NeedsConfirmation
        } else {
            self.reset_topic_context();
            TopicSwitch::Switched
        }
    }

    /// Confirm a pending topic switch: cancel the edit, then clear the
    /// old topic's pages.
    pub fn confirm_topic_switch(&mut self) {
        self.cancel();
        self.reset_topic_context();
    }

    fn reset_topic_context(&mut self) {
        self.canonical.clear();
        self.server_total = 0;
    }

    /// Rows as the table should render them for a page: buffered state
    /// when editing, canonical rows otherwise. Deleted rows stay visible
    /// so the undo affordance has somewhere to live.
    pub fn visible_rows(&self, page: u64) -> Vec<(RecordRow, bool)> {
        if self.phase == SessionPhase::Viewing {
            return self
                .canonical
                .get(&page)
                .map(|rows| rows.iter().cloned().map(|row| (row, false)).collect())
                .unwrap_or_default();
        }
        self.buffers
            .get(&page)
            .map(|rows| {
                rows.iter()
                    .map(|row| match row {
                        BufferedRow::Unchanged(r) => (r.clone(), false),
                        BufferedRow::Modified { current, .. } => (current.clone(), false),
                        BufferedRow::Deleted { current, .. } => (current.clone(), true),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Locate the row in the page buffer, copying it in from the
    /// canonical page on first touch.
    fn ensure_buffered(&mut self, page: u64, id: Uuid) -> Result<usize, EditSessionError> {
        let canonical = &self.canonical;
        let buffer = self.buffers.entry(page).or_default();

        if let Some(index) = buffer.iter().position(|row| row.id() == id) {
            return Ok(index);
        }

        let source = canonical
            .get(&page)
            .and_then(|rows| rows.iter().find(|row| row.id == id))
            .ok_or(EditSessionError::RowNotFound(id))?;
        buffer.push(BufferedRow::Unchanged(source.clone()));
        Ok(buffer.len() - 1)
    }
}

fn apply_edit(row: &mut RecordRow, edit: CellEdit) {
    match edit {
        CellEdit::Date(date) => row.date = date,
        CellEdit::ProductName(name) => row.product_name = name,
        CellEdit::Color(color) => row.color = color,
        CellEdit::Amount(amount) => row.amount = amount,
        CellEdit::Unit(unit) => row.unit = unit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn row(name: &str, amount: Decimal, unit: Decimal) -> RecordRow {
        RecordRow {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            product_name: name.to_string(),
            color: "Red".to_string(),
            amount,
            unit,
        }
    }

    fn signed_in() -> SessionState {
        SessionState::Authenticated(AuthUser {
            user_id: Uuid::new_v4(),
            name: "Alex".to_string(),
            email: "alex@example.com".to_string(),
        })
    }

    #[derive(Default)]
    struct FakeWriter {
        updates: Mutex<Vec<Uuid>>,
        deletes: Mutex<Vec<Uuid>>,
        fail_deletes: bool,
    }

    #[async_trait]
    impl RecordWriter for FakeWriter {
        async fn update_record(&self, row: &RecordRow) -> Result<(), ServiceError> {
            self.updates.lock().unwrap().push(row.id);
            Ok(())
        }

        async fn delete_record(&self, id: Uuid) -> Result<(), ServiceError> {
            if self.fail_deletes {
                return Err(ServiceError::InternalError("delete rejected".into()));
            }
            self.deletes.lock().unwrap().push(id);
            Ok(())
        }
    }

    #[test]
    fn display_total_truncates_toward_zero() {
        let r = row("Gadget", dec!(2.5), dec!(3));
        assert_eq!(r.total(), dec!(7.5));
        assert_eq!(r.display_total(), dec!(7));
    }

    #[test]
    fn begin_editing_requires_authentication() {
        let mut session = EditSession::new(10);
        session.load_page(1, vec![row("Gadget", dec!(1), dec!(1))], 1);
        assert_eq!(
            session.begin_editing(&SessionState::Unauthenticated),
            Err(EditSessionError::NotAuthenticated)
        );
        assert!(session.begin_editing(&signed_in()).is_ok());
        assert!(session.is_editing());
    }

    #[test]
    fn cell_edit_copies_row_in_and_tracks_modification() {
        let target = row("Gadget", dec!(10), dec!(3));
        let id = target.id;
        let mut session = EditSession::new(10);
        session.load_page(1, vec![target], 1);
        session.begin_editing(&signed_in()).unwrap();

        session
            .edit_cell(1, id, CellEdit::Amount(dec!(12)))
            .unwrap();

        let plan = session.save_plan();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].amount, dec!(12));
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn edit_reverted_to_baseline_produces_no_update() {
        let target = row("Gadget", dec!(10), dec!(3));
        let id = target.id;
        let mut session = EditSession::new(10);
        session.load_page(1, vec![target], 1);
        session.begin_editing(&signed_in()).unwrap();

        session
            .edit_cell(1, id, CellEdit::Amount(dec!(12)))
            .unwrap();
        session
            .edit_cell(1, id, CellEdit::Amount(dec!(10)))
            .unwrap();

        assert!(session.save_plan().is_empty());
    }

    #[test]
    fn delete_is_idempotent_through_undo() {
        let target = row("Gadget", dec!(10), dec!(3));
        let id = target.id;
        let mut session = EditSession::new(10);
        session.load_page(1, vec![target], 1);
        session.begin_editing(&signed_in()).unwrap();

        session.mark_deleted(1, id).unwrap();
        session.undo_delete(1, id).unwrap();
        session.mark_deleted(1, id).unwrap();
        session.mark_deleted(1, id).unwrap();

        assert_eq!(session.deleted_count(), 1);
        let plan = session.save_plan();
        assert_eq!(plan.deletes, vec![id]);
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn undo_restores_modified_when_edits_pending() {
        let target = row("Gadget", dec!(10), dec!(3));
        let id = target.id;
        let mut session = EditSession::new(10);
        session.load_page(1, vec![target], 1);
        session.begin_editing(&signed_in()).unwrap();

        session
            .edit_cell(1, id, CellEdit::Color("Blue".into()))
            .unwrap();
        session.mark_deleted(1, id).unwrap();
        session.undo_delete(1, id).unwrap();

        let plan = session.save_plan();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].color, "Blue");
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn editing_a_deleted_row_is_rejected() {
        let target = row("Gadget", dec!(10), dec!(3));
        let id = target.id;
        let mut session = EditSession::new(10);
        session.load_page(1, vec![target], 1);
        session.begin_editing(&signed_in()).unwrap();
        session.mark_deleted(1, id).unwrap();

        assert_eq!(
            session.edit_cell(1, id, CellEdit::Amount(dec!(1))),
            Err(EditSessionError::RowDeleted(id))
        );
    }

    #[test]
    fn displayed_total_subtracts_deletions_across_pages() {
        let page1: Vec<RecordRow> = (0..10).map(|i| row(&format!("p{i}"), dec!(1), dec!(1))).collect();
        let page2: Vec<RecordRow> = (0..10).map(|i| row(&format!("q{i}"), dec!(1), dec!(1))).collect();
        let first = page1[0].id;
        let second = page2[3].id;

        let mut session = EditSession::new(10);
        session.load_page(1, page1, 23);
        session.begin_editing(&signed_in()).unwrap();
        session.load_page(2, page2, 23);

        session.mark_deleted(1, first).unwrap();
        session.mark_deleted(2, second).unwrap();

        assert_eq!(session.displayed_total(), 21);
        assert_eq!(session.displayed_page_count(), 3);
    }

    #[test]
    fn edits_survive_page_navigation() {
        let page1: Vec<RecordRow> = (0..2).map(|i| row(&format!("p{i}"), dec!(1), dec!(1))).collect();
        let page2: Vec<RecordRow> = (0..2).map(|i| row(&format!("q{i}"), dec!(2), dec!(2))).collect();
        let edited = page1[0].id;

        let mut session = EditSession::new(10);
        session.load_page(1, page1.clone(), 4);
        session.begin_editing(&signed_in()).unwrap();
        session
            .edit_cell(1, edited, CellEdit::ProductName("Renamed".into()))
            .unwrap();

        // Navigate away and back; the page-1 buffer must survive the
        // fresh fetch.
        session.load_page(2, page2, 4);
        session.load_page(1, page1, 4);

        let plan = session.save_plan();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].product_name, "Renamed");
    }

    #[tokio::test]
    async fn save_fans_out_updates_then_deletes_and_clears() {
        let rows: Vec<RecordRow> = (0..3).map(|i| row(&format!("p{i}"), dec!(1), dec!(1))).collect();
        let edited = rows[0].id;
        let removed = rows[1].id;

        let mut session = EditSession::new(10);
        session.load_page(1, rows, 3);
        session.begin_editing(&signed_in()).unwrap();
        session
            .edit_cell(1, edited, CellEdit::Amount(dec!(9)))
            .unwrap();
        session.mark_deleted(1, removed).unwrap();

        let writer = FakeWriter::default();
        let outcome = session.save(&writer).await.unwrap();

        assert_eq!(outcome, SaveOutcome { updated: 1, deleted: 1 });
        assert_eq!(*writer.updates.lock().unwrap(), vec![edited]);
        assert_eq!(*writer.deletes.lock().unwrap(), vec![removed]);
        assert_eq!(session.phase(), SessionPhase::Viewing);
        assert!(session.save_plan().is_empty());
    }

    #[tokio::test]
    async fn failed_save_keeps_buffers_for_retry() {
        let rows: Vec<RecordRow> = (0..2).map(|i| row(&format!("p{i}"), dec!(1), dec!(1))).collect();
        let edited = rows[0].id;
        let removed = rows[1].id;

        let mut session = EditSession::new(10);
        session.load_page(1, rows, 2);
        session.begin_editing(&signed_in()).unwrap();
        session
            .edit_cell(1, edited, CellEdit::Amount(dec!(5)))
            .unwrap();
        session.mark_deleted(1, removed).unwrap();

        let writer = FakeWriter {
            fail_deletes: true,
            ..Default::default()
        };
        assert!(session.save(&writer).await.is_err());

        // Back in editing with the full plan intact; the update that
        // already landed is not rolled back.
        assert_eq!(session.phase(), SessionPhase::Editing);
        let plan = session.save_plan();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.deletes, vec![removed]);
    }

    #[test]
    fn cancel_discards_everything_without_calls() {
        let target = row("Gadget", dec!(1), dec!(1));
        let id = target.id;
        let mut session = EditSession::new(10);
        session.load_page(1, vec![target], 1);
        session.begin_editing(&signed_in()).unwrap();
        session.mark_deleted(1, id).unwrap();

        session.cancel();
        assert_eq!(session.phase(), SessionPhase::Viewing);
        assert!(session.save_plan().is_empty());
        assert_eq!(session.deleted_count(), 0);
    }

    #[test]
    fn topic_switch_mid_edit_needs_confirmation() {
        let target = row("Gadget", dec!(1), dec!(1));
        let mut session = EditSession::new(10);
        session.load_page(1, vec![target], 1);

        assert_eq!(session.request_topic_switch(), TopicSwitch::Switched);

        session.load_page(1, vec![row("Widget", dec!(1), dec!(1))], 1);
        session.begin_editing(&signed_in()).unwrap();
        assert_eq!(
            session.request_topic_switch(),
            TopicSwitch::NeedsConfirmation
        );

        session.confirm_topic_switch();
        assert_eq!(session.phase(), SessionPhase::Viewing);
        assert_eq!(session.displayed_total(), 0);
    }

    #[test]
    fn visible_rows_flag_deleted_entries() {
        let target = row("Gadget", dec!(1), dec!(1));
        let id = target.id;
        let mut session = EditSession::new(10);
        session.load_page(1, vec![target], 1);
        session.begin_editing(&signed_in()).unwrap();
        session.mark_deleted(1, id).unwrap();

        let visible = session.visible_rows(1);
        assert_eq!(visible.len(), 1);
        assert!(visible[0].1);
    }
}
