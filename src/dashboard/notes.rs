//! Per-cell notes buffers with a quiescence-delayed write.
//!
//! Each cell has at most one pending write. A new edit aborts it and
//! schedules another; blurring aborts it and writes inline. The buffer
//! outlives a failed write so the text the user typed stays visible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use kennel_common::{CellRecord, MAX_NOTES_LEN, clamp_notes};
use tokio::task::JoinHandle;

use super::Dashboard;
use crate::errors::StoreError;

#[derive(Default)]
struct Slot {
    text: String,
    /// Edit that produced `text`.
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

pub(super) struct NoteBuffers {
    quiescence: Duration,
    next_generation: AtomicU64,
    slots: Mutex<HashMap<i64, Slot>>,
}

impl NoteBuffers {
    pub(super) fn new(quiescence: Duration) -> Self {
        Self {
            quiescence,
            next_generation: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<i64, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Abort the pending write and return the generation of the buffer.
    fn cancel_pending(&self, id: i64) -> Option<u64> {
        let mut slots = self.slots();
        let slot = slots.get_mut(&id)?;
        if let Some(pending) = slot.pending.take() {
            pending.abort();
        }
        Some(slot.generation)
    }

    fn text(&self, id: i64) -> Option<String> {
        self.slots().get(&id).map(|slot| slot.text.clone())
    }

    /// Drop the buffer unless a newer edit arrived meanwhile.
    fn finish(&self, id: i64, generation: u64) {
        let mut slots = self.slots();
        if slots.get(&id).is_some_and(|slot| slot.generation == generation) {
            slots.remove(&id);
        }
    }

    pub(super) fn discard(&self, id: i64) {
        if let Some(slot) = self.slots().remove(&id)
            && let Some(pending) = slot.pending
        {
            pending.abort();
        }
    }
}

impl Dashboard {
    /// Buffer new notes text for a cell and (re)start its quiescence timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn edit_notes(&self, id: i64, text: &str) {
        let notes = &self.shared.notes;
        let generation = notes.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut slots = notes.slots();
        let slot = slots.entry(id).or_default();
        slot.text = clamp_notes(text);
        slot.generation = generation;
        if let Some(pending) = slot.pending.take() {
            pending.abort();
        }

        let dashboard = self.clone();
        let quiescence = notes.quiescence;
        slot.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiescence).await;
            // Failures are logged by persist_notes.
            let _ = dashboard.persist_notes(id, generation).await;
        }));
    }

    /// Write the buffered notes now, skipping the quiescence window.
    ///
    /// Returns `Ok(None)` when nothing was buffered for the cell.
    pub async fn blur_notes(&self, id: i64) -> Result<Option<CellRecord>, StoreError> {
        match self.shared.notes.cancel_pending(id) {
            Some(generation) => self.persist_notes(id, generation).await,
            None => Ok(None),
        }
    }

    async fn persist_notes(
        &self,
        id: i64,
        generation: u64,
    ) -> Result<Option<CellRecord>, StoreError> {
        let Some(text) = self.shared.notes.text(id) else {
            return Ok(None);
        };

        match self.shared.store.update_notes(id, &text).await {
            Ok(row) => {
                self.update(|s| {
                    if let Some(cell) = s.cell_mut(id) {
                        *cell = row.clone();
                    }
                });
                self.shared.notes.finish(id, generation);
                tracing::debug!(id, "notes saved");
                Ok(Some(row))
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "failed to save notes");
                Err(e)
            }
        }
    }

    /// Text shown in the editor: the buffer if any, else the stored notes.
    pub fn notes_text(&self, id: i64) -> String {
        if let Some(text) = self.shared.notes.text(id) {
            return text;
        }
        self.shared
            .state
            .borrow()
            .cell(id)
            .and_then(|c| c.notes.clone())
            .unwrap_or_default()
    }

    pub fn notes_counter(&self, id: i64) -> String {
        format!("{}/{}", self.notes_text(id).chars().count(), MAX_NOTES_LEN)
    }

    pub fn has_unsaved_notes(&self, id: i64) -> bool {
        self.shared.notes.text(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CellStore;
    use crate::store::testing::{FlakyStore, Op};
    use kennel_common::{CellSide, NewCell};
    use std::sync::Arc;

    const QUIESCENCE: Duration = Duration::from_millis(50);
    const SETTLE: Duration = Duration::from_millis(300);

    async fn setup() -> (Arc<FlakyStore>, Dashboard, i64) {
        let store = Arc::new(FlakyStore::new());
        let id = store
            .inner
            .insert_cells(&[NewCell::fresh(1, CellSide::Both)])
            .await
            .unwrap()[0]
            .id;
        let dashboard = Dashboard::new(store.clone(), QUIESCENCE);
        dashboard.load().await.unwrap();
        (store, dashboard, id)
    }

    async fn stored_notes(store: &FlakyStore, id: i64) -> Option<String> {
        store
            .inner
            .fetch_cells()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == id)
            .and_then(|c| c.notes)
    }

    #[tokio::test]
    async fn test_burst_of_edits_writes_once() {
        let (store, dashboard, id) = setup().await;
        let before = store.calls();

        dashboard.edit_notes(id, "a");
        dashboard.edit_notes(id, "ab");
        dashboard.edit_notes(id, "abc");
        assert_eq!(dashboard.notes_text(id), "abc");

        tokio::time::sleep(SETTLE).await;
        assert_eq!(store.calls() - before, 1);
        assert_eq!(stored_notes(&store, id).await.as_deref(), Some("abc"));
        assert_eq!(
            dashboard.snapshot().cell(id).unwrap().notes.as_deref(),
            Some("abc")
        );
        assert!(!dashboard.has_unsaved_notes(id));
    }

    #[tokio::test]
    async fn test_blur_writes_inline_and_cancels_timer() {
        let (store, dashboard, id) = setup().await;
        let before = store.calls();

        dashboard.edit_notes(id, "  limps on left leg  ");
        let row = dashboard.blur_notes(id).await.unwrap().unwrap();
        assert_eq!(row.notes.as_deref(), Some("limps on left leg"));

        tokio::time::sleep(SETTLE).await;
        assert_eq!(store.calls() - before, 1);
    }

    #[tokio::test]
    async fn test_blank_notes_become_absent() {
        let (store, dashboard, id) = setup().await;
        dashboard.edit_notes(id, "temp");
        dashboard.blur_notes(id).await.unwrap();
        dashboard.edit_notes(id, "   ");
        let row = dashboard.blur_notes(id).await.unwrap().unwrap();
        assert_eq!(row.notes, None);
        assert_eq!(stored_notes(&store, id).await, None);
    }

    #[tokio::test]
    async fn test_blur_without_edits_does_nothing() {
        let (store, dashboard, id) = setup().await;
        let before = store.calls();
        assert_eq!(dashboard.blur_notes(id).await.unwrap(), None);
        assert_eq!(store.calls(), before);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_buffer() {
        let (store, dashboard, id) = setup().await;
        store.fail(Op::UpdateNotes);

        dashboard.edit_notes(id, "needs meds");
        assert!(dashboard.blur_notes(id).await.is_err());
        assert!(dashboard.has_unsaved_notes(id));
        assert_eq!(dashboard.notes_text(id), "needs meds");
        assert_eq!(dashboard.snapshot().cell(id).unwrap().notes, None);

        store.heal(Op::UpdateNotes);
        dashboard.blur_notes(id).await.unwrap();
        assert!(!dashboard.has_unsaved_notes(id));
        assert_eq!(stored_notes(&store, id).await.as_deref(), Some("needs meds"));
    }

    #[tokio::test]
    async fn test_notes_clamped_and_counted() {
        let (_store, dashboard, id) = setup().await;
        assert_eq!(dashboard.notes_counter(id), "0/500");

        dashboard.edit_notes(id, &"x".repeat(650));
        assert_eq!(dashboard.notes_text(id).chars().count(), MAX_NOTES_LEN);
        assert_eq!(dashboard.notes_counter(id), "500/500");
    }

    #[tokio::test]
    async fn test_notes_text_falls_back_to_stored() {
        let (store, dashboard, id) = setup().await;
        store.inner.update_notes(id, "stored").await.unwrap();
        dashboard.load().await.unwrap();
        assert_eq!(dashboard.notes_text(id), "stored");
        assert_eq!(dashboard.notes_counter(id), "6/500");
    }
}
