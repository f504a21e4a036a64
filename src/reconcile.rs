//! Cage reconciliation: keep a cage's cell rows consistent with its
//! split/combined configuration.
//!
//! A cage is either combined (one `Both` row) or split (one `Inner` row and
//! one `Outer` row). Switching shape deletes the superseded rows and inserts
//! the new ones, carrying state and notes across with the merge policy in
//! [`merge_state`] and [`merge_notes`]. The configuration flag is upserted
//! after the rows have been rewritten.
//!
//! Nothing here is atomic against store failures: a failure between a delete
//! and the following insert leaves the cage with fewer rows and is reported
//! to the caller as is. Toggles of the same cage are serialized within this
//! process only; two processes toggling one cage can still interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kennel_common::{CageConfiguration, CellRecord, CellSide, ConfigurationUpdate, NewCell, WalkState};

use crate::errors::StoreError;
use crate::store::CellStore;

/// What a reconciliation did to the cell rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A `Both` row was replaced by `Inner` and `Outer` copies.
    SplitFromCombined,
    /// The cage was already split; this many missing sides were created.
    CreatedMissing(usize),
    /// `Inner`/`Outer` rows were merged into one `Both` row.
    Combined,
    /// Rows already matched the requested shape.
    Unchanged,
}

/// Combined state for two sides: `Walked` wins over `DoNotWalk`, which wins
/// over `NotYet`. A missing side contributes nothing.
pub fn merge_state(inner: Option<WalkState>, outer: Option<WalkState>) -> WalkState {
    let sides = [inner, outer];
    if sides.contains(&Some(WalkState::Walked)) {
        WalkState::Walked
    } else if sides.contains(&Some(WalkState::DoNotWalk)) {
        WalkState::DoNotWalk
    } else {
        WalkState::NotYet
    }
}

/// Inner then outer notes joined with `"; "`, skipping absent or empty ones.
pub fn merge_notes(inner: Option<&str>, outer: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [inner, outer]
        .into_iter()
        .flatten()
        .filter(|n| !n.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

/// Per-cage locks so two toggles of one cage in this process never overlap.
#[derive(Default)]
struct CageLocks {
    locks: Mutex<HashMap<i32, Arc<tokio::sync::Mutex<()>>>>,
}

impl CageLocks {
    fn lock_for(&self, cage_num: i32) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(cage_num).or_default().clone()
    }
}

pub struct CageReconciler {
    store: Arc<dyn CellStore>,
    locks: CageLocks,
}

impl CageReconciler {
    pub fn new(store: Arc<dyn CellStore>) -> Self {
        Self {
            store,
            locks: CageLocks::default(),
        }
    }

    /// Rewrite the cage's rows to the requested shape, then persist the flag.
    ///
    /// The flag is upserted even when the rows already matched.
    pub async fn set_split(
        &self,
        cage_num: i32,
        is_split: bool,
    ) -> Result<ReconcileOutcome, StoreError> {
        let lock = self.locks.lock_for(cage_num);
        let _guard = lock.lock().await;
        self.reshape(cage_num, is_split).await
    }

    /// Flip the cage's current configuration. A cage without a configuration
    /// row counts as split, the seeded default.
    ///
    /// The current flag is read under the cage lock so concurrent toggles
    /// each see the previous one's result.
    pub async fn toggle(&self, cage_num: i32) -> Result<(bool, ReconcileOutcome), StoreError> {
        let lock = self.locks.lock_for(cage_num);
        let _guard = lock.lock().await;

        let configurations = self.store.fetch_configurations().await?;
        let is_split = !current_split(&configurations, cage_num);
        let outcome = self.reshape(cage_num, is_split).await?;
        Ok((is_split, outcome))
    }

    /// Caller holds the cage lock.
    async fn reshape(
        &self,
        cage_num: i32,
        is_split: bool,
    ) -> Result<ReconcileOutcome, StoreError> {
        let outcome = if is_split {
            self.ensure_split(cage_num).await?
        } else {
            self.ensure_combined(cage_num).await?
        };
        self.store.upsert_configuration(cage_num, is_split).await?;

        tracing::info!(
            cage_num,
            is_split,
            ?outcome,
            "cage configuration updated"
        );
        Ok(outcome)
    }

    async fn ensure_split(&self, cage_num: i32) -> Result<ReconcileOutcome, StoreError> {
        let existing = self.store.fetch_cage_cells(cage_num).await?;

        if let Some(both) = find_side(&existing, CellSide::Both) {
            let state = both.state;
            let notes = both.notes.clone();
            // Clear every row so the result is exactly {Inner, Outer}.
            for cell in &existing {
                self.store.delete_cell(cell.id).await?;
            }
            let copies: Vec<NewCell> = [CellSide::Inner, CellSide::Outer]
                .into_iter()
                .map(|cell_side| NewCell {
                    cage_num,
                    cell_side,
                    state,
                    notes: notes.clone(),
                })
                .collect();
            self.store.insert_cells(&copies).await?;
            return Ok(ReconcileOutcome::SplitFromCombined);
        }

        let missing: Vec<NewCell> = [CellSide::Inner, CellSide::Outer]
            .into_iter()
            .filter(|side| find_side(&existing, *side).is_none())
            .map(|side| NewCell::fresh(cage_num, side))
            .collect();
        if missing.is_empty() {
            return Ok(ReconcileOutcome::Unchanged);
        }
        self.store.insert_cells(&missing).await?;
        Ok(ReconcileOutcome::CreatedMissing(missing.len()))
    }

    async fn ensure_combined(&self, cage_num: i32) -> Result<ReconcileOutcome, StoreError> {
        let existing = self.store.fetch_cage_cells(cage_num).await?;
        let inner = find_side(&existing, CellSide::Inner);
        let outer = find_side(&existing, CellSide::Outer);

        if find_side(&existing, CellSide::Both).is_some() || (inner.is_none() && outer.is_none()) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let combined = NewCell {
            cage_num,
            cell_side: CellSide::Both,
            state: merge_state(inner.map(|c| c.state), outer.map(|c| c.state)),
            notes: merge_notes(
                inner.and_then(|c| c.notes.as_deref()),
                outer.and_then(|c| c.notes.as_deref()),
            ),
        };

        for cell in &existing {
            self.store.delete_cell(cell.id).await?;
        }
        self.store.insert_cells(&[combined]).await?;
        Ok(ReconcileOutcome::Combined)
    }

    /// Create the `Inner` and `Outer` rows of a cage that has none yet.
    ///
    /// A cage that already has rows is left alone and its rows returned.
    pub async fn initialize_cage(&self, cage_num: i32) -> Result<Vec<CellRecord>, StoreError> {
        let lock = self.locks.lock_for(cage_num);
        let _guard = lock.lock().await;

        let existing = self.store.fetch_cage_cells(cage_num).await?;
        if !existing.is_empty() {
            tracing::info!(cage_num, "cage already initialized");
            return Ok(existing);
        }
        self.store
            .insert_cells(&[
                NewCell::fresh(cage_num, CellSide::Inner),
                NewCell::fresh(cage_num, CellSide::Outer),
            ])
            .await
    }

    /// Upsert split configurations for cages `1..=count`.
    pub async fn seed_default_configurations(&self, count: i32) -> Result<usize, StoreError> {
        let rows: Vec<ConfigurationUpdate> = (1..=count)
            .map(|cage_num| ConfigurationUpdate {
                cage_num,
                is_split: true,
            })
            .collect();
        self.store.upsert_configurations(&rows).await?;
        Ok(rows.len())
    }
}

fn find_side(cells: &[CellRecord], side: CellSide) -> Option<&CellRecord> {
    cells.iter().find(|c| c.cell_side == side)
}

fn current_split(configurations: &[CageConfiguration], cage_num: i32) -> bool {
    configurations
        .iter()
        .find(|c| c.cage_num == cage_num)
        .is_none_or(|c| c.is_split)
}
