//! Test double: a [`SqliteStore`] whose operations can be made to fail.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kennel_common::{
    CageConfiguration, CellRecord, ConfigurationUpdate, NewCell, WalkState,
};

use super::{CellStore, SqliteStore, Subscription};
use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchCells,
    FetchCageCells,
    FetchConfigurations,
    UpdateState,
    UpdateNotes,
    InsertCells,
    DeleteCell,
    UpsertConfigurations,
    Subscribe,
}

pub struct FlakyStore {
    pub inner: SqliteStore,
    failing: Mutex<HashSet<Op>>,
    message: Mutex<String>,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            failing: Mutex::new(HashSet::new()),
            message: Mutex::new("connection reset by peer".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn fail_with(&self, op: Op, message: &str) {
        *self.message.lock().unwrap() = message.to_string();
        self.fail(op);
    }

    pub fn heal(&self, op: Op) {
        self.failing.lock().unwrap().remove(&op);
    }

    /// Number of operations attempted so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, op: Op) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&op) {
            let message = self.message.lock().unwrap().clone();
            return Err(StoreError::backend("injected", message));
        }
        Ok(())
    }
}

#[async_trait]
impl CellStore for FlakyStore {
    async fn fetch_cells(&self) -> Result<Vec<CellRecord>, StoreError> {
        self.check(Op::FetchCells)?;
        self.inner.fetch_cells().await
    }

    async fn fetch_cage_cells(&self, cage_num: i32) -> Result<Vec<CellRecord>, StoreError> {
        self.check(Op::FetchCageCells)?;
        self.inner.fetch_cage_cells(cage_num).await
    }

    async fn fetch_configurations(&self) -> Result<Vec<CageConfiguration>, StoreError> {
        self.check(Op::FetchConfigurations)?;
        self.inner.fetch_configurations().await
    }

    async fn update_state(&self, id: i64, state: WalkState) -> Result<CellRecord, StoreError> {
        self.check(Op::UpdateState)?;
        self.inner.update_state(id, state).await
    }

    async fn update_notes(&self, id: i64, notes: &str) -> Result<CellRecord, StoreError> {
        self.check(Op::UpdateNotes)?;
        self.inner.update_notes(id, notes).await
    }

    async fn insert_cells(&self, cells: &[NewCell]) -> Result<Vec<CellRecord>, StoreError> {
        self.check(Op::InsertCells)?;
        self.inner.insert_cells(cells).await
    }

    async fn delete_cell(&self, id: i64) -> Result<(), StoreError> {
        self.check(Op::DeleteCell)?;
        self.inner.delete_cell(id).await
    }

    async fn upsert_configurations(&self, rows: &[ConfigurationUpdate]) -> Result<(), StoreError> {
        self.check(Op::UpsertConfigurations)?;
        self.inner.upsert_configurations(rows).await
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        self.check(Op::Subscribe)?;
        self.inner.subscribe().await
    }
}
