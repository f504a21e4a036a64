//! Dashboard state controller.
//!
//! [`Dashboard`] owns the in-memory cell and configuration lists for as long
//! as a board is shown. Every mutation goes through a `watch` channel, so a
//! reader always sees a whole [`DashboardState`] snapshot and renderers can
//! await the next one.
//!
//! Cell state changes are applied optimistically and confirmed by the store;
//! a failed write is repaired by reloading from the store rather than by
//! undoing the local change. Live notifications from [`Dashboard::connect`]
//! are folded into the same snapshot.

pub mod notes;
pub mod view;

use std::sync::Arc;
use std::time::Duration;

use kennel_common::{CageConfiguration, CellRecord, ChangeEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::{LoadError, StoreError};
use crate::reconcile::{CageReconciler, ReconcileOutcome};
use crate::store::CellStore;

use notes::NoteBuffers;
pub use view::{BoardStats, CageGroup};

/// One consistent view of the board.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub cells: Vec<CellRecord>,
    pub configurations: Vec<CageConfiguration>,
    /// A change feed is connected.
    pub live: bool,
    pub loading: bool,
    pub error: Option<LoadError>,
    /// Cage whose configuration is being rewritten.
    pub saving_cage: Option<i32>,
}

impl DashboardState {
    pub fn groups(&self) -> Vec<CageGroup<'_>> {
        view::group_by_cage(&self.cells)
    }

    pub fn stats(&self) -> BoardStats {
        BoardStats::from_cells(&self.cells)
    }

    pub fn cell(&self, id: i64) -> Option<&CellRecord> {
        self.cells.iter().find(|c| c.id == id)
    }

    fn cell_mut(&mut self, id: i64) -> Option<&mut CellRecord> {
        self.cells.iter_mut().find(|c| c.id == id)
    }

    pub fn configuration(&self, cage_num: i32) -> Option<&CageConfiguration> {
        self.configurations.iter().find(|c| c.cage_num == cage_num)
    }

    /// Cages without a configuration row count as split.
    pub fn is_split(&self, cage_num: i32) -> bool {
        self.configuration(cage_num).is_none_or(|c| c.is_split)
    }

    fn upsert_cell(&mut self, row: CellRecord) {
        match self.cell_mut(row.id) {
            Some(existing) => *existing = row,
            None => self.cells.push(row),
        }
    }

    fn set_configuration(&mut self, cage_num: i32, is_split: bool) {
        if let Some(config) = self.configurations.iter_mut().find(|c| c.cage_num == cage_num) {
            config.is_split = is_split;
            return;
        }
        let at = self
            .configurations
            .partition_point(|c| c.cage_num < cage_num);
        self.configurations.insert(
            at,
            CageConfiguration {
                cage_num,
                is_split,
                created_at: None,
                updated_at: None,
            },
        );
    }
}

struct Shared {
    store: Arc<dyn CellStore>,
    state: watch::Sender<DashboardState>,
    notes: NoteBuffers,
}

/// Cheaply cloneable handle to one board's state.
#[derive(Clone)]
pub struct Dashboard {
    shared: Arc<Shared>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn CellStore>, notes_quiescence: Duration) -> Self {
        let (state, _) = watch::channel(DashboardState {
            loading: true,
            ..DashboardState::default()
        });
        Self {
            shared: Arc::new(Shared {
                store,
                state,
                notes: NoteBuffers::new(notes_quiescence),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn CellStore> {
        &self.shared.store
    }

    pub fn snapshot(&self) -> DashboardState {
        self.shared.state.borrow().clone()
    }

    /// Receiver that is notified after every mutation.
    pub fn watch(&self) -> watch::Receiver<DashboardState> {
        self.shared.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut DashboardState)) {
        self.shared.state.send_modify(f);
    }

    /// Replace both lists with a fresh read from the store.
    ///
    /// On failure the previous lists are kept and the classified error is
    /// recorded in the snapshot as well as returned.
    pub async fn load(&self) -> Result<(), LoadError> {
        self.update(|s| s.loading = true);

        let store = &self.shared.store;
        let (cells, configurations) =
            tokio::join!(store.fetch_cells(), store.fetch_configurations());

        match cells.and_then(|cells| configurations.map(|configs| (cells, configs))) {
            Ok((cells, configurations)) => {
                tracing::debug!(
                    cells = cells.len(),
                    configurations = configurations.len(),
                    "dashboard loaded"
                );
                self.update(|s| {
                    s.cells = cells;
                    s.configurations = configurations;
                    s.error = None;
                    s.loading = false;
                });
                Ok(())
            }
            Err(e) => {
                let err = LoadError::from(e);
                tracing::warn!(error = %err, "dashboard load failed");
                self.update(|s| {
                    s.error = Some(err.clone());
                    s.loading = false;
                });
                Err(err)
            }
        }
    }

    /// Fold one change notification into the snapshot.
    ///
    /// An insert for an id already present replaces that row, and an update
    /// for an unknown id is dropped. Unrecognized events trigger a reload.
    pub async fn apply_change(&self, event: ChangeEvent) {
        tracing::debug!(kind = event.kind(), "change received");
        match event {
            ChangeEvent::Insert(row) => self.update(|s| {
                s.live = true;
                s.upsert_cell(row);
            }),
            ChangeEvent::Update { new, .. } => self.update(|s| {
                s.live = true;
                if let Some(existing) = s.cell_mut(new.id) {
                    *existing = new;
                }
            }),
            ChangeEvent::Delete(key) => {
                self.shared.notes.discard(key.id);
                self.update(|s| {
                    s.live = true;
                    s.cells.retain(|c| c.id != key.id);
                });
            }
            ChangeEvent::Other { kind } => {
                self.update(|s| s.live = true);
                tracing::info!(kind = %kind, "unrecognized change, reloading");
                // The failure is already recorded in the snapshot.
                let _ = self.load().await;
            }
        }
    }

    /// Subscribe to store changes and apply them until the returned handle
    /// is dropped or the feed ends.
    pub async fn connect(&self) -> Result<LiveFeed, StoreError> {
        let mut subscription = self.shared.store.subscribe().await?;
        self.update(|s| s.live = true);
        tracing::info!("change feed connected");

        let dashboard = self.clone();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let pump = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    event = subscription.recv() => event,
                };
                let Some(event) = event else {
                    tracing::info!("change feed ended");
                    break;
                };
                dashboard.apply_change(event).await;
            }
            dashboard.update(|s| s.live = false);
            subscription.unsubscribe().await;
        });

        Ok(LiveFeed {
            pump: Some(pump),
            cancel,
            dashboard: self.clone(),
        })
    }

    /// Advance a cell to its next state.
    ///
    /// The new state is visible immediately. If the store rejects it, the
    /// board is reloaded and the store error returned.
    pub async fn cycle_state(&self, id: i64) -> Result<CellRecord, StoreError> {
        let current = self
            .shared
            .state
            .borrow()
            .cell(id)
            .map(|c| c.state)
            .ok_or(StoreError::RowNotFound { id })?;
        let next = current.next();

        self.update(|s| {
            if let Some(cell) = s.cell_mut(id) {
                cell.state = next;
            }
        });

        match self.shared.store.update_state(id, next).await {
            Ok(row) => {
                self.update(|s| {
                    if let Some(cell) = s.cell_mut(id) {
                        *cell = row.clone();
                    }
                });
                Ok(row)
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "state update failed, reloading");
                let _ = self.load().await;
                Err(e)
            }
        }
    }

    /// Flip a cage between split and combined from the configuration panel.
    pub async fn toggle_cage(
        &self,
        reconciler: &CageReconciler,
        cage_num: i32,
    ) -> Result<(bool, ReconcileOutcome), StoreError> {
        let _saving = SavingIndicator::start(self, cage_num);

        let (is_split, outcome) = reconciler.toggle(cage_num).await?;
        self.update(|s| s.set_configuration(cage_num, is_split));
        let _ = self.load().await;
        Ok((is_split, outcome))
    }
}

/// Clears `saving_cage` on every exit path of a toggle.
struct SavingIndicator<'a> {
    dashboard: &'a Dashboard,
}

impl<'a> SavingIndicator<'a> {
    fn start(dashboard: &'a Dashboard, cage_num: i32) -> Self {
        dashboard.update(|s| s.saving_cage = Some(cage_num));
        Self { dashboard }
    }
}

impl Drop for SavingIndicator<'_> {
    fn drop(&mut self) {
        self.dashboard.update(|s| s.saving_cage = None);
    }
}

/// A connected change feed. Dropping it stops applying changes, releases
/// the subscription and clears the live flag.
///
/// A change already being applied on another worker can still land after
/// a plain drop; `close` waits for the pump so `live` stays false.
pub struct LiveFeed {
    pump: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    dashboard: Dashboard,
}

impl LiveFeed {
    /// Whether the feed ended on its own.
    pub fn is_finished(&self) -> bool {
        self.pump.as_ref().is_none_or(|p| p.is_finished())
    }

    /// Stop the pump and wait until it can no longer touch the state.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            pump.abort();
            let _ = pump.await;
        }
        self.dashboard.update(|s| s.live = false);
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.dashboard.update(|s| s.live = false);
    }
}
