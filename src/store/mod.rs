//! Persistence gateway.
//!
//! ## Overview
//!
//! Every read, write and subscription goes through the [`CellStore`] trait.
//! Backends perform no retries; all failures come back as
//! [`StoreError`](crate::errors::StoreError) for the caller to handle.
//!
//! ```text
//! ┌────────────────────┐         ┌──────────────────────────────────────┐
//! │ reconcile.rs       │         │ rest.rs      RestStore (PostgREST)   │
//! │ dashboard/         │ ──────> │   └─ realtime.rs  Phoenix channel    │
//! │   (Arc<dyn         │  trait  │ sqlite.rs    SqliteStore (rusqlite)  │
//! │    CellStore>)     │ <────── │   └─ broadcast change feed           │
//! └────────────────────┘  events └──────────────────────────────────────┘
//! ```
//!
//! | Module     | Responsibility                                         |
//! |------------|--------------------------------------------------------|
//! | `rest`     | Hosted store over HTTP; unconfigured mode fails fast   |
//! | `realtime` | `cells` change notifications over a WebSocket channel  |
//! | `sqlite`   | Local file/in-memory store with an in-process feed     |

pub mod realtime;
pub mod rest;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use kennel_common::{
    CageConfiguration, CellRecord, ChangeEvent, ConfigurationUpdate, NewCell, WalkState,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Backend, KennelToml};
use crate::errors::StoreError;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// Buffered change events per subscription before the producer waits.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 256;

/// Abstraction over the remote relational store.
/// Real implementations: `RestStore`, `SqliteStore`.
#[async_trait]
pub trait CellStore: Send + Sync {
    /// All cells, ordered by cage number then cell side.
    async fn fetch_cells(&self) -> Result<Vec<CellRecord>, StoreError>;

    /// Cells belonging to one cage, in no particular order.
    async fn fetch_cage_cells(&self, cage_num: i32) -> Result<Vec<CellRecord>, StoreError>;

    /// All cage configurations, ordered by cage number.
    async fn fetch_configurations(&self) -> Result<Vec<CageConfiguration>, StoreError>;

    async fn update_state(&self, id: i64, state: WalkState) -> Result<CellRecord, StoreError>;

    /// Notes are trimmed; an empty result is stored as absent.
    async fn update_notes(&self, id: i64, notes: &str) -> Result<CellRecord, StoreError>;

    async fn insert_cells(&self, cells: &[NewCell]) -> Result<Vec<CellRecord>, StoreError>;

    async fn delete_cell(&self, id: i64) -> Result<(), StoreError>;

    async fn upsert_configurations(&self, rows: &[ConfigurationUpdate]) -> Result<(), StoreError>;

    /// Subscribe to insert/update/delete notifications on the cells table.
    async fn subscribe(&self) -> Result<Subscription, StoreError>;

    async fn upsert_configuration(&self, cage_num: i32, is_split: bool) -> Result<(), StoreError> {
        self.upsert_configurations(&[ConfigurationUpdate { cage_num, is_split }])
            .await
    }
}

/// Open the store selected by the configuration.
///
/// The hosted backend never fails here: without valid credentials it is
/// built in unconfigured mode and every operation fails instead.
pub fn open(config: &KennelToml) -> Result<Arc<dyn CellStore>> {
    match config.store.backend {
        Backend::Supabase => Ok(Arc::new(RestStore::from_config(
            &config.store,
            &config.realtime,
        ))),
        Backend::Sqlite => {
            let path = &config.store.db_path;
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Handle for a live change feed.
///
/// The producer task is cancelled when the handle is dropped, so the feed is
/// released on every exit path. [`Subscription::unsubscribe`] additionally
/// waits for the producer to finish its own teardown.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(
        events: mpsc::Receiver<ChangeEvent>,
        cancel: CancellationToken,
        producer: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            cancel,
            producer: Some(producer),
        }
    }

    /// Next change event, or `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the feed and wait for the producer to shut down.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(producer) = self.producer.take()
            && let Err(e) = producer.await
        {
            tracing::warn!("change feed task ended abnormally: {}", e);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
