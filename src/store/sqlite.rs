use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kennel_common::{
    CageConfiguration, CellRecord, CellSide, ChangeEvent, ConfigurationUpdate, NewCell, RowKey,
    WalkState, normalize_notes,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::{CellStore, SUBSCRIPTION_BUFFER, Subscription};
use crate::errors::StoreError;

const CHANGE_FEED_CAPACITY: usize = 256;

const CELL_COLUMNS: &str = "id, cage_num, cell_side, state, notes, created_at, updated_at";

/// Local store backed by SQLite.
///
/// All access runs on tokio's blocking thread pool via `spawn_blocking`, so
/// synchronous SQLite I/O never ties up async worker threads. Every cell
/// write is published on an in-process change feed.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<std::sync::Mutex<KennelDb>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_db(KennelDb::new(path)?))
    }

    /// Create an in-memory database (for tests and throwaway sessions).
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_db(KennelDb::new_in_memory()?))
    }

    fn from_db(db: KennelDb) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            db: Arc::new(std::sync::Mutex::new(db)),
            changes,
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    async fn call<F, R>(&self, operation: &'static str, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&KennelDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.db.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await;

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::backend(operation, format!("{:#}", e))),
            Err(e) => Err(StoreError::backend(operation, format!("DB task panicked: {}", e))),
        }
    }

    fn publish(&self, event: ChangeEvent) {
        // No receivers simply means nobody is watching.
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl CellStore for SqliteStore {
    async fn fetch_cells(&self) -> Result<Vec<CellRecord>, StoreError> {
        self.call("fetch cells", |db| db.list_cells()).await
    }

    async fn fetch_cage_cells(&self, cage_num: i32) -> Result<Vec<CellRecord>, StoreError> {
        self.call("fetch cage cells", move |db| db.list_cage_cells(cage_num))
            .await
    }

    async fn fetch_configurations(&self) -> Result<Vec<CageConfiguration>, StoreError> {
        self.call("fetch configurations", |db| db.list_configurations())
            .await
    }

    async fn update_state(&self, id: i64, state: WalkState) -> Result<CellRecord, StoreError> {
        let updated = self
            .call("update state", move |db| db.update_cell_state(id, state))
            .await?
            .ok_or(StoreError::RowNotFound { id })?;
        self.publish(ChangeEvent::Update {
            new: updated.clone(),
            old: Some(RowKey { id }),
        });
        Ok(updated)
    }

    async fn update_notes(&self, id: i64, notes: &str) -> Result<CellRecord, StoreError> {
        let notes = normalize_notes(notes);
        let updated = self
            .call("update notes", move |db| db.update_cell_notes(id, notes.as_deref()))
            .await?
            .ok_or(StoreError::RowNotFound { id })?;
        self.publish(ChangeEvent::Update {
            new: updated.clone(),
            old: Some(RowKey { id }),
        });
        Ok(updated)
    }

    async fn insert_cells(&self, cells: &[NewCell]) -> Result<Vec<CellRecord>, StoreError> {
        if cells.is_empty() {
            return Ok(Vec::new());
        }
        let cells = cells.to_vec();
        let inserted = self
            .call("insert cells", move |db| db.insert_cells(&cells))
            .await?;
        for cell in &inserted {
            self.publish(ChangeEvent::Insert(cell.clone()));
        }
        Ok(inserted)
    }

    async fn delete_cell(&self, id: i64) -> Result<(), StoreError> {
        let deleted = self.call("delete cell", move |db| db.delete_cell(id)).await?;
        if deleted {
            self.publish(ChangeEvent::Delete(RowKey { id }));
        }
        Ok(())
    }

    async fn upsert_configurations(&self, rows: &[ConfigurationUpdate]) -> Result<(), StoreError> {
        let rows = rows.to_vec();
        self.call("upsert configurations", move |db| db.upsert_configurations(&rows))
            .await
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let producer = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    received = changes.recv() => match received {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!("change feed lagged, {} event(s) dropped", missed);
                            ChangeEvent::Other { kind: "lagged".to_string() }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, cancel, producer))
    }
}

/// Synchronous SQLite access. Wrapped by [`SqliteStore`] for async callers.
pub struct KennelDb {
    conn: Connection,
}

impl KennelDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS cells (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    cage_num INTEGER NOT NULL,
                    cell_side TEXT NOT NULL CHECK (cell_side IN ('Inner', 'Outer', 'Both')),
                    state INTEGER NOT NULL DEFAULT 0 CHECK (state IN (0, 1, 2)),
                    notes TEXT CHECK (notes IS NULL OR length(notes) <= 500),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS cage_configurations (
                    cage_num INTEGER PRIMARY KEY,
                    is_split INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_cells_cage ON cells(cage_num);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    pub fn list_cells(&self) -> Result<Vec<CellRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cells ORDER BY cage_num ASC, cell_side ASC",
            CELL_COLUMNS
        ))?;
        let cells = stmt
            .query_map([], row_to_cell)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read cells")?;
        Ok(cells)
    }

    pub fn list_cage_cells(&self, cage_num: i32) -> Result<Vec<CellRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cells WHERE cage_num = ?1 ORDER BY id ASC",
            CELL_COLUMNS
        ))?;
        let cells = stmt
            .query_map(params![cage_num], row_to_cell)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read cage cells")?;
        Ok(cells)
    }

    pub fn get_cell(&self, id: i64) -> Result<Option<CellRecord>> {
        let cell = self
            .conn
            .query_row(
                &format!("SELECT {} FROM cells WHERE id = ?1", CELL_COLUMNS),
                params![id],
                row_to_cell,
            )
            .optional()
            .context("Failed to read cell")?;
        Ok(cell)
    }

    pub fn update_cell_state(&self, id: i64, state: WalkState) -> Result<Option<CellRecord>> {
        let changed = self.conn.execute(
            "UPDATE cells SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![state.as_u8(), now_text(), id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_cell(id)
    }

    pub fn update_cell_notes(&self, id: i64, notes: Option<&str>) -> Result<Option<CellRecord>> {
        let changed = self.conn.execute(
            "UPDATE cells SET notes = ?1, updated_at = ?2 WHERE id = ?3",
            params![notes, now_text(), id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_cell(id)
    }

    /// Insert all cells in one transaction; either every row lands or none.
    pub fn insert_cells(&self, cells: &[NewCell]) -> Result<Vec<CellRecord>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(cells.len());
        for cell in cells {
            let now = now_text();
            tx.execute(
                "INSERT INTO cells (cage_num, cell_side, state, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    cell.cage_num,
                    cell.cell_side.as_str(),
                    cell.state.as_u8(),
                    cell.notes,
                    now
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert cell for cage {} {}",
                    cell.cage_num, cell.cell_side
                )
            })?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit()?;

        let mut inserted = Vec::with_capacity(ids.len());
        for id in ids {
            let cell = self
                .get_cell(id)?
                .ok_or_else(|| anyhow::anyhow!("Inserted cell {} vanished", id))?;
            inserted.push(cell);
        }
        Ok(inserted)
    }

    /// Returns whether a row was removed.
    pub fn delete_cell(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM cells WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn list_configurations(&self) -> Result<Vec<CageConfiguration>> {
        let mut stmt = self.conn.prepare(
            "SELECT cage_num, is_split, created_at, updated_at
             FROM cage_configurations ORDER BY cage_num ASC",
        )?;
        let configs = stmt
            .query_map([], |row| {
                Ok(CageConfiguration {
                    cage_num: row.get(0)?,
                    is_split: row.get(1)?,
                    created_at: parse_timestamp(row.get::<_, Option<String>>(2)?),
                    updated_at: parse_timestamp(row.get::<_, Option<String>>(3)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read cage configurations")?;
        Ok(configs)
    }

    pub fn upsert_configurations(&self, rows: &[ConfigurationUpdate]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for row in rows {
            let now = now_text();
            tx.execute(
                "INSERT INTO cage_configurations (cage_num, is_split, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(cage_num) DO UPDATE SET
                     is_split = excluded.is_split,
                     updated_at = excluded.updated_at",
                params![row.cage_num, row.is_split, now],
            )
            .with_context(|| format!("Failed to upsert configuration for cage {}", row.cage_num))?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_cell(row: &Row<'_>) -> rusqlite::Result<CellRecord> {
    let side: String = row.get(2)?;
    let cell_side = side.parse::<CellSide>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    let state: u8 = row.get(3)?;
    let state = WalkState::try_from(state).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Integer, e.into())
    })?;

    Ok(CellRecord {
        id: row.get(0)?,
        cage_num: row.get(1)?,
        cell_side,
        state,
        notes: row.get(4)?,
        created_at: parse_timestamp(row.get(5)?),
        updated_at: parse_timestamp(row.get(6)?),
    })
}
