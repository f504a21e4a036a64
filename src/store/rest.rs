use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kennel_common::{
    CageConfiguration, CellRecord, ConfigurationUpdate, NewCell, WalkState, normalize_notes,
};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::realtime::{self, RealtimeOptions};
use super::{CellStore, Subscription};
use crate::config::{RealtimeSection, StoreSection};
use crate::errors::StoreError;

const CELLS_TABLE: &str = "cells";
const CONFIGURATIONS_TABLE: &str = "cage_configurations";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway to the hosted store's PostgREST interface.
///
/// Constructed in unconfigured mode when the URL or key is missing or
/// malformed; every operation then fails with
/// [`StoreError::NotConfigured`] without touching the network.
pub struct RestStore {
    conn: Result<RestConnection, String>,
}

struct RestConnection {
    client: reqwest::Client,
    base_url: Url,
    anon_key: String,
    realtime: RealtimeOptions,
}

#[derive(Serialize)]
struct StatePatch {
    state: WalkState,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct NotesPatch {
    notes: Option<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct CellInsert<'a> {
    #[serde(flatten)]
    cell: &'a NewCell,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ConfigurationUpsert {
    cage_num: i32,
    is_split: bool,
    updated_at: DateTime<Utc>,
}

impl RestStore {
    pub fn new(url: Option<&str>, anon_key: Option<&str>, realtime: RealtimeOptions) -> Self {
        let conn = validate_credentials(url, anon_key).and_then(|(base_url, anon_key)| {
            let client = reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
            Ok(RestConnection {
                client,
                base_url,
                anon_key,
                realtime,
            })
        });

        if let Err(reason) = &conn {
            tracing::warn!("hosted store unconfigured: {}", reason);
        }
        Self { conn }
    }

    pub fn from_config(store: &StoreSection, realtime: &RealtimeSection) -> Self {
        Self::new(
            store.url.as_deref(),
            store.anon_key.as_deref(),
            RealtimeOptions::from(realtime),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.conn.is_ok()
    }

    fn conn(&self) -> Result<&RestConnection, StoreError> {
        self.conn.as_ref().map_err(|reason| StoreError::NotConfigured {
            reason: reason.clone(),
        })
    }
}

/// Check the endpoint and key without any network I/O.
fn validate_credentials(
    url: Option<&str>,
    anon_key: Option<&str>,
) -> Result<(Url, String), String> {
    let url = url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "store URL is not set".to_string())?;
    let anon_key = anon_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| "store access key is not set".to_string())?;

    let mut base_url = Url::parse(url).map_err(|e| format!("invalid store URL '{}': {}", url, e))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(format!("store URL must be http(s), got '{}'", url));
    }
    if base_url.host_str().is_none() {
        return Err(format!("store URL has no host: '{}'", url));
    }
    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(&path);
    }
    Ok((base_url, anon_key.to_string()))
}

impl RestConnection {
    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| StoreError::backend("build request", e.to_string()))
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .client
            .request(method, self.table_url(table)?)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key)))
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::backend(operation, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        tracing::warn!("{} failed: {}", operation, message);
        Err(StoreError::backend(operation, message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, StoreError> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StoreError::backend(operation, format!("invalid response: {}", e)))
    }

    /// PATCH one cell and return the updated row.
    async fn patch_cell<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        id: i64,
        body: &B,
    ) -> Result<CellRecord, StoreError> {
        let request = self
            .request(Method::PATCH, CELLS_TABLE)?
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(body);
        let rows: Vec<CellRecord> = self.send_json(operation, request).await?;
        rows.into_iter().next().ok_or(StoreError::RowNotFound { id })
    }
}

/// Pull the human-readable message out of a PostgREST error body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, body.trim())
            }
        })
}

#[async_trait]
impl CellStore for RestStore {
    async fn fetch_cells(&self) -> Result<Vec<CellRecord>, StoreError> {
        let conn = self.conn()?;
        let request = conn
            .request(Method::GET, CELLS_TABLE)?
            .query(&[("select", "*"), ("order", "cage_num.asc,cell_side.asc")]);
        conn.send_json("fetch cells", request).await
    }

    async fn fetch_cage_cells(&self, cage_num: i32) -> Result<Vec<CellRecord>, StoreError> {
        let conn = self.conn()?;
        let request = conn
            .request(Method::GET, CELLS_TABLE)?
            .query(&[("select", "*".to_string()), ("cage_num", format!("eq.{}", cage_num))]);
        conn.send_json("fetch cage cells", request).await
    }

    async fn fetch_configurations(&self) -> Result<Vec<CageConfiguration>, StoreError> {
        let conn = self.conn()?;
        let request = conn
            .request(Method::GET, CONFIGURATIONS_TABLE)?
            .query(&[("select", "*"), ("order", "cage_num.asc")]);
        conn.send_json("fetch configurations", request).await
    }

    async fn update_state(&self, id: i64, state: WalkState) -> Result<CellRecord, StoreError> {
        let conn = self.conn()?;
        let patch = StatePatch {
            state,
            updated_at: Utc::now(),
        };
        conn.patch_cell("update state", id, &patch).await
    }

    async fn update_notes(&self, id: i64, notes: &str) -> Result<CellRecord, StoreError> {
        let conn = self.conn()?;
        let patch = NotesPatch {
            notes: normalize_notes(notes),
            updated_at: Utc::now(),
        };
        conn.patch_cell("update notes", id, &patch).await
    }

    async fn insert_cells(&self, cells: &[NewCell]) -> Result<Vec<CellRecord>, StoreError> {
        let conn = self.conn()?;
        if cells.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let rows: Vec<CellInsert<'_>> = cells
            .iter()
            .map(|cell| CellInsert {
                cell,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let request = conn
            .request(Method::POST, CELLS_TABLE)?
            .header("Prefer", "return=representation")
            .json(&rows);
        conn.send_json("insert cells", request).await
    }

    async fn delete_cell(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let request = conn
            .request(Method::DELETE, CELLS_TABLE)?
            .query(&[("id", format!("eq.{}", id))]);
        conn.send("delete cell", request).await?;
        Ok(())
    }

    async fn upsert_configurations(&self, rows: &[ConfigurationUpdate]) -> Result<(), StoreError> {
        let conn = self.conn()?;
        if rows.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let rows: Vec<ConfigurationUpsert> = rows
            .iter()
            .map(|row| ConfigurationUpsert {
                cage_num: row.cage_num,
                is_split: row.is_split,
                updated_at: now,
            })
            .collect();
        let request = conn
            .request(Method::POST, CONFIGURATIONS_TABLE)?
            .query(&[("on_conflict", "cage_num")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        conn.send("upsert configurations", request).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let conn = self.conn()?;
        let url = realtime::socket_url(&conn.base_url, &conn.anon_key)?;
        realtime::subscribe_cells(url, conn.anon_key.clone(), conn.realtime.clone()).await
    }
}
