//! Change notifications from the hosted store.
//!
//! The hosted store publishes row changes over a Phoenix channel on a
//! WebSocket. The client joins `realtime:<channel>` with a `postgres_changes`
//! filter for the `cells` table, keeps the socket alive with heartbeats on
//! the `phoenix` topic, and forwards each change as a [`ChangeEvent`].

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt as _, StreamExt as _};
use kennel_common::ChangeEvent;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::{SUBSCRIPTION_BUFFER, Subscription};
use crate::config::RealtimeSection;
use crate::errors::StoreError;

const PROTOCOL_VERSION: &str = "1.0.0";
const JOIN_REF: &str = "1";
const WATCHED_SCHEMA: &str = "public";
const WATCHED_TABLE: &str = "cells";
const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, WsMessage>;
type SocketSource = SplitStream<Socket>;

#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    pub channel: String,
    pub heartbeat: Duration,
    pub join_timeout: Duration,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self::from(&RealtimeSection::default())
    }
}

impl From<&RealtimeSection> for RealtimeOptions {
    fn from(section: &RealtimeSection) -> Self {
        Self {
            channel: section.channel.clone(),
            heartbeat: section.heartbeat(),
            join_timeout: section.join_timeout(),
        }
    }
}

/// A Phoenix channel frame (JSON serializer, protocol 1.0.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn new(topic: &str, event: &str, payload: serde_json::Value, msg_ref: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    /// The join request subscribing `topic` to every change on the cells table.
    pub fn join(topic: &str, access_token: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": WATCHED_SCHEMA, "table": WATCHED_TABLE }
                    ],
                    "private": false
                },
                "access_token": access_token
            }),
            msg_ref: Some(JOIN_REF.to_string()),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }

    fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(|s| s.as_str())
    }
}

/// Map a `postgres_changes` payload (`data.type`, `data.record`,
/// `data.old_record`) to a change event.
pub fn change_from_payload(payload: &serde_json::Value) -> ChangeEvent {
    let Some(data) = payload.get("data") else {
        return ChangeEvent::Other {
            kind: "unknown".to_string(),
        };
    };
    let kind = data.get("type").and_then(|t| t.as_str()).unwrap_or("unknown");
    ChangeEvent::from_parts(
        kind,
        data.get("record").cloned(),
        data.get("old_record").cloned(),
    )
}

/// Derive the realtime socket URL from the store's base URL.
pub fn socket_url(base_url: &Url, anon_key: &str) -> Result<Url, StoreError> {
    let mut url = base_url
        .join("realtime/v1/websocket")
        .map_err(|e| StoreError::backend("subscribe", e.to_string()))?;
    let scheme = if base_url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| StoreError::backend("subscribe", format!("cannot use {} for {}", scheme, base_url)))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

/// Connect, join the cells channel and start forwarding change events.
///
/// Returns once the join has been acknowledged, so a returned subscription
/// is known to be live.
pub async fn subscribe_cells(
    url: Url,
    access_token: String,
    options: RealtimeOptions,
) -> Result<Subscription, StoreError> {
    let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| StoreError::backend("subscribe", e.to_string()))?;
    let (mut sink, mut source) = socket.split();

    let topic = format!("realtime:{}", options.channel);
    send_message(&mut sink, &PhoenixMessage::join(&topic, &access_token)).await?;

    tokio::time::timeout(options.join_timeout, await_join_reply(&mut source, &topic))
        .await
        .map_err(|_| StoreError::backend("subscribe", "timed out waiting for channel join"))??;
    tracing::info!("subscribed to {} changes on {}", WATCHED_TABLE, topic);

    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let cancel = CancellationToken::new();
    let producer = tokio::spawn(run_channel_loop(
        sink,
        source,
        tx,
        cancel.clone(),
        topic,
        options.heartbeat,
    ));
    Ok(Subscription::new(rx, cancel, producer))
}

async fn send_message(sink: &mut SocketSink, message: &PhoenixMessage) -> Result<(), StoreError> {
    let text = serde_json::to_string(message)
        .map_err(|e| StoreError::backend("subscribe", e.to_string()))?;
    sink.send(WsMessage::Text(text.into()))
        .await
        .map_err(|e| StoreError::backend("subscribe", e.to_string()))
}

fn decode_frame(frame: &WsMessage) -> Option<PhoenixMessage> {
    match frame {
        WsMessage::Text(text) => serde_json::from_str(text.as_str()).ok(),
        _ => None,
    }
}

async fn await_join_reply(source: &mut SocketSource, topic: &str) -> Result<(), StoreError> {
    while let Some(frame) = source.next().await {
        let frame = frame.map_err(|e| StoreError::backend("subscribe", e.to_string()))?;
        let Some(message) = decode_frame(&frame) else {
            continue;
        };
        if message.topic != topic {
            continue;
        }
        match message.event.as_str() {
            "phx_reply" if message.msg_ref.as_deref() == Some(JOIN_REF) => {
                if message.reply_status() == Some("ok") {
                    return Ok(());
                }
                let response = message
                    .payload
                    .get("response")
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                return Err(StoreError::backend(
                    "subscribe",
                    format!("channel join rejected: {}", response),
                ));
            }
            "phx_error" | "phx_close" => {
                return Err(StoreError::backend(
                    "subscribe",
                    format!("channel closed during join ({})", message.event),
                ));
            }
            _ => {}
        }
    }
    Err(StoreError::backend(
        "subscribe",
        "connection closed before channel join",
    ))
}

/// Forward changes until cancelled, the server closes the channel, or the
/// subscriber goes away.
async fn run_channel_loop(
    mut sink: SocketSink,
    mut source: SocketSource,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
    topic: String,
    heartbeat: Duration,
) {
    let mut ticker = tokio::time::interval(heartbeat.max(MIN_HEARTBEAT));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the join just proved liveness.
    ticker.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let leave = PhoenixMessage::new(&topic, "phx_leave", json!({}), next_ref);
                if let Err(e) = send_message(&mut sink, &leave).await {
                    tracing::debug!("failed to leave {}: {}", topic, e);
                }
                let _ = sink.close().await;
                tracing::info!("unsubscribed from {}", topic);
                break;
            }
            _ = ticker.tick() => {
                let beat = PhoenixMessage::new("phoenix", "heartbeat", json!({}), next_ref);
                next_ref += 1;
                if let Err(e) = send_message(&mut sink, &beat).await {
                    tracing::warn!("realtime heartbeat failed: {}", e);
                    break;
                }
            }
            frame = source.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        tracing::warn!("realtime connection error: {}", e);
                        break;
                    }
                    None => {
                        tracing::info!("realtime connection closed");
                        break;
                    }
                };
                if matches!(frame, WsMessage::Close(_)) {
                    tracing::info!("realtime connection closed by server");
                    break;
                }
                let Some(message) = decode_frame(&frame) else {
                    continue;
                };
                if message.topic != topic {
                    continue;
                }
                match message.event.as_str() {
                    "postgres_changes" => {
                        let event = change_from_payload(&message.payload);
                        tracing::debug!("received {} change", event.kind());
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    "phx_error" | "phx_close" => {
                        tracing::warn!("realtime channel {} ended: {}", topic, message.event);
                        break;
                    }
                    "system" => {
                        tracing::debug!("realtime system message: {}", message.payload);
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_switches_scheme_and_adds_params() {
        let base = Url::parse("https://abc.supabase.co/").unwrap();
        let url = socket_url(&base, "anon").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/realtime/v1/websocket");
        let query = url.query().unwrap();
        assert!(query.contains("apikey=anon"));
        assert!(query.contains("vsn=1.0.0"));

        let local = socket_url(&Url::parse("http://127.0.0.1:54321/").unwrap(), "k").unwrap();
        assert_eq!(local.scheme(), "ws");
    }

    #[test]
    fn test_join_message_filters_cells_table() {
        let join = PhoenixMessage::join("realtime:cells-changes", "token");
        let value = serde_json::to_value(&join).unwrap();
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
        assert_eq!(value["join_ref"], "1");
        let filter = &value["payload"]["config"]["postgres_changes"][0];
        assert_eq!(filter["event"], "*");
        assert_eq!(filter["table"], "cells");
        assert_eq!(value["payload"]["access_token"], "token");
    }

    #[test]
    fn test_heartbeat_omits_join_ref() {
        let beat = PhoenixMessage::new("phoenix", "heartbeat", json!({}), 7);
        let value = serde_json::to_value(&beat).unwrap();
        assert_eq!(value["ref"], "7");
        assert!(value.get("join_ref").is_none());
    }

    #[test]
    fn test_decode_reply_with_null_ref() {
        let text = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":null}"#;
        let message: PhoenixMessage = serde_json::from_str(text).unwrap();
        assert!(message.msg_ref.is_none());
        assert_eq!(message.reply_status(), Some("ok"));
    }

    #[test]
    fn test_change_from_update_payload() {
        let payload = json!({
            "ids": [12],
            "data": {
                "schema": "public",
                "table": "cells",
                "commit_timestamp": "2025-03-01T10:00:00Z",
                "type": "UPDATE",
                "record": {"id": 4, "cage_num": 1, "cell_side": "Inner", "state": 1, "notes": "ok"},
                "old_record": {"id": 4},
                "errors": null
            }
        });
        match change_from_payload(&payload) {
            ChangeEvent::Update { new, old } => {
                assert_eq!(new.id, 4);
                assert_eq!(new.notes.as_deref(), Some("ok"));
                assert_eq!(old.map(|k| k.id), Some(4));
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn test_change_without_data_is_other() {
        let event = change_from_payload(&json!({"ids": []}));
        assert!(matches!(event, ChangeEvent::Other { .. }));
    }
}
