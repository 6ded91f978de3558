//! Realtime change feed over a Phoenix-channel websocket.
//!
//! Each subscription owns one socket: join the `realtime:<channel>` topic with
//! a `postgres_changes` entry per watched table, keep it alive with
//! heartbeats, forward decoded changes, and leave on cancellation.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::RealtimeSettings;
use crate::error::{RemoteError, RemoteResult};
use crate::query::Row;
use crate::service::{ChangeEvent, ChangeKind, SubscriptionRequest};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_REF: &str = "1";

#[derive(Debug, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    fn to_frame(&self) -> RemoteResult<Message> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }
}

fn join_payload(request: &SubscriptionRequest, access_token: &str) -> Value {
    let changes: Vec<Value> = request
        .tables
        .iter()
        .map(|table| {
            json!({
                "event": request.events.as_wire(),
                "schema": "public",
                "table": table,
            })
        })
        .collect();

    json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": changes,
        },
        "access_token": access_token,
    })
}

/// Connect, join the channel and start forwarding changes.
pub(crate) async fn open_channel(
    settings: &RealtimeSettings,
    access_token: &str,
    request: &SubscriptionRequest,
    cancel: CancellationToken,
) -> RemoteResult<(mpsc::Receiver<ChangeEvent>, JoinHandle<()>)> {
    let mut url =
        Url::parse(&settings.url).map_err(|e| RemoteError::Subscription(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("apikey", &settings.api_key)
        .append_pair("vsn", "1.0.0");

    let (mut socket, _) = tokio::time::timeout(settings.join_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| RemoteError::Subscription("timed out connecting".to_string()))??;

    let topic = format!("realtime:{}", request.channel);
    let join = PhoenixMessage {
        topic: topic.clone(),
        event: "phx_join".to_string(),
        payload: join_payload(request, access_token),
        reference: Some(JOIN_REF.to_string()),
        join_ref: Some(JOIN_REF.to_string()),
    };
    socket.send(join.to_frame()?).await?;

    tokio::time::timeout(settings.join_timeout, await_join_reply(&mut socket, &topic))
        .await
        .map_err(|_| RemoteError::Subscription("timed out joining channel".to_string()))??;

    let (events, receiver) = mpsc::channel(settings.buffer);
    let task = tokio::spawn(pump(
        socket,
        topic,
        request.clone(),
        events,
        cancel,
        settings.heartbeat,
    ));
    Ok((receiver, task))
}

async fn await_join_reply(socket: &mut Socket, topic: &str) -> RemoteResult<()> {
    while let Some(frame) = socket.next().await {
        let Message::Text(text) = frame? else {
            continue;
        };
        let Ok(message) = serde_json::from_str::<PhoenixMessage>(&text) else {
            continue;
        };
        if message.event != "phx_reply"
            || message.topic != topic
            || message.reference.as_deref() != Some(JOIN_REF)
        {
            continue;
        }

        return match message.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(()),
            _ => Err(RemoteError::Subscription(
                message
                    .payload
                    .pointer("/response/reason")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| message.payload.to_string()),
            )),
        };
    }
    Err(RemoteError::Subscription(
        "socket closed while joining channel".to_string(),
    ))
}

async fn pump(
    mut socket: Socket,
    topic: String,
    request: SubscriptionRequest,
    events: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
    heartbeat: Duration,
) {
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;
    let mut next_ref: u64 = 1;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                next_ref += 1;
                if let Ok(frame) = PhoenixMessage::new(&topic, "phx_leave", json!({}), next_ref).to_frame() {
                    let _ = socket.send(frame).await;
                }
                let _ = socket.close(None).await;
                break;
            }
            _ = ticker.tick() => {
                next_ref += 1;
                let beat = PhoenixMessage::new("phoenix", "heartbeat", json!({}), next_ref);
                let sent = match beat.to_frame() {
                    Ok(frame) => socket.send(frame).await.map_err(RemoteError::from),
                    Err(error) => Err(error),
                };
                if let Err(error) = sent {
                    warn!(%topic, %error, "realtime heartbeat failed");
                    break;
                }
            }
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(change) = parse_frame(&text, &topic) else {
                        continue;
                    };
                    if !request.watches(&change.table, change.kind) {
                        continue;
                    }
                    debug!(%topic, table = %change.table, kind = %change.kind, "change received");
                    if events.send(change).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    warn!(%topic, "realtime socket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%topic, %error, "realtime socket error");
                    break;
                }
            }
        }
    }
}

fn parse_frame(text: &str, topic: &str) -> Option<ChangeEvent> {
    let message: PhoenixMessage = serde_json::from_str(text).ok()?;
    if message.event != "postgres_changes" || message.topic != topic {
        return None;
    }
    decode_change(&message.payload)
}

fn non_empty_row(value: Option<&Value>) -> Option<Row> {
    match value {
        Some(Value::Object(row)) if !row.is_empty() => Some(row.clone()),
        _ => None,
    }
}

/// Decode a `postgres_changes` payload into a [`ChangeEvent`].
///
/// Accepts both the nested `{"data": {...}}` shape and a flat payload.
pub fn decode_change(payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data").unwrap_or(payload);
    let table = data.get("table")?.as_str()?.to_string();
    let kind: ChangeKind = serde_json::from_value(
        data.get("type").or_else(|| data.get("eventType"))?.clone(),
    )
    .ok()?;

    Some(ChangeEvent {
        table,
        kind,
        record: non_empty_row(data.get("record")),
        old_record: non_empty_row(data.get("old_record")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nested_insert() {
        let payload = json!({
            "ids": [1],
            "data": {
                "schema": "public",
                "table": "mineral_submissions",
                "type": "INSERT",
                "record": {"id": "s-1", "verification_status": "pending"},
                "old_record": {}
            }
        });
        let change = decode_change(&payload).unwrap();
        assert_eq!(change.table, "mineral_submissions");
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.record.unwrap()["id"], json!("s-1"));
        assert!(change.old_record.is_none());
    }

    #[test]
    fn test_decode_flat_delete() {
        let payload = json!({
            "table": "members",
            "type": "DELETE",
            "old_record": {"id": "m-1"}
        });
        let change = decode_change(&payload).unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert!(change.record.is_none());
        assert_eq!(change.old_record.unwrap()["id"], json!("m-1"));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode_change(&json!({"table": "t", "type": "TRUNCATE"})).is_none());
        assert!(decode_change(&json!({"type": "INSERT"})).is_none());
    }

    #[test]
    fn test_parse_frame_filters_topic_and_event() {
        let frame = json!({
            "topic": "realtime:listings",
            "event": "postgres_changes",
            "payload": {"data": {"table": "mineral_listings", "type": "UPDATE"}},
            "ref": null
        })
        .to_string();
        assert!(parse_frame(&frame, "realtime:listings").is_some());
        assert!(parse_frame(&frame, "realtime:other").is_none());

        let reply = json!({"topic": "realtime:listings", "event": "phx_reply", "payload": {}}).to_string();
        assert!(parse_frame(&reply, "realtime:listings").is_none());
    }

    #[test]
    fn test_join_payload_lists_each_table() {
        let request = SubscriptionRequest::new("stats", &["mineral_listings", "mineral_submissions"]);
        let payload = join_payload(&request, "token-1");
        let changes = payload["config"]["postgres_changes"].as_array().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0]["event"], json!("*"));
        assert_eq!(changes[1]["table"], json!("mineral_submissions"));
        assert_eq!(payload["access_token"], json!("token-1"));
    }
}
