//! The `DataService` seam and the session and change-feed types it exchanges.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{RemoteError, RemoteResult};
use crate::query::{Filter, Query, Row};

/// An authenticated identity as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Claims attached at sign-up (`role`, `cooperative_id`, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AuthUser {
    /// The `role` claim, if one was attached.
    pub fn role(&self) -> Option<&str> {
        self.metadata.get("role").and_then(Value::as_str)
    }

    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

/// Kind of row-level change carried by the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which change kinds a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Only(ChangeKind),
}

impl EventFilter {
    pub fn accepts(&self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(only) => *only == kind,
        }
    }

    /// Wire representation used by the realtime protocol.
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventFilter::All => "*",
            EventFilter::Only(kind) => kind.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Option<Row>,
    pub old_record: Option<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    /// Channel name, used for logging and as the realtime topic.
    pub channel: String,
    pub tables: Vec<String>,
    pub events: EventFilter,
}

impl SubscriptionRequest {
    pub fn new(channel: impl Into<String>, tables: &[&str]) -> Self {
        Self {
            channel: channel.into(),
            tables: tables.iter().map(|t| (*t).to_string()).collect(),
            events: EventFilter::All,
        }
    }

    pub fn watches(&self, table: &str, kind: ChangeKind) -> bool {
        self.events.accepts(kind) && self.tables.iter().any(|t| t == table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An open change-notification subscription.
///
/// Events arrive on `events`; the channel closes when the service drops the
/// subscription (after `unsubscribe` or a transport failure).
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

/// Everything the client consumes from the hosted backend.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn select(&self, query: &Query) -> RemoteResult<Vec<Row>>;

    /// First matching row, or `None`.
    async fn select_single(&self, query: &Query) -> RemoteResult<Option<Row>> {
        let rows = self.select(&query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Number of rows matching the query's filters, ignoring any limit.
    async fn count(&self, query: &Query) -> RemoteResult<u64>;

    /// Insert a row and return it as stored, including service-side defaults.
    async fn insert(&self, table: &str, row: Row) -> RemoteResult<Row>;

    /// Apply `patch` to every row matching `filters`; returns the updated rows.
    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> RemoteResult<Vec<Row>>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> RemoteResult<Vec<Row>>;

    async fn rpc(&self, procedure: &str, args: Value) -> RemoteResult<Value>;

    async fn subscribe(&self, request: SubscriptionRequest) -> RemoteResult<Subscription>;

    async fn unsubscribe(&self, id: SubscriptionId) -> RemoteResult<()>;

    /// Register a new identity. Does not replace the current session.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> RemoteResult<AuthUser>;

    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Session>;

    async fn sign_out(&self) -> RemoteResult<()>;

    async fn current_session(&self) -> Option<Session>;
}

/// Decode a row into a typed entity.
pub fn decode_row<T: DeserializeOwned>(row: Row) -> RemoteResult<T> {
    serde_json::from_value(Value::Object(row)).map_err(RemoteError::from)
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> RemoteResult<Vec<T>> {
    rows.into_iter().map(decode_row).collect()
}

/// Encode a serializable payload as a row.
pub fn encode_row<T: Serialize>(value: &T) -> RemoteResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(RemoteError::Decode(format!(
            "expected an object payload, got {other}"
        ))),
    }
}
