//! In-memory implementation of [`DataService`] for tests and offline runs.
//!
//! Rows live in per-table vectors behind a `tokio` lock. Column defaults,
//! unique constraints and stored procedures are registered by the caller, so
//! the service itself stays free of any marketplace schema.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{RemoteError, RemoteResult};
use crate::query::{Filter, Query, Row};
use crate::service::{
    AuthUser, ChangeEvent, ChangeKind, DataService, Session, Subscription, SubscriptionId,
    SubscriptionRequest,
};

const DEFAULT_EVENT_BUFFER: usize = 1024;
const MIN_PASSWORD_LENGTH: usize = 6;

/// A stored procedure: reads the tables, sees the caller's session.
pub type Procedure =
    Arc<dyn Fn(&TableSet<'_>, Option<&Session>, &Value) -> RemoteResult<Value> + Send + Sync>;

/// Value used for a column the insert payload leaves out.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Value(Value),
    /// Insertion timestamp, strictly increasing across the service.
    Now,
}

/// Read-only view of the tables handed to stored procedures.
pub struct TableSet<'a> {
    tables: &'a HashMap<String, Vec<Row>>,
}

impl<'a> TableSet<'a> {
    pub fn rows(&self, table: &str) -> &'a [Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, table: &str, column: &str, value: &Value) -> Option<&'a Row> {
        let filter = Filter::eq(column, value.clone());
        self.rows(table).iter().find(|row| filter.matches(row))
    }

    pub fn filter(&self, table: &str, column: &str, value: &Value) -> Vec<&'a Row> {
        let filter = Filter::eq(column, value.clone());
        self.rows(table).iter().filter(|row| filter.matches(row)).collect()
    }
}

struct StoredUser {
    user: AuthUser,
    password: String,
}

struct Subscriber {
    request: SubscriptionRequest,
    sender: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct Faults {
    failing_selects: u32,
    failure_message: String,
    refuse_subscriptions: Option<String>,
    select_delays: VecDeque<Duration>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    defaults: HashMap<String, Vec<(String, ColumnDefault)>>,
    unique: HashMap<String, Vec<Vec<String>>>,
    procedures: HashMap<String, Procedure>,
    users: HashMap<String, StoredUser>,
    session: Option<Session>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    last_timestamp: Option<DateTime<Utc>>,
    faults: Faults,
}

type Delivery = (SubscriptionId, mpsc::Sender<ChangeEvent>, ChangeEvent);

impl MemoryState {
    fn next_timestamp(&mut self) -> String {
        let now = Utc::now();
        let stamp = match self.last_timestamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn run_query(&self, query: &Query) -> Vec<Row> {
        let source = self
            .tables
            .get(&query.table)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let mut rows: Vec<Row> = source.iter().filter(|r| query.matches(r)).cloned().collect();
        query.sort(&mut rows);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        rows.iter()
            .map(|row| {
                let mut projected = query.project(row);
                for embed in &query.embeds {
                    let related = row
                        .get(&embed.foreign_key)
                        .and_then(|key| {
                            let filter = Filter::eq("id", key.clone());
                            self.tables
                                .get(&embed.table)
                                .and_then(|rows| rows.iter().find(|r| filter.matches(r)))
                        })
                        .map(|related| Value::Object(pick_columns(related, &embed.columns)))
                        .unwrap_or(Value::Null);
                    projected.insert(embed.alias.clone(), related);
                }
                projected
            })
            .collect()
    }

    fn check_unique(&self, table: &str, candidate: &Row) -> RemoteResult<()> {
        let Some(constraints) = self.unique.get(table) else {
            return Ok(());
        };
        let existing = self.tables.get(table).map(Vec::as_slice).unwrap_or(&[]);

        for columns in constraints {
            let values: Vec<&Value> = columns
                .iter()
                .map(|c| candidate.get(c).unwrap_or(&Value::Null))
                .collect();
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            let clash = existing.iter().any(|row| {
                columns
                    .iter()
                    .zip(&values)
                    .all(|(column, value)| row.get(column) == Some(*value))
            });
            if clash {
                return Err(RemoteError::rejected(
                    409,
                    format!(
                        "duplicate key value violates unique constraint \"{}_{}_key\"",
                        table,
                        columns.join("_")
                    ),
                ));
            }
        }
        Ok(())
    }

    fn deliveries(
        &self,
        table: &str,
        kind: ChangeKind,
        record: Option<Row>,
        old_record: Option<Row>,
    ) -> Vec<Delivery> {
        self.subscribers
            .iter()
            .filter(|(_, subscriber)| subscriber.request.watches(table, kind))
            .map(|(id, subscriber)| {
                (
                    *id,
                    subscriber.sender.clone(),
                    ChangeEvent {
                        table: table.to_string(),
                        kind,
                        record: record.clone(),
                        old_record: old_record.clone(),
                    },
                )
            })
            .collect()
    }
}

fn pick_columns(row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// The hosted service, simulated in-process.
#[derive(Clone)]
pub struct MemoryDataService {
    state: Arc<RwLock<MemoryState>>,
    next_subscription: Arc<AtomicU64>,
    event_buffer: usize,
}

impl Default for MemoryDataService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDataService {
    pub fn new() -> Self {
        Self::with_event_buffer(DEFAULT_EVENT_BUFFER)
    }

    pub fn with_event_buffer(event_buffer: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            next_subscription: Arc::new(AtomicU64::new(1)),
            event_buffer: event_buffer.max(1),
        }
    }

    pub async fn set_default(&self, table: &str, column: &str, default: ColumnDefault) {
        let mut state = self.state.write().await;
        state
            .defaults
            .entry(table.to_string())
            .or_default()
            .push((column.to_string(), default));
    }

    pub async fn add_unique(&self, table: &str, columns: &[&str]) {
        let mut state = self.state.write().await;
        state
            .unique
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| (*c).to_string()).collect());
    }

    pub async fn register_procedure<F>(&self, name: &str, procedure: F)
    where
        F: Fn(&TableSet<'_>, Option<&Session>, &Value) -> RemoteResult<Value>
            + Send
            + Sync
            + 'static,
    {
        let mut state = self.state.write().await;
        state
            .procedures
            .insert(name.to_string(), Arc::new(procedure));
    }

    /// Make the next `count` selects fail with a network error.
    pub async fn fail_next_selects(&self, count: u32, message: &str) {
        let mut state = self.state.write().await;
        state.faults.failing_selects = count;
        state.faults.failure_message = message.to_string();
    }

    /// Refuse (`Some`) or accept (`None`) new subscriptions.
    pub async fn refuse_subscriptions(&self, reason: Option<&str>) {
        let mut state = self.state.write().await;
        state.faults.refuse_subscriptions = reason.map(str::to_string);
    }

    /// Delay the response of the next select; the rows are read before the delay.
    pub async fn queue_select_delay(&self, delay: Duration) {
        let mut state = self.state.write().await;
        state.faults.select_delays.push_back(delay);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    pub async fn table_len(&self, table: &str) -> usize {
        self.state
            .read()
            .await
            .tables
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn deliver(&self, deliveries: Vec<Delivery>) {
        let mut closed = Vec::new();
        for (id, sender, event) in deliveries {
            if sender.send(event).await.is_err() {
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            let mut state = self.state.write().await;
            for id in closed {
                debug!(subscription = %id, "dropping closed subscriber");
                state.subscribers.remove(&id);
            }
        }
    }
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn select(&self, query: &Query) -> RemoteResult<Vec<Row>> {
        let (rows, delay) = {
            let mut state = self.state.write().await;
            if state.faults.failing_selects > 0 {
                state.faults.failing_selects -= 1;
                return Err(RemoteError::Network(state.faults.failure_message.clone()));
            }
            let delay = state.faults.select_delays.pop_front();
            (state.run_query(query), delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(rows)
    }

    async fn count(&self, query: &Query) -> RemoteResult<u64> {
        let state = self.state.read().await;
        let count = state
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn insert(&self, table: &str, mut row: Row) -> RemoteResult<Row> {
        let (stored, deliveries) = {
            let mut state = self.state.write().await;

            row.entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));

            let defaults = state.defaults.get(table).cloned().unwrap_or_default();
            for (column, default) in defaults {
                if row.contains_key(&column) {
                    continue;
                }
                let value = match default {
                    ColumnDefault::Value(value) => value,
                    ColumnDefault::Now => Value::String(state.next_timestamp()),
                };
                row.insert(column, value);
            }

            state.check_unique(table, &row)?;
            state
                .tables
                .entry(table.to_string())
                .or_default()
                .push(row.clone());

            let deliveries = state.deliveries(table, ChangeKind::Insert, Some(row.clone()), None);
            (row, deliveries)
        };

        self.deliver(deliveries).await;
        Ok(stored)
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> RemoteResult<Vec<Row>> {
        let (updated, deliveries) = {
            let mut state = self.state.write().await;
            let mut changes = Vec::new();

            if let Some(rows) = state.tables.get_mut(table) {
                for row in rows
                    .iter_mut()
                    .filter(|row| filters.iter().all(|f| f.matches(row)))
                {
                    let old = row.clone();
                    for (column, value) in &patch {
                        row.insert(column.clone(), value.clone());
                    }
                    changes.push((old, row.clone()));
                }
            }

            let mut deliveries = Vec::new();
            for (old, new) in &changes {
                deliveries.extend(state.deliveries(
                    table,
                    ChangeKind::Update,
                    Some(new.clone()),
                    Some(old.clone()),
                ));
            }
            (
                changes.into_iter().map(|(_, new)| new).collect::<Vec<_>>(),
                deliveries,
            )
        };

        self.deliver(deliveries).await;
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> RemoteResult<Vec<Row>> {
        let (removed, deliveries) = {
            let mut state = self.state.write().await;
            let mut removed = Vec::new();

            if let Some(rows) = state.tables.get_mut(table) {
                let mut kept = Vec::with_capacity(rows.len());
                for row in rows.drain(..) {
                    if filters.iter().all(|f| f.matches(&row)) {
                        removed.push(row);
                    } else {
                        kept.push(row);
                    }
                }
                *rows = kept;
            }

            let mut deliveries = Vec::new();
            for row in &removed {
                deliveries.extend(state.deliveries(
                    table,
                    ChangeKind::Delete,
                    None,
                    Some(row.clone()),
                ));
            }
            (removed, deliveries)
        };

        self.deliver(deliveries).await;
        Ok(removed)
    }

    async fn rpc(&self, procedure: &str, args: Value) -> RemoteResult<Value> {
        let state = self.state.read().await;
        let handler = state
            .procedures
            .get(procedure)
            .cloned()
            .ok_or_else(|| RemoteError::UnknownProcedure(procedure.to_string()))?;

        let tables = TableSet {
            tables: &state.tables,
        };
        handler(&tables, state.session.as_ref(), &args)
    }

    async fn subscribe(&self, request: SubscriptionRequest) -> RemoteResult<Subscription> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.faults.refuse_subscriptions {
            return Err(RemoteError::Subscription(reason.clone()));
        }

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (sender, events) = mpsc::channel(self.event_buffer);
        debug!(subscription = %id, channel = %request.channel, tables = ?request.tables, "subscribed");
        state.subscribers.insert(id, Subscriber { request, sender });

        Ok(Subscription { id, events })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> RemoteResult<()> {
        let mut state = self.state.write().await;
        if state.subscribers.remove(&id).is_some() {
            debug!(subscription = %id, "unsubscribed");
        }
        Ok(())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> RemoteResult<AuthUser> {
        let email = email.trim().to_lowercase();
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(RemoteError::rejected(
                422,
                format!("Password should be at least {MIN_PASSWORD_LENGTH} characters"),
            ));
        }

        let mut state = self.state.write().await;
        if state.users.contains_key(&email) {
            return Err(RemoteError::UserExists);
        }

        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: Some(email.clone()),
            metadata,
        };
        state.users.insert(
            email,
            StoredUser {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Session> {
        let email = email.trim().to_lowercase();
        let mut state = self.state.write().await;

        let user = match state.users.get(&email) {
            Some(stored) if stored.password == password => stored.user.clone(),
            _ => return Err(RemoteError::InvalidCredentials),
        };

        let session = Session {
            access_token: format!("memory-{}", Uuid::new_v4()),
            refresh_token: None,
            user,
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        self.state.write().await.session = None;
        Ok(())
    }

    async fn current_session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }
}
