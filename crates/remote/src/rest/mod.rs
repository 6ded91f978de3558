//! HTTP implementation of [`DataService`] against a hosted REST/auth/realtime backend.

mod realtime;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coopmarket_config::{RealtimeConfig, RemoteConfig};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RemoteError, RemoteResult};
use crate::query::{Filter, Query, Row};
use crate::service::{
    AuthUser, DataService, Session, Subscription, SubscriptionId, SubscriptionRequest,
};

pub use realtime::decode_change;

#[derive(Debug, Clone)]
pub(crate) struct RealtimeSettings {
    pub url: String,
    pub api_key: String,
    pub heartbeat: Duration,
    pub join_timeout: Duration,
    pub buffer: usize,
}

struct OpenChannel {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Client for the hosted service's REST, auth and realtime endpoints.
#[derive(Clone)]
pub struct RestDataService {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    realtime: RealtimeSettings,
    session: Arc<RwLock<Option<Session>>>,
    channels: Arc<Mutex<HashMap<SubscriptionId, OpenChannel>>>,
    next_subscription: Arc<AtomicU64>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: WireUser,
}

#[derive(Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Map<String, Value>,
}

impl From<WireUser> for AuthUser {
    fn from(user: WireUser) -> Self {
        AuthUser {
            id: user.id,
            email: user.email,
            metadata: user.user_metadata,
        }
    }
}

impl RestDataService {
    pub fn new(remote: &RemoteConfig, realtime: &RealtimeConfig) -> RemoteResult<Self> {
        let timeout = Duration::from_secs(remote.request_timeout_seconds.max(1));
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: remote.url.trim_end_matches('/').to_string(),
            anon_key: remote.anon_key.clone(),
            realtime: RealtimeSettings {
                url: remote.realtime_url(),
                api_key: remote.anon_key.clone(),
                heartbeat: Duration::from_secs(realtime.heartbeat_interval_seconds.max(1)),
                join_timeout: timeout,
                buffer: realtime.event_buffer.max(1),
            },
            session: Arc::new(RwLock::new(None)),
            channels: Arc::new(Mutex::new(HashMap::new())),
            next_subscription: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Adopt a session obtained elsewhere (for example restored from disk).
    pub async fn restore_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    async fn bearer(&self) -> String {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut headers = HeaderMap::new();
        if let Ok(key) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.bearer().await)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .headers(headers)
    }

    async fn rows_request(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"))
            .await
            .header("Prefer", "return=representation")
    }
}

/// Turn a non-success response into the error the user should see.
async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = extract_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(message),
        _ => RemoteError::rejected(status.as_u16(), message),
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

async fn expect_success(response: Response) -> RemoteResult<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(error_from_response(response).await)
    }
}

async fn read_rows(response: Response) -> RemoteResult<Vec<Row>> {
    let response = expect_success(response).await?;
    let body: Value = response.json().await?;
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(RemoteError::Decode(format!("expected row object, got {other}"))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        other => Err(RemoteError::Decode(format!("expected row array, got {other}"))),
    }
}

/// Total from a `Content-Range` header such as `0-9/42` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::to_param).collect()
}

#[async_trait]
impl DataService for RestDataService {
    async fn select(&self, query: &Query) -> RemoteResult<Vec<Row>> {
        let response = self
            .request(Method::GET, &format!("/rest/v1/{}", query.table))
            .await
            .query(&query.to_params())
            .send()
            .await?;
        read_rows(response).await
    }

    async fn count(&self, query: &Query) -> RemoteResult<u64> {
        let mut params = filter_params(&query.filters);
        params.push(("select".to_string(), "*".to_string()));

        let response = self
            .request(Method::HEAD, &format!("/rest/v1/{}", query.table))
            .await
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await?;
        let response = expect_success(response).await?;

        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| RemoteError::Decode("missing Content-Range total".to_string()))
    }

    async fn insert(&self, table: &str, row: Row) -> RemoteResult<Row> {
        let response = self
            .rows_request(Method::POST, table)
            .await
            .json(&row)
            .send()
            .await?;
        read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode(format!("insert into {table} returned no row")))
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> RemoteResult<Vec<Row>> {
        let response = self
            .rows_request(Method::PATCH, table)
            .await
            .query(&filter_params(filters))
            .json(&patch)
            .send()
            .await?;
        read_rows(response).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> RemoteResult<Vec<Row>> {
        let response = self
            .rows_request(Method::DELETE, table)
            .await
            .query(&filter_params(filters))
            .send()
            .await?;
        read_rows(response).await
    }

    async fn rpc(&self, procedure: &str, args: Value) -> RemoteResult<Value> {
        let body = if args.is_null() { json!({}) } else { args };
        let response = self
            .request(Method::POST, &format!("/rest/v1/rpc/{procedure}"))
            .await
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RemoteError::UnknownProcedure(procedure.to_string()));
        }
        let response = expect_success(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn subscribe(&self, request: SubscriptionRequest) -> RemoteResult<Subscription> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let token = self.bearer().await;
        let cancel = CancellationToken::new();

        let (events, task) =
            realtime::open_channel(&self.realtime, &token, &request, cancel.clone()).await?;

        info!(subscription = %id, channel = %request.channel, "realtime channel joined");
        self.channels
            .lock()
            .await
            .insert(id, OpenChannel { cancel, task });

        Ok(Subscription { id, events })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> RemoteResult<()> {
        let channel = self.channels.lock().await.remove(&id);
        if let Some(channel) = channel {
            channel.cancel.cancel();
            if let Err(error) = channel.task.await {
                warn!(subscription = %id, ?error, "realtime channel task ended abnormally");
            }
            debug!(subscription = %id, "realtime channel left");
        }
        Ok(())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> RemoteResult<AuthUser> {
        let response = self
            .request(Method::POST, "/auth/v1/signup")
            .await
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = error_from_response(response).await;
            return Err(match error {
                RemoteError::Rejected { ref message, .. }
                    if message.to_lowercase().contains("already registered") =>
                {
                    RemoteError::UserExists
                }
                other => other,
            });
        }

        let body: Value = response.json().await?;
        let user = body.get("user").cloned().unwrap_or(body);
        let user: WireUser = serde_json::from_value(user)?;
        Ok(user.into())
    }

    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Session> {
        let response = self
            .request(Method::POST, "/auth/v1/token")
            .await
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            return Err(RemoteError::InvalidCredentials);
        }
        let response = expect_success(response).await?;
        let token: TokenResponse = response.json().await?;

        let session = Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user.into(),
        };
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        let response = self.request(Method::POST, "/auth/v1/logout").await.send().await;
        *self.session.write().await = None;
        expect_success(response?).await?;
        Ok(())
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_total() {
        assert_eq!(parse_content_range_total("0-9/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
    }

    #[test]
    fn test_extract_message_variants() {
        assert_eq!(
            extract_message(r#"{"message":"duplicate key"}"#).as_deref(),
            Some("duplicate key")
        );
        assert_eq!(
            extract_message(r#"{"msg":"User already registered"}"#).as_deref(),
            Some("User already registered")
        );
        assert_eq!(
            extract_message(r#"{"error_description":"Invalid login credentials"}"#).as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(extract_message("not json"), None);
    }
}
