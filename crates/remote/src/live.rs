//! Fetch-and-subscribe controller keeping a view's rows in step with the service.
//!
//! A [`LiveView`] opens one change subscription for the tables it watches,
//! runs its fetch once, and re-runs the full fetch for every change event.
//! Results replace the rows wholesale. A result is only committed while the
//! view is live and when no newer request has already been committed, so a
//! slow response can never overwrite a newer one and a torn-down view is never
//! written to.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::service::{ChangeEvent, DataService, Subscription, SubscriptionRequest};

/// State of the change feed behind a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeStatus {
    Connecting,
    Connected,
    /// The feed could not be opened or has closed; rows only change on re-activation.
    Degraded(String),
}

/// Snapshot published to whoever renders the view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<T> {
    pub rows: Vec<T>,
    /// True until the first fetch has completed, successfully or not.
    pub loading: bool,
    /// User-visible message of the most recent failed fetch.
    pub error: Option<String>,
    pub realtime: RealtimeStatus,
    /// Sequence number of the request whose outcome is shown; 0 before any.
    pub revision: u64,
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            loading: true,
            error: None,
            realtime: RealtimeStatus::Connecting,
            revision: 0,
        }
    }
}

struct Controller<T, F> {
    label: String,
    service: Arc<dyn DataService>,
    request: SubscriptionRequest,
    fetch: F,
    state: Arc<watch::Sender<ViewState<T>>>,
    cancel: CancellationToken,
    issued: Arc<AtomicU64>,
}

impl<T, F, Fut, E> Controller<T, F>
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async fn run(self) {
        let mut subscription = match self.service.subscribe(self.request.clone()).await {
            Ok(subscription) => {
                self.set_realtime(RealtimeStatus::Connected);
                Some(subscription)
            }
            Err(error) => {
                warn!(view = %self.label, %error, "change feed unavailable, view will not refresh on changes");
                self.set_realtime(RealtimeStatus::Degraded(error.to_string()));
                None
            }
        };

        let mut refreshes = JoinSet::new();
        if !self.cancel.is_cancelled() {
            self.spawn_refresh(&mut refreshes, None);
        }

        let mut feed_open = subscription.is_some();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                change = next_change(&mut subscription), if feed_open => match change {
                    Some(change) => self.spawn_refresh(&mut refreshes, Some(&change)),
                    None => {
                        feed_open = false;
                        warn!(view = %self.label, "change feed closed");
                        self.set_realtime(RealtimeStatus::Degraded("change feed closed".to_string()));
                    }
                },
                Some(joined) = refreshes.join_next(), if !refreshes.is_empty() => {
                    if let Err(error) = joined {
                        if error.is_panic() {
                            warn!(view = %self.label, %error, "refresh task panicked");
                        }
                    }
                }
            }
        }

        refreshes.abort_all();
        if let Some(subscription) = subscription {
            if let Err(error) = self.service.unsubscribe(subscription.id).await {
                warn!(view = %self.label, %error, "failed to cancel change subscription");
            }
        }
        debug!(view = %self.label, "view deactivated");
    }

    fn spawn_refresh(&self, refreshes: &mut JoinSet<()>, trigger: Option<&ChangeEvent>) {
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        match trigger {
            Some(change) => debug!(
                view = %self.label,
                sequence,
                table = %change.table,
                kind = %change.kind,
                "refreshing after change"
            ),
            None => debug!(view = %self.label, sequence, "initial fetch"),
        }

        let pending = (self.fetch)();
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        let label = self.label.clone();
        refreshes.spawn(async move {
            let outcome = pending.await;
            commit(&state, &cancel, &label, sequence, outcome);
        });
    }

    fn set_realtime(&self, status: RealtimeStatus) {
        self.state.send_modify(|view| view.realtime = status);
    }
}

async fn next_change(subscription: &mut Option<Subscription>) -> Option<ChangeEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

fn commit<T, E: Display>(
    state: &watch::Sender<ViewState<T>>,
    cancel: &CancellationToken,
    label: &str,
    sequence: u64,
    outcome: Result<Vec<T>, E>,
) {
    state.send_if_modified(|view| {
        if cancel.is_cancelled() {
            debug!(view = %label, sequence, "discarding result for inactive view");
            return false;
        }
        if sequence <= view.revision {
            debug!(view = %label, sequence, shown = view.revision, "discarding stale result");
            return false;
        }

        view.revision = sequence;
        view.loading = false;
        match outcome {
            Ok(rows) => {
                debug!(view = %label, sequence, rows = rows.len(), "committed rows");
                view.rows = rows;
                view.error = None;
            }
            Err(error) => {
                warn!(view = %label, sequence, %error, "fetch failed");
                view.error = Some(error.to_string());
            }
        }
        true
    });
}

/// A view's rows, kept current by a background controller.
pub struct LiveView<T> {
    service: Arc<dyn DataService>,
    request: SubscriptionRequest,
    state: watch::Receiver<ViewState<T>>,
    cancel: CancellationToken,
    issued: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl<T> LiveView<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Subscribe to `request.tables`, run `fetch`, and re-run it on every change.
    ///
    /// Must be called within a tokio runtime.
    pub fn activate<F, Fut, E>(
        service: Arc<dyn DataService>,
        request: SubscriptionRequest,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (sender, receiver) = watch::channel(ViewState::default());
        let cancel = CancellationToken::new();
        let issued = Arc::new(AtomicU64::new(0));

        let controller = Controller {
            label: request.channel.clone(),
            service: Arc::clone(&service),
            request: request.clone(),
            fetch,
            state: Arc::new(sender),
            cancel: cancel.clone(),
            issued: Arc::clone(&issued),
        };
        debug!(view = %request.channel, tables = ?request.tables, "activating view");
        let task = tokio::spawn(controller.run());

        Self {
            service,
            request,
            state: receiver,
            cancel,
            issued,
            task: Some(task),
        }
    }

    pub fn label(&self) -> &str {
        &self.request.channel
    }

    pub fn watched_tables(&self) -> &[String] {
        &self.request.tables
    }

    pub fn snapshot(&self) -> ViewState<T> {
        self.state.borrow().clone()
    }

    /// A receiver for renderers that outlive this handle's borrow.
    pub fn watch(&self) -> watch::Receiver<ViewState<T>> {
        self.state.clone()
    }

    pub fn rows(&self) -> Vec<T> {
        self.state.borrow().rows.clone()
    }

    /// Fetches issued so far, the initial one included.
    pub fn requests_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Wait for the next published change. `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<ViewState<T>> {
        self.state.changed().await.ok()?;
        Some(self.snapshot())
    }

    /// Wait until the snapshot satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&ViewState<T>) -> bool,
    ) -> Option<ViewState<T>> {
        self.state
            .wait_for(predicate)
            .await
            .ok()
            .map(|view| view.clone())
    }

    /// Stop the view and wait until its subscription has been cancelled.
    pub async fn deactivate(mut self) {
        self.shutdown().await;
    }

    /// Replace the fetch (the filter changed): the old subscription is
    /// cancelled before the new one is opened.
    pub async fn retarget<F, Fut, E>(mut self, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.shutdown().await;
        Self::activate(Arc::clone(&self.service), self.request.clone(), fetch)
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(view = %self.request.channel, %error, "view controller ended abnormally");
            }
        }
    }
}

impl<T> Drop for LiveView<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
