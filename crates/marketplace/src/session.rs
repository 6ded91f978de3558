//! Process-wide session context.
//!
//! Initialised once from the service at start-up, replaced on sign-in and
//! cleared on sign-out. Every action and view reads identity from here.

use std::sync::Arc;

use coopmarket_remote::{DataService, Session};
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{MarketError, MarketResult};

/// Role derived from the session's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    /// Only an explicit `admin` claim grants administrator rights.
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some("admin") => Role::Admin,
            _ => Role::Member,
        }
    }

    pub fn of(session: &Session) -> Self {
        Self::from_claim(session.user.role())
    }
}

#[derive(Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt whatever session the service already holds.
    pub async fn init_from(&self, service: &dyn DataService) -> Option<Session> {
        let session = service.current_session().await;
        debug!(signed_in = session.is_some(), "session context initialised");
        *self.inner.write().await = session.clone();
        session
    }

    pub async fn set(&self, session: Session) {
        *self.inner.write().await = Some(session);
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.read().await.clone()
    }

    pub async fn role(&self) -> Option<Role> {
        self.inner.read().await.as_ref().map(Role::of)
    }

    pub async fn is_admin(&self) -> bool {
        self.role().await == Some(Role::Admin)
    }

    /// The current session, or `NotAuthenticated`.
    pub async fn require(&self) -> MarketResult<Session> {
        self.current().await.ok_or(MarketError::NotAuthenticated)
    }

    /// The current session if it belongs to an administrator.
    pub async fn require_admin(&self) -> MarketResult<Session> {
        let session = self.require().await?;
        if Role::of(&session) != Role::Admin {
            return Err(MarketError::Unauthorized(
                "Only cooperative administrators can do this".to_string(),
            ));
        }
        Ok(session)
    }
}
