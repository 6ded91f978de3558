//! Cooperative registration, sign-in and sign-out.

use std::sync::Arc;

use coopmarket_remote::{decode_row, encode_row, DataService, Session};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::entities::{Cooperative, NewCooperative};
use crate::schema::tables;
use crate::session::{Role, SessionContext};
use crate::types::{ActionOutcome, MarketResult, RegisterCooperativeRequest, SignInRequest};

pub(crate) fn claims(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect()
}

pub struct AuthService {
    remote: Arc<dyn DataService>,
    session: SessionContext,
}

impl AuthService {
    pub fn new(remote: Arc<dyn DataService>, session: SessionContext) -> Self {
        Self { remote, session }
    }

    /// Create the administrator identity and the cooperative it manages.
    ///
    /// Does not sign in; the administrator signs in with the contact email.
    pub async fn register_cooperative(
        &self,
        request: &RegisterCooperativeRequest,
    ) -> MarketResult<ActionOutcome<Cooperative>> {
        let registration = request.validate()?;

        self.remote
            .sign_up(
                &registration.email,
                &request.password,
                claims(&[("role", json!("admin"))]),
            )
            .await?;

        let payload = NewCooperative {
            name: registration.name,
            registration_number: Some(registration.registration_number),
            contact_email: registration.email,
            contact_phone: registration.phone,
            address: registration.address,
        };
        let row = self
            .remote
            .insert(tables::COOPERATIVES, encode_row(&payload)?)
            .await?;
        let cooperative: Cooperative = decode_row(row)?;

        info!(cooperative = %cooperative.id, name = %cooperative.name, "cooperative registered");
        Ok(ActionOutcome::new(
            cooperative,
            "Registration successful! Please check your email to verify your account.",
        ))
    }

    pub async fn sign_in(&self, request: &SignInRequest) -> MarketResult<Session> {
        let email = request.validate()?;
        let session = self.remote.sign_in(&email, &request.password).await?;
        self.session.set(session.clone()).await;

        info!(user = %session.user.id, role = ?Role::of(&session), "signed in");
        Ok(session)
    }

    /// Clears the local session even when the service call fails.
    pub async fn sign_out(&self) -> MarketResult<()> {
        self.session.clear().await;
        self.remote.sign_out().await?;
        info!("signed out");
        Ok(())
    }
}
