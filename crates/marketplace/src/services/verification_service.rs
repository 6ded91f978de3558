//! Verification of pending submissions by the cooperative administrator.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use coopmarket_remote::{decode_row, DataService, Embed, Filter, Query, Row};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::entities::{
    MineralSubmission, QueuedSubmission, VerificationDecision, VerificationStatus,
};
use crate::queries;
use crate::schema::tables;
use crate::session::SessionContext;
use crate::types::{ActionOutcome, MarketError, MarketResult};

#[derive(Deserialize)]
struct Owner {
    #[serde(default)]
    cooperative_id: Option<String>,
}

#[derive(Deserialize)]
struct SubmissionOwner {
    verification_status: VerificationStatus,
    #[serde(default)]
    member: Option<Owner>,
}

pub struct VerificationService {
    remote: Arc<dyn DataService>,
    session: SessionContext,
}

impl VerificationService {
    pub fn new(remote: Arc<dyn DataService>, session: SessionContext) -> Self {
        Self { remote, session }
    }

    /// Pending submissions of the administrator's cooperative.
    pub async fn queue(&self) -> MarketResult<Vec<QueuedSubmission>> {
        self.session.require_admin().await?;
        queries::verification_queue(self.remote.as_ref()).await
    }

    /// Record the administrator's decision on a pending submission.
    ///
    /// The write only matches rows that are still pending, so a decided
    /// submission is never transitioned again.
    pub async fn decide(
        &self,
        submission_id: &str,
        decision: VerificationDecision,
    ) -> MarketResult<ActionOutcome<MineralSubmission>> {
        let session = self.session.require_admin().await?;
        let cooperative = queries::current_cooperative(self.remote.as_ref()).await?;
        let next = decision.status();

        let current = self.owner_of(submission_id).await?;
        let owned = current
            .member
            .as_ref()
            .and_then(|m| m.cooperative_id.as_deref())
            .is_some_and(|id| id == cooperative.id);
        if !owned {
            return Err(MarketError::NotFound("Submission"));
        }
        if !current.verification_status.can_transition_to(next) {
            return Err(MarketError::AlreadyDecided(current.verification_status));
        }

        let mut patch = Row::new();
        patch.insert("verification_status".into(), json!(next.as_str()));
        patch.insert("verified_by".into(), json!(session.user.id));
        patch.insert(
            "verification_date".into(),
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );

        let filters = [
            Filter::eq("id", submission_id),
            Filter::eq("verification_status", VerificationStatus::Pending.as_str()),
        ];
        let updated = self
            .remote
            .update(tables::SUBMISSIONS, patch, &filters)
            .await?;

        let Some(row) = updated.into_iter().next() else {
            let status = self.owner_of(submission_id).await?.verification_status;
            warn!(submission = %submission_id, %status, "submission decided concurrently");
            return Err(MarketError::AlreadyDecided(status));
        };
        let submission: MineralSubmission = decode_row(row)?;

        info!(
            submission = %submission.id,
            status = %submission.verification_status,
            verified_by = %session.user.id,
            "submission decided"
        );
        Ok(ActionOutcome::new(
            submission,
            format!("Submission {next} successfully"),
        ))
    }

    async fn owner_of(&self, submission_id: &str) -> MarketResult<SubmissionOwner> {
        let query = Query::table(tables::SUBMISSIONS)
            .columns(&["id", "verification_status"])
            .embed(Embed::new("member", tables::MEMBERS, "member_id").columns(&["cooperative_id"]))
            .eq("id", submission_id);
        let row = self
            .remote
            .select_single(&query)
            .await?
            .ok_or(MarketError::NotFound("Submission"))?;
        Ok(serde_json::from_value(Value::Object(row))?)
    }
}
