//! Actions of a cooperative administrator on its own cooperative.

use std::sync::Arc;

use coopmarket_remote::{decode_row, encode_row, DataService, Query};
use serde_json::json;
use tracing::info;

use super::auth_service::claims;
use crate::entities::{Cooperative, CooperativeStats, Member, NewMember};
use crate::queries;
use crate::schema::tables;
use crate::session::SessionContext;
use crate::types::{ActionOutcome, AddMemberRequest, MarketError, MarketResult};

pub struct CooperativeService {
    remote: Arc<dyn DataService>,
    session: SessionContext,
}

impl CooperativeService {
    pub fn new(remote: Arc<dyn DataService>, session: SessionContext) -> Self {
        Self { remote, session }
    }

    /// The cooperative managed by the signed-in administrator.
    pub async fn current_cooperative(&self) -> MarketResult<Cooperative> {
        self.session.require().await?;
        queries::current_cooperative(self.remote.as_ref()).await
    }

    /// Create a member identity and its profile under the current cooperative.
    ///
    /// The administrator's session is kept; the new member signs in later.
    /// The member code is checked before the identity is created, so a
    /// rejected code leaves the email free for a corrected retry.
    pub async fn add_member(&self, request: &AddMemberRequest) -> MarketResult<ActionOutcome<Member>> {
        let member = request.validate()?;
        self.session.require_admin().await?;
        let cooperative = queries::current_cooperative(self.remote.as_ref()).await?;

        let taken = Query::table(tables::MEMBERS)
            .columns(&["id"])
            .eq("cooperative_id", cooperative.id.as_str())
            .eq("member_id", member.member_code.as_str());
        if self.remote.select_single(&taken).await?.is_some() {
            return Err(MarketError::Validation(format!(
                "Member ID {} is already in use",
                member.member_code
            )));
        }

        let user = self
            .remote
            .sign_up(
                &member.email,
                &request.password,
                claims(&[
                    ("role", json!("member")),
                    ("cooperative_id", json!(cooperative.id)),
                ]),
            )
            .await?;

        let payload = NewMember {
            user_id: user.id,
            cooperative_id: cooperative.id.clone(),
            full_name: member.full_name,
            member_code: member.member_code,
            phone_number: member.phone_number,
        };
        let row = self
            .remote
            .insert(tables::MEMBERS, encode_row(&payload)?)
            .await?;
        let created: Member = decode_row(row)?;

        info!(
            cooperative = %cooperative.id,
            member = %created.id,
            code = %created.member_code,
            "member added"
        );
        Ok(ActionOutcome::new(created, "Member added successfully"))
    }

    pub async fn members(&self) -> MarketResult<Vec<Member>> {
        self.session.require_admin().await?;
        queries::member_roster(self.remote.as_ref()).await
    }

    pub async fn stats(&self) -> MarketResult<CooperativeStats> {
        self.session.require_admin().await?;
        queries::cooperative_stats(self.remote.as_ref()).await
    }

    /// Whether the signed-in user administers a cooperative profile.
    pub async fn has_profile(&self) -> MarketResult<bool> {
        match self.current_cooperative().await {
            Ok(_) => Ok(true),
            Err(MarketError::ProfileNotFound(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use crate::services::AuthService;
    use crate::types::{RegisterCooperativeRequest, SignInRequest};
    use coopmarket_remote::MemoryDataService;

    const PASSWORD: &str = "secret1";

    async fn signed_in_admin() -> (MemoryDataService, AuthService, CooperativeService) {
        let memory = MemoryDataService::new();
        schema::install(&memory).await;
        let remote: Arc<dyn DataService> = Arc::new(memory.clone());
        let session = SessionContext::new();
        let auth = AuthService::new(Arc::clone(&remote), session.clone());
        let cooperatives = CooperativeService::new(remote, session);

        auth.register_cooperative(&RegisterCooperativeRequest {
            name: "Kivu Miners".to_string(),
            registration_number: "RC-42".to_string(),
            email: "a@coop.test".to_string(),
            password: PASSWORD.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        sign_in(&auth, "a@coop.test").await;
        (memory, auth, cooperatives)
    }

    async fn sign_in(auth: &AuthService, email: &str) {
        let _ = auth.sign_out().await;
        auth.sign_in(&SignInRequest {
            email: email.to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap();
    }

    fn member(code: &str, email: &str) -> AddMemberRequest {
        AddMemberRequest {
            full_name: "Asha Mwangi".to_string(),
            member_code: code.to_string(),
            email: email.to_string(),
            password: PASSWORD.to_string(),
            phone_number: String::new(),
        }
    }

    #[tokio::test]
    async fn test_taken_member_code_leaves_email_free() {
        let (memory, _, cooperatives) = signed_in_admin().await;
        cooperatives.add_member(&member("M-001", "asha@coop.test")).await.unwrap();

        let clash = cooperatives.add_member(&member("M-001", "juma@coop.test")).await;
        assert_eq!(
            clash.unwrap_err(),
            MarketError::Validation("Member ID M-001 is already in use".to_string())
        );

        let retry = cooperatives
            .add_member(&member("M-002", "juma@coop.test"))
            .await
            .unwrap();
        assert_eq!(retry.record.member_code, "M-002");
        assert_eq!(memory.table_len(tables::MEMBERS).await, 2);
    }

    #[tokio::test]
    async fn test_members_get_authorization_errors() {
        let (_, auth, cooperatives) = signed_in_admin().await;
        cooperatives.add_member(&member("M-001", "asha@coop.test")).await.unwrap();
        sign_in(&auth, "asha@coop.test").await;

        let listed = cooperatives.members().await.unwrap_err();
        assert!(matches!(listed, MarketError::Unauthorized(_)));
        assert!(matches!(cooperatives.stats().await, Err(MarketError::Unauthorized(_))));
        let added = cooperatives.add_member(&member("M-002", "juma@coop.test")).await;
        assert!(matches!(added, Err(MarketError::Unauthorized(_))));
    }
}
