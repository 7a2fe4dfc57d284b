use super::cache::MembershipApi;
use super::coordinator::RefreshCoordinator;
use super::error::ClientError;
use super::session::SessionClient;
use super::transport::*;
use crate::api::v1::{AccountDeletedResponse, LogoutResponse, ProfileResponse, SessionResponse};
use crate::domain_model::{ListKind, MembershipEntry, PrincipalInfo};
use crate::logger::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct RegisterForm {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password: String,
}

/// Typed calls against `/api/v1`. Authenticated calls go through the
/// [`RefreshCoordinator`].
/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    coordinator: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, session: SessionClient) -> Self {
        ApiClient {
            coordinator: RefreshCoordinator::new(transport, session),
        }
    }

    pub fn session(&self) -> &SessionClient {
        self.coordinator.session()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<PrincipalInfo, ClientError> {
        let reply = self
            .coordinator
            .send_public(ApiRequest::post(
                "/auth",
                json!({ "email": email, "password": password }),
            ))
            .await?;
        self.start_session(reply.into_result()?)
    }

    pub async fn register(&self, form: &RegisterForm) -> Result<PrincipalInfo, ClientError> {
        let body = serde_json::to_value(form).map_err(|e| ClientError::Validation(e.to_string()))?;
        let reply = self
            .coordinator
            .send_public(ApiRequest::post("/register", body))
            .await?;
        self.start_session(reply.into_result()?)
    }

    /// Revokes the refresh token on the server, then drops the local session.
    /// The local session is dropped even when the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let outcome = self
            .authorized::<LogoutResponse>(ApiRequest::post("/logout", json!({})))
            .await;
        self.session().clear_session();
        match outcome {
            Ok(_) => Ok(()),
            Err(e @ ClientError::Transport(_)) | Err(e @ ClientError::Server { .. }) => {
                warn!(error = %e, "server logout failed, session dropped locally");
                Err(e)
            }
            // Nothing left to revoke server side.
            Err(_) => Ok(()),
        }
    }

    pub async fn profile(&self) -> Result<PrincipalInfo, ClientError> {
        self.authorized(ApiRequest::get("/profile")).await
    }

    /// A password change comes back with a new credential pair, which
    /// replaces the current session.
    pub async fn update_profile(&self, form: &ProfileForm) -> Result<PrincipalInfo, ClientError> {
        let body = serde_json::to_value(form).map_err(|e| ClientError::Validation(e.to_string()))?;
        let response: ProfileResponse = self.authorized(ApiRequest::put("/profile", body)).await?;
        match &response.tokens {
            Some(tokens) => self
                .session()
                .set_session(response.principal.clone(), tokens)?,
            None => self.session().update_principal(response.principal.clone())?,
        }
        Ok(response.principal)
    }

    /// Deletes the account server side and ends the local session. On failure
    /// the session is kept, since the account still exists.
    pub async fn delete_account(&self) -> Result<(), ClientError> {
        self.authorized::<AccountDeletedResponse>(ApiRequest::delete("/profile", json!({})))
            .await?;
        self.session().clear_session();
        Ok(())
    }

    fn start_session(&self, response: SessionResponse) -> Result<PrincipalInfo, ClientError> {
        self.session()
            .set_session(response.principal.clone(), &response.tokens)?;
        Ok(response.principal)
    }

    async fn authorized<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        self.coordinator.send(request).await?.into_result()
    }
}

fn membership_path(kind: ListKind) -> String {
    format!("/{}", kind.as_str())
}

fn entry_body(entry: MembershipEntry) -> serde_json::Value {
    json!({ "resource_id": entry.resource_id, "resource_kind": entry.resource_kind })
}

#[async_trait::async_trait]
impl MembershipApi for ApiClient {
    async fn list(&self, kind: ListKind) -> Result<Vec<MembershipEntry>, ClientError> {
        self.authorized(ApiRequest::get(membership_path(kind))).await
    }

    async fn add(
        &self,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<Vec<MembershipEntry>, ClientError> {
        self.authorized(ApiRequest::post(membership_path(kind), entry_body(entry)))
            .await
    }

    async fn remove(
        &self,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<Vec<MembershipEntry>, ClientError> {
        self.authorized(ApiRequest::delete(membership_path(kind), entry_body(entry)))
            .await
    }
}
