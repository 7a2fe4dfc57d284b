//! Refresh-and-replay in front of every authenticated request.
//!
//! Only a `401 TokenExpired` reply triggers a refresh. Concurrent expiries
//! share one refresh call through a [`Shared`] future that is also spawned,
//! so it runs to completion even when every waiter goes away. A logout that
//! lands while the refresh is out bumps the session epoch and the refresh
//! result is dropped on arrival.

use super::error::ClientError;
use super::session::SessionClient;
use super::transport::*;
use crate::api::v1::ApiErrorCode;
use crate::application_port::RefreshResult;
use crate::logger::*;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

type RefreshFlight = Shared<BoxFuture<'static, Result<String, ClientError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Refreshing,
    LoggedOut,
}

enum Flight {
    Idle,
    Refreshing { epoch: u64, flight: RefreshFlight },
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    session: SessionClient,
    flight: Arc<Mutex<Flight>>,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn Transport>, session: SessionClient) -> Self {
        RefreshCoordinator {
            transport,
            session,
            flight: Arc::new(Mutex::new(Flight::Idle)),
        }
    }

    pub fn session(&self) -> &SessionClient {
        &self.session
    }

    /// `LoggedOut` whenever the session holds no credentials, `Refreshing`
    /// while a refresh for the current session is out.
    pub fn state(&self) -> CoordinatorState {
        let slot = self.flight.lock();
        let Some((epoch, _)) = self.session.access_token() else {
            return CoordinatorState::LoggedOut;
        };
        match &*slot {
            Flight::Refreshing { epoch: e, .. } if *e == epoch => CoordinatorState::Refreshing,
            _ => CoordinatorState::Idle,
        }
    }

    /// Sends without credentials and without refresh handling.
    pub async fn send_public(&self, request: ApiRequest) -> Result<ApiReply, ClientError> {
        self.transport.send(request).await
    }

    /// Sends with the current access token. On `TokenExpired` the request is
    /// replayed once with a fresh token; every other reply is returned as is.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiReply, ClientError> {
        let (_, token) = self
            .session
            .access_token()
            .ok_or(ClientError::Unauthenticated(ApiErrorCode::MissingToken))?;

        let reply = self
            .transport
            .send(request.clone().with_bearer(token.clone()))
            .await?;
        if !reply.is_token_expired() {
            return Ok(reply);
        }

        let fresh = self.fresh_token(&token).await?;
        debug!(path = %request.path, "replaying request with refreshed token");
        self.transport.send(request.with_bearer(fresh)).await
    }

    /// Returns a token newer than `stale`, joining the refresh in flight or
    /// starting one.
    async fn fresh_token(&self, stale: &str) -> Result<String, ClientError> {
        let flight = {
            let mut slot = self.flight.lock();
            // Read under the slot lock so a refresh finishing concurrently is
            // seen either here or as the flight to join.
            let (epoch, current) = self
                .session
                .access_token()
                .ok_or(ClientError::Unauthenticated(ApiErrorCode::MissingToken))?;
            if current != stale {
                return Ok(current);
            }
            match &*slot {
                Flight::Refreshing { epoch: e, flight } if *e == epoch => flight.clone(),
                _ => {
                    let flight = self.start_refresh(epoch);
                    *slot = Flight::Refreshing {
                        epoch,
                        flight: flight.clone(),
                    };
                    flight
                }
            }
        };
        flight.await
    }

    fn start_refresh(&self, epoch: u64) -> RefreshFlight {
        let transport = self.transport.clone();
        let session = self.session.clone();
        let slot = self.flight.clone();

        let task = tokio::spawn(async move {
            let result = run_refresh(transport.as_ref(), &session, epoch).await;
            let mut slot = slot.lock();
            if matches!(&*slot, Flight::Refreshing { epoch: e, .. } if *e == epoch) {
                *slot = Flight::Idle;
            }
            result
        });

        async move {
            task.await
                .map_err(|e| ClientError::Transport(format!("refresh task failed: {e}")))?
        }
        .boxed()
        .shared()
    }
}

async fn run_refresh(
    transport: &dyn Transport,
    session: &SessionClient,
    epoch: u64,
) -> Result<String, ClientError> {
    let refresh_token = match session.refresh_token() {
        Some((current, token)) if current == epoch => token,
        _ => return Err(ClientError::Unauthenticated(ApiErrorCode::MissingToken)),
    };

    debug!(epoch, "refreshing access token");
    let request = ApiRequest::post("/refresh-token", json!({ "refresh_token": refresh_token }));
    let outcome = match transport.send(request).await {
        Ok(reply) => reply.into_result::<RefreshResult>(),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(refreshed) => {
            if session.apply_refresh(epoch, &refreshed)? {
                Ok(refreshed.access_token.0)
            } else {
                Err(ClientError::Unauthenticated(ApiErrorCode::MissingToken))
            }
        }
        Err(e) => {
            warn!(error = %e, "refresh failed, ending session");
            session.revoke(epoch);
            Err(match e {
                ClientError::Transport(_) => e,
                _ => ClientError::RefreshInvalid,
            })
        }
    }
}
