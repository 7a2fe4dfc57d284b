use super::error::ClientError;
use crate::api::v1::{ApiErrorCode, ApiResponse};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A request relative to the API root, e.g. `POST /favorites`.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            body,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path, Some(body))
    }

    pub fn delete(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Delete, path, Some(body))
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// Status plus the decoded JSON envelope. Bodies that are not JSON decode to
/// `Value::Null`.
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

impl ApiReply {
    /// The error code of a 401 reply, if it carried one.
    pub fn unauthenticated_code(&self) -> Option<ApiErrorCode> {
        if self.status != 401 {
            return None;
        }
        let code = self.body.get("error")?.get("code")?;
        serde_json::from_value(code.clone()).ok()
    }

    pub fn is_token_expired(&self) -> bool {
        self.unauthenticated_code() == Some(ApiErrorCode::TokenExpired)
    }

    /// Unwraps the `{success, data, error}` envelope.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let status = self.status;
        let envelope: ApiResponse<T> =
            serde_json::from_value(self.body).map_err(|e| ClientError::Server {
                status,
                message: format!("malformed response: {e}"),
            })?;

        match (envelope.success, envelope.data, envelope.error) {
            (true, Some(data), _) if (200..300).contains(&status) => Ok(data),
            (_, _, Some(error)) => Err(ClientError::from_api_error(status, error)),
            _ => Err(ClientError::Server {
                status,
                message: "response carried neither data nor error".to_string(),
            }),
        }
    }
}

/// One round trip to the API. Implementations never interpret the reply.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiReply, ClientError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is the API root, e.g. `https://host/api/v1`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(HttpTransport {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiReply, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(ApiReply { status, body })
    }
}
