use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use verilingua_core::auth::{Credential, RefreshIdentity, RefreshResponse};
use verilingua_core::error::ApiError;

use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, StoreError};

#[derive(Debug, Error)]
pub enum ClientError {
    /// No response at all (connect failure, timeout). Never triggers a refresh.
    #[error("could not reach the server: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("server responded with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("credential refresh failed: {0}")]
    RefreshFailed(#[source] Box<ClientError>),
    #[error("refresh response did not contain a credential")]
    EmptyCredential,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the session is gone and the user has to log in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::RefreshFailed(_))
    }
}

/// Hook fired when the credential could not be renewed. The surrounding app decides
/// what "go to the login surface" means.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

/// One logical call: method, path relative to the API base, optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

/// A request paired with whether it already went through a refresh cycle.
#[derive(Debug, Clone, Copy)]
struct Attempt<'a> {
    request: &'a ApiRequest,
    retried: bool,
}

impl<'a> Attempt<'a> {
    fn first(request: &'a ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    fn retry(self) -> Self {
        Self {
            request: self.request,
            retried: true,
        }
    }
}

/// Successful (2xx) response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Empty body and JSON `null` both decode to `None`.
    pub fn json_opt<T: DeserializeOwned>(&self) -> Result<Option<T>, ClientError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP client that attaches the stored credential and renews it once per request
/// on 401.
pub struct AuthenticatedClient {
    http: reqwest::Client,
    api_base: String,
    store: Arc<dyn CredentialStore>,
    identity: RefreshIdentity,
    redirect: Arc<dyn LoginRedirect>,
}

impl AuthenticatedClient {
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self {
            http,
            api_base: config.api_base(),
            store,
            identity: config.refresh_identity.clone(),
            redirect,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Send a logical request. At most two attempts are made: the original and, after
    /// a successful refresh, one retry.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut attempt = Attempt::first(request);
        loop {
            let response = self.dispatch(attempt).await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !attempt.retried {
                tracing::info!(
                    method = %request.method,
                    path = %request.path,
                    "credential rejected; refreshing once"
                );
                self.renew_credential().await?;
                attempt = attempt.retry();
                continue;
            }

            let body = response
                .bytes()
                .await
                .map_err(ClientError::Transport)?
                .to_vec();

            if !status.is_success() {
                tracing::debug!(
                    method = %request.method,
                    path = %request.path,
                    status = status.as_u16(),
                    retried = attempt.retried,
                    "request failed"
                );
                return Err(ClientError::Status {
                    status,
                    message: ApiError::describe(&body),
                });
            }

            return Ok(ApiResponse { status, body });
        }
    }

    async fn dispatch(&self, attempt: Attempt<'_>) -> Result<reqwest::Response, ClientError> {
        let request = attempt.request;
        let mut req = self
            .http
            .request(request.method.clone(), self.url(&request.path));

        if let Some(credential) = self.store.get()? {
            req = req.header("Authorization", credential.bearer());
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            retried = attempt.retried,
            "sending request"
        );
        req.send().await.map_err(|e| {
            tracing::warn!(path = %request.path, error = %e, "network error or server unreachable");
            ClientError::Transport(e)
        })
    }

    async fn renew_credential(&self) -> Result<(), ClientError> {
        match self.request_refresh().await {
            Ok(credential) => {
                self.store.set(&credential)?;
                tracing::info!("credential refreshed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "credential refresh failed; clearing session");
                if let Err(clear_err) = self.store.clear() {
                    tracing::error!(error = %clear_err, "failed to clear credential");
                }
                self.redirect.redirect_to_login();
                Err(ClientError::RefreshFailed(Box::new(err)))
            }
        }
    }

    /// `POST /auth/refresh`, sent without the stale credential.
    async fn request_refresh(&self) -> Result<Credential, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&self.identity)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(ClientError::Transport)?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                message: ApiError::describe(&body),
            });
        }

        let parsed: RefreshResponse = serde_json::from_slice(&body)?;
        Credential::new(parsed.access_token).ok_or(ClientError::EmptyCredential)
    }
}
