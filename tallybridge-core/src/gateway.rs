//! OAuth2 token acquisition and the resilient upstream gateway.
//!
//! This module provides:
//! - [`TokenAcquirer`] - refresh-token exchange against the authorization
//!   server
//! - [`ApiGateway`] - the "get valid token, call, on 401 refresh once and
//!   retry, classify result" wrapper every upstream integration goes through
//!
//! One gateway is built per [`ServiceCredential`], each owning its own entry
//! in the shared [`TokenStore`]. The retry budget is exactly one extra
//! attempt, and only a 401 spends it; transport failures are never retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{ServiceCredential, ServiceId};
use crate::token::{CachedToken, TokenStore};

/// Fixed timeout for the token exchange.
const TOKEN_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for upstream data calls.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream bodies are truncated to this many bytes in log lines. The error
/// payload itself carries the full body.
const LOG_BODY_LIMIT: usize = 512;

/// Authorization scheme the Zoho-style upstreams expect.
pub const DEFAULT_AUTH_SCHEME: &str = "Zoho-oauthtoken";

/// Error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The token exchange failed: non-2xx from the token endpoint or a
    /// response body without an `access_token`.
    #[error("token exchange failed for {service}: {message}")]
    Auth { service: ServiceId, message: String },

    /// An unrecoverable upstream response: non-2xx after the retry budget,
    /// or a 2xx whose body carries an application-level error.
    #[error("upstream call to {service} failed with status {status}: {body}")]
    Upstream {
        service: ServiceId,
        status: u16,
        body: String,
    },

    /// Network-level failure (timeout, connection refused, DNS).
    #[error("transport failure talking to {service}: {source}")]
    Transport {
        service: ServiceId,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// Performs the refresh-token exchange for a given credential set.
///
/// No retry lives here; retrying is the gateway's responsibility.
pub struct TokenAcquirer {
    http: reqwest::Client,
    token_url: String,
}

impl TokenAcquirer {
    /// Create an acquirer against a fixed token endpoint.
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }

    /// Exchange the refresh token for a fresh access token.
    ///
    /// The grant parameters travel as query-string encoding; the upstream
    /// rejects a JSON body.
    pub async fn acquire(
        &self,
        service: &ServiceId,
        credential: &ServiceCredential,
    ) -> Result<CachedToken, GatewayError> {
        tracing::info!("Requesting new access token for {}", service);

        let response = self
            .http
            .post(&self.token_url)
            .query(&[
                ("client_id", credential.client_id.as_str()),
                ("client_secret", credential.client_secret.expose()),
                ("refresh_token", credential.refresh_token.expose()),
                ("grant_type", "refresh_token"),
            ])
            .timeout(TOKEN_EXCHANGE_TIMEOUT)
            .send()
            .await
            .map_err(|source| GatewayError::Transport {
                service: service.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| GatewayError::Transport {
                service: service.clone(),
                source,
            })?;

        if !status.is_success() {
            tracing::error!(
                "Token request for {} failed with {}: {}",
                service,
                status.as_u16(),
                truncate_for_log(&body)
            );
            return Err(GatewayError::Auth {
                service: service.clone(),
                message: format!("token endpoint returned {}: {}", status.as_u16(), body),
            });
        }

        let grant: TokenGrant =
            serde_json::from_str(&body).map_err(|e| GatewayError::Auth {
                service: service.clone(),
                message: format!("unparseable token response: {}", e),
            })?;

        let access_token = grant
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                tracing::error!("No access token in response for {}", service);
                GatewayError::Auth {
                    service: service.clone(),
                    message: "no access_token in token response".to_string(),
                }
            })?;

        let expires_in = grant.expires_in.unwrap_or(3600);
        let token = CachedToken::issue(access_token, expires_in);
        tracing::info!(
            "Access token obtained for {}, expires at {}",
            service,
            token.expires_at
        );
        Ok(token)
    }
}

/// Declarative description of one upstream request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub accept: Option<String>,
    pub timeout: Duration,
}

impl UpstreamRequest {
    /// A GET request with the default data-call timeout.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            accept: None,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the Accept header.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Override the call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Wraps upstream HTTP calls with the token lifecycle protocol.
pub struct ApiGateway {
    service: ServiceId,
    credential: ServiceCredential,
    auth_scheme: String,
    store: Arc<TokenStore>,
    acquirer: TokenAcquirer,
    http: reqwest::Client,
}

impl ApiGateway {
    /// Create a gateway for one upstream service.
    pub fn new(
        service: ServiceId,
        credential: ServiceCredential,
        token_url: impl Into<String>,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            service,
            credential,
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            store,
            acquirer: TokenAcquirer::new(token_url),
            http: reqwest::Client::new(),
        }
    }

    /// Override the Authorization scheme (defaults to the Zoho one).
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    /// The service this gateway fronts.
    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    /// The shared token store.
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Send a request, refreshing the bearer token and retrying exactly once
    /// on a 401.
    ///
    /// A 2xx response is parsed as JSON and checked for application-level
    /// failure; HTTP success does not imply logical success.
    pub async fn send(&self, request: UpstreamRequest) -> Result<Value, GatewayError> {
        let token = self.valid_token().await?;
        let mut response = self.issue(&request, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                "Token rejected (401) by {}, refreshing and retrying once",
                self.service
            );
            let token = self.refresh_token().await?;
            response = self.issue(&request, &token).await?;
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| GatewayError::Transport {
                service: self.service.clone(),
                source,
            })?;

        if !status.is_success() {
            tracing::error!(
                "Upstream {} error {}: {}",
                self.service,
                status.as_u16(),
                truncate_for_log(&body)
            );
            return Err(GatewayError::Upstream {
                service: self.service.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = serde_json::from_str(&body).map_err(|e| GatewayError::Upstream {
            service: self.service.clone(),
            status: status.as_u16(),
            body: format!("unparseable response body: {}", e),
        })?;

        self.check_application_error(status.as_u16(), &payload)?;
        tracing::debug!("Request to {} successful: {}", self.service, status.as_u16());
        Ok(payload)
    }

    /// Acquire a valid token without issuing a data call.
    ///
    /// Health checks use this to verify the credential still exchanges; the
    /// acquired token lands in the store like any other.
    pub async fn verify_token(&self) -> Result<(), GatewayError> {
        self.valid_token().await.map(|_| ())
    }

    /// Use the cached token when valid, otherwise acquire and store.
    async fn valid_token(&self) -> Result<CachedToken, GatewayError> {
        if let Some(token) = self.store.get(&self.service) {
            if token.is_valid() {
                tracing::debug!("Using cached access token for {}", self.service);
                return Ok(token);
            }
        }
        tracing::info!("Token expired or missing for {}, refreshing", self.service);
        self.refresh_token().await
    }

    /// Acquire unconditionally and replace the cache entry.
    async fn refresh_token(&self) -> Result<CachedToken, GatewayError> {
        let token = self.acquirer.acquire(&self.service, &self.credential).await?;
        self.store.set(&self.service, token.clone());
        Ok(token)
    }

    async fn issue(
        &self,
        request: &UpstreamRequest,
        token: &CachedToken,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{} {}", self.auth_scheme, token.access_token.expose()),
            )
            .query(&request.query)
            .timeout(request.timeout);

        if let Some(accept) = &request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept.clone());
        }

        builder
            .send()
            .await
            .map_err(|source| GatewayError::Transport {
                service: self.service.clone(),
                source,
            })
    }

    /// Books reports logical failure via a non-zero `code` field, WorkDrive
    /// via an `errors` array, both inside otherwise-200 responses.
    fn check_application_error(&self, status: u16, payload: &Value) -> Result<(), GatewayError> {
        if let Some(code) = payload.get("code").and_then(Value::as_i64) {
            if code != 0 {
                let message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("upstream reported an error");
                return Err(GatewayError::Upstream {
                    service: self.service.clone(),
                    status,
                    body: format!("code {}: {}", code, message),
                });
            }
        }

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(GatewayError::Upstream {
                    service: self.service.clone(),
                    status,
                    body: serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string()),
                });
            }
        }

        Ok(())
    }
}

fn truncate_for_log(body: &str) -> &str {
    if body.len() <= LOG_BODY_LIMIT {
        return body;
    }
    let mut end = LOG_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
