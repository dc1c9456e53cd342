//! Grant-flow authenticator - OAuth2-style token acquisition
//!
//! Tries an ordered list of candidate token endpoints with the grant kinds
//! the configured credentials support. Each endpoint/grant attempt is
//! independent; a failure is recorded and the next candidate is tried.
//! Exhaustion surfaces every attempt for diagnostics so an operator can see
//! exactly which backend variants were probed.

use crate::{AttemptFailure, AuthError, AuthResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Candidate token endpoints, ordered by how common the variant is
pub const DEFAULT_TOKEN_ENDPOINTS: &[&str] = &[
    "/api/authorize/access_token",
    "/oauth/token",
    "/api/oauth/token",
    "/token",
];

/// Application-level OAuth2 client credentials
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// A successfully acquired token set
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Wire shape of a token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrantKind {
    Password,
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl std::fmt::Display for GrantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrantKind::Password => write!(f, "password"),
            GrantKind::AuthorizationCode => write!(f, "authorization_code"),
            GrantKind::ClientCredentials => write!(f, "client_credentials"),
            GrantKind::RefreshToken => write!(f, "refresh_token"),
        }
    }
}

/// Outcome of a single endpoint/grant attempt
enum Attempt {
    Granted(TokenGrant),
    /// Definitive rejection by the backend (4xx with a body)
    Rejected(String),
    /// Transient or shape failure; recorded and the next candidate is tried
    Failed(String),
}

/// OAuth2-style token acquisition against heterogeneous backends
pub struct GrantFlowAuthenticator {
    client: reqwest::Client,
    base_url: Url,
    endpoints: Vec<String>,
    client_creds: Option<ClientCredentials>,
    exchange_timeout: Duration,
}

impl GrantFlowAuthenticator {
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        client_creds: Option<ClientCredentials>,
        exchange_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url,
            endpoints: DEFAULT_TOKEN_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            client_creds,
            exchange_timeout,
        }
    }

    /// Override the candidate endpoint list (ordered)
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Whether application-level client credentials are configured
    pub fn has_client_credentials(&self) -> bool {
        self.client_creds.is_some()
    }

    /// Acquire human-bound tokens: password grant first, then an
    /// authorization-code exchange when a code was supplied out-of-band.
    pub async fn acquire_user_tokens(
        &self,
        username: &str,
        password: &str,
        auth_code: Option<&str>,
    ) -> AuthResult<TokenGrant> {
        let mut attempts: Vec<AttemptFailure> = Vec::new();

        for endpoint in &self.endpoints {
            let mut params = self.base_params(GrantKind::Password);
            params.push(("username".into(), username.to_string()));
            params.push(("password".into(), password.to_string()));
            match self.exchange(endpoint, GrantKind::Password, &params).await {
                Attempt::Granted(grant) => return Ok(grant),
                Attempt::Rejected(reason) | Attempt::Failed(reason) => {
                    attempts.push(attempt_failure(endpoint, GrantKind::Password, reason));
                }
            }
        }

        if let Some(code) = auth_code {
            for endpoint in &self.endpoints {
                let mut params = self.base_params(GrantKind::AuthorizationCode);
                params.push(("code".into(), code.to_string()));
                match self
                    .exchange(endpoint, GrantKind::AuthorizationCode, &params)
                    .await
                {
                    Attempt::Granted(grant) => return Ok(grant),
                    Attempt::Rejected(reason) | Attempt::Failed(reason) => {
                        attempts.push(attempt_failure(
                            endpoint,
                            GrantKind::AuthorizationCode,
                            reason,
                        ));
                    }
                }
            }
        }

        info!(
            attempts = attempts.len(),
            "grant flow exhausted without a token"
        );
        Err(AuthError::Exhausted { attempts })
    }

    /// Acquire an app-level token with the client-credentials grant
    pub async fn acquire_client_token(&self) -> AuthResult<TokenGrant> {
        if self.client_creds.is_none() {
            return Err(AuthError::credential_invalid(
                "no client credentials configured",
            ));
        }

        let mut attempts: Vec<AttemptFailure> = Vec::new();
        for endpoint in &self.endpoints {
            let params = self.base_params(GrantKind::ClientCredentials);
            match self
                .exchange(endpoint, GrantKind::ClientCredentials, &params)
                .await
            {
                Attempt::Granted(grant) => return Ok(grant),
                Attempt::Rejected(reason) | Attempt::Failed(reason) => {
                    attempts.push(attempt_failure(endpoint, GrantKind::ClientCredentials, reason));
                }
            }
        }
        Err(AuthError::Exhausted { attempts })
    }

    /// Exchange a refresh token for a new token set.
    ///
    /// A definitive backend rejection surfaces as `RefreshFailed` (the token
    /// is dead and the caller must re-authenticate); transport failures
    /// surface as `BackendUnreachable` (the stored record is still good).
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        let mut rejected: Option<String> = None;
        let mut last_failure = String::from("no token endpoints configured");

        for endpoint in &self.endpoints {
            let mut params = self.base_params(GrantKind::RefreshToken);
            params.push(("refresh_token".into(), refresh_token.to_string()));
            match self
                .exchange(endpoint, GrantKind::RefreshToken, &params)
                .await
            {
                Attempt::Granted(grant) => return Ok(grant),
                Attempt::Rejected(reason) => {
                    debug!(endpoint = endpoint.as_str(), reason = reason.as_str(), "refresh rejected");
                    rejected = Some(reason);
                }
                Attempt::Failed(reason) => {
                    debug!(endpoint = endpoint.as_str(), reason = reason.as_str(), "refresh attempt failed");
                    last_failure = reason;
                }
            }
        }

        match rejected {
            Some(reason) => Err(AuthError::refresh_failed(reason)),
            None => Err(AuthError::unreachable(last_failure)),
        }
    }

    fn base_params(&self, kind: GrantKind) -> Vec<(String, String)> {
        let mut params = vec![("grant_type".to_string(), kind.to_string())];
        if let Some(creds) = &self.client_creds {
            params.push(("client_id".into(), creds.client_id.clone()));
            params.push(("client_secret".into(), creds.client_secret.clone()));
        }
        params
    }

    async fn exchange(
        &self,
        endpoint: &str,
        kind: GrantKind,
        params: &[(String, String)],
    ) -> Attempt {
        let url = match self.base_url.join(endpoint) {
            Ok(url) => url,
            Err(e) => return Attempt::Failed(format!("invalid endpoint: {}", e)),
        };

        debug!(endpoint, grant = %kind, "attempting token exchange");
        let response = match self
            .client
            .post(url)
            .timeout(self.exchange_timeout)
            .form(params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Failed(match AuthError::from_request_error(e) {
                    AuthError::BackendUnreachable { message } => message,
                    other => other.to_string(),
                })
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        // Only statuses that speak about the credential count as rejections;
        // a missing endpoint (404 and friends) is just a failed candidate
        if status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            let detail = error_detail(&body).unwrap_or_else(|| body.chars().take(120).collect());
            return Attempt::Rejected(format!("HTTP {}: {}", status.as_u16(), detail));
        }
        if !status.is_success() {
            return Attempt::Failed(format!("HTTP {}", status.as_u16()));
        }

        let parsed: TokenResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) => return Attempt::Failed("2xx response is not token JSON".into()),
        };

        // A success status without a token is a format mismatch, not a success
        match parsed.access_token.filter(|t| !t.is_empty()) {
            Some(access_token) => {
                debug!(endpoint, grant = %kind, "token exchange succeeded");
                Attempt::Granted(TokenGrant {
                    access_token,
                    refresh_token: parsed.refresh_token,
                    expires_at: parsed
                        .expires_in
                        .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
                })
            }
            None => Attempt::Failed("2xx response carries no access_token".into()),
        }
    }
}

fn attempt_failure(endpoint: &str, kind: GrantKind, reason: String) -> AttemptFailure {
    AttemptFailure {
        endpoint: endpoint.to_string(),
        strategy: Some(kind.to_string()),
        reason,
    }
}

/// Pull a human-readable detail out of an OAuth2 error body
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["error_description", "message", "error"] {
        if let Some(detail) = value.get(key).and_then(|v| v.as_str()) {
            return Some(detail.to_string());
        }
    }
    None
}
