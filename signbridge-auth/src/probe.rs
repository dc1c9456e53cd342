//! Identity probing - "who am I" lookup after authentication
//!
//! Queries a fixed ordered list of identity endpoints until one returns
//! identity data. Works for both credential shapes: bearer tokens are passed
//! explicitly, form-login sessions ride on the shared client's cookie jar.

use crate::{AttemptFailure, AuthError, AuthResult};
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Candidate identity endpoints, tried in order
pub const DEFAULT_IDENTITY_ENDPOINTS: &[&str] =
    &["/api/user/me", "/api/me", "/api/user/current", "/user/me"];

/// Fetch the raw identity payload for the active credential
pub async fn probe_identity(
    client: &reqwest::Client,
    base_url: &Url,
    bearer: Option<&str>,
    timeout: Duration,
) -> AuthResult<serde_json::Value> {
    let mut attempts: Vec<AttemptFailure> = Vec::new();

    for endpoint in DEFAULT_IDENTITY_ENDPOINTS {
        let url = match base_url.join(endpoint) {
            Ok(url) => url,
            Err(e) => {
                attempts.push(probe_failure(endpoint, format!("invalid path: {}", e)));
                continue;
            }
        };

        let mut request = client
            .get(url)
            .timeout(timeout)
            .header(ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<serde_json::Value>().await {
                    Ok(payload) if payload.is_object() => {
                        debug!(endpoint, "identity probe succeeded");
                        return Ok(payload);
                    }
                    Ok(_) => attempts.push(probe_failure(endpoint, "non-object body".into())),
                    Err(e) => attempts.push(probe_failure(endpoint, e.to_string())),
                }
            }
            Ok(response) => attempts.push(probe_failure(
                endpoint,
                format!("HTTP {}", response.status().as_u16()),
            )),
            Err(e) => attempts.push(probe_failure(endpoint, e.to_string())),
        }
    }

    Err(AuthError::Exhausted { attempts })
}

fn probe_failure(endpoint: &str, reason: String) -> AttemptFailure {
    AttemptFailure {
        endpoint: endpoint.to_string(),
        strategy: Some("identity-probe".into()),
        reason,
    }
}
