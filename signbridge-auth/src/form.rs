//! Form-login authenticator - session-cookie/CSRF authentication
//!
//! Used when the backend exposes no working token endpoint. The flow is a
//! small state machine: fetch a login surface, extract an anti-forgery token
//! if one is embedded, submit credentials, then classify the response.
//! Classification recognizes three success shapes in fixed priority order:
//! a JSON body carrying a session/user identifier, a non-login redirect,
//! then a recognized session cookie.
//!
//! An MFA challenge is detected and reported verbatim; completing it is out
//! of scope.

use crate::permissions::PermissionSet;
use crate::{AttemptFailure, AuthError, AuthResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use reqwest::header::{HeaderValue, LOCATION, SET_COOKIE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Candidate login pages, tried in order until one responds 2xx/3xx
pub const DEFAULT_LOGIN_PAGES: &[&str] = &["/login", "/admin/login", "/user/login", "/"];

/// Candidate credential submission endpoints, tried in order
pub const DEFAULT_SUBMIT_ENDPOINTS: &[&str] =
    &["/login", "/admin/login", "/api/login", "/user/login"];

/// Session cookie names recognized across backend variants
pub const SESSION_COOKIE_NAMES: &[&str] =
    &["PHPSESSID", "SESSION", "sessionid", "JSESSIONID", "connect.sid"];

/// Path fragments that mark a redirect as "back to the login page"
const LOGIN_PATH_MARKERS: &[&str] = &["login", "signin", "sign-in"];

/// JSON keys that mark a body as an MFA challenge
const MFA_TOKEN_KEYS: &[&str] = &["mfaToken", "mfa_token", "twoFactorToken", "tfa_token"];

/// Ephemeral, in-memory session produced by a successful form login.
///
/// Never persisted to disk - that is what distinguishes it from a
/// [`crate::store::CredentialRecord`], which holds grant-flow tokens.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user_id: Option<String>,
    pub username: String,
    pub csrf_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub permissions: Option<PermissionSet>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// One named anti-forgery extraction rule; rules are tried in order
struct CsrfRule {
    name: &'static str,
    pattern: Regex,
}

/// Identifiers recovered while classifying a successful login response
#[derive(Debug, Default)]
struct SessionSeed {
    session_id: Option<String>,
    user_id: Option<String>,
}

enum SubmitOutcome {
    Authenticated(SessionSeed),
    MfaChallenge(Option<String>),
    Failed(String),
}

/// Cookie/CSRF-based login against a web login surface
pub struct FormLoginAuthenticator {
    /// Shared client; must have a cookie store and redirects disabled so
    /// Set-Cookie and Location stay observable
    client: reqwest::Client,
    base_url: Url,
    login_pages: Vec<String>,
    submit_endpoints: Vec<String>,
    csrf_rules: Vec<CsrfRule>,
    probe_timeout: Duration,
    exchange_timeout: Duration,
    session_hours: i64,
}

impl FormLoginAuthenticator {
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        probe_timeout: Duration,
        exchange_timeout: Duration,
        session_hours: i64,
    ) -> Self {
        Self {
            client,
            base_url,
            login_pages: DEFAULT_LOGIN_PAGES.iter().map(|s| s.to_string()).collect(),
            submit_endpoints: DEFAULT_SUBMIT_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            csrf_rules: csrf_rules(),
            probe_timeout,
            exchange_timeout,
            session_hours,
        }
    }

    /// Override the candidate login page list (ordered)
    pub fn with_login_pages(mut self, pages: Vec<String>) -> Self {
        self.login_pages = pages;
        self
    }

    /// Override the candidate submission endpoint list (ordered)
    pub fn with_submit_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.submit_endpoints = endpoints;
        self
    }

    /// Run the login state machine to completion
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<Session> {
        let mut attempts: Vec<AttemptFailure> = Vec::new();

        let surface = self.fetch_login_surface(&mut attempts).await;
        let csrf_token = surface
            .as_deref()
            .and_then(|body| self.extract_anti_forgery_token(body));
        if surface.is_some() && csrf_token.is_none() {
            // Some backends embed no token at all; proceed without one
            debug!("no anti-forgery token found on login surface");
        }

        for endpoint in &self.submit_endpoints {
            match self
                .submit(endpoint, username, password, csrf_token.as_deref())
                .await
            {
                SubmitOutcome::Authenticated(seed) => {
                    let session = self.build_session(seed, username, csrf_token);
                    info!(
                        endpoint = endpoint.as_str(),
                        session_id = session.session_id.as_str(),
                        "form login succeeded"
                    );
                    return Ok(session);
                }
                SubmitOutcome::MfaChallenge(mfa_token) => {
                    info!(endpoint = endpoint.as_str(), "backend issued an MFA challenge");
                    return Err(AuthError::MfaRequired { mfa_token });
                }
                SubmitOutcome::Failed(reason) => {
                    debug!(endpoint = endpoint.as_str(), reason = reason.as_str(), "submission failed");
                    attempts.push(AttemptFailure {
                        endpoint: endpoint.clone(),
                        strategy: Some("form-login".into()),
                        reason,
                    });
                }
            }
        }

        warn!(attempts = attempts.len(), "form login exhausted all endpoints");
        Err(AuthError::Exhausted { attempts })
    }

    /// Fetch the first login page that answers 2xx/3xx
    async fn fetch_login_surface(&self, attempts: &mut Vec<AttemptFailure>) -> Option<String> {
        for page in &self.login_pages {
            let url = match self.base_url.join(page) {
                Ok(url) => url,
                Err(e) => {
                    attempts.push(surface_failure(page, format!("invalid path: {}", e)));
                    continue;
                }
            };
            match self.client.get(url).timeout(self.probe_timeout).send().await {
                Ok(response)
                    if response.status().is_success() || response.status().is_redirection() =>
                {
                    debug!(page = page.as_str(), "login surface fetched");
                    return response.text().await.ok();
                }
                Ok(response) => {
                    attempts.push(surface_failure(
                        page,
                        format!("HTTP {}", response.status().as_u16()),
                    ));
                }
                Err(e) => {
                    attempts.push(surface_failure(page, e.to_string()));
                }
            }
        }
        None
    }

    /// Scan the login surface for an embedded anti-forgery token.
    ///
    /// Rules are tried in order; the first capture wins.
    pub fn extract_anti_forgery_token(&self, body: &str) -> Option<String> {
        for rule in &self.csrf_rules {
            if let Some(caps) = rule.pattern.captures(body) {
                if let Some(token) = caps.get(1) {
                    debug!(rule = rule.name, "anti-forgery token extracted");
                    return Some(token.as_str().to_string());
                }
            }
        }
        None
    }

    async fn submit(
        &self,
        endpoint: &str,
        username: &str,
        password: &str,
        csrf_token: Option<&str>,
    ) -> SubmitOutcome {
        let url = match self.base_url.join(endpoint) {
            Ok(url) => url,
            Err(e) => return SubmitOutcome::Failed(format!("invalid endpoint: {}", e)),
        };

        let mut form: Vec<(&str, &str)> = vec![("username", username), ("password", password)];
        if let Some(token) = csrf_token {
            form.push(("csrf_token", token));
        }

        let mut request = self
            .client
            .post(url)
            .timeout(self.exchange_timeout)
            .form(&form);
        if let Some(token) = csrf_token {
            request = request.header("X-CSRF-Token", token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return SubmitOutcome::Failed(match AuthError::from_request_error(e) {
                    AuthError::BackendUnreachable { message } => message,
                    other => other.to_string(),
                })
            }
        };

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v: &HeaderValue| v.to_str().ok())
            .map(String::from)
            .collect();
        let body = response.text().await.unwrap_or_default();

        // A challenge stops the machine before any success classification
        if let Some(mfa_token) = detect_mfa_challenge(status, &body) {
            return SubmitOutcome::MfaChallenge(mfa_token);
        }

        if !(status.is_success() || status.is_redirection()) {
            return SubmitOutcome::Failed(format!("HTTP {}", status.as_u16()));
        }

        // Fixed precedence: JSON body > non-login redirect > session cookie
        if let Some(seed) = classify_json_body(&body) {
            debug!(endpoint, "classified response via JSON body");
            return SubmitOutcome::Authenticated(seed);
        }
        if status.is_redirection() {
            match &location {
                Some(target) if !is_login_path(target) => {
                    debug!(endpoint, target = target.as_str(), "classified response via redirect");
                    return SubmitOutcome::Authenticated(SessionSeed::default());
                }
                Some(target) => {
                    return SubmitOutcome::Failed(format!("redirected back to login: {}", target))
                }
                None => return SubmitOutcome::Failed("redirect without a target".into()),
            }
        }
        if let Some(seed) = classify_session_cookie(&cookies) {
            debug!(endpoint, "classified response via session cookie");
            return SubmitOutcome::Authenticated(seed);
        }

        SubmitOutcome::Failed("response matched no recognized success shape".into())
    }

    fn build_session(
        &self,
        seed: SessionSeed,
        username: &str,
        csrf_token: Option<String>,
    ) -> Session {
        Session {
            session_id: seed
                .session_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: seed.user_id,
            username: username.to_string(),
            csrf_token,
            expires_at: Utc::now() + ChronoDuration::hours(self.session_hours),
            permissions: None,
        }
    }
}

fn surface_failure(page: &str, reason: String) -> AttemptFailure {
    AttemptFailure {
        endpoint: page.to_string(),
        strategy: Some("login-surface".into()),
        reason,
    }
}

/// Anti-forgery token embedding patterns, in priority order
fn csrf_rules() -> Vec<CsrfRule> {
    // Patterns are fixed strings; a compile failure here is a programming
    // error caught by the unit tests below
    let rule = |name, pattern: &str| CsrfRule {
        name,
        pattern: Regex::new(pattern).expect("invalid csrf rule pattern"),
    };
    vec![
        rule(
            "meta-tag",
            r#"(?i)<meta\s+name=["']csrf-token["']\s+content=["']([^"']+)["']"#,
        ),
        rule(
            "hidden-input",
            r#"(?i)<input[^>]*name=["'](?:csrf_token|csrfToken|_token|authenticity_token)["'][^>]*value=["']([^"']+)["']"#,
        ),
        rule(
            "hidden-input-value-first",
            r#"(?i)<input[^>]*value=["']([^"']+)["'][^>]*name=["'](?:csrf_token|csrfToken|_token|authenticity_token)["']"#,
        ),
        rule("script-var", r#"csrfToken\s*[:=]\s*["']([^"']+)["']"#),
    ]
}

/// MFA challenge detection: a challenge status, or a token-bearing body
fn detect_mfa_challenge(status: StatusCode, body: &str) -> Option<Option<String>> {
    let token = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            MFA_TOKEN_KEYS
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(String::from))
        });
    if status == StatusCode::ACCEPTED || token.is_some() {
        return Some(token);
    }
    None
}

/// Success shape 1: a JSON body carrying a session or user identifier
fn classify_json_body(body: &str) -> Option<SessionSeed> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;

    let pick = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|key| {
            obj.get(*key).and_then(|v| match v {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        })
    };

    let session_id = pick(&["sessionId", "session_id", "sessionID", "token"]);
    let user_id = pick(&["userId", "user_id"]).or_else(|| {
        value
            .get("user")
            .and_then(|u| u.get("userId").or_else(|| u.get("id")))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    });

    if session_id.is_none() && user_id.is_none() {
        return None;
    }
    Some(SessionSeed {
        session_id,
        user_id,
    })
}

/// Success shape 3: a recognized session cookie among several known variants
fn classify_session_cookie(cookies: &[String]) -> Option<SessionSeed> {
    for cookie in cookies {
        let name_value = cookie.split(';').next().unwrap_or_default();
        let (name, value) = name_value.split_once('=')?;
        if SESSION_COOKIE_NAMES.contains(&name.trim()) && !value.trim().is_empty() {
            return Some(SessionSeed {
                session_id: Some(value.trim().to_string()),
                user_id: None,
            });
        }
    }
    None
}

/// Does a redirect target point back at a login surface?
fn is_login_path(target: &str) -> bool {
    let path = Url::parse(target)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| target.to_ascii_lowercase());
    LOGIN_PATH_MARKERS.iter().any(|marker| path.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> FormLoginAuthenticator {
        FormLoginAuthenticator::new(
            reqwest::Client::new(),
            Url::parse("http://cms.example.com").unwrap(),
            Duration::from_secs(5),
            Duration::from_secs(30),
            8,
        )
    }

    #[test]
    fn extracts_csrf_from_meta_tag() {
        let auth = authenticator();
        let body = r#"<html><head><meta name="csrf-token" content="xyz"></head></html>"#;
        assert_eq!(auth.extract_anti_forgery_token(body).as_deref(), Some("xyz"));
    }

    #[test]
    fn extracts_csrf_from_hidden_input() {
        let auth = authenticator();
        let body = r#"<form><input type="hidden" name="csrf_token" value="tok-1"></form>"#;
        assert_eq!(
            auth.extract_anti_forgery_token(body).as_deref(),
            Some("tok-1")
        );

        let reversed = r#"<form><input type="hidden" value="tok-2" name="_token"></form>"#;
        assert_eq!(
            auth.extract_anti_forgery_token(reversed).as_deref(),
            Some("tok-2")
        );
    }

    #[test]
    fn extracts_csrf_from_script_var() {
        let auth = authenticator();
        let body = r#"<script>var config = { csrfToken: "js-tok" };</script>"#;
        assert_eq!(
            auth.extract_anti_forgery_token(body).as_deref(),
            Some("js-tok")
        );
    }

    #[test]
    fn meta_tag_wins_over_script_var() {
        let auth = authenticator();
        let body = r#"
            <meta name="csrf-token" content="from-meta">
            <script>csrfToken = "from-script"</script>
        "#;
        assert_eq!(
            auth.extract_anti_forgery_token(body).as_deref(),
            Some("from-meta")
        );
    }

    #[test]
    fn missing_token_is_tolerated() {
        let auth = authenticator();
        assert_eq!(auth.extract_anti_forgery_token("<html>no token</html>"), None);
    }

    #[test]
    fn json_body_classification_needs_an_identifier() {
        let seed = classify_json_body(r#"{"sessionId":"s-1","userId":7}"#).unwrap();
        assert_eq!(seed.session_id.as_deref(), Some("s-1"));
        assert_eq!(seed.user_id.as_deref(), Some("7"));

        let nested = classify_json_body(r#"{"user":{"id":42}}"#).unwrap();
        assert_eq!(nested.user_id.as_deref(), Some("42"));

        assert!(classify_json_body(r#"{"error":"bad password"}"#).is_none());
        assert!(classify_json_body("<html></html>").is_none());
    }

    #[test]
    fn session_cookie_classification_recognizes_known_names() {
        let cookies = vec!["PHPSESSID=abc123; Path=/; HttpOnly".to_string()];
        let seed = classify_session_cookie(&cookies).unwrap();
        assert_eq!(seed.session_id.as_deref(), Some("abc123"));

        let unknown = vec!["tracking=xyz; Path=/".to_string()];
        assert!(classify_session_cookie(&unknown).is_none());
    }

    #[test]
    fn login_redirect_targets_are_rejected() {
        assert!(is_login_path("/login?error=1"));
        assert!(is_login_path("https://cms.example.com/admin/login"));
        assert!(!is_login_path("/dashboard"));
        assert!(!is_login_path("https://cms.example.com/welcome"));
    }

    #[test]
    fn mfa_challenge_detection() {
        // Challenge status with a token body
        let token = detect_mfa_challenge(StatusCode::ACCEPTED, r#"{"mfaToken":"t1"}"#).unwrap();
        assert_eq!(token.as_deref(), Some("t1"));

        // Challenge status without a token still stops the machine
        let none = detect_mfa_challenge(StatusCode::ACCEPTED, "").unwrap();
        assert_eq!(none, None);

        // Token marker in an ordinary status is also a challenge
        let marker = detect_mfa_challenge(StatusCode::OK, r#"{"mfa_token":"t2"}"#).unwrap();
        assert_eq!(marker.as_deref(), Some("t2"));

        // Ordinary success body is not a challenge
        assert!(detect_mfa_challenge(StatusCode::OK, r#"{"sessionId":"s"}"#).is_none());
    }

    #[test]
    fn sessions_expire_after_their_window() {
        let auth = authenticator();
        let session = auth.build_session(SessionSeed::default(), "alice", None);
        assert!(!session.is_expired());
        assert_eq!(session.username, "alice");

        let expired = Session {
            expires_at: Utc::now() - ChronoDuration::minutes(1),
            ..session
        };
        assert!(expired.is_expired());
    }
}
