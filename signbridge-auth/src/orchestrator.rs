//! Credential orchestrator - owns the live client and the active credential
//!
//! Exactly one credential source is active at a time: app-level client
//! credentials, or human-bound user tokens produced by either authenticator.
//! Every outbound call passes through "ensure authenticated"; a 401 response
//! triggers exactly one forced re-authentication and retry before the
//! failure is surfaced. A background task refreshes the stored credential at
//! 75 % of its validity window and is stopped on logout.

use crate::capability;
use crate::codec::SecretCodec;
use crate::form::{FormLoginAuthenticator, Session};
use crate::grant::{ClientCredentials, GrantFlowAuthenticator, TokenGrant};
use crate::permissions::{resolve, PermissionSet};
use crate::probe::probe_identity;
use crate::store::CredentialStore;
use crate::{AttemptFailure, AuthError, AuthResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Which kind of credential is currently active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// App-level token, not bound to a human identity
    ClientCredentials,
    /// Human-bound tokens or session, produced by either authenticator
    UserTokens,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::ClientCredentials => write!(f, "client_credentials"),
            CredentialSource::UserTokens => write!(f, "user_tokens"),
        }
    }
}

/// Snapshot of the orchestrator's authentication state
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub mode: CredentialSource,
    pub is_authenticated: bool,
    pub identity: Option<String>,
}

/// Everything the orchestrator needs to run, distilled from the app config
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub base_url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub passphrase: String,
    pub data_dir: PathBuf,
    pub expiry_margin_secs: i64,
    pub session_hours: i64,
    pub probe_timeout: Duration,
    pub exchange_timeout: Duration,
    pub request_timeout: Duration,
}

impl OrchestratorConfig {
    /// Distill the application configuration, supplying the passphrase
    /// from whatever source the caller chose
    pub fn from_config(
        config: &signbridge_core::SignbridgeConfig,
        passphrase: String,
    ) -> AuthResult<Self> {
        let base_url = Url::parse(&config.backend.base_url).map_err(|e| {
            AuthError::Core(signbridge_core::SignbridgeError::Config {
                message: format!("Invalid backend base URL: {}", e),
                source: None,
                context: signbridge_core::ErrorContext::new("orchestrator")
                    .with_operation("parse_base_url")
                    .with_suggestion("Set backend.base_url to a full http(s) URL"),
            })
        })?;

        Ok(Self {
            base_url,
            username: config.auth.username.clone(),
            password: config.auth.password.clone(),
            client_id: config.backend.client_id.clone(),
            client_secret: config.backend.client_secret.clone(),
            passphrase,
            data_dir: config.resolved_data_dir(),
            expiry_margin_secs: config.auth.expiry_margin_secs as i64,
            session_hours: config.auth.session_hours as i64,
            probe_timeout: Duration::from_secs(config.http.probe_timeout_secs),
            exchange_timeout: Duration::from_secs(config.http.exchange_timeout_secs),
            request_timeout: Duration::from_secs(config.http.request_timeout_secs),
        })
    }
}

/// Credential installed on one outgoing request
#[derive(Debug, Clone)]
enum RequestAuth {
    Bearer(String),
    Session { csrf_token: Option<String> },
}

struct AuthState {
    source: CredentialSource,
    session: Option<Session>,
    app_token: Option<TokenGrant>,
    permissions: Option<PermissionSet>,
    identity: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            source: CredentialSource::ClientCredentials,
            session: None,
            app_token: None,
            permissions: None,
            identity: None,
        }
    }
}

/// Cancellation handle for the background refresh task
struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.join.abort();
    }
}

struct Inner {
    client: reqwest::Client,
    base_url: Url,
    store: CredentialStore,
    grant: GrantFlowAuthenticator,
    form: FormLoginAuthenticator,
    username: Option<String>,
    password: Option<String>,
    expiry_margin_secs: i64,
    probe_timeout: Duration,
    request_timeout: Duration,
    state: RwLock<AuthState>,
    refresh_task: Mutex<Option<RefreshHandle>>,
}

/// Top-level owner of the live client and the active credential
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> AuthResult<Self> {
        // Redirects stay observable and cookies persist across calls; both
        // authenticators and the catalog share this client and its jar
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(AuthError::from_request_error)?;

        let codec = SecretCodec::new(&config.passphrase)?;
        let owner = config
            .username
            .clone()
            .or_else(|| config.client_id.clone())
            .unwrap_or_else(|| "default".to_string());
        let store = CredentialStore::new(
            &config.data_dir,
            &owner,
            codec,
            config.expiry_margin_secs,
        )?;

        let client_creds = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => Some(ClientCredentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        };
        let grant = GrantFlowAuthenticator::new(
            client.clone(),
            config.base_url.clone(),
            client_creds,
            config.exchange_timeout,
        );
        let form = FormLoginAuthenticator::new(
            client.clone(),
            config.base_url.clone(),
            config.probe_timeout,
            config.exchange_timeout,
            config.session_hours,
        );

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url: config.base_url,
                store,
                grant,
                form,
                username: config.username,
                password: config.password,
                expiry_margin_secs: config.expiry_margin_secs,
                probe_timeout: config.probe_timeout,
                request_timeout: config.request_timeout,
                state: RwLock::new(AuthState::default()),
                refresh_task: Mutex::new(None),
            }),
        })
    }

    /// Startup sequence: adopt a persisted credential record if one exists
    /// and is not expired
    pub async fn startup(&self) -> AuthResult<AuthStatus> {
        if let Some(record) = self.inner.store.load()? {
            if !CredentialStore::is_expired(&record, self.inner.expiry_margin_secs) {
                info!(owner = record.owner_identity.as_str(), "adopting persisted credential");
                {
                    let mut state = self.inner.state.write().await;
                    state.source = CredentialSource::UserTokens;
                    state.identity = Some(record.owner_identity.clone());
                }
                self.spawn_refresh_task(record.expires_at).await;
                self.refresh_permissions_best_effort().await;
            } else {
                debug!("persisted credential is expired; ignoring");
            }
        }
        Ok(self.auth_status().await)
    }

    /// Run the full login strategy chain: grant flow, then form login, then
    /// app-level client credentials. Returns the resolved permission set.
    ///
    /// An MFA challenge from the form surface is surfaced verbatim and
    /// never retried.
    pub async fn login(&self, auth_code: Option<&str>) -> AuthResult<PermissionSet> {
        let mut attempts: Vec<AttemptFailure> = Vec::new();

        if let (Some(username), Some(password)) =
            (self.inner.username.clone(), self.inner.password.clone())
        {
            // Strategy 1: OAuth2-style token grants
            match self
                .inner
                .grant
                .acquire_user_tokens(&username, &password, auth_code)
                .await
            {
                Ok(grant) => {
                    let record = self
                        .inner
                        .store
                        .store_grant(&grant, self.inner.base_url.as_str())
                        .await?;
                    let permissions = self
                        .resolve_permissions(Some(&grant.access_token))
                        .await
                        .unwrap_or_else(PermissionSet::viewer);
                    {
                        let mut state = self.inner.state.write().await;
                        state.source = CredentialSource::UserTokens;
                        state.session = None;
                        state.app_token = None;
                        state.identity = Some(username.clone());
                        state.permissions = Some(permissions.clone());
                    }
                    self.spawn_refresh_task(record.expires_at).await;
                    info!(user = username.as_str(), "authenticated via token grant");
                    return Ok(permissions);
                }
                Err(AuthError::Exhausted {
                    attempts: grant_attempts,
                }) => {
                    info!(
                        attempts = grant_attempts.len(),
                        "grant flow exhausted; falling back to form login"
                    );
                    attempts.extend(grant_attempts);
                }
                Err(e) => return Err(e),
            }

            // Strategy 2: cookie/CSRF form login
            match self.inner.form.login(&username, &password).await {
                Ok(mut session) => {
                    let permissions = self
                        .resolve_permissions(None)
                        .await
                        .unwrap_or_else(PermissionSet::viewer);
                    session.permissions = Some(permissions.clone());

                    // A fallback-only session can still drive app-scoped
                    // operations when client credentials exist
                    let mut app_token = None;
                    if capability::is_fallback_only(&permissions)
                        && self.inner.grant.has_client_credentials()
                    {
                        info!("form login yielded fallback-only capability; acquiring app token");
                        match self.inner.grant.acquire_client_token().await {
                            Ok(token) => app_token = Some(token),
                            Err(e) => warn!(error = %e, "app token acquisition failed"),
                        }
                    }

                    {
                        let mut state = self.inner.state.write().await;
                        state.source = CredentialSource::UserTokens;
                        state.session = Some(session);
                        state.app_token = app_token;
                        state.identity = Some(username.clone());
                        state.permissions = Some(permissions.clone());
                    }
                    info!(user = username.as_str(), "authenticated via form login");
                    return Ok(permissions);
                }
                Err(e @ AuthError::MfaRequired { .. }) => return Err(e),
                Err(AuthError::Exhausted {
                    attempts: form_attempts,
                }) => {
                    attempts.extend(form_attempts);
                }
                Err(e) => return Err(e),
            }
        }

        // Strategy 3: app-level client credentials
        if self.inner.grant.has_client_credentials() {
            match self.inner.grant.acquire_client_token().await {
                Ok(token) => {
                    let permissions = self
                        .resolve_permissions(Some(&token.access_token))
                        .await
                        .unwrap_or_else(PermissionSet::admin);
                    {
                        let mut state = self.inner.state.write().await;
                        state.source = CredentialSource::ClientCredentials;
                        state.session = None;
                        state.app_token = Some(token);
                        state.identity = None;
                        state.permissions = Some(permissions.clone());
                    }
                    info!("authenticated via client credentials");
                    return Ok(permissions);
                }
                Err(AuthError::Exhausted {
                    attempts: cc_attempts,
                }) => attempts.extend(cc_attempts),
                Err(e) => return Err(e),
            }
        }

        Err(AuthError::Exhausted { attempts })
    }

    /// Issue an authenticated request, retrying once across a forced
    /// re-authentication if the backend answers 401
    pub async fn request(&self, method: Method, path: &str) -> AuthResult<reqwest::Response> {
        let auth = self.ensure_authenticated().await?;
        let response = self.send_with(&auth, method.clone(), path).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(path, "authorization failure; forcing one re-authentication");
        self.force_reauthenticate().await?;
        let auth = self.ensure_authenticated().await?;
        let retry = self.send_with(&auth, method, path).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::credential_invalid(
                "authorization rejected after re-authentication",
            ));
        }
        Ok(retry)
    }

    /// Fetch a JSON document through the authenticated request path
    pub async fn get_json(&self, path: &str) -> AuthResult<serde_json::Value> {
        let response = self.request(Method::GET, path).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::protocol_mismatch(
                path,
                format!("HTTP {}", status.as_u16()),
            ));
        }
        response
            .json()
            .await
            .map_err(AuthError::from_request_error)
    }

    /// A decrypted access token that is valid past the safety margin, if any
    pub async fn valid_access_token(&self) -> AuthResult<Option<String>> {
        {
            let state = self.inner.state.read().await;
            if let Some(app) = &state.app_token {
                if token_usable(app, self.inner.expiry_margin_secs) {
                    return Ok(Some(app.access_token.clone()));
                }
            }
        }
        self.inner.store.valid_access_token()
    }

    /// Snapshot of the current authentication state
    pub async fn auth_status(&self) -> AuthStatus {
        let state = self.inner.state.read().await;
        let session_active = state
            .session
            .as_ref()
            .map(|s| !s.is_expired())
            .unwrap_or(false);
        let app_active = state
            .app_token
            .as_ref()
            .map(|t| token_usable(t, self.inner.expiry_margin_secs))
            .unwrap_or(false);
        let store_active = state.source == CredentialSource::UserTokens
            && !session_active
            && self
                .inner
                .store
                .valid_access_token()
                .ok()
                .flatten()
                .is_some();

        AuthStatus {
            mode: state.source,
            is_authenticated: session_active || app_active || store_active,
            identity: state.identity.clone(),
        }
    }

    /// Operation names the active identity may invoke; empty until a
    /// permission set has been resolved
    pub async fn available_operations(&self) -> BTreeSet<String> {
        let state = self.inner.state.read().await;
        match &state.permissions {
            Some(permissions) => capability::available_operations(permissions),
            None => BTreeSet::new(),
        }
    }

    /// The cached permission set, if an authentication has resolved one
    pub async fn permissions(&self) -> Option<PermissionSet> {
        self.inner.state.read().await.permissions.clone()
    }

    /// Stop background refresh, delete the persisted record, drop session
    /// state
    pub async fn logout(&self) -> AuthResult<()> {
        self.stop_refresh_task().await;
        self.inner.store.logout().await?;
        {
            let mut state = self.inner.state.write().await;
            *state = AuthState::default();
        }
        info!("logged out");
        Ok(())
    }

    // ---- internals ----

    /// Produce a usable request credential, refreshing or re-authenticating
    /// as needed. Downgrades to client-credentials mode when user tokens
    /// cannot be revived.
    async fn ensure_authenticated(&self) -> AuthResult<RequestAuth> {
        if let Some(auth) = self.current_auth().await? {
            return Ok(auth);
        }

        // Drop an expired session before trying anything else
        {
            let mut state = self.inner.state.write().await;
            if state.session.as_ref().map(|s| s.is_expired()).unwrap_or(false) {
                warn!("form session expired; discarding");
                state.session = None;
            }
        }

        let source = self.inner.state.read().await.source;
        if source == CredentialSource::UserTokens {
            match self.inner.store.refresh(&self.inner.grant).await {
                Ok(Some(_)) => {
                    let expires_at = self.inner.store.load()?.and_then(|r| r.expires_at);
                    self.spawn_refresh_task(expires_at).await;
                }
                Ok(None) => {
                    warn!("user tokens unavailable; downgrading to client credentials");
                    self.inner.state.write().await.source = CredentialSource::ClientCredentials;
                }
                Err(AuthError::RefreshFailed { message }) => {
                    warn!(
                        reason = message.as_str(),
                        "refresh token rejected; downgrading to client credentials"
                    );
                    self.inner.state.write().await.source = CredentialSource::ClientCredentials;
                }
                Err(e) => return Err(e),
            }
            if let Some(auth) = self.current_auth().await? {
                return Ok(auth);
            }
        }

        if self.inner.grant.has_client_credentials() {
            match self.inner.grant.acquire_client_token().await {
                Ok(token) => {
                    let mut state = self.inner.state.write().await;
                    state.source = CredentialSource::ClientCredentials;
                    state.app_token = Some(token);
                }
                Err(e) => {
                    if self.inner.username.is_none() || self.inner.password.is_none() {
                        return Err(e);
                    }
                    debug!(error = %e, "client-credentials grant failed; trying full login");
                }
            }
            if let Some(auth) = self.current_auth().await? {
                return Ok(auth);
            }
        }

        if self.inner.username.is_some() && self.inner.password.is_some() {
            self.login(None).await?;
            if let Some(auth) = self.current_auth().await? {
                return Ok(auth);
            }
        }

        Err(AuthError::credential_invalid("no usable credential source"))
    }

    /// The credential currently installable on a request, if one is live
    async fn current_auth(&self) -> AuthResult<Option<RequestAuth>> {
        let state = self.inner.state.read().await;
        if let Some(session) = &state.session {
            if !session.is_expired() {
                return Ok(Some(RequestAuth::Session {
                    csrf_token: session.csrf_token.clone(),
                }));
            }
        }
        if let Some(app) = &state.app_token {
            if token_usable(app, self.inner.expiry_margin_secs) {
                return Ok(Some(RequestAuth::Bearer(app.access_token.clone())));
            }
        }
        if state.source == CredentialSource::UserTokens && state.session.is_none() {
            if let Some(token) = self.inner.store.valid_access_token()? {
                return Ok(Some(RequestAuth::Bearer(token)));
            }
        }
        Ok(None)
    }

    async fn send_with(
        &self,
        auth: &RequestAuth,
        method: Method,
        path: &str,
    ) -> AuthResult<reqwest::Response> {
        let url = self
            .inner
            .base_url
            .join(path)
            .map_err(|e| AuthError::protocol_mismatch(path, format!("invalid path: {}", e)))?;

        let mut request = self
            .inner
            .client
            .request(method, url)
            .timeout(self.inner.request_timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        request = match auth {
            RequestAuth::Bearer(token) => request.bearer_auth(token),
            RequestAuth::Session { csrf_token } => match csrf_token {
                // Session cookies ride the shared jar; only the anti-forgery
                // header needs installing
                Some(token) => request.header("X-CSRF-Token", token.as_str()),
                None => request,
            },
        };

        request.send().await.map_err(AuthError::from_request_error)
    }

    /// Clear cached credentials and run the strategy chain again
    async fn force_reauthenticate(&self) -> AuthResult<()> {
        self.stop_refresh_task().await;
        {
            let mut state = self.inner.state.write().await;
            state.session = None;
            state.app_token = None;
        }
        self.login(None).await.map(|_| ())
    }

    /// Probe the backend for the active identity and resolve permissions
    async fn resolve_permissions(&self, bearer: Option<&str>) -> Option<PermissionSet> {
        match probe_identity(
            &self.inner.client,
            &self.inner.base_url,
            bearer,
            self.inner.probe_timeout,
        )
        .await
        {
            Ok(payload) => Some(resolve(&payload)),
            Err(e) => {
                warn!(error = %e, "identity probe failed; using safe default permissions");
                None
            }
        }
    }

    /// Best-effort permission refresh for a credential adopted at startup
    async fn refresh_permissions_best_effort(&self) {
        let token = match self.inner.store.valid_access_token() {
            Ok(Some(token)) => token,
            _ => return,
        };
        if let Some(permissions) = self.resolve_permissions(Some(&token)).await {
            self.inner.state.write().await.permissions = Some(permissions);
        }
    }

    /// Start (or replace) the background refresh task
    async fn spawn_refresh_task(&self, expires_at: Option<DateTime<Utc>>) {
        let Some(period) = refresh_period(expires_at, Utc::now()) else {
            debug!("no usable validity window; background refresh not scheduled");
            return;
        };

        let (shutdown, mut signal) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            let mut period = period;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        match inner.store.refresh(&inner.grant).await {
                            Ok(Some(_)) => {
                                debug!("background refresh succeeded");
                                let next = inner
                                    .store
                                    .load()
                                    .ok()
                                    .flatten()
                                    .and_then(|r| refresh_period(r.expires_at, Utc::now()));
                                match next {
                                    Some(p) => period = p,
                                    None => break,
                                }
                            }
                            Ok(None) => {
                                warn!("background refresh failed; clearing cached credential");
                                let mut state = inner.state.write().await;
                                state.session = None;
                                state.app_token = None;
                                state.permissions = None;
                                break;
                            }
                            Err(e) => {
                                warn!(error = %e, "background refresh errored; clearing cached credential");
                                let mut state = inner.state.write().await;
                                state.session = None;
                                state.app_token = None;
                                state.permissions = None;
                                break;
                            }
                        }
                    }
                    _ = signal.changed() => break,
                }
            }
        });

        debug!(period_secs = period.as_secs(), "background refresh scheduled");
        let mut slot = self.inner.refresh_task.lock().await;
        // Dropping a previous handle signals and aborts its task
        *slot = Some(RefreshHandle { shutdown, join });
    }

    async fn stop_refresh_task(&self) {
        self.inner.refresh_task.lock().await.take();
    }

    /// Whether a background refresh task is currently scheduled
    pub async fn refresh_task_running(&self) -> bool {
        self.inner
            .refresh_task
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.join.is_finished())
            .unwrap_or(false)
    }
}

fn token_usable(grant: &TokenGrant, margin_secs: i64) -> bool {
    match grant.expires_at {
        Some(expires_at) => expires_at - ChronoDuration::seconds(margin_secs) > Utc::now(),
        // No expiry means "never trust silently"
        None => false,
    }
}

/// Background refresh period: 75 % of the remaining validity window,
/// clamped so a short-lived token cannot produce a hot loop
pub(crate) fn refresh_period(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let expires_at = expires_at?;
    let validity = (expires_at - now).num_seconds();
    if validity <= 0 {
        return None;
    }
    Some(Duration::from_secs((validity * 3 / 4).max(30) as u64))
}
