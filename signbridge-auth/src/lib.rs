//! Signbridge Auth - credential lifecycle for the Signbridge CMS client
//!
//! This crate owns everything between "we have an operator's credentials"
//! and "we can issue an authorized request":
//!
//! - Encrypted, persistent credential storage with automatic refresh
//! - A multi-strategy login state machine (OAuth2 token grants and
//!   cookie/CSRF form login, with MFA challenge detection)
//! - A permission model mapping the detected identity to the set of
//!   operations it may invoke
//!
//! ## Architecture
//!
//! The [`orchestrator::Orchestrator`] is the single entry point: it owns the
//! HTTP client, selects the strategy that produced the active credential,
//! installs it on outgoing requests, and drives transparent refresh. The
//! remaining modules are its collaborators and are individually testable.

pub mod capability;
pub mod codec;
pub mod form;
pub mod grant;
pub mod orchestrator;
pub mod permissions;
pub mod probe;
pub mod store;

pub use capability::{available_operations, is_fallback_only, CapabilityCategory, CATALOG};
pub use codec::{SealedSecret, SecretCodec};
pub use form::{FormLoginAuthenticator, Session};
pub use grant::{ClientCredentials, GrantFlowAuthenticator, TokenGrant};
pub use orchestrator::{AuthStatus, CredentialSource, Orchestrator, OrchestratorConfig};
pub use permissions::{resolve, PermissionFlag, PermissionSet, PrivilegeLevel};
pub use store::{CredentialRecord, CredentialStore};

use serde::{Deserialize, Serialize};

/// One failed endpoint/strategy attempt, kept for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Endpoint path that was attempted
    pub endpoint: String,
    /// Grant kind or login phase, when applicable
    pub strategy: Option<String>,
    /// Why the attempt failed
    pub reason: String,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.strategy {
            Some(strategy) => write!(f, "{} [{}]: {}", self.endpoint, strategy, self.reason),
            None => write!(f, "{}: {}", self.endpoint, self.reason),
        }
    }
}

/// Authentication error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Bad username/password/client secret; never retried automatically
    #[error("Invalid credentials: {message}")]
    CredentialInvalid { message: String },

    /// Network failure or timeout; the next candidate endpoint is tried instead
    #[error("Backend unreachable: {message}")]
    BackendUnreachable { message: String },

    /// 2xx response with an unrecognized shape; treated as endpoint failure
    #[error("Protocol mismatch at {endpoint}: {message}")]
    ProtocolMismatch { endpoint: String, message: String },

    /// Local clock check says the access token is past its safety margin
    #[error("Access token expired")]
    TokenExpired,

    /// The backend rejected the refresh token; the stored record is cleared
    #[error("Token refresh failed: {message}")]
    RefreshFailed { message: String },

    /// The backend issued a multi-factor challenge; reported, never completed
    #[error("Backend requires multi-factor completion")]
    MfaRequired { mfa_token: Option<String> },

    /// Every strategy and endpoint failed
    #[error("All authentication strategies exhausted after {} attempts", attempts.len())]
    Exhausted { attempts: Vec<AttemptFailure> },

    /// Corrupted store or wrong passphrase; treated as a missing credential
    #[error("Failed to decrypt stored secret: {message}")]
    Decrypt { message: String },

    /// Sealing-side crypto failure
    #[error("Crypto failure: {message}")]
    Crypto { message: String },

    #[error("Core error: {0}")]
    Core(#[from] signbridge_core::SignbridgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Create an invalid-credentials error
    pub fn credential_invalid<S: Into<String>>(message: S) -> Self {
        Self::CredentialInvalid {
            message: message.into(),
        }
    }

    /// Create a backend-unreachable error
    pub fn unreachable<S: Into<String>>(message: S) -> Self {
        Self::BackendUnreachable {
            message: message.into(),
        }
    }

    /// Create a protocol-mismatch error
    pub fn protocol_mismatch<E: Into<String>, S: Into<String>>(endpoint: E, message: S) -> Self {
        Self::ProtocolMismatch {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a refresh-failed error
    pub fn refresh_failed<S: Into<String>>(message: S) -> Self {
        Self::RefreshFailed {
            message: message.into(),
        }
    }

    /// Create a decrypt error
    pub fn decrypt<S: Into<String>>(message: S) -> Self {
        Self::Decrypt {
            message: message.into(),
        }
    }

    /// Create a sealing-side crypto error
    pub fn crypto<S: Into<String>>(message: S) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Classify a transport error; timeouts are network failures, not rejections
    pub fn from_request_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::BackendUnreachable {
                message: format!("request timed out: {}", err),
            }
        } else if err.is_connect() {
            Self::BackendUnreachable {
                message: format!("connection failed: {}", err),
            }
        } else {
            Self::BackendUnreachable {
                message: err.to_string(),
            }
        }
    }
}
