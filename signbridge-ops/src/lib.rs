//! Signbridge Ops - the remote-resource operation catalog
//!
//! Thin typed wrappers over the CMS JSON endpoints. Every call is routed
//! through the orchestrator's authenticated request path and pre-gated
//! against the capability catalog: an operation the active identity is not
//! allowed to invoke fails locally with `NotPermitted`, before any request
//! is issued.

pub mod campaigns;
pub mod datasets;
pub mod displays;
pub mod layouts;
pub mod media;
pub mod notifications;
pub mod reports;
pub mod schedules;
pub mod system;
pub mod users;

use reqwest::Method;
use serde::de::DeserializeOwned;
use signbridge_auth::{AuthError, Orchestrator};
use tracing::debug;

/// Operation-layer error type
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("Operation not permitted for the active identity: {operation}")]
    NotPermitted { operation: String },

    #[error("Backend error at {path}: HTTP {status}")]
    Backend { path: String, status: u16 },

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type OpsResult<T> = Result<T, OpsError>;

/// Entry point to the operation catalog
pub struct OpsClient {
    orchestrator: Orchestrator,
}

impl OpsClient {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn displays(&self) -> displays::Displays<'_> {
        displays::Displays { ops: self }
    }

    pub fn layouts(&self) -> layouts::Layouts<'_> {
        layouts::Layouts { ops: self }
    }

    pub fn media(&self) -> media::Media<'_> {
        media::Media { ops: self }
    }

    pub fn campaigns(&self) -> campaigns::Campaigns<'_> {
        campaigns::Campaigns { ops: self }
    }

    pub fn schedules(&self) -> schedules::Schedules<'_> {
        schedules::Schedules { ops: self }
    }

    pub fn datasets(&self) -> datasets::Datasets<'_> {
        datasets::Datasets { ops: self }
    }

    pub fn notifications(&self) -> notifications::Notifications<'_> {
        notifications::Notifications { ops: self }
    }

    pub fn reports(&self) -> reports::Reports<'_> {
        reports::Reports { ops: self }
    }

    pub fn users(&self) -> users::Users<'_> {
        users::Users { ops: self }
    }

    pub fn system(&self) -> system::System<'_> {
        system::System { ops: self }
    }

    /// Server information; part of the viewer baseline
    pub async fn about(&self) -> OpsResult<serde_json::Value> {
        self.get_value("about", "/api/about").await
    }

    /// Backend clock; part of the viewer baseline
    pub async fn clock(&self) -> OpsResult<serde_json::Value> {
        self.get_value("clock", "/api/clock").await
    }

    /// The active identity as the backend reports it
    pub async fn whoami(&self) -> OpsResult<serde_json::Value> {
        self.get_value("whoami", "/api/user/me").await
    }

    pub(crate) async fn ensure_permitted(&self, operation: &str) -> OpsResult<()> {
        let allowed = self.orchestrator.available_operations().await;
        if allowed.contains(operation) {
            Ok(())
        } else {
            debug!(operation, "operation withheld by capability gate");
            Err(OpsError::NotPermitted {
                operation: operation.to_string(),
            })
        }
    }

    /// Gated GET returning a raw JSON document
    pub(crate) async fn get_value(
        &self,
        operation: &str,
        path: &str,
    ) -> OpsResult<serde_json::Value> {
        self.ensure_permitted(operation).await?;
        let response = self.orchestrator.request(Method::GET, path).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OpsError::Backend {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| OpsError::Auth(AuthError::from_request_error(e)))
    }

    /// Gated GET returning a typed list; tolerates both a bare array and
    /// the enveloped `{"data": [...]}` shape
    pub(crate) async fn get_list<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
    ) -> OpsResult<Vec<T>> {
        let value = self.get_value(operation, path).await?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            other => other
                .get("data")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
        };
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(OpsError::Serialization))
            .collect()
    }

    /// Gated GET returning a single typed item
    pub(crate) async fn get_item<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
    ) -> OpsResult<T> {
        let value = self.get_value(operation, path).await?;
        serde_json::from_value(value).map_err(OpsError::Serialization)
    }
}
