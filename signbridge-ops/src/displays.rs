//! Display operations - register, edit and monitor signage displays

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

/// One signage display as the backend reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    pub display_id: i64,
    pub display: String,
    #[serde(default)]
    pub licensed: Option<i64>,
    #[serde(default)]
    pub logged_in: Option<i64>,
    #[serde(default)]
    pub last_accessed: Option<String>,
    #[serde(default)]
    pub client_address: Option<String>,
}

pub struct Displays<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Displays<'_> {
    pub async fn list(&self) -> OpsResult<Vec<Display>> {
        self.ops.get_list("display.list", "/api/display").await
    }

    pub async fn get(&self, display_id: i64) -> OpsResult<Display> {
        self.ops
            .get_item("display.get", &format!("/api/display/{}", display_id))
            .await
    }

    /// Request a screenshot from a display; returns the backend's report
    pub async fn screenshot(&self, display_id: i64) -> OpsResult<serde_json::Value> {
        self.ops
            .get_value(
                "display.screenshot",
                &format!("/api/display/screenshot/{}", display_id),
            )
            .await
    }
}
