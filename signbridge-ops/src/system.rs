//! System administration operations - settings, tasks and logs

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendTask {
    pub task_id: i64,
    pub name: String,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub last_run_dt: Option<String>,
}

pub struct System<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl System<'_> {
    /// Backend settings as a raw document; the shape varies by version
    pub async fn settings(&self) -> OpsResult<serde_json::Value> {
        self.ops.get_value("settings.list", "/api/admin/settings").await
    }

    pub async fn tasks(&self) -> OpsResult<Vec<BackendTask>> {
        self.ops.get_list("task.list", "/api/task").await
    }

    /// Recent backend log entries
    pub async fn logs(&self) -> OpsResult<serde_json::Value> {
        self.ops.get_value("log.list", "/api/log").await
    }
}
