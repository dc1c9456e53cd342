//! Reporting operations - proof of play and usage statistics

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatRecord {
    #[serde(default)]
    pub display_id: Option<i64>,
    #[serde(default)]
    pub layout_id: Option<i64>,
    #[serde(default)]
    pub media_id: Option<i64>,
    #[serde(default)]
    pub number_plays: Option<i64>,
    #[serde(default)]
    pub duration: Option<i64>,
}

pub struct Reports<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Reports<'_> {
    /// Raw proof-of-play statistics
    pub async fn stats(&self) -> OpsResult<Vec<StatRecord>> {
        self.ops.get_list("stats.list", "/api/stats").await
    }

    /// Backend-rendered summary report
    pub async fn summary(&self) -> OpsResult<serde_json::Value> {
        self.ops
            .get_value("report.summary", "/api/report/data/summaryReport")
            .await
    }
}
