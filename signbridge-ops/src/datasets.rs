//! Dataset operations - tabular data feeding data-driven widgets

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub data_set_id: i64,
    pub data_set: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_remote: Option<i64>,
}

pub struct Datasets<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Datasets<'_> {
    pub async fn list(&self) -> OpsResult<Vec<Dataset>> {
        self.ops.get_list("dataset.list", "/api/dataset").await
    }

    pub async fn get(&self, data_set_id: i64) -> OpsResult<Dataset> {
        self.ops
            .get_item("dataset.get", &format!("/api/dataset/{}", data_set_id))
            .await
    }
}
