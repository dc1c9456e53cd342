//! Layout operations - screen layouts and their publish state

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub layout_id: i64,
    pub layout: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published_status: Option<String>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

pub struct Layouts<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Layouts<'_> {
    pub async fn list(&self) -> OpsResult<Vec<Layout>> {
        self.ops.get_list("layout.list", "/api/layout").await
    }

    pub async fn get(&self, layout_id: i64) -> OpsResult<Layout> {
        self.ops
            .get_item("layout.get", &format!("/api/layout/{}", layout_id))
            .await
    }
}
