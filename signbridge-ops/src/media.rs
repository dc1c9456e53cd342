//! Media library operations

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub media_id: i64,
    pub name: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub duration: Option<i64>,
}

pub struct Media<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Media<'_> {
    pub async fn list(&self) -> OpsResult<Vec<MediaItem>> {
        self.ops.get_list("media.list", "/api/library").await
    }

    pub async fn get(&self, media_id: i64) -> OpsResult<MediaItem> {
        self.ops
            .get_item("media.get", &format!("/api/library/{}", media_id))
            .await
    }
}
