//! Notification operations

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: i64,
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub release_dt: Option<String>,
    #[serde(default)]
    pub is_system: Option<i64>,
}

pub struct Notifications<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Notifications<'_> {
    pub async fn list(&self) -> OpsResult<Vec<Notification>> {
        self.ops
            .get_list("notification.list", "/api/notification")
            .await
    }
}
