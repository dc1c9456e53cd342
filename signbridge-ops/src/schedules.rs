//! Schedule operations - events placing campaigns and layouts on displays

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvent {
    pub event_id: i64,
    #[serde(default)]
    pub event_type_id: Option<i64>,
    #[serde(default)]
    pub campaign_id: Option<i64>,
    #[serde(default)]
    pub from_dt: Option<String>,
    #[serde(default)]
    pub to_dt: Option<String>,
    #[serde(default)]
    pub is_priority: Option<i64>,
}

pub struct Schedules<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Schedules<'_> {
    pub async fn list(&self) -> OpsResult<Vec<ScheduleEvent>> {
        self.ops.get_list("schedule.list", "/api/schedule").await
    }

    pub async fn get(&self, event_id: i64) -> OpsResult<ScheduleEvent> {
        self.ops
            .get_item("schedule.get", &format!("/api/schedule/{}", event_id))
            .await
    }
}
