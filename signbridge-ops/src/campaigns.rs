//! Campaign operations - ordered groups of layouts

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub campaign_id: i64,
    pub campaign: String,
    #[serde(default)]
    pub num_layouts: Option<i64>,
    #[serde(default)]
    pub total_duration: Option<i64>,
}

pub struct Campaigns<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Campaigns<'_> {
    pub async fn list(&self) -> OpsResult<Vec<Campaign>> {
        self.ops.get_list("campaign.list", "/api/campaign").await
    }

    pub async fn get(&self, campaign_id: i64) -> OpsResult<Campaign> {
        self.ops
            .get_item("campaign.get", &format!("/api/campaign/{}", campaign_id))
            .await
    }
}
