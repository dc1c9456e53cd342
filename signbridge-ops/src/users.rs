//! User and group administration operations

use crate::{OpsClient, OpsResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: i64,
    pub user_name: String,
    #[serde(default)]
    pub user_type_id: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub retired: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroup {
    pub group_id: i64,
    pub group: String,
    #[serde(default)]
    pub is_user_specific: Option<i64>,
}

pub struct Users<'a> {
    pub(crate) ops: &'a OpsClient,
}

impl Users<'_> {
    pub async fn list(&self) -> OpsResult<Vec<User>> {
        self.ops.get_list("user.list", "/api/user").await
    }

    pub async fn get(&self, user_id: i64) -> OpsResult<User> {
        self.ops
            .get_item("user.get", &format!("/api/user/{}", user_id))
            .await
    }

    pub async fn groups(&self) -> OpsResult<Vec<UserGroup>> {
        self.ops.get_list("group.list", "/api/group").await
    }
}
