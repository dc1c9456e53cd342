//! Permission resolver - raw identity payloads to normalized permission sets
//!
//! Backends report identity in several shapes (numeric user-type ids,
//! boolean admin flags, role strings). Classification is an ordered list of
//! named extraction rules, each a pure function over the payload, applied in
//! priority order; the viewer tier is the safe default for any shape the
//! rules do not recognize.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Ordered privilege tiers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeLevel {
    Viewer,
    Editor,
    Admin,
    SuperAdmin,
}

impl std::fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivilegeLevel::Viewer => write!(f, "viewer"),
            PrivilegeLevel::Editor => write!(f, "editor"),
            PrivilegeLevel::Admin => write!(f, "admin"),
            PrivilegeLevel::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

impl std::str::FromStr for PrivilegeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "viewer" => Ok(PrivilegeLevel::Viewer),
            "editor" => Ok(PrivilegeLevel::Editor),
            "admin" => Ok(PrivilegeLevel::Admin),
            "super_admin" | "superadmin" => Ok(PrivilegeLevel::SuperAdmin),
            _ => Err(format!("Unknown privilege level: {}", s)),
        }
    }
}

/// Individual capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionFlag {
    ManageDisplays,
    ManageLayouts,
    ManageMedia,
    ManageCampaigns,
    ManageSchedules,
    ManageDatasets,
    ManageNotifications,
    ViewReports,
    ManageSystem,
    ManageUsers,
}

impl std::fmt::Display for PermissionFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionFlag::ManageDisplays => write!(f, "manage_displays"),
            PermissionFlag::ManageLayouts => write!(f, "manage_layouts"),
            PermissionFlag::ManageMedia => write!(f, "manage_media"),
            PermissionFlag::ManageCampaigns => write!(f, "manage_campaigns"),
            PermissionFlag::ManageSchedules => write!(f, "manage_schedules"),
            PermissionFlag::ManageDatasets => write!(f, "manage_datasets"),
            PermissionFlag::ManageNotifications => write!(f, "manage_notifications"),
            PermissionFlag::ViewReports => write!(f, "view_reports"),
            PermissionFlag::ManageSystem => write!(f, "manage_system"),
            PermissionFlag::ManageUsers => write!(f, "manage_users"),
        }
    }
}

/// Fixed-shape normalized permission set for one identity.
///
/// Computed wholesale per successful authentication; never partially
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub manage_displays: bool,
    pub manage_layouts: bool,
    pub manage_media: bool,
    pub manage_campaigns: bool,
    pub manage_schedules: bool,
    pub manage_datasets: bool,
    pub manage_notifications: bool,
    pub view_reports: bool,
    pub manage_system: bool,
    pub manage_users: bool,
    pub level: PrivilegeLevel,
    pub group_ids: HashSet<i64>,
    pub folder_access: HashSet<i64>,
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::for_level(PrivilegeLevel::Viewer)
    }
}

impl PermissionSet {
    /// Build the fixed flag table for a privilege tier.
    ///
    /// Each tier is a strict superset of the tier below it, which is what
    /// keeps capability gating monotonic in the level.
    pub fn for_level(level: PrivilegeLevel) -> Self {
        let editor = level >= PrivilegeLevel::Editor;
        let admin = level >= PrivilegeLevel::Admin;
        let super_admin = level >= PrivilegeLevel::SuperAdmin;

        Self {
            manage_displays: editor,
            manage_layouts: editor,
            manage_media: editor,
            manage_campaigns: editor,
            manage_schedules: editor,
            manage_datasets: admin,
            manage_notifications: admin,
            view_reports: editor,
            manage_system: super_admin,
            manage_users: admin,
            level,
            group_ids: HashSet::new(),
            folder_access: HashSet::new(),
        }
    }

    pub fn viewer() -> Self {
        Self::for_level(PrivilegeLevel::Viewer)
    }

    pub fn editor() -> Self {
        Self::for_level(PrivilegeLevel::Editor)
    }

    pub fn admin() -> Self {
        Self::for_level(PrivilegeLevel::Admin)
    }

    pub fn super_admin() -> Self {
        Self::for_level(PrivilegeLevel::SuperAdmin)
    }

    /// Look up one capability flag
    pub fn has_flag(&self, flag: PermissionFlag) -> bool {
        match flag {
            PermissionFlag::ManageDisplays => self.manage_displays,
            PermissionFlag::ManageLayouts => self.manage_layouts,
            PermissionFlag::ManageMedia => self.manage_media,
            PermissionFlag::ManageCampaigns => self.manage_campaigns,
            PermissionFlag::ManageSchedules => self.manage_schedules,
            PermissionFlag::ManageDatasets => self.manage_datasets,
            PermissionFlag::ManageNotifications => self.manage_notifications,
            PermissionFlag::ViewReports => self.view_reports,
            PermissionFlag::ManageSystem => self.manage_system,
            PermissionFlag::ManageUsers => self.manage_users,
        }
    }

    /// True when no capability flag is set
    pub fn has_no_flags(&self) -> bool {
        !(self.manage_displays
            || self.manage_layouts
            || self.manage_media
            || self.manage_campaigns
            || self.manage_schedules
            || self.manage_datasets
            || self.manage_notifications
            || self.view_reports
            || self.manage_system
            || self.manage_users)
    }
}

/// One named classification rule; a pure function over the raw payload
struct LevelRule {
    name: &'static str,
    extract: fn(&serde_json::Value) -> Option<PrivilegeLevel>,
}

/// Classification rules in priority order, strongest tier first
static LEVEL_RULES: &[LevelRule] = &[
    LevelRule {
        name: "user-type-super",
        extract: user_type_super,
    },
    LevelRule {
        name: "super-admin-flag",
        extract: super_admin_flag,
    },
    LevelRule {
        name: "role-super",
        extract: role_super,
    },
    LevelRule {
        name: "user-type-admin",
        extract: user_type_admin,
    },
    LevelRule {
        name: "admin-flag",
        extract: admin_flag,
    },
    LevelRule {
        name: "role-admin",
        extract: role_admin,
    },
    LevelRule {
        name: "can-edit-flag",
        extract: can_edit_flag,
    },
    LevelRule {
        name: "role-editor",
        extract: role_editor,
    },
];

/// Classify a raw identity payload into a normalized permission set
pub fn resolve(payload: &serde_json::Value) -> PermissionSet {
    let level = LEVEL_RULES
        .iter()
        .find_map(|rule| {
            (rule.extract)(payload).map(|level| {
                debug!(rule = rule.name, level = %level, "identity classified");
                level
            })
        })
        .unwrap_or(PrivilegeLevel::Viewer);

    let mut set = PermissionSet::for_level(level);
    set.group_ids = extract_id_set(payload, &["groupIds", "groups", "group_ids"]);
    set.folder_access = extract_id_set(payload, &["folderAccess", "folders", "folder_ids"]);
    set
}

fn field_i64(payload: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| payload.get(*key)?.as_i64())
}

fn field_bool(payload: &serde_json::Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| payload.get(*key)?.as_bool())
}

fn field_str<'a>(payload: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| payload.get(*key)?.as_str())
}

const ROLE_KEYS: &[&str] = &["role", "userType", "user_type", "type"];

fn user_type_super(payload: &serde_json::Value) -> Option<PrivilegeLevel> {
    (field_i64(payload, &["userTypeId", "user_type_id"])? == 1).then_some(PrivilegeLevel::SuperAdmin)
}

fn super_admin_flag(payload: &serde_json::Value) -> Option<PrivilegeLevel> {
    field_bool(payload, &["isSuperAdmin", "is_super_admin", "superAdmin"])?
        .then_some(PrivilegeLevel::SuperAdmin)
}

fn role_super(payload: &serde_json::Value) -> Option<PrivilegeLevel> {
    let role = field_str(payload, ROLE_KEYS)?.to_ascii_lowercase();
    matches!(role.as_str(), "super_admin" | "superadmin").then_some(PrivilegeLevel::SuperAdmin)
}

fn user_type_admin(payload: &serde_json::Value) -> Option<PrivilegeLevel> {
    (field_i64(payload, &["userTypeId", "user_type_id"])? == 2).then_some(PrivilegeLevel::Admin)
}

fn admin_flag(payload: &serde_json::Value) -> Option<PrivilegeLevel> {
    field_bool(payload, &["isAdmin", "is_admin", "admin"])?.then_some(PrivilegeLevel::Admin)
}

fn role_admin(payload: &serde_json::Value) -> Option<PrivilegeLevel> {
    let role = field_str(payload, ROLE_KEYS)?.to_ascii_lowercase();
    matches!(role.as_str(), "admin" | "group_admin" | "groupadmin").then_some(PrivilegeLevel::Admin)
}

fn can_edit_flag(payload: &serde_json::Value) -> Option<PrivilegeLevel> {
    field_bool(payload, &["canEdit", "can_edit", "editor"])?.then_some(PrivilegeLevel::Editor)
}

fn role_editor(payload: &serde_json::Value) -> Option<PrivilegeLevel> {
    let role = field_str(payload, ROLE_KEYS)?.to_ascii_lowercase();
    matches!(role.as_str(), "editor" | "content_manager").then_some(PrivilegeLevel::Editor)
}

/// Group/folder memberships are captured verbatim: arrays of numbers, or
/// arrays of objects carrying an id field
fn extract_id_set(payload: &serde_json::Value, keys: &[&str]) -> HashSet<i64> {
    let mut ids = HashSet::new();
    for key in keys {
        let Some(entries) = payload.get(*key).and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in entries {
            if let Some(id) = entry.as_i64() {
                ids.insert(id);
            } else if let Some(id) = ["groupId", "folderId", "id"]
                .iter()
                .find_map(|k| entry.get(*k)?.as_i64())
            {
                ids.insert(id);
            }
        }
        if !ids.is_empty() {
            break;
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_type_one_is_super_admin_with_every_flag() {
        let set = resolve(&json!({ "userTypeId": 1 }));
        assert_eq!(set.level, PrivilegeLevel::SuperAdmin);
        assert!(set.manage_displays);
        assert!(set.manage_layouts);
        assert!(set.manage_media);
        assert!(set.manage_campaigns);
        assert!(set.manage_schedules);
        assert!(set.manage_datasets);
        assert!(set.manage_notifications);
        assert!(set.view_reports);
        assert!(set.manage_system);
        assert!(set.manage_users);
    }

    #[test]
    fn can_edit_is_editor_without_user_management() {
        let set = resolve(&json!({ "canEdit": true }));
        assert_eq!(set.level, PrivilegeLevel::Editor);
        assert!(set.manage_displays);
        assert!(set.manage_layouts);
        assert!(set.manage_media);
        assert!(set.manage_campaigns);
        assert!(set.manage_schedules);
        assert!(!set.manage_users);
        assert!(!set.manage_system);
    }

    #[test]
    fn unrecognized_shapes_default_to_viewer() {
        let set = resolve(&json!({ "favouriteColour": "green" }));
        assert_eq!(set.level, PrivilegeLevel::Viewer);
        assert!(set.has_no_flags());

        // A viewer must not carry management flags
        let viewer = PermissionSet::viewer();
        assert!(viewer.has_no_flags());
    }

    #[test]
    fn strongest_recognized_signal_wins() {
        // An unrecognized numeric user type does not mask a boolean signal
        let set = resolve(&json!({ "userTypeId": 3, "canEdit": true }));
        assert_eq!(set.level, PrivilegeLevel::Editor);

        // A super-admin signal beats a weaker admin flag
        let set = resolve(&json!({ "isSuperAdmin": true, "isAdmin": true }));
        assert_eq!(set.level, PrivilegeLevel::SuperAdmin);
    }

    #[test]
    fn role_strings_classify() {
        assert_eq!(resolve(&json!({"role": "admin"})).level, PrivilegeLevel::Admin);
        assert_eq!(
            resolve(&json!({"userType": "superadmin"})).level,
            PrivilegeLevel::SuperAdmin
        );
        assert_eq!(
            resolve(&json!({"role": "editor"})).level,
            PrivilegeLevel::Editor
        );
        assert_eq!(
            resolve(&json!({"role": "intern"})).level,
            PrivilegeLevel::Viewer
        );
    }

    #[test]
    fn group_and_folder_memberships_are_captured_verbatim() {
        let set = resolve(&json!({
            "userTypeId": 2,
            "groups": [{"groupId": 4, "group": "Editors"}, {"groupId": 9}],
            "folderAccess": [1, 2, 3]
        }));
        assert_eq!(set.group_ids, HashSet::from([4, 9]));
        assert_eq!(set.folder_access, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn levels_are_strictly_ordered() {
        assert!(PrivilegeLevel::Viewer < PrivilegeLevel::Editor);
        assert!(PrivilegeLevel::Editor < PrivilegeLevel::Admin);
        assert!(PrivilegeLevel::Admin < PrivilegeLevel::SuperAdmin);
    }

    #[test]
    fn tier_flag_tables_are_nested_supersets() {
        let levels = [
            PrivilegeLevel::Viewer,
            PrivilegeLevel::Editor,
            PrivilegeLevel::Admin,
            PrivilegeLevel::SuperAdmin,
        ];
        let flags = [
            PermissionFlag::ManageDisplays,
            PermissionFlag::ManageLayouts,
            PermissionFlag::ManageMedia,
            PermissionFlag::ManageCampaigns,
            PermissionFlag::ManageSchedules,
            PermissionFlag::ManageDatasets,
            PermissionFlag::ManageNotifications,
            PermissionFlag::ViewReports,
            PermissionFlag::ManageSystem,
            PermissionFlag::ManageUsers,
        ];
        for pair in levels.windows(2) {
            let lower = PermissionSet::for_level(pair[0]);
            let higher = PermissionSet::for_level(pair[1]);
            for flag in flags {
                assert!(
                    !lower.has_flag(flag) || higher.has_flag(flag),
                    "{:?} lost {} when moving to {:?}",
                    pair[0],
                    flag,
                    pair[1]
                );
            }
        }
    }
}
