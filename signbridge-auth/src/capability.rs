//! Capability gate - maps permission sets to allowed operation names
//!
//! The catalog is immutable process-wide configuration. A category's
//! operations become available when the identity meets the category's
//! minimum privilege level and carries every flag the category requires;
//! an empty requirement set means "available to anyone at that level".

use crate::permissions::{PermissionFlag, PermissionSet, PrivilegeLevel};
use std::collections::BTreeSet;

/// One entry of the static capability catalog
#[derive(Debug, Clone)]
pub struct CapabilityCategory {
    pub name: &'static str,
    pub description: &'static str,
    pub min_level: PrivilegeLevel,
    pub required_flags: &'static [PermissionFlag],
    pub operations: &'static [&'static str],
}

/// The fixed capability catalog.
///
/// Categories may overlap in operation names; gating unions them.
pub static CATALOG: &[CapabilityCategory] = &[
    CapabilityCategory {
        name: "session",
        description: "Server and session information available to any authenticated identity",
        min_level: PrivilegeLevel::Viewer,
        required_flags: &[],
        operations: &["about", "clock", "whoami"],
    },
    CapabilityCategory {
        name: "displays",
        description: "Register, edit and monitor signage displays",
        min_level: PrivilegeLevel::Editor,
        required_flags: &[PermissionFlag::ManageDisplays],
        operations: &[
            "display.list",
            "display.get",
            "display.edit",
            "display.wakeonlan",
            "display.screenshot",
        ],
    },
    CapabilityCategory {
        name: "layouts",
        description: "Design and publish screen layouts",
        min_level: PrivilegeLevel::Editor,
        required_flags: &[PermissionFlag::ManageLayouts],
        operations: &[
            "layout.list",
            "layout.get",
            "layout.add",
            "layout.edit",
            "layout.publish",
        ],
    },
    CapabilityCategory {
        name: "media",
        description: "Upload and manage library media",
        min_level: PrivilegeLevel::Editor,
        required_flags: &[PermissionFlag::ManageMedia],
        operations: &["media.list", "media.get", "media.upload", "media.delete"],
    },
    CapabilityCategory {
        name: "campaigns",
        description: "Group layouts into campaigns",
        min_level: PrivilegeLevel::Editor,
        required_flags: &[PermissionFlag::ManageCampaigns],
        operations: &[
            "campaign.list",
            "campaign.get",
            "campaign.add",
            "campaign.assign-layout",
        ],
    },
    CapabilityCategory {
        name: "schedules",
        description: "Schedule campaigns and layouts onto displays",
        min_level: PrivilegeLevel::Editor,
        required_flags: &[PermissionFlag::ManageSchedules],
        operations: &[
            "schedule.list",
            "schedule.get",
            "schedule.add",
            "schedule.delete",
        ],
    },
    CapabilityCategory {
        name: "datasets",
        description: "Manage tabular datasets feeding data widgets",
        min_level: PrivilegeLevel::Admin,
        required_flags: &[PermissionFlag::ManageDatasets],
        operations: &[
            "dataset.list",
            "dataset.get",
            "dataset.add",
            "dataset.import",
        ],
    },
    CapabilityCategory {
        name: "notifications",
        description: "Author operator notifications",
        min_level: PrivilegeLevel::Admin,
        required_flags: &[PermissionFlag::ManageNotifications],
        operations: &[
            "notification.list",
            "notification.add",
            "notification.delete",
        ],
    },
    CapabilityCategory {
        name: "reports",
        description: "Proof-of-play and usage reporting",
        min_level: PrivilegeLevel::Editor,
        required_flags: &[PermissionFlag::ViewReports],
        operations: &["report.proof-of-play", "report.summary", "stats.list"],
    },
    CapabilityCategory {
        name: "users",
        description: "Administer operator accounts and groups",
        min_level: PrivilegeLevel::Admin,
        required_flags: &[PermissionFlag::ManageUsers],
        operations: &[
            "user.list",
            "user.get",
            "user.add",
            "user.delete",
            "group.list",
        ],
    },
    CapabilityCategory {
        name: "system",
        description: "Backend settings, tasks and logs",
        min_level: PrivilegeLevel::SuperAdmin,
        required_flags: &[PermissionFlag::ManageSystem],
        operations: &[
            "settings.list",
            "settings.edit",
            "task.list",
            "task.run",
            "log.list",
        ],
    },
];

/// All operation names the given permission set may invoke
pub fn available_operations(set: &PermissionSet) -> BTreeSet<String> {
    let mut operations = BTreeSet::new();
    for category in CATALOG {
        if set.level < category.min_level {
            continue;
        }
        if !category.required_flags.iter().all(|f| set.has_flag(*f)) {
            continue;
        }
        operations.extend(category.operations.iter().map(|op| op.to_string()));
    }
    operations
}

/// The operation set of a bare viewer identity
pub fn viewer_baseline() -> BTreeSet<String> {
    available_operations(&PermissionSet::viewer())
}

/// Detects "authentication technically succeeded but produced no elevated
/// capability" - the orchestrator uses this to decide whether a stronger
/// strategy is still worth trying.
pub fn is_fallback_only(set: &PermissionSet) -> bool {
    set.level == PrivilegeLevel::Viewer
        && available_operations(set).len() <= viewer_baseline().len()
}

/// Look up the catalog category an operation belongs to
pub fn category_of(operation: &str) -> Option<&'static CapabilityCategory> {
    CATALOG
        .iter()
        .find(|category| category.operations.contains(&operation))
}
