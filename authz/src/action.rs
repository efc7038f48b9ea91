// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Concrete actions a user may be permitted to perform
//!
//! Actions are spelled `resource:verb` on the wire and in stored
//! permission records.  They fall into three groups:
//!
//! * workspace-level actions ([`WORKSPACE_ACTIONS`]), which govern a
//!   user's ability to operate on workspaces themselves,
//! * in-workspace actions ([`IN_WORKSPACE_ACTIONS`]), which govern
//!   resources living inside a workspace, and
//! * administrative actions, which appear in no default grant and are
//!   satisfied only through the admin role short-circuits.

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Serialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum Action {
    // Workspaces
    #[serde(rename = "workspaces:create")]
    CreateWorkspace,
    #[serde(rename = "workspaces:read")]
    ReadWorkspace,
    #[serde(rename = "workspaces:update")]
    UpdateWorkspace,
    #[serde(rename = "workspaces:delete")]
    DeleteWorkspace,

    // Deployments
    #[serde(rename = "deployments:create")]
    CreateDeployment,
    #[serde(rename = "deployments:read")]
    ReadDeployment,
    #[serde(rename = "deployments:proxy")]
    ProxyDeployment,
    #[serde(rename = "deployments:update")]
    UpdateDeployment,
    #[serde(rename = "deployments:delete")]
    DeleteDeployment,

    // Wikis
    #[serde(rename = "wiki:create")]
    CreateWiki,
    #[serde(rename = "wiki:read")]
    ReadWiki,
    #[serde(rename = "wiki:update")]
    UpdateWiki,
    #[serde(rename = "wiki:delete")]
    DeleteWiki,
    #[serde(rename = "wiki_sections:create")]
    CreateWikiSection,
    #[serde(rename = "wiki_sections:read")]
    ReadWikiSection,
    #[serde(rename = "wiki_sections:update")]
    UpdateWikiSection,
    #[serde(rename = "wiki_sections:delete")]
    DeleteWikiSection,
    #[serde(rename = "wiki_pages:create")]
    CreateWikiPage,
    #[serde(rename = "wiki_pages:read")]
    ReadWikiPage,
    #[serde(rename = "wiki_pages:update")]
    UpdateWikiPage,
    #[serde(rename = "wiki_pages:delete")]
    DeleteWikiPage,

    // Projects
    #[serde(rename = "projects:create")]
    CreateProject,
    #[serde(rename = "projects:read")]
    ReadProject,
    #[serde(rename = "projects:update")]
    UpdateProject,
    #[serde(rename = "projects:delete")]
    DeleteProject,
    #[serde(rename = "project_lanes:create")]
    CreateProjectLane,
    #[serde(rename = "project_lanes:read")]
    ReadProjectLane,
    #[serde(rename = "project_lanes:update")]
    UpdateProjectLane,
    #[serde(rename = "project_lanes:delete")]
    DeleteProjectLane,
    #[serde(rename = "project_tasks:create")]
    CreateProjectTask,
    #[serde(rename = "project_tasks:read")]
    ReadProjectTask,
    #[serde(rename = "project_tasks:update")]
    UpdateProjectTask,
    #[serde(rename = "project_tasks:delete")]
    DeleteProjectTask,

    // Administration.  These appear in no default grant; they can only
    // be satisfied by the super-admin or workspace-admin short-circuits
    // in the resolution engine.
    #[serde(rename = "users:manage")]
    ManageUser,
    #[serde(rename = "workspaces:manage")]
    ManageWorkspace,
}

/// Actions granted to every ordinary user at the application level when
/// their permission record is first created.
pub const WORKSPACE_ACTIONS: [Action; 4] = [
    Action::CreateWorkspace,
    Action::ReadWorkspace,
    Action::UpdateWorkspace,
    Action::DeleteWorkspace,
];

/// Actions granted to an ordinary member of a workspace, covering every
/// resource that lives inside one.
pub const IN_WORKSPACE_ACTIONS: [Action; 29] = [
    Action::CreateDeployment,
    Action::ReadDeployment,
    Action::ProxyDeployment,
    Action::UpdateDeployment,
    Action::DeleteDeployment,
    Action::CreateWiki,
    Action::ReadWiki,
    Action::UpdateWiki,
    Action::DeleteWiki,
    Action::CreateWikiSection,
    Action::ReadWikiSection,
    Action::UpdateWikiSection,
    Action::DeleteWikiSection,
    Action::CreateWikiPage,
    Action::ReadWikiPage,
    Action::UpdateWikiPage,
    Action::DeleteWikiPage,
    Action::CreateProject,
    Action::ReadProject,
    Action::UpdateProject,
    Action::DeleteProject,
    Action::CreateProjectLane,
    Action::ReadProjectLane,
    Action::UpdateProjectLane,
    Action::DeleteProjectLane,
    Action::CreateProjectTask,
    Action::ReadProjectTask,
    Action::UpdateProjectTask,
    Action::DeleteProjectTask,
];

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 35] = [
        Action::CreateWorkspace,
        Action::ReadWorkspace,
        Action::UpdateWorkspace,
        Action::DeleteWorkspace,
        Action::CreateDeployment,
        Action::ReadDeployment,
        Action::ProxyDeployment,
        Action::UpdateDeployment,
        Action::DeleteDeployment,
        Action::CreateWiki,
        Action::ReadWiki,
        Action::UpdateWiki,
        Action::DeleteWiki,
        Action::CreateWikiSection,
        Action::ReadWikiSection,
        Action::UpdateWikiSection,
        Action::DeleteWikiSection,
        Action::CreateWikiPage,
        Action::ReadWikiPage,
        Action::UpdateWikiPage,
        Action::DeleteWikiPage,
        Action::CreateProject,
        Action::ReadProject,
        Action::UpdateProject,
        Action::DeleteProject,
        Action::CreateProjectLane,
        Action::ReadProjectLane,
        Action::UpdateProjectLane,
        Action::DeleteProjectLane,
        Action::CreateProjectTask,
        Action::ReadProjectTask,
        Action::UpdateProjectTask,
        Action::DeleteProjectTask,
        Action::ManageUser,
        Action::ManageWorkspace,
    ];

    /// Returns the wire spelling of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateWorkspace => "workspaces:create",
            Action::ReadWorkspace => "workspaces:read",
            Action::UpdateWorkspace => "workspaces:update",
            Action::DeleteWorkspace => "workspaces:delete",
            Action::CreateDeployment => "deployments:create",
            Action::ReadDeployment => "deployments:read",
            Action::ProxyDeployment => "deployments:proxy",
            Action::UpdateDeployment => "deployments:update",
            Action::DeleteDeployment => "deployments:delete",
            Action::CreateWiki => "wiki:create",
            Action::ReadWiki => "wiki:read",
            Action::UpdateWiki => "wiki:update",
            Action::DeleteWiki => "wiki:delete",
            Action::CreateWikiSection => "wiki_sections:create",
            Action::ReadWikiSection => "wiki_sections:read",
            Action::UpdateWikiSection => "wiki_sections:update",
            Action::DeleteWikiSection => "wiki_sections:delete",
            Action::CreateWikiPage => "wiki_pages:create",
            Action::ReadWikiPage => "wiki_pages:read",
            Action::UpdateWikiPage => "wiki_pages:update",
            Action::DeleteWikiPage => "wiki_pages:delete",
            Action::CreateProject => "projects:create",
            Action::ReadProject => "projects:read",
            Action::UpdateProject => "projects:update",
            Action::DeleteProject => "projects:delete",
            Action::CreateProjectLane => "project_lanes:create",
            Action::ReadProjectLane => "project_lanes:read",
            Action::UpdateProjectLane => "project_lanes:update",
            Action::DeleteProjectLane => "project_lanes:delete",
            Action::CreateProjectTask => "project_tasks:create",
            Action::ReadProjectTask => "project_tasks:read",
            Action::UpdateProjectTask => "project_tasks:update",
            Action::DeleteProjectTask => "project_tasks:delete",
            Action::ManageUser => "users:manage",
            Action::ManageWorkspace => "workspaces:manage",
        }
    }

    /// Returns true if this action operates on workspaces themselves.
    pub fn is_workspace_scope(&self) -> bool {
        WORKSPACE_ACTIONS.contains(self)
    }

    /// Returns true if this action operates on a resource inside a
    /// workspace.
    pub fn is_in_workspace(&self) -> bool {
        IN_WORKSPACE_ACTIONS.contains(self)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unrecognized action {0:?}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .find(|action| action.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_wire_spelling_round_trips() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
            // The serde spelling and `as_str()` must agree.
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                serde_json::Value::String(action.as_str().to_string()),
            );
        }
        assert_eq!(
            "deployments:launch".parse::<Action>(),
            Err(UnknownAction("deployments:launch".to_string()))
        );
    }

    #[test]
    fn test_action_groups_partition() {
        let workspace: BTreeSet<_> = WORKSPACE_ACTIONS.into_iter().collect();
        let in_workspace: BTreeSet<_> =
            IN_WORKSPACE_ACTIONS.into_iter().collect();
        assert_eq!(workspace.len(), WORKSPACE_ACTIONS.len());
        assert_eq!(in_workspace.len(), IN_WORKSPACE_ACTIONS.len());
        assert!(workspace.is_disjoint(&in_workspace));

        // The administrative actions belong to neither group.
        for action in [Action::ManageUser, Action::ManageWorkspace] {
            assert!(!action.is_workspace_scope());
            assert!(!action.is_in_workspace());
        }

        // Together with the administrative pair, the groups cover the
        // whole enum.
        let all: BTreeSet<_> = Action::ALL.into_iter().collect();
        assert_eq!(all.len(), Action::ALL.len());
        assert_eq!(
            all.len(),
            workspace.len() + in_workspace.len() + 2,
        );
    }
}
