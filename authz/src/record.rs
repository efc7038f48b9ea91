// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-user permission records and the grants inside them

use crate::action::Action;
use crate::action::IN_WORKSPACE_ACTIONS;
use crate::action::WORKSPACE_ACTIONS;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Roles a user can hold, either at the application level or within a
/// particular workspace.
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
pub enum Role {
    /// An ordinary user with no special privileges.
    #[serde(rename = "user")]
    User,
    /// Application-level administrator.  Resolution short-circuits to an
    /// allow for any request, in any workspace.
    #[serde(rename = "super-admin")]
    SuperAdmin,
    /// Administrator of one workspace.  Only meaningful inside a
    /// [`WorkspaceGrant`]; resolution short-circuits to an allow for any
    /// request scoped to that workspace.
    #[serde(rename = "workspace-admin")]
    WorkspaceAdmin,
}

/// Roles that may be assigned at the application level.
pub const APPLICATION_ROLES: [Role; 2] = [Role::User, Role::SuperAdmin];

/// Roles that may be assigned within a workspace.
pub const WORKSPACE_ROLES: [Role; 2] = [Role::User, Role::WorkspaceAdmin];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::SuperAdmin => "super-admin",
            Role::WorkspaceAdmin => "workspace-admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's roles and permitted actions within one workspace.
#[derive(
    Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq,
)]
pub struct WorkspaceGrant {
    pub roles: BTreeSet<Role>,
    pub permissions: BTreeSet<Action>,
}

impl WorkspaceGrant {
    /// Grant given to the creator of a workspace.  Admins carry no
    /// explicit permissions; resolution short-circuits on the role.
    pub fn admin() -> WorkspaceGrant {
        WorkspaceGrant {
            roles: BTreeSet::from([Role::WorkspaceAdmin]),
            permissions: BTreeSet::new(),
        }
    }

    /// Grant given to an ordinary member joining a workspace.
    pub fn member() -> WorkspaceGrant {
        WorkspaceGrant {
            roles: BTreeSet::from([Role::User]),
            permissions: IN_WORKSPACE_ACTIONS.into_iter().collect(),
        }
    }
}

/// Error returned when inserting a grant for a workspace that already
/// has one.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("user already has a grant for workspace {0}")]
pub struct DuplicateGrant(pub Uuid);

/// Map from workspace id to the user's grant within that workspace
///
/// Insertion is checked: a user has at most one grant per workspace.
/// Removal of an absent entry is a no-op, which keeps replayed
/// membership events harmless.
#[derive(
    Clone,
    Debug,
    Default,
    Deserialize,
    Serialize,
    JsonSchema,
    PartialEq,
    Eq,
)]
#[serde(transparent)]
pub struct WorkspaceGrantMap(BTreeMap<Uuid, WorkspaceGrant>);

impl WorkspaceGrantMap {
    pub fn new() -> WorkspaceGrantMap {
        WorkspaceGrantMap(BTreeMap::new())
    }

    pub fn get(&self, workspace_id: &Uuid) -> Option<&WorkspaceGrant> {
        self.0.get(workspace_id)
    }

    pub fn contains_key(&self, workspace_id: &Uuid) -> bool {
        self.0.contains_key(workspace_id)
    }

    pub fn insert(
        &mut self,
        workspace_id: Uuid,
        grant: WorkspaceGrant,
    ) -> Result<(), DuplicateGrant> {
        match self.0.entry(workspace_id) {
            std::collections::btree_map::Entry::Occupied(_) => {
                Err(DuplicateGrant(workspace_id))
            }
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(grant);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, workspace_id: &Uuid) -> Option<WorkspaceGrant> {
        self.0.remove(workspace_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &WorkspaceGrant)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The complete permission state for one user
#[derive(
    Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq,
)]
pub struct PermissionRecord {
    pub user_id: Uuid,
    /// Application-level roles.
    pub roles: BTreeSet<Role>,
    /// Application-level permitted actions.
    pub permissions: BTreeSet<Action>,
    /// Per-workspace grants.
    pub workspaces: WorkspaceGrantMap,
}

impl PermissionRecord {
    /// Returns the record created for a newly-registered user.
    ///
    /// Super-admins get no explicit permissions since resolution never
    /// consults them; everyone else may operate on workspaces.
    pub fn new_user(user_id: Uuid, role: Role) -> PermissionRecord {
        let permissions = if role == Role::SuperAdmin {
            BTreeSet::new()
        } else {
            WORKSPACE_ACTIONS.into_iter().collect()
        };
        PermissionRecord {
            user_id,
            roles: BTreeSet::from([role]),
            permissions,
            workspaces: WorkspaceGrantMap::new(),
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.roles.contains(&Role::SuperAdmin)
    }
}
