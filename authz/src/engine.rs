// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Permission resolution

use crate::action::Action;
use crate::record::Role;
use crate::store::PermissionStore;
use crate::store::StoreError;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a successful resolution
///
/// `is_admin` reports whether the allow came from an admin role rather
/// than explicit grants.  Callers use it to expose extra affordances;
/// it's never true on a deny.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Verdict {
    pub allowed: bool,
    pub is_admin: bool,
}

impl Verdict {
    fn admin() -> Verdict {
        Verdict { allowed: true, is_admin: true }
    }

    fn from_allowed(allowed: bool) -> Verdict {
        Verdict { allowed, is_admin: false }
    }
}

/// Resolution failed before a verdict could be reached
///
/// These are distinct from a deny: a deny is a successful resolution
/// whose answer is "no".
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The user has no permission record at all.  Lifecycle
    /// synchronization creates one for every user, so this indicates an
    /// inconsistency, not a denial.
    #[error("no permission record for user {user_id}")]
    PermissionsNotFound { user_id: Uuid },

    /// The request was scoped to a workspace the user has no grant for.
    #[error("user {user_id} has no grant for workspace {workspace_id}")]
    WorkspaceNotFoundForPrincipal { user_id: Uuid, workspace_id: Uuid },

    #[error("permission store failure")]
    Store(#[source] StoreError),
}

impl From<AuthzError> for gangway_common::Error {
    fn from(error: AuthzError) -> Self {
        match error {
            AuthzError::PermissionsNotFound { .. }
            | AuthzError::Store(_) => {
                gangway_common::Error::internal_error(&error.to_string())
            }
            // Deliberately indistinguishable from a plain deny so that
            // callers can't probe for workspace membership.
            AuthzError::WorkspaceNotFoundForPrincipal { .. } => {
                gangway_common::Error::Forbidden
            }
        }
    }
}

/// Resolves requested actions against stored permission records
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn PermissionStore>,
}

impl Engine {
    pub fn new(store: Arc<dyn PermissionStore>) -> Engine {
        Engine { store }
    }

    /// Decides whether `user_id` may perform all of `needed`, scoped to
    /// `workspace_id` if one is given.
    ///
    /// Resolution order matters and is part of the contract:
    ///
    /// 1. fetch the user's record; a missing record is an error
    /// 2. a super-admin is allowed, regardless of scope
    /// 3. with no workspace scope, check `needed` against the record's
    ///    application-level actions
    /// 4. with a workspace scope, a missing grant for that workspace is
    ///    an error
    /// 5. a workspace-admin of that workspace is allowed
    /// 6. otherwise check `needed` against the union of the
    ///    application-level and workspace-level actions
    ///
    /// Both containment checks (steps 3 and 6) deny outright when
    /// either side is empty.
    pub async fn can(
        &self,
        user_id: Uuid,
        needed: &BTreeSet<Action>,
        workspace_id: Option<Uuid>,
    ) -> Result<Verdict, AuthzError> {
        let record = match self.store.fetch(user_id).await {
            Ok(record) => record,
            Err(StoreError::NoSuchUser(_)) => {
                return Err(AuthzError::PermissionsNotFound { user_id });
            }
            Err(error) => return Err(AuthzError::Store(error)),
        };

        if record.roles.contains(&Role::SuperAdmin) {
            return Ok(Verdict::admin());
        }

        let Some(workspace_id) = workspace_id else {
            return Ok(Verdict::from_allowed(has_all(
                &record.permissions,
                needed,
            )));
        };

        let Some(grant) = record.workspaces.get(&workspace_id) else {
            return Err(AuthzError::WorkspaceNotFoundForPrincipal {
                user_id,
                workspace_id,
            });
        };

        if grant.roles.contains(&Role::WorkspaceAdmin) {
            return Ok(Verdict::admin());
        }

        let combined: BTreeSet<Action> = record
            .permissions
            .union(&grant.permissions)
            .copied()
            .collect();
        Ok(Verdict::from_allowed(has_all(&combined, needed)))
    }
}

/// Containment check used at both levels
///
/// An empty set on either side is a deny: a user with no grants can do
/// nothing, and a request demanding nothing is malformed rather than
/// trivially satisfied.
fn has_all(granted: &BTreeSet<Action>, needed: &BTreeSet<Action>) -> bool {
    if granted.is_empty() || needed.is_empty() {
        return false;
    }
    needed.is_subset(granted)
}
