// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authorization gate sitting between authentication and the endpoint
//! handlers
//!
//! Every endpoint names an [`Operation`].  The gate owns a static route
//! table mapping each operation to the actions it requires, merged from
//! two declaration sites: actions declared for a whole group of
//! endpoints and actions declared for one endpoint.  An operation with
//! an empty merged set requires authentication only and never consults
//! the resolution engine (which would deny an empty request set).

use crate::authn::Actor;
use gangway_authz::Action;
use gangway_authz::AuthzError;
use gangway_authz::Engine;
use gangway_authz::Verdict;
use gangway_common::Error;
use slog::debug;
use slog::error;
use slog::Logger;
use slog_error_chain::InlineErrorChain;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use uuid::Uuid;

/// A guarded endpoint
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    CurrentUserPermissionsView,
    UserPermissionsView,
    UserPermissionsUpdate,
    WorkspaceUserPermissionsUpdate,
    DeploymentProxy,
    DeploymentStream,
}

/// Requirements for one operation, split by declaration site
struct RouteSpec {
    operation: Operation,
    group_actions: &'static [Action],
    route_actions: &'static [Action],
}

/// Actions required by every deployment proxy endpoint
const PROXY_GROUP_ACTIONS: [Action; 3] = [
    Action::ReadWorkspace,
    Action::ReadDeployment,
    Action::ProxyDeployment,
];

const ROUTES: &[RouteSpec] = &[
    RouteSpec {
        operation: Operation::CurrentUserPermissionsView,
        group_actions: &[],
        route_actions: &[],
    },
    RouteSpec {
        operation: Operation::UserPermissionsView,
        group_actions: &[],
        route_actions: &[Action::ManageUser],
    },
    RouteSpec {
        operation: Operation::UserPermissionsUpdate,
        group_actions: &[],
        route_actions: &[Action::ManageUser],
    },
    RouteSpec {
        operation: Operation::WorkspaceUserPermissionsUpdate,
        group_actions: &[],
        route_actions: &[Action::ManageWorkspace],
    },
    RouteSpec {
        operation: Operation::DeploymentProxy,
        group_actions: &PROXY_GROUP_ACTIONS,
        route_actions: &[],
    },
    RouteSpec {
        operation: Operation::DeploymentStream,
        group_actions: &PROXY_GROUP_ACTIONS,
        route_actions: &[],
    },
];

/// Checks authenticated actors against the route table
pub struct Gate {
    engine: Engine,
    required: BTreeMap<Operation, BTreeSet<Action>>,
}

impl Gate {
    /// Builds the merged requirement table.
    ///
    /// Panics if an operation appears twice in the route table.  That's
    /// a programming error in this file, not a runtime condition.
    pub fn new(engine: Engine) -> Gate {
        let mut required = BTreeMap::new();
        for route in ROUTES {
            let mut needed = BTreeSet::new();
            needed.extend(route.group_actions.iter().copied());
            needed.extend(route.route_actions.iter().copied());
            if required.insert(route.operation, needed).is_some() {
                panic!(
                    "operation {:?} appears twice in the route table",
                    route.operation
                );
            }
        }
        Gate { engine, required }
    }

    /// Decides whether `actor` may carry out `operation`.
    ///
    /// A deny and a workspace the actor has no grant for both surface
    /// as the uniform external `Forbidden`.  Resolution failures that
    /// indicate an inconsistency (no permission record at all) surface
    /// as 500s and are logged loudly.
    pub async fn authorize(
        &self,
        log: &Logger,
        actor: Actor,
        operation: Operation,
        workspace_id: Option<Uuid>,
    ) -> Result<Verdict, Error> {
        let needed = self.required.get(&operation).unwrap_or_else(|| {
            panic!("operation {:?} missing from the route table", operation)
        });
        if needed.is_empty() {
            return Ok(Verdict { allowed: true, is_admin: false });
        }

        match self.engine.can(actor.id, needed, workspace_id).await {
            Ok(verdict) if verdict.allowed => Ok(verdict),
            Ok(_) => {
                debug!(
                    log,
                    "authorization denied";
                    "actor_id" => %actor.id,
                    "operation" => ?operation,
                );
                Err(Error::Forbidden)
            }
            Err(
                error @ AuthzError::WorkspaceNotFoundForPrincipal { .. },
            ) => {
                debug!(
                    log,
                    "actor has no grant for requested workspace";
                    "actor_id" => %actor.id,
                    "operation" => ?operation,
                    "error" => InlineErrorChain::new(&error),
                );
                Err(error.into())
            }
            Err(error) => {
                error!(
                    log,
                    "permission resolution failed";
                    "actor_id" => %actor.id,
                    "operation" => ?operation,
                    "error" => InlineErrorChain::new(&error),
                );
                Err(error.into())
            }
        }
    }
}
