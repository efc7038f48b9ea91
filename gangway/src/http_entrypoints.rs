// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handlers for the gangway HTTP interface
//!
//! Every handler follows the same shape: authenticate the caller from
//! the request headers, ask the [`Gate`](crate::gate::Gate) whether the
//! operation is allowed, then do the work.  Authorization failures never
//! reach the handler bodies below the gate call.

use crate::authn;
use crate::context::ServerContext;
use crate::gate::Operation;
use crate::proxy;
use dropshot::Body;
use dropshot::HttpError;
use dropshot::HttpResponseOk;
use dropshot::Path;
use dropshot::RequestContext;
use dropshot::TypedBody;
use dropshot::UntypedBody;
use dropshot::WebsocketEndpointResult;
use dropshot::WebsocketUpgrade;
use gangway_api::DeploymentPathParams;
use gangway_api::GangwayApi;
use gangway_api::UpdateUserPermissions;
use gangway_api::UpdateWorkspaceUserPermissions;
use gangway_api::UserPathParams;
use gangway_api::WorkspaceUserPathParams;
use gangway_authz::PermissionRecord;
use gangway_authz::APPLICATION_ROLES;
use gangway_authz::WORKSPACE_ROLES;
use gangway_common::Error;
use gangway_common::ResourceType;
use http::Response;
use slog::o;
use slog::Logger;
use slog_error_chain::InlineErrorChain;
use uuid::Uuid;

pub fn api() -> dropshot::ApiDescription<ServerContext> {
    gangway_api::gangway_api_mod::api_description::<GangwayImpl>()
        .expect("registered gangway entrypoints")
}

enum GangwayImpl {}

impl GangwayApi for GangwayImpl {
    type Context = ServerContext;

    async fn current_user_permissions_view(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<PermissionRecord>, HttpError> {
        let apictx = rqctx.context();
        let actor = authn::actor_from_headers(rqctx.request.headers())?;
        apictx
            .gate
            .authorize(
                &rqctx.log,
                actor,
                Operation::CurrentUserPermissionsView,
                None,
            )
            .await?;

        // Authentication vouches that this user exists, so a missing
        // record here is an inconsistency between the identity system
        // and the permission store, not a 404.
        let record = apictx.store.fetch(actor.id).await.map_err(|error| {
            Error::internal_error(&format!(
                "fetching permission record for authenticated user {}: {}",
                actor.id,
                InlineErrorChain::new(&error),
            ))
        })?;
        Ok(HttpResponseOk(record))
    }

    async fn user_permissions_view(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<UserPathParams>,
    ) -> Result<HttpResponseOk<PermissionRecord>, HttpError> {
        let apictx = rqctx.context();
        let UserPathParams { user_id } = path_params.into_inner();
        let actor = authn::actor_from_headers(rqctx.request.headers())?;
        apictx
            .gate
            .authorize(&rqctx.log, actor, Operation::UserPermissionsView, None)
            .await?;

        // Unlike the self view, the target user here is caller-supplied
        // and may simply not exist.
        let record = apictx.store.fetch(user_id).await.map_err(|_| {
            Error::not_found_by_id(ResourceType::User, &user_id)
        })?;
        Ok(HttpResponseOk(record))
    }

    async fn user_permissions_update(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<UserPathParams>,
        body: TypedBody<UpdateUserPermissions>,
    ) -> Result<HttpResponseOk<PermissionRecord>, HttpError> {
        let apictx = rqctx.context();
        let UserPathParams { user_id } = path_params.into_inner();
        let update = body.into_inner();
        let actor = authn::actor_from_headers(rqctx.request.headers())?;
        apictx
            .gate
            .authorize(&rqctx.log, actor, Operation::UserPermissionsUpdate, None)
            .await?;
        validate_user_update(&update)?;

        // TODO: replacement semantics still need to be pinned down --
        // whether replacing roles may strip the last super-admin and how
        // an explicit grant interacts with the role short-circuits.
        // Until then the payload is validated and the operation refused.
        Err(Error::not_implemented(&format!(
            "updating application-level permissions for user {}",
            user_id,
        ))
        .into())
    }

    async fn workspace_user_permissions_update(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<WorkspaceUserPathParams>,
        body: TypedBody<UpdateWorkspaceUserPermissions>,
    ) -> Result<HttpResponseOk<PermissionRecord>, HttpError> {
        let apictx = rqctx.context();
        let WorkspaceUserPathParams { workspace_id, user_id } =
            path_params.into_inner();
        let update = body.into_inner();
        let actor = authn::actor_from_headers(rqctx.request.headers())?;
        apictx
            .gate
            .authorize(
                &rqctx.log,
                actor,
                Operation::WorkspaceUserPermissionsUpdate,
                Some(workspace_id),
            )
            .await?;
        validate_workspace_user_update(&update)?;

        // TODO: same replacement semantics question as
        // `user_permissions_update`, plus what happens to a grant whose
        // user is no longer a member of the workspace.
        Err(Error::not_implemented(&format!(
            "updating permissions for user {} in workspace {}",
            user_id, workspace_id,
        ))
        .into())
    }

    async fn deployment_proxy_get(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
    ) -> Result<Response<Body>, HttpError> {
        proxy_request(&rqctx, path_params.into_inner(), None).await
    }

    async fn deployment_proxy_delete(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
    ) -> Result<Response<Body>, HttpError> {
        proxy_request(&rqctx, path_params.into_inner(), None).await
    }

    async fn deployment_proxy_post(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError> {
        proxy_request(
            &rqctx,
            path_params.into_inner(),
            Some(body.as_bytes().to_vec()),
        )
        .await
    }

    async fn deployment_proxy_put(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError> {
        proxy_request(
            &rqctx,
            path_params.into_inner(),
            Some(body.as_bytes().to_vec()),
        )
        .await
    }

    async fn deployment_proxy_patch(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError> {
        proxy_request(
            &rqctx,
            path_params.into_inner(),
            Some(body.as_bytes().to_vec()),
        )
        .await
    }

    async fn deployment_stream(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
        websocket: WebsocketUpgrade,
    ) -> WebsocketEndpointResult {
        let apictx = rqctx.context();
        let DeploymentPathParams { workspace_id, deployment_id, path: _ } =
            path_params.into_inner();
        let actor = authn::actor_from_headers(rqctx.request.headers())?;
        let log = request_log(&rqctx, &actor, workspace_id, deployment_id);
        apictx
            .gate
            .authorize(
                &log,
                actor,
                Operation::DeploymentStream,
                Some(workspace_id),
            )
            .await?;

        // Dial the backend before completing the upgrade so that an
        // unreachable backend surfaces to the caller as a plain HTTP
        // error rather than an immediately-dead socket.
        let backend = apictx
            .forwarder
            .connect_websocket(
                &log,
                workspace_id,
                deployment_id,
                rqctx.request.uri(),
            )
            .await?;
        websocket.handle(move |conn| proxy::relay_websocket(conn, backend, log))
    }
}

/// Common path for the plain-HTTP proxy endpoints: authenticate,
/// authorize against the deployment proxy operation, then forward.
async fn proxy_request(
    rqctx: &RequestContext<ServerContext>,
    params: DeploymentPathParams,
    body: Option<Vec<u8>>,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    let DeploymentPathParams { workspace_id, deployment_id, path: _ } = params;
    let actor = authn::actor_from_headers(rqctx.request.headers())?;
    let log = request_log(rqctx, &actor, workspace_id, deployment_id);
    apictx
        .gate
        .authorize(&log, actor, Operation::DeploymentProxy, Some(workspace_id))
        .await?;
    let response = apictx
        .forwarder
        .forward(
            &log,
            rqctx.request.method().clone(),
            workspace_id,
            deployment_id,
            rqctx.request.uri(),
            rqctx.request.headers(),
            body,
        )
        .await?;
    Ok(response)
}

fn request_log(
    rqctx: &RequestContext<ServerContext>,
    actor: &authn::Actor,
    workspace_id: Uuid,
    deployment_id: Uuid,
) -> Logger {
    rqctx.log.new(o!(
        "actor_id" => actor.id.to_string(),
        "workspace_id" => workspace_id.to_string(),
        "deployment_id" => deployment_id.to_string(),
    ))
}

/// Checks that an application-level update names only roles and actions
/// that can be granted at the application level.
fn validate_user_update(update: &UpdateUserPermissions) -> Result<(), Error> {
    for role in &update.roles {
        if !APPLICATION_ROLES.contains(role) {
            return Err(Error::invalid_request(&format!(
                "role \"{}\" cannot be assigned at the application level",
                role,
            )));
        }
    }
    for action in &update.permissions {
        if !action.is_workspace_scope() {
            return Err(Error::invalid_request(&format!(
                "action \"{}\" cannot be granted at the application level",
                action,
            )));
        }
    }
    Ok(())
}

/// Checks that a workspace-level update names only roles and actions
/// that make sense inside a workspace.
fn validate_workspace_user_update(
    update: &UpdateWorkspaceUserPermissions,
) -> Result<(), Error> {
    for role in &update.roles {
        if !WORKSPACE_ROLES.contains(role) {
            return Err(Error::invalid_request(&format!(
                "role \"{}\" cannot be assigned within a workspace",
                role,
            )));
        }
    }
    for action in &update.permissions {
        if !action.is_in_workspace() {
            return Err(Error::invalid_request(&format!(
                "action \"{}\" cannot be granted within a workspace",
                action,
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::validate_user_update;
    use super::validate_workspace_user_update;
    use gangway_api::UpdateUserPermissions;
    use gangway_api::UpdateWorkspaceUserPermissions;
    use gangway_authz::Action;
    use gangway_authz::Role;
    use gangway_authz::IN_WORKSPACE_ACTIONS;
    use gangway_authz::WORKSPACE_ACTIONS;

    #[test]
    fn test_user_update_validation() {
        let update = UpdateUserPermissions {
            roles: vec![Role::User, Role::SuperAdmin],
            permissions: WORKSPACE_ACTIONS.to_vec(),
        };
        assert!(validate_user_update(&update).is_ok());

        // Workspace-admin is only meaningful inside a workspace.
        let update = UpdateUserPermissions {
            roles: vec![Role::WorkspaceAdmin],
            permissions: Vec::new(),
        };
        let error = validate_user_update(&update).unwrap_err();
        assert!(error.to_string().contains("workspace-admin"));

        // In-workspace actions cannot be granted application-wide.
        let update = UpdateUserPermissions {
            roles: Vec::new(),
            permissions: vec![Action::ReadDeployment],
        };
        let error = validate_user_update(&update).unwrap_err();
        assert!(error.to_string().contains("deployments:read"));
    }

    #[test]
    fn test_workspace_user_update_validation() {
        let update = UpdateWorkspaceUserPermissions {
            roles: vec![Role::User, Role::WorkspaceAdmin],
            permissions: IN_WORKSPACE_ACTIONS.to_vec(),
        };
        assert!(validate_workspace_user_update(&update).is_ok());

        let update = UpdateWorkspaceUserPermissions {
            roles: vec![Role::SuperAdmin],
            permissions: Vec::new(),
        };
        let error = validate_workspace_user_update(&update).unwrap_err();
        assert!(error.to_string().contains("super-admin"));

        let update = UpdateWorkspaceUserPermissions {
            roles: Vec::new(),
            permissions: vec![Action::CreateWorkspace],
        };
        let error = validate_workspace_user_update(&update).unwrap_err();
        assert!(error.to_string().contains("workspaces:create"));
    }
}
