// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface for the gangway server: permission inspection and the
//! authorizing proxy to per-deployment backends

use dropshot::Body;
use dropshot::HttpError;
use dropshot::HttpResponseOk;
use dropshot::Path;
use dropshot::RequestContext;
use dropshot::TypedBody;
use dropshot::UntypedBody;
use dropshot::WebsocketEndpointResult;
use dropshot::WebsocketUpgrade;
use gangway_authz::Action;
use gangway_authz::PermissionRecord;
use gangway_authz::Role;
use http::Response;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

#[dropshot::api_description]
pub trait GangwayApi {
    type Context;

    /// Fetch the calling user's own permission record.
    #[endpoint {
        method = GET,
        path = "/user/permissions",
    }]
    async fn current_user_permissions_view(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<PermissionRecord>, HttpError>;

    /// Fetch another user's permission record.
    #[endpoint {
        method = GET,
        path = "/users/{user_id}/permissions",
    }]
    async fn user_permissions_view(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<UserPathParams>,
    ) -> Result<HttpResponseOk<PermissionRecord>, HttpError>;

    /// Replace a user's application-level roles and permissions.
    #[endpoint {
        method = PUT,
        path = "/users/{user_id}/permissions",
    }]
    async fn user_permissions_update(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<UserPathParams>,
        body: TypedBody<UpdateUserPermissions>,
    ) -> Result<HttpResponseOk<PermissionRecord>, HttpError>;

    /// Replace a user's roles and permissions within one workspace.
    #[endpoint {
        method = PUT,
        path = "/workspaces/{workspace_id}/users/{user_id}/permissions",
    }]
    async fn workspace_user_permissions_update(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<WorkspaceUserPathParams>,
        body: TypedBody<UpdateWorkspaceUserPermissions>,
    ) -> Result<HttpResponseOk<PermissionRecord>, HttpError>;

    /// Forward a GET request to a deployment's backend.
    #[endpoint {
        method = GET,
        path = "/workspaces/{workspace_id}/deployments/{deployment_id}/proxy/{path:.*}",
        unpublished = true,
    }]
    async fn deployment_proxy_get(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
    ) -> Result<Response<Body>, HttpError>;

    /// Forward a DELETE request to a deployment's backend.
    #[endpoint {
        method = DELETE,
        path = "/workspaces/{workspace_id}/deployments/{deployment_id}/proxy/{path:.*}",
        unpublished = true,
    }]
    async fn deployment_proxy_delete(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
    ) -> Result<Response<Body>, HttpError>;

    /// Forward a POST request, body included, to a deployment's backend.
    #[endpoint {
        method = POST,
        path = "/workspaces/{workspace_id}/deployments/{deployment_id}/proxy/{path:.*}",
        unpublished = true,
    }]
    async fn deployment_proxy_post(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError>;

    /// Forward a PUT request, body included, to a deployment's backend.
    #[endpoint {
        method = PUT,
        path = "/workspaces/{workspace_id}/deployments/{deployment_id}/proxy/{path:.*}",
        unpublished = true,
    }]
    async fn deployment_proxy_put(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError>;

    /// Forward a PATCH request, body included, to a deployment's backend.
    #[endpoint {
        method = PATCH,
        path = "/workspaces/{workspace_id}/deployments/{deployment_id}/proxy/{path:.*}",
        unpublished = true,
    }]
    async fn deployment_proxy_patch(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError>;

    /// Open a WebSocket relay to a deployment's backend.
    ///
    /// Authorization happens before the upgrade completes, so an
    /// unauthorized caller sees an HTTP error, never a half-open
    /// socket.
    #[endpoint {
        method = GET,
        path = "/workspaces/{workspace_id}/deployments/{deployment_id}/stream/{path:.*}",
        unpublished = true,
    }]
    async fn deployment_stream(
        rqctx: RequestContext<Self::Context>,
        path_params: Path<DeploymentPathParams>,
        websocket: WebsocketUpgrade,
    ) -> WebsocketEndpointResult;
}

#[derive(Clone, Debug, Deserialize, JsonSchema)]
pub struct UserPathParams {
    pub user_id: Uuid,
}

#[derive(Clone, Debug, Deserialize, JsonSchema)]
pub struct WorkspaceUserPathParams {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Clone, Debug, Deserialize, JsonSchema)]
pub struct DeploymentPathParams {
    pub workspace_id: Uuid,
    pub deployment_id: Uuid,
    /// Remainder of the path, forwarded to the backend.
    pub path: Vec<String>,
}

/// Replacement application-level grants for a user
///
/// Roles are restricted to those meaningful at the application level
/// and permissions to workspace-level actions; anything else is
/// rejected.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct UpdateUserPermissions {
    pub roles: Vec<Role>,
    pub permissions: Vec<Action>,
}

/// Replacement grants for a user within one workspace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct UpdateWorkspaceUserPermissions {
    pub roles: Vec<Role>,
    pub permissions: Vec<Action>,
}
