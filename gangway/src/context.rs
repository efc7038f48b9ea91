// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared state available to all endpoint handlers

use crate::gate::Gate;
use crate::proxy::Forwarder;
use gangway_authz::PermissionStore;
use std::sync::Arc;

/// Shared state used by API request handlers
pub struct ServerContext {
    /// Permission records, read directly by the view endpoints
    pub store: Arc<dyn PermissionStore>,
    /// Authorization gate consulted before any handler acts
    pub gate: Gate,
    /// Forwarder for the deployment proxy endpoints
    pub forwarder: Forwarder,
}
