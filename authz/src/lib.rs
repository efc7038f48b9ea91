// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Permission model and resolution engine
//!
//! Every user known to the system has exactly one [`PermissionRecord`]
//! keyed by their id.  The record carries two levels of grants:
//!
//! * an application-level set of roles and permitted [`Action`]s, and
//! * a per-workspace map of [`WorkspaceGrant`]s, each with its own roles
//!   and permitted actions.
//!
//! [`Engine::can()`] resolves the question "may this user perform these
//! actions, possibly within this workspace?" against that record.  Two
//! roles short-circuit resolution: a super-admin at the application level
//! and a workspace-admin within a particular workspace.  Everything else
//! comes down to set containment over the granted actions.
//!
//! Records are kept consistent with the rest of the deployment by the
//! [`LifecycleSynchronizer`], which applies user and workspace lifecycle
//! events (creation, deletion, membership changes) to the backing
//! [`PermissionStore`].  Events are delivered at least once and handlers
//! are written to tolerate replay.

pub mod action;
pub mod engine;
pub mod events;
pub mod record;
pub mod store;
pub mod sync;

pub use action::Action;
pub use action::IN_WORKSPACE_ACTIONS;
pub use action::WORKSPACE_ACTIONS;
pub use engine::AuthzError;
pub use engine::Engine;
pub use engine::Verdict;
pub use events::Dispatcher;
pub use events::EventSender;
pub use events::LifecycleEvent;
pub use record::PermissionRecord;
pub use record::Role;
pub use record::WorkspaceGrant;
pub use record::WorkspaceGrantMap;
pub use record::APPLICATION_ROLES;
pub use record::WORKSPACE_ROLES;
pub use store::MemoryStore;
pub use store::PermissionStore;
pub use store::StoreError;
pub use sync::LifecycleSynchronizer;
