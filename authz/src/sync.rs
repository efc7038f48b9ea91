// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Applies lifecycle events to permission records

use crate::events::LifecycleEvent;
use crate::record::DuplicateGrant;
use crate::record::PermissionRecord;
use crate::record::Role;
use crate::record::WorkspaceGrant;
use crate::store::PermissionStore;
use crate::store::StoreError;
use slog::debug;
use slog::o;
use slog::warn;
use slog::Logger;
use slog_error_chain::InlineErrorChain;
use std::sync::Arc;
use uuid::Uuid;

/// Keeps permission records consistent with user and workspace
/// lifecycle changes
///
/// Handlers are idempotent where the store allows it: creating a record
/// that exists, removing a grant that's gone, and deleting a record
/// that's gone are all quiet no-ops, so replayed events are harmless.
pub struct LifecycleSynchronizer {
    store: Arc<dyn PermissionStore>,
    log: Logger,
}

impl LifecycleSynchronizer {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        log: &Logger,
    ) -> LifecycleSynchronizer {
        LifecycleSynchronizer {
            store,
            log: log.new(o!("component" => "lifecycle-sync")),
        }
    }

    /// Applies one event to the store.
    ///
    /// Failures are logged rather than returned.  The bus has no way to
    /// reject an event, and a failed application is an inconsistency to
    /// surface in the log, not a reason to stop draining the queue.
    pub async fn apply(&self, event: &LifecycleEvent) {
        debug!(self.log, "applying lifecycle event";
            "topic" => event.topic(),
        );
        let result = match event {
            LifecycleEvent::UserCreated { user_id, assigned_role } => {
                self.user_created(*user_id, *assigned_role).await
            }
            LifecycleEvent::UserDeleted { user_id } => {
                self.user_deleted(*user_id).await
            }
            LifecycleEvent::WorkspaceCreated { workspace_id, member_ids } => {
                self.workspace_created(*workspace_id, member_ids).await
            }
            LifecycleEvent::WorkspaceUserRemoved {
                workspace_id,
                user_id,
            } => self.workspace_user_removed(*workspace_id, *user_id).await,
            LifecycleEvent::WorkspaceDeleted { workspace_id } => {
                self.workspace_deleted(*workspace_id).await
            }
        };
        if let Err(error) = result {
            warn!(self.log, "failed to apply lifecycle event";
                "topic" => event.topic(),
                "error" => InlineErrorChain::new(&error),
            );
        }
    }

    async fn user_created(
        &self,
        user_id: Uuid,
        assigned_role: Role,
    ) -> Result<(), StoreError> {
        let record = PermissionRecord::new_user(user_id, assigned_role);
        match self.store.create(record).await {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists(_)) => {
                debug!(self.log, "user already has a permission record";
                    "user_id" => %user_id,
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn user_deleted(&self, user_id: Uuid) -> Result<(), StoreError> {
        if !self.store.delete(user_id).await? {
            debug!(self.log, "user had no permission record";
                "user_id" => %user_id,
            );
        }
        Ok(())
    }

    /// The first member of a new workspace is its creator and becomes
    /// its admin; any other initial members join as ordinary members
    /// with the default in-workspace grant.
    async fn workspace_created(
        &self,
        workspace_id: Uuid,
        member_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        let Some((creator, members)) = member_ids.split_first() else {
            warn!(self.log, "workspace created with no members";
                "workspace_id" => %workspace_id,
            );
            return Ok(());
        };
        self.insert_grant(*creator, workspace_id, WorkspaceGrant::admin())
            .await?;
        for user_id in members {
            // One member's failure shouldn't cost the others their
            // grants.
            if let Err(error) = self
                .insert_grant(*user_id, workspace_id, WorkspaceGrant::member())
                .await
            {
                warn!(self.log, "failed to grant workspace membership";
                    "workspace_id" => %workspace_id,
                    "user_id" => %user_id,
                    "error" => InlineErrorChain::new(&error),
                );
            }
        }
        Ok(())
    }

    async fn insert_grant(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        grant: WorkspaceGrant,
    ) -> Result<(), StoreError> {
        let mut record = self.store.fetch(user_id).await?;
        match record.workspaces.insert(workspace_id, grant) {
            Ok(()) => self.store.update(record).await,
            Err(DuplicateGrant(_)) => {
                debug!(self.log, "user already has a grant for workspace";
                    "workspace_id" => %workspace_id,
                    "user_id" => %user_id,
                );
                Ok(())
            }
        }
    }

    async fn workspace_user_removed(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut record = self.store.fetch(user_id).await?;
        if record.workspaces.remove(&workspace_id).is_none() {
            debug!(self.log, "user had no grant for workspace";
                "workspace_id" => %workspace_id,
                "user_id" => %user_id,
            );
            return Ok(());
        }
        self.store.update(record).await
    }

    async fn workspace_deleted(
        &self,
        workspace_id: Uuid,
    ) -> Result<(), StoreError> {
        let records = self.store.list_by_workspace(workspace_id).await?;
        for mut record in records {
            record.workspaces.remove(&workspace_id);
            // Keep going if one record fails; the rest shouldn't be
            // left holding grants for a dead workspace.
            if let Err(error) = self.store.update(record).await {
                warn!(self.log, "failed to drop workspace grant";
                    "workspace_id" => %workspace_id,
                    "error" => InlineErrorChain::new(&error),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::action::Action;
    use crate::action::WORKSPACE_ACTIONS;
    use crate::engine::AuthzError;
    use crate::engine::Engine;
    use crate::store::MemoryStore;
    use slog::Discard;
    use std::collections::BTreeSet;

    fn sync_with_store() -> (LifecycleSynchronizer, Arc<MemoryStore>) {
        let log = Logger::root(Discard, o!());
        let store = Arc::new(MemoryStore::new());
        (LifecycleSynchronizer::new(store.clone(), &log), store)
    }

    #[tokio::test]
    async fn test_user_created() {
        let (sync, store) = sync_with_store();
        let user_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::UserCreated {
            user_id,
            assigned_role: Role::User,
        })
        .await;

        let record = store.fetch(user_id).await.unwrap();
        assert_eq!(record.roles, BTreeSet::from([Role::User]));
        assert_eq!(
            record.permissions,
            WORKSPACE_ACTIONS.into_iter().collect()
        );

        // Super-admins start with no explicit permissions.
        let admin_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::UserCreated {
            user_id: admin_id,
            assigned_role: Role::SuperAdmin,
        })
        .await;
        let record = store.fetch(admin_id).await.unwrap();
        assert!(record.permissions.is_empty());
        assert!(record.is_super_admin());
    }

    #[tokio::test]
    async fn test_user_created_replay_keeps_existing_record() {
        let (sync, store) = sync_with_store();
        let user_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::UserCreated {
            user_id,
            assigned_role: Role::User,
        })
        .await;

        // Accumulate some state, then replay the creation.
        let workspace_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::WorkspaceCreated {
            workspace_id,
            member_ids: vec![user_id],
        })
        .await;
        sync.apply(&LifecycleEvent::UserCreated {
            user_id,
            assigned_role: Role::User,
        })
        .await;

        let record = store.fetch(user_id).await.unwrap();
        assert!(record.workspaces.contains_key(&workspace_id));
    }

    #[tokio::test]
    async fn test_user_deleted() {
        let (sync, store) = sync_with_store();
        let user_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::UserCreated {
            user_id,
            assigned_role: Role::User,
        })
        .await;
        sync.apply(&LifecycleEvent::UserDeleted { user_id }).await;
        assert!(store.is_empty());

        // Replay is a quiet no-op.
        sync.apply(&LifecycleEvent::UserDeleted { user_id }).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_workspace_created_grants_creator_admin() {
        let (sync, store) = sync_with_store();
        let creator = Uuid::new_v4();
        sync.apply(&LifecycleEvent::UserCreated {
            user_id: creator,
            assigned_role: Role::User,
        })
        .await;

        let workspace_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::WorkspaceCreated {
            workspace_id,
            member_ids: vec![creator],
        })
        .await;

        let record = store.fetch(creator).await.unwrap();
        assert_eq!(
            record.workspaces.get(&workspace_id),
            Some(&WorkspaceGrant::admin())
        );

        // Replay doesn't clobber the existing grant.
        sync.apply(&LifecycleEvent::WorkspaceCreated {
            workspace_id,
            member_ids: vec![creator],
        })
        .await;
        assert_eq!(store.fetch(creator).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_workspace_created_grants_initial_members() {
        let (sync, store) = sync_with_store();
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let ghost = Uuid::new_v4();
        for user_id in [creator, member] {
            sync.apply(&LifecycleEvent::UserCreated {
                user_id,
                assigned_role: Role::User,
            })
            .await;
        }

        // One listed member has no record; the others are granted
        // anyway.
        let workspace_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::WorkspaceCreated {
            workspace_id,
            member_ids: vec![creator, ghost, member],
        })
        .await;

        assert_eq!(
            store.fetch(creator).await.unwrap().workspaces.get(&workspace_id),
            Some(&WorkspaceGrant::admin())
        );
        assert_eq!(
            store.fetch(member).await.unwrap().workspaces.get(&workspace_id),
            Some(&WorkspaceGrant::member())
        );
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_workspace_created_for_unknown_creator() {
        let (sync, store) = sync_with_store();
        // No record for the creator: logged and swallowed, no record
        // invented.
        sync.apply(&LifecycleEvent::WorkspaceCreated {
            workspace_id: Uuid::new_v4(),
            member_ids: vec![Uuid::new_v4()],
        })
        .await;
        sync.apply(&LifecycleEvent::WorkspaceCreated {
            workspace_id: Uuid::new_v4(),
            member_ids: vec![],
        })
        .await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_workspace_user_removed() {
        let (sync, store) = sync_with_store();
        let user_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::UserCreated {
            user_id,
            assigned_role: Role::User,
        })
        .await;
        sync.apply(&LifecycleEvent::WorkspaceCreated {
            workspace_id,
            member_ids: vec![user_id],
        })
        .await;

        sync.apply(&LifecycleEvent::WorkspaceUserRemoved {
            workspace_id,
            user_id,
        })
        .await;
        let record = store.fetch(user_id).await.unwrap();
        assert!(!record.workspaces.contains_key(&workspace_id));

        // Removing again, or removing from a workspace the user was
        // never in, changes nothing.
        sync.apply(&LifecycleEvent::WorkspaceUserRemoved {
            workspace_id,
            user_id,
        })
        .await;
        sync.apply(&LifecycleEvent::WorkspaceUserRemoved {
            workspace_id: Uuid::new_v4(),
            user_id,
        })
        .await;
        assert_eq!(store.fetch(user_id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_workspace_deleted_scrubs_all_members() {
        let (sync, store) = sync_with_store();
        let workspace_id = Uuid::new_v4();
        let other_workspace = Uuid::new_v4();

        // Three members of the doomed workspace, one of whom is also in
        // another workspace, plus a bystander.
        let members: Vec<Uuid> =
            (0..3).map(|_| Uuid::new_v4()).collect();
        let bystander = Uuid::new_v4();
        for user_id in members.iter().chain([&bystander]) {
            sync.apply(&LifecycleEvent::UserCreated {
                user_id: *user_id,
                assigned_role: Role::User,
            })
            .await;
        }
        for user_id in &members {
            let mut record = store.fetch(*user_id).await.unwrap();
            record
                .workspaces
                .insert(workspace_id, WorkspaceGrant::member())
                .unwrap();
            store.update(record).await.unwrap();
        }
        let mut straddler = store.fetch(members[0]).await.unwrap();
        straddler
            .workspaces
            .insert(other_workspace, WorkspaceGrant::member())
            .unwrap();
        store.update(straddler).await.unwrap();

        sync.apply(&LifecycleEvent::WorkspaceDeleted { workspace_id })
            .await;

        for user_id in &members {
            let record = store.fetch(*user_id).await.unwrap();
            assert!(!record.workspaces.contains_key(&workspace_id));
        }
        // The unrelated grant survives.
        let record = store.fetch(members[0]).await.unwrap();
        assert!(record.workspaces.contains_key(&other_workspace));

        // Replay finds nothing to scrub.
        sync.apply(&LifecycleEvent::WorkspaceDeleted { workspace_id })
            .await;
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_events_drive_resolution() {
        let (sync, store) = sync_with_store();
        let engine = Engine::new(store);
        let creator = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();
        sync.apply(&LifecycleEvent::UserCreated {
            user_id: creator,
            assigned_role: Role::User,
        })
        .await;
        sync.apply(&LifecycleEvent::WorkspaceCreated {
            workspace_id,
            member_ids: vec![creator],
        })
        .await;

        // The creator resolves as admin of the new workspace.
        let needed = BTreeSet::from([Action::DeleteWikiSection]);
        let verdict = engine
            .can(creator, &needed, Some(workspace_id))
            .await
            .unwrap();
        assert!(verdict.allowed);
        assert!(verdict.is_admin);

        // Deleting the workspace turns the same check into a
        // membership failure.
        sync.apply(&LifecycleEvent::WorkspaceDeleted { workspace_id })
            .await;
        let error = engine
            .can(creator, &needed, Some(workspace_id))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            AuthzError::WorkspaceNotFoundForPrincipal { .. }
        ));
    }
}
