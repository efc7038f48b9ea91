// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Storage for permission records
//!
//! [`PermissionStore`] abstracts the backing store so the resolution
//! engine and the lifecycle synchronizer don't care where records live.
//! [`MemoryStore`] is the in-process implementation used by the server
//! and by tests.

use crate::record::PermissionRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("no permission record for user {0}")]
    NoSuchUser(Uuid),
    #[error("permission record already exists for user {0}")]
    AlreadyExists(Uuid),
}

/// Interface to the permission record store
///
/// Records are keyed by user id.  `update()` replaces the stored record
/// wholesale; callers are expected to fetch, modify, and write back.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fetches the record for `user_id`.
    async fn fetch(
        &self,
        user_id: Uuid,
    ) -> Result<PermissionRecord, StoreError>;

    /// Stores a record for a user that has none.
    async fn create(&self, record: PermissionRecord)
        -> Result<(), StoreError>;

    /// Replaces the existing record for `record.user_id`.
    async fn update(&self, record: PermissionRecord)
        -> Result<(), StoreError>;

    /// Removes the record for `user_id`, reporting whether one existed.
    async fn delete(&self, user_id: Uuid) -> Result<bool, StoreError>;

    /// Returns every record holding a grant for `workspace_id`.
    async fn list_by_workspace(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<PermissionRecord>, StoreError>;
}

/// In-memory [`PermissionStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<Uuid, PermissionRecord>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore { records: Mutex::new(BTreeMap::new()) }
    }

    /// Returns the number of records held.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn fetch(
        &self,
        user_id: Uuid,
    ) -> Result<PermissionRecord, StoreError> {
        let records = self.records.lock().unwrap();
        records.get(&user_id).cloned().ok_or(StoreError::NoSuchUser(user_id))
    }

    async fn create(
        &self,
        record: PermissionRecord,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.entry(record.user_id) {
            std::collections::btree_map::Entry::Occupied(entry) => {
                Err(StoreError::AlreadyExists(*entry.key()))
            }
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    async fn update(
        &self,
        record: PermissionRecord,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&record.user_id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StoreError::NoSuchUser(record.user_id)),
        }
    }

    async fn delete(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.lock().unwrap();
        Ok(records.remove(&user_id).is_some())
    }

    async fn list_by_workspace(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<PermissionRecord>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|record| record.workspaces.contains_key(&workspace_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::Role;
    use crate::record::WorkspaceGrant;

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        assert_eq!(
            store.fetch(user_id).await,
            Err(StoreError::NoSuchUser(user_id))
        );

        let record = PermissionRecord::new_user(user_id, Role::User);
        store.create(record.clone()).await.unwrap();
        assert_eq!(store.fetch(user_id).await.unwrap(), record);
        assert_eq!(
            store.create(record.clone()).await,
            Err(StoreError::AlreadyExists(user_id))
        );

        let mut updated = record.clone();
        updated.roles.insert(Role::SuperAdmin);
        store.update(updated.clone()).await.unwrap();
        assert_eq!(store.fetch(user_id).await.unwrap(), updated);

        assert!(store.delete(user_id).await.unwrap());
        assert!(!store.delete(user_id).await.unwrap());
        assert_eq!(
            store.update(updated).await,
            Err(StoreError::NoSuchUser(user_id))
        );
    }

    #[tokio::test]
    async fn test_list_by_workspace() {
        let store = MemoryStore::new();
        let workspace_id = Uuid::new_v4();
        let other_workspace = Uuid::new_v4();

        let mut inside = Vec::new();
        for _ in 0..3 {
            let mut record =
                PermissionRecord::new_user(Uuid::new_v4(), Role::User);
            record
                .workspaces
                .insert(workspace_id, WorkspaceGrant::member())
                .unwrap();
            store.create(record.clone()).await.unwrap();
            inside.push(record);
        }
        let mut outside =
            PermissionRecord::new_user(Uuid::new_v4(), Role::User);
        outside
            .workspaces
            .insert(other_workspace, WorkspaceGrant::member())
            .unwrap();
        store.create(outside).await.unwrap();

        let mut found = store.list_by_workspace(workspace_id).await.unwrap();
        found.sort_by_key(|record| record.user_id);
        inside.sort_by_key(|record| record.user_id);
        assert_eq!(found, inside);
        assert!(store
            .list_by_workspace(Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }
}
