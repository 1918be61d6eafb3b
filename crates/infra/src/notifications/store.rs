//! Notification storage implementations.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use gradelens_core::{DomainError, DomainResult, Entity, Notification, NotificationId, OwnerId};

/// Notification store abstraction. All reads and writes are owner-scoped.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: Notification) -> DomainResult<Notification>;

    /// Newest first, at most `limit` entries.
    async fn list(&self, owner_id: OwnerId, limit: usize) -> DomainResult<Vec<Notification>>;

    async fn unread_count(&self, owner_id: OwnerId) -> DomainResult<usize>;

    /// Mark one notification read. Already-read is a no-op success.
    async fn mark_read(&self, owner_id: OwnerId, id: NotificationId)
    -> DomainResult<Notification>;

    /// Mark every unread notification of the owner read; returns how many changed.
    async fn mark_all_read(&self, owner_id: OwnerId) -> DomainResult<usize>;

    async fn delete(&self, owner_id: OwnerId, id: NotificationId) -> DomainResult<()>;
}

/// In-memory notification store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    notifications: RwLock<HashMap<NotificationId, Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DomainResult<RwLockReadGuard<'_, HashMap<NotificationId, Notification>>> {
        self.notifications
            .read()
            .map_err(|_| DomainError::storage("notification store lock poisoned"))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, HashMap<NotificationId, Notification>>> {
        self.notifications
            .write()
            .map_err(|_| DomainError::storage("notification store lock poisoned"))
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, notification: Notification) -> DomainResult<Notification> {
        let mut map = self.write()?;
        map.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list(&self, owner_id: OwnerId, limit: usize) -> DomainResult<Vec<Notification>> {
        let map = self.read()?;
        let mut result: Vec<_> = map
            .values()
            .filter(|n| n.is_owned_by(owner_id))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        result.truncate(limit);
        Ok(result)
    }

    async fn unread_count(&self, owner_id: OwnerId) -> DomainResult<usize> {
        let map = self.read()?;
        Ok(map
            .values()
            .filter(|n| n.is_owned_by(owner_id) && !n.is_read)
            .count())
    }

    async fn mark_read(
        &self,
        owner_id: OwnerId,
        id: NotificationId,
    ) -> DomainResult<Notification> {
        let mut map = self.write()?;
        let notification = map
            .get_mut(&id)
            .filter(|n| n.is_owned_by(owner_id))
            .ok_or(DomainError::NotFound)?;
        notification.mark_read();
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, owner_id: OwnerId) -> DomainResult<usize> {
        let mut map = self.write()?;
        Ok(map
            .values_mut()
            .filter(|n| n.is_owned_by(owner_id))
            .map(|n| n.mark_read())
            .filter(|changed| *changed)
            .count())
    }

    async fn delete(&self, owner_id: OwnerId, id: NotificationId) -> DomainResult<()> {
        let mut map = self.write()?;
        match map.get(&id) {
            Some(n) if n.is_owned_by(owner_id) => {
                map.remove(&id);
                Ok(())
            }
            _ => Err(DomainError::NotFound),
        }
    }
}
