use std::sync::Arc;

use tracing::{debug, warn};

use gradelens_core::{DomainResult, Notification, NotificationId, OwnerId};

use super::store::NotificationStore;

/// Default page size for inbox listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Owner-facing notification inbox.
///
/// Fails fast: every store error is surfaced to the caller unchanged.
#[derive(Clone)]
pub struct NotificationInbox {
    store: Arc<dyn NotificationStore>,
}

impl NotificationInbox {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, owner_id: OwnerId, limit: usize) -> DomainResult<Vec<Notification>> {
        self.store.list(owner_id, limit).await
    }

    pub async fn unread_count(&self, owner_id: OwnerId) -> DomainResult<usize> {
        self.store.unread_count(owner_id).await
    }

    pub async fn mark_read(
        &self,
        owner_id: OwnerId,
        id: NotificationId,
    ) -> DomainResult<Notification> {
        self.store.mark_read(owner_id, id).await.inspect_err(|err| {
            warn!(owner_id = %owner_id, notification_id = %id, error = %err, "mark_read failed");
        })
    }

    pub async fn mark_all_read(&self, owner_id: OwnerId) -> DomainResult<usize> {
        let changed = self.store.mark_all_read(owner_id).await?;
        debug!(owner_id = %owner_id, changed, "marked all notifications read");
        Ok(changed)
    }

    pub async fn delete(&self, owner_id: OwnerId, id: NotificationId) -> DomainResult<()> {
        self.store.delete(owner_id, id).await
    }
}

impl core::fmt::Debug for NotificationInbox {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationInbox").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use gradelens_core::{DomainError, NotificationType};

    use super::*;
    use crate::notifications::{InMemoryNotificationStore, NotificationEmitter};

    #[tokio::test]
    async fn mark_all_read_then_mark_read_is_a_no_op() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let emitter = NotificationEmitter::new(store.clone());
        let inbox = NotificationInbox::new(store);
        let owner = OwnerId::new();

        let mut ids = Vec::new();
        for i in 0..3 {
            let n = emitter
                .emit(owner, NotificationType::System, format!("n{i}"), "body", None)
                .await
                .unwrap();
            ids.push(n.id);
        }
        assert_eq!(inbox.unread_count(owner).await.unwrap(), 3);

        assert_eq!(inbox.mark_all_read(owner).await.unwrap(), 3);
        assert_eq!(inbox.unread_count(owner).await.unwrap(), 0);

        let before = inbox.list(owner, DEFAULT_LIST_LIMIT).await.unwrap();
        for id in &ids {
            let n = inbox.mark_read(owner, *id).await.unwrap();
            assert!(n.is_read);
        }
        let after = inbox.list(owner, DEFAULT_LIST_LIMIT).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(inbox.unread_count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_then_mark_read_is_not_found() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let emitter = NotificationEmitter::new(store.clone());
        let inbox = NotificationInbox::new(store);
        let owner = OwnerId::new();

        let n = emitter
            .emit(owner, NotificationType::System, "t", "m", None)
            .await
            .unwrap();
        inbox.delete(owner, n.id).await.unwrap();
        assert_eq!(inbox.mark_read(owner, n.id).await, Err(DomainError::NotFound));
    }
}
