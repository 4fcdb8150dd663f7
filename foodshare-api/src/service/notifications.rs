use crate::service::{Result, ServiceError};
use foodshare_common::{
    model::{
        Id,
        notification::{Notification, NotificationMarker},
        user::UserMarker,
    },
    query::{Page, Pagination},
};
use foodshare_db::store::Store;
use tracing::debug;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Inbox {
    pub page: Page<Notification>,
    pub unread: u64,
}

async fn fetch_own(
    store: &dyn Store,
    caller: Id<UserMarker>,
    id: Id<NotificationMarker>,
) -> Result<Notification> {
    let notification = store
        .fetch_notification(id)
        .await?
        .ok_or(ServiceError::NotificationNotFound(id))?;

    if notification.recipient == caller {
        Ok(notification)
    } else {
        Err(ServiceError::NotRecipient)
    }
}

pub async fn list(
    store: &dyn Store,
    caller: Id<UserMarker>,
    unread_only: bool,
    pagination: Pagination,
) -> Result<Inbox> {
    let page = store
        .fetch_notifications(caller, unread_only, pagination)
        .await?;
    let unread = store.count_unread(caller).await?;

    Ok(Inbox { page, unread })
}

pub async fn mark_read(
    store: &dyn Store,
    caller: Id<UserMarker>,
    id: Id<NotificationMarker>,
) -> Result<Notification> {
    let mut notification = fetch_own(store, caller, id).await?;

    if !store.mark_read(id).await? {
        return Err(ServiceError::NotificationNotFound(id));
    }

    notification.read = true;
    Ok(notification)
}

pub async fn mark_all_read(store: &dyn Store, caller: Id<UserMarker>) -> Result<u64> {
    let count = store.mark_all_read(caller).await?;

    debug!(user = %caller, count, "Marked notifications as read");
    Ok(count)
}

pub async fn delete(
    store: &dyn Store,
    caller: Id<UserMarker>,
    id: Id<NotificationMarker>,
) -> Result<()> {
    fetch_own(store, caller, id).await?;

    if store.delete_notification(id).await? {
        Ok(())
    } else {
        Err(ServiceError::NotificationNotFound(id))
    }
}
