use crate::{
    server::{
        Result, ServerError, ServerRouter, auth::AuthenticatedUser, extract::Query,
        response::Envelope,
    },
    service::notifications,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use foodshare_common::{
    model::{
        Id,
        notification::{Notification, NotificationMarker},
    },
    query::Pagination,
};
use foodshare_db::store::Store;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_notifications)
        .typed_put(mark_all_read)
        .typed_put(mark_read)
        .typed_delete(delete_notification)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notifications", rejection(ServerError))]
struct NotificationsPath();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct InboxQuery {
    #[serde(default)]
    unread: bool,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_notifications(
    NotificationsPath(): NotificationsPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Query(query): Query<InboxQuery>,
) -> Result<Envelope<Vec<Notification>>> {
    let pagination = Pagination::new(query.page, query.limit);
    let inbox = notifications::list(store.as_ref(), user.user_id(), query.unread, pagination).await?;

    Ok(Envelope::page(inbox.page, pagination).with_unread_count(inbox.unread))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notifications/read-all", rejection(ServerError))]
struct ReadAllPath();

async fn mark_all_read(
    ReadAllPath(): ReadAllPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Envelope<()>> {
    let count = notifications::mark_all_read(store.as_ref(), user.user_id()).await?;

    Ok(Envelope::message("All notifications marked as read").with_count(count))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notifications/{id}/read", rejection(ServerError))]
struct ReadPath {
    id: Id<NotificationMarker>,
}

async fn mark_read(
    ReadPath { id }: ReadPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Envelope<Notification>> {
    let notification = notifications::mark_read(store.as_ref(), user.user_id(), id).await?;

    Ok(Envelope::data(notification))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notifications/{id}", rejection(ServerError))]
struct NotificationPath {
    id: Id<NotificationMarker>,
}

async fn delete_notification(
    NotificationPath { id }: NotificationPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Envelope<()>> {
    notifications::delete(store.as_ref(), user.user_id(), id).await?;

    Ok(Envelope::message("Notification deleted"))
}
