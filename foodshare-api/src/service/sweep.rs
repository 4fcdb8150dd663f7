//! Periodic maintenance: overdue posts expire and owners get one reminder
//! before their post runs out.

use crate::service::Result;
use foodshare_common::{
    model::{notification::NotificationDraft, post::PostStatus},
    query::{PostQuery, StatusFilter},
};
use foodshare_db::store::Store;
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const REMINDED: &[PostStatus] = &[PostStatus::Posted, PostStatus::Claimed];

/// Moves every unsettled post whose expiry date passed into `Expired`.
/// Returns how many posts changed.
pub async fn expire_overdue(store: &dyn Store, now: OffsetDateTime) -> Result<usize> {
    let overdue = store.fetch_posts(&PostQuery::overdue(now), None).await?.items;
    let mut expired = 0;

    for mut post in overdue {
        if !post.expire(now) {
            continue;
        }

        if store.replace_post(&post).await? {
            expired += 1;
        } else {
            debug!(post = %post.id, "Post changed during the sweep, leaving it");
        }
    }

    Ok(expired)
}

/// Sends the expiring-soon reminder to owners who have not had one for the
/// post yet. Returns how many were sent.
pub async fn notify_expiring_soon(store: &dyn Store, now: OffsetDateTime) -> Result<usize> {
    let query = PostQuery {
        status: StatusFilter::OneOf(REMINDED),
        ..PostQuery::default()
    }
    .expiring_soon(now);
    let posts = store.fetch_posts(&query, None).await?.items;
    let mut notified = 0;

    for post in posts {
        let draft = NotificationDraft::expiring_soon(&post);
        if store.insert_notification_once(&draft, now).await?.is_some() {
            notified += 1;
        }
    }

    Ok(notified)
}

pub async fn run_once(store: &dyn Store, now: OffsetDateTime) {
    match expire_overdue(store, now).await {
        Ok(count) => info!(count, "Expired overdue posts"),
        Err(error) => error!(%error, "Expiring overdue posts failed"),
    }

    match notify_expiring_soon(store, now).await {
        Ok(count) => info!(count, "Sent expiring soon notifications"),
        Err(error) => error!(%error, "Sending expiring soon notifications failed"),
    }
}

/// Sweeps right away and then once per `period` until `cancel` fires.
pub async fn run(store: Arc<dyn Store>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => run_once(store.as_ref(), OffsetDateTime::now_utc()).await,
        }
    }

    info!("Sweep stopped");
}
