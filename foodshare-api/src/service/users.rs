use crate::service::{Result, ServiceError, fetch_user, posts::views};
use foodshare_common::{
    model::{
        Id,
        post::{PostKind, PostStatus, PostView},
        user::{ProfileUpdate, User, UserMarker, UserStats},
    },
    query::{Page, Pagination, Participant, PostOrder, PostQuery, StatusFilter},
};
use foodshare_db::store::Store;
use serde::Deserialize;
use tracing::debug;

/// Size of the recent posts and recent claims lists in the stats.
pub const RECENT_LIMIT: u32 = 5;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Posts,
    Claims,
    #[default]
    All,
}

pub async fn get_profile(store: &dyn Store, id: Id<UserMarker>) -> Result<User> {
    fetch_user(store, id).await
}

pub async fn update_profile(
    store: &dyn Store,
    caller: Id<UserMarker>,
    update: ProfileUpdate,
) -> Result<User> {
    let mut user = fetch_user(store, caller).await?;
    update.apply(&mut user);

    if !store.update_profile(&user).await? {
        return Err(ServiceError::UserNotFound(caller));
    }

    debug!(user = %caller, "Updated profile");
    Ok(user)
}

fn involving(participant: Participant, kind: PostKind, status: StatusFilter) -> PostQuery {
    PostQuery {
        kind: Some(kind),
        status,
        participant: Some(participant),
        ..PostQuery::default()
    }
}

pub async fn stats(store: &dyn Store, caller: Id<UserMarker>) -> Result<UserStats<PostView>> {
    let user = fetch_user(store, caller).await?;
    let completed = StatusFilter::Only(PostStatus::Completed);

    let donations_made = store
        .count_posts(&involving(Participant::Owner(caller), PostKind::Donate, StatusFilter::Any))
        .await?;
    let donations_received = store
        .count_posts(&involving(Participant::Claimer(caller), PostKind::Donate, completed))
        .await?;
    let requests_made = store
        .count_posts(&involving(Participant::Owner(caller), PostKind::Request, StatusFilter::Any))
        .await?;
    let requests_fulfilled = store
        .count_posts(&involving(Participant::Claimer(caller), PostKind::Request, completed))
        .await?;

    let recent = Some(Pagination::new(None, Some(RECENT_LIMIT)));
    let recent_posts = PostQuery {
        participant: Some(Participant::Owner(caller)),
        ..PostQuery::default()
    };
    let recent_claims = PostQuery {
        participant: Some(Participant::Claimer(caller)),
        order: PostOrder::RecentlyClaimed,
        ..PostQuery::default()
    };
    let recent_posts = store.fetch_posts(&recent_posts, recent).await?.items;
    let recent_claims = store.fetch_posts(&recent_claims, recent).await?.items;

    Ok(UserStats {
        donations_made,
        donations_received,
        requests_made,
        requests_fulfilled,
        average_rating: user.average_rating,
        total_ratings: user.total_ratings,
        recent_posts: views(store, recent_posts).await?,
        recent_claims: views(store, recent_claims).await?,
    })
}

pub async fn history(
    store: &dyn Store,
    caller: Id<UserMarker>,
    kind: HistoryKind,
    pagination: Pagination,
) -> Result<Page<PostView>> {
    let participant = match kind {
        HistoryKind::Posts => Participant::Owner(caller),
        HistoryKind::Claims => Participant::Claimer(caller),
        HistoryKind::All => Participant::Either(caller),
    };
    let query = PostQuery {
        participant: Some(participant),
        ..PostQuery::default()
    };
    let page = store.fetch_posts(&query, Some(pagination)).await?;

    Ok(Page {
        items: views(store, page.items).await?,
        total: page.total,
    })
}
