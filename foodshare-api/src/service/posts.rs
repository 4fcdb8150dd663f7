use crate::service::{Result, ServiceError, fetch_user, summaries};
use foodshare_common::{
    geo::GeoFilter,
    lifecycle::StatusChange,
    model::{
        Id,
        notification::NotificationDraft,
        post::{MapPost, Post, PostDraft, PostKind, PostMarker, PostStatus, PostUpdate, PostView},
        user::{UserCounter, UserMarker, UserSummary},
    },
    query::{LIST_HIDDEN, MAP_HIDDEN, Page, Pagination, PostQuery, StatusFilter},
};
use foodshare_db::store::Store;
use std::{collections::HashMap, iter};
use time::OffsetDateTime;
use tracing::{debug, info};

/// Filters a client may put on the list and map endpoints.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct PostFilter {
    pub kind: Option<PostKind>,
    pub status: Option<PostStatus>,
    pub expiring_soon: bool,
    pub geo: Option<GeoFilter>,
}

impl PostFilter {
    fn into_query(self, hidden: &'static [PostStatus], now: OffsetDateTime) -> PostQuery {
        let query = PostQuery {
            kind: self.kind,
            status: StatusFilter::or_default(self.status, hidden),
            geo: self.geo,
            ..PostQuery::default()
        };

        if self.expiring_soon {
            query.expiring_soon(now)
        } else {
            query
        }
    }
}

pub(crate) async fn fetch_post(store: &dyn Store, id: Id<PostMarker>) -> Result<Post> {
    store
        .fetch_post(id)
        .await?
        .ok_or(ServiceError::PostNotFound(id))
}

fn into_view(post: Post, profiles: &HashMap<Id<UserMarker>, UserSummary>) -> PostView {
    PostView {
        owner_profile: profiles.get(&post.owner).cloned(),
        claimer_profile: post.claimed_by().and_then(|id| profiles.get(&id).cloned()),
        post,
    }
}

pub(crate) async fn views(store: &dyn Store, posts: Vec<Post>) -> Result<Vec<PostView>> {
    let participants = posts
        .iter()
        .flat_map(|post| iter::once(post.owner).chain(post.claimed_by()));
    let profiles = summaries(store, participants).await?;

    Ok(posts
        .into_iter()
        .map(|post| into_view(post, &profiles))
        .collect())
}

async fn view(store: &dyn Store, post: Post) -> Result<PostView> {
    let participants = iter::once(post.owner).chain(post.claimed_by());
    let profiles = summaries(store, participants).await?;

    Ok(into_view(post, &profiles))
}

pub async fn create(
    store: &dyn Store,
    owner: Id<UserMarker>,
    draft: PostDraft,
    now: OffsetDateTime,
) -> Result<PostView> {
    let owner_profile = UserSummary::from(&fetch_user(store, owner).await?);
    let post = Post::new(store.next_id()?.into(), owner, draft, now)?;

    store.insert_post(&post).await?;
    if post.kind == PostKind::Donate {
        store
            .increment_counter(owner, UserCounter::DonationsMade)
            .await?;
    }

    info!(post = %post.id, %owner, kind = post.kind.as_str(), "Created post");

    Ok(PostView {
        post,
        owner_profile: Some(owner_profile),
        claimer_profile: None,
    })
}

pub async fn list(
    store: &dyn Store,
    filter: PostFilter,
    pagination: Pagination,
    now: OffsetDateTime,
) -> Result<Page<PostView>> {
    let query = filter.into_query(LIST_HIDDEN, now);
    let page = store.fetch_posts(&query, Some(pagination)).await?;

    Ok(Page {
        items: views(store, page.items).await?,
        total: page.total,
    })
}

/// Every matching post as a map marker. Without a geo filter only posts
/// that have coordinates are returned.
pub async fn map(store: &dyn Store, filter: PostFilter, now: OffsetDateTime) -> Result<Vec<MapPost>> {
    let query = PostQuery {
        require_coordinates: filter.geo.is_none(),
        ..filter.into_query(MAP_HIDDEN, now)
    };
    let posts = store.fetch_posts(&query, None).await?.items;
    let profiles = summaries(store, posts.iter().map(|post| post.owner)).await?;

    Ok(posts
        .into_iter()
        .map(|post| MapPost {
            id: post.id,
            status: post.status(),
            owner_profile: profiles.get(&post.owner).cloned(),
            title: post.title,
            kind: post.kind,
            location: post.location,
        })
        .collect())
}

pub async fn get(store: &dyn Store, id: Id<PostMarker>) -> Result<PostView> {
    let post = fetch_post(store, id).await?;
    view(store, post).await
}

pub async fn update(
    store: &dyn Store,
    caller: Id<UserMarker>,
    id: Id<PostMarker>,
    update: PostUpdate,
    now: OffsetDateTime,
) -> Result<PostView> {
    let mut post = fetch_post(store, id).await?;
    post.ensure_editable_by(caller)?;

    update.apply(&mut post, now)?;
    if !store.replace_post(&post).await? {
        return Err(ServiceError::ConcurrentModification);
    }

    debug!(post = %id, "Updated post");
    view(store, post).await
}

pub async fn delete(store: &dyn Store, caller: Id<UserMarker>, id: Id<PostMarker>) -> Result<()> {
    let post = fetch_post(store, id).await?;
    post.ensure_editable_by(caller)?;

    if !store.delete_post(&post).await? {
        return Err(ServiceError::ConcurrentModification);
    }

    info!(post = %id, "Deleted post");
    Ok(())
}

pub async fn claim(
    store: &dyn Store,
    caller: Id<UserMarker>,
    id: Id<PostMarker>,
    now: OffsetDateTime,
) -> Result<PostView> {
    let mut post = fetch_post(store, id).await?;
    let change = post.claim(caller, now)?;

    commit(store, &post, change, caller, now).await?;
    view(store, post).await
}

pub async fn change_status(
    store: &dyn Store,
    caller: Id<UserMarker>,
    id: Id<PostMarker>,
    to: PostStatus,
    now: OffsetDateTime,
) -> Result<PostView> {
    let mut post = fetch_post(store, id).await?;
    let change = post.change_status(caller, to, now)?;

    commit(store, &post, change, caller, now).await?;
    view(store, post).await
}

/// Persists a transition and carries out its side effects. Nothing happens if
/// the stored post changed since it was read.
async fn commit(
    store: &dyn Store,
    post: &Post,
    change: StatusChange,
    caller: Id<UserMarker>,
    now: OffsetDateTime,
) -> Result<()> {
    let notification = match change.notice {
        Some(notice) => {
            let sender = fetch_user(store, caller).await?;
            Some(NotificationDraft::about_post(notice, (caller, &sender.name), post))
        }
        None => None,
    };

    if !store.replace_post(post).await? {
        return Err(ServiceError::ConcurrentModification);
    }

    info!(
        post = %post.id,
        %caller,
        from = %change.from,
        to = %change.to,
        "Changed post status"
    );

    if let Some(receiver) = change.credited_receiver {
        store
            .increment_counter(receiver, UserCounter::DonationsReceived)
            .await?;
    }
    if let Some(notification) = notification {
        store.insert_notification(&notification, now).await?;
    }

    Ok(())
}
