use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, Query},
        response::Envelope,
        routes::PageQuery,
    },
    service::{
        ratings,
        users::{self, HistoryKind},
    },
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use foodshare_common::{
    model::{
        Id,
        post::PostView,
        rating::RatingView,
        user::{ProfileUpdate, User, UserMarker, UserStats},
    },
    query::Pagination,
};
use foodshare_db::store::Store;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_put(update_profile)
        .typed_get(get_stats)
        .typed_get(get_history)
        .typed_get(get_user)
        .typed_get(get_user_ratings)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/profile", rejection(ServerError))]
struct ProfilePath();

async fn update_profile(
    ProfilePath(): ProfilePath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Envelope<User>> {
    let user = users::update_profile(store.as_ref(), user.user_id(), update).await?;

    Ok(Envelope::data(user))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/stats", rejection(ServerError))]
struct StatsPath();

async fn get_stats(
    StatsPath(): StatsPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Envelope<UserStats<PostView>>> {
    let stats = users::stats(store.as_ref(), user.user_id()).await?;

    Ok(Envelope::data(stats))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/history", rejection(ServerError))]
struct HistoryPath();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct HistoryQuery {
    #[serde(rename = "type", default)]
    kind: HistoryKind,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn get_history(
    HistoryPath(): HistoryPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Envelope<Vec<PostView>>> {
    let pagination = Pagination::new(query.page, query.limit);
    let history = users::history(store.as_ref(), user.user_id(), query.kind, pagination).await?;

    Ok(Envelope::page(history, pagination))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}", rejection(ServerError))]
struct UserPath {
    id: Id<UserMarker>,
}

async fn get_user(
    UserPath { id }: UserPath,
    State(store): State<Arc<dyn Store>>,
) -> Result<Envelope<User>> {
    let user = users::get_profile(store.as_ref(), id).await?;

    Ok(Envelope::data(user))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/ratings", rejection(ServerError))]
struct UserRatingsPath {
    id: Id<UserMarker>,
}

async fn get_user_ratings(
    UserRatingsPath { id }: UserRatingsPath,
    State(store): State<Arc<dyn Store>>,
    Query(query): Query<PageQuery>,
) -> Result<Envelope<Vec<RatingView>>> {
    let pagination = Pagination::from(query);
    let received = ratings::list_for_user(store.as_ref(), id, pagination).await?;

    Ok(Envelope::page(received, pagination))
}
