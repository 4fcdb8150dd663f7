use crate::{
    server::{
        Result, ServerError, ServerRouter, auth::AuthenticatedUser, extract::Json,
        response::Envelope,
    },
    service::ratings,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use foodshare_common::model::{
    Id,
    post::PostMarker,
    rating::{Rating, RatingDraft, RatingMarker, RatingUpdate, RatingView},
};
use foodshare_db::store::Store;
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(submit_rating)
        .typed_put(update_rating)
        .typed_delete(delete_rating)
        .typed_get(post_ratings)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/ratings", rejection(ServerError))]
struct RatingsPath();

async fn submit_rating(
    RatingsPath(): RatingsPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(draft): Json<RatingDraft>,
) -> Result<(StatusCode, Envelope<Rating>)> {
    let rating = ratings::submit(
        store.as_ref(),
        user.user_id(),
        draft,
        OffsetDateTime::now_utc(),
    )
    .await?;

    Ok((StatusCode::CREATED, Envelope::data(rating)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/ratings/{id}", rejection(ServerError))]
struct RatingPath {
    id: Id<RatingMarker>,
}

async fn update_rating(
    RatingPath { id }: RatingPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(update): Json<RatingUpdate>,
) -> Result<Envelope<Rating>> {
    let rating = ratings::update(
        store.as_ref(),
        user.user_id(),
        id,
        update,
        OffsetDateTime::now_utc(),
    )
    .await?;

    Ok(Envelope::data(rating))
}

async fn delete_rating(
    RatingPath { id }: RatingPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Envelope<()>> {
    ratings::delete(store.as_ref(), user.user_id(), id).await?;

    Ok(Envelope::message("Rating deleted"))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/ratings", rejection(ServerError))]
struct PostRatingsPath {
    id: Id<PostMarker>,
}

async fn post_ratings(
    PostRatingsPath { id }: PostRatingsPath,
    State(store): State<Arc<dyn Store>>,
) -> Result<Envelope<Vec<RatingView>>> {
    let ratings = ratings::list_for_post(store.as_ref(), id).await?;

    Ok(Envelope::list(ratings))
}
