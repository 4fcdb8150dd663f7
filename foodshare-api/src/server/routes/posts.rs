use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, Query},
        response::Envelope,
    },
    service::{
        ServiceError,
        posts::{self, PostFilter},
    },
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use foodshare_common::{
    geo::{GeoFilter, GeoPoint},
    model::{
        Id, ModelValidationError,
        post::{MapPost, PostDraft, PostKind, PostMarker, PostStatus, PostUpdate, PostView},
    },
    query::Pagination,
};
use foodshare_db::store::Store;
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_get(map_posts)
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_delete(delete_post)
        .typed_put(claim_post)
        .typed_put(update_status)
}

#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostListQuery {
    #[serde(rename = "type")]
    kind: Option<PostKind>,
    status: Option<PostStatus>,
    #[serde(default)]
    expiring_soon: bool,
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<u32>,
    page: Option<u32>,
    limit: Option<u32>,
}

impl PostListQuery {
    /// The geo filter applies only when the center and the radius are all
    /// given.
    fn filter(self) -> Result<PostFilter> {
        let geo = match (self.lng, self.lat, self.radius) {
            (Some(lng), Some(lat), Some(radius)) => {
                let center = GeoPoint::new(lng, lat)
                    .map_err(|error| ServiceError::Model(ModelValidationError::from(error)))?;
                Some(GeoFilter::new(center, radius))
            }
            _ => None,
        };

        Ok(PostFilter {
            kind: self.kind,
            status: self.status,
            expiring_soon: self.expiring_soon,
            geo,
        })
    }

    fn pagination(self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct PostsPath();

async fn list_posts(
    PostsPath(): PostsPath,
    State(store): State<Arc<dyn Store>>,
    Query(query): Query<PostListQuery>,
) -> Result<Envelope<Vec<PostView>>> {
    let pagination = query.pagination();
    let page = posts::list(
        store.as_ref(),
        query.filter()?,
        pagination,
        OffsetDateTime::now_utc(),
    )
    .await?;

    Ok(Envelope::page(page, pagination))
}

async fn create_post(
    PostsPath(): PostsPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(draft): Json<PostDraft>,
) -> Result<(StatusCode, Envelope<PostView>)> {
    let post = posts::create(
        store.as_ref(),
        user.user_id(),
        draft,
        OffsetDateTime::now_utc(),
    )
    .await?;

    Ok((StatusCode::CREATED, Envelope::data(post)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/map", rejection(ServerError))]
struct PostsMapPath();

async fn map_posts(
    PostsMapPath(): PostsMapPath,
    State(store): State<Arc<dyn Store>>,
    Query(query): Query<PostListQuery>,
) -> Result<Envelope<Vec<MapPost>>> {
    let markers = posts::map(store.as_ref(), query.filter()?, OffsetDateTime::now_utc()).await?;

    Ok(Envelope::list(markers))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
) -> Result<Envelope<PostView>> {
    let post = posts::get(store.as_ref(), id).await?;

    Ok(Envelope::data(post))
}

async fn update_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(update): Json<PostUpdate>,
) -> Result<Envelope<PostView>> {
    let post = posts::update(
        store.as_ref(),
        user.user_id(),
        id,
        update,
        OffsetDateTime::now_utc(),
    )
    .await?;

    Ok(Envelope::data(post))
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Envelope<()>> {
    posts::delete(store.as_ref(), user.user_id(), id).await?;

    Ok(Envelope::message("Post deleted"))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/claim", rejection(ServerError))]
struct ClaimPath {
    id: Id<PostMarker>,
}

async fn claim_post(
    ClaimPath { id }: ClaimPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Envelope<PostView>> {
    let post = posts::claim(store.as_ref(), user.user_id(), id, OffsetDateTime::now_utc()).await?;

    Ok(Envelope::data(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/status", rejection(ServerError))]
struct StatusPath {
    id: Id<PostMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct StatusBody {
    status: PostStatus,
}

async fn update_status(
    StatusPath { id }: StatusPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(StatusBody { status }): Json<StatusBody>,
) -> Result<Envelope<PostView>> {
    let post = posts::change_status(
        store.as_ref(),
        user.user_id(),
        id,
        status,
        OffsetDateTime::now_utc(),
    )
    .await?;

    Ok(Envelope::data(post))
}
