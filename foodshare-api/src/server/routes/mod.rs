use crate::server::ServerRouter;
use axum::Router;
use foodshare_common::query::Pagination;
use serde::Deserialize;

mod notifications;
mod posts;
mod ratings;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(posts::routes())
        .merge(ratings::routes())
        .merge(users::routes())
        .merge(notifications::routes())
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

impl From<PageQuery> for Pagination {
    fn from(value: PageQuery) -> Self {
        Pagination::new(value.page, value.limit)
    }
}
