use crate::{server::ServerError, service::ServiceError};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use foodshare_common::model::{Id, auth::AuthToken, user::UserMarker};
use foodshare_db::store::Store;
use headers::{Authorization, Cookie, authorization::Bearer};
use std::sync::Arc;
use time::OffsetDateTime;

/// Cookie consulted when no `Authorization` header is sent.
pub const TOKEN_COOKIE: &str = "token";

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;
type CookieHeader = TypedHeader<Cookie>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }
}

async fn request_token<S>(parts: &mut Parts, state: &S) -> Result<String, ServerError>
where
    S: Send + Sync,
{
    let header = Option::<AuthorizationHeader>::from_request_parts(parts, state)
        .await
        .map_err(ServerError::InvalidAuthorizationHeader)?;
    if let Some(header) = header {
        return Ok(header.token().to_owned());
    }

    let cookies = Option::<CookieHeader>::from_request_parts(parts, state)
        .await
        .map_err(ServerError::InvalidAuthorizationHeader)?;

    cookies
        .and_then(|cookies| cookies.get(TOKEN_COOKIE).map(str::to_owned))
        .ok_or(ServerError::MissingToken)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Store>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_token: AuthToken = request_token(parts, state).await?.parse()?;
        let token_hash = request_token.hash()?;

        let authentication = Arc::<dyn Store>::from_ref(state)
            .fetch_authentication(&token_hash)
            .await
            .map_err(ServiceError::from)?
            .ok_or(ServerError::InvalidToken)?;

        if authentication.token_hash != token_hash
            || authentication.user != request_token.user_id
            || authentication.is_expired(OffsetDateTime::now_utc())
        {
            return Err(ServerError::InvalidToken);
        }

        Ok(Self {
            id: authentication.user,
        })
    }
}
