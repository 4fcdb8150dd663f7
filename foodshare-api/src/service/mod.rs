//! Marketplace operations on top of a [`Store`](foodshare_db::store::Store).
//!
//! Decisions come from the pure rules in `foodshare_common`; this layer loads
//! what they need, persists the outcome and carries out the side effects.
//! Every operation takes the current time so tests can pin it.

use foodshare_common::{
    lifecycle::LifecycleError,
    model::{
        Id, ModelValidationError,
        notification::NotificationMarker,
        post::PostMarker,
        rating::{RatingError, RatingMarker},
        user::{User, UserMarker, UserSummary},
    },
};
use foodshare_db::store::{Store, StoreError};
use std::collections::HashMap;
use thiserror::Error;

pub mod notifications;
pub mod posts;
pub mod ratings;
pub mod sweep;
pub mod users;

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Validation,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelValidationError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error("Post with id {0} was not found")]
    PostNotFound(Id<PostMarker>),
    #[error("User with id {0} was not found")]
    UserNotFound(Id<UserMarker>),
    #[error("Rating with id {0} was not found")]
    RatingNotFound(Id<RatingMarker>),
    #[error("Notification with id {0} was not found")]
    NotificationNotFound(Id<NotificationMarker>),
    #[error("Not authorized to access this notification")]
    NotRecipient,
    #[error("Post was modified concurrently")]
    ConcurrentModification,
}

impl ServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Store(_) => ErrorKind::Internal,
            ServiceError::Model(_) => ErrorKind::Validation,
            ServiceError::Lifecycle(error) => match error {
                LifecycleError::NotParticipant
                | LifecycleError::OwnerOnly(_)
                | LifecycleError::ClaimerOnly(_)
                | LifecycleError::OwnClaim
                | LifecycleError::NotOwner => ErrorKind::Forbidden,
                LifecycleError::NotRequestable(_) => ErrorKind::Validation,
                LifecycleError::InvalidTransition { .. }
                | LifecycleError::NoClaimer
                | LifecycleError::NotClaimable(_)
                | LifecycleError::ClaimExpired
                | LifecycleError::Locked(_) => ErrorKind::Conflict,
            },
            ServiceError::Rating(error) => match error {
                RatingError::NotCompleted(_) | RatingError::AlreadyRated => ErrorKind::Conflict,
                RatingError::NotParticipant | RatingError::SelfRating | RatingError::NotGiver => {
                    ErrorKind::Forbidden
                }
                RatingError::InvalidRecipient => ErrorKind::Validation,
            },
            ServiceError::PostNotFound(_)
            | ServiceError::UserNotFound(_)
            | ServiceError::RatingNotFound(_)
            | ServiceError::NotificationNotFound(_) => ErrorKind::NotFound,
            ServiceError::NotRecipient => ErrorKind::Forbidden,
            ServiceError::ConcurrentModification => ErrorKind::Conflict,
        }
    }
}

async fn fetch_user(store: &dyn Store, id: Id<UserMarker>) -> Result<User> {
    store
        .fetch_user(id)
        .await?
        .ok_or(ServiceError::UserNotFound(id))
}

/// Summaries of the given users keyed by id. Unknown ids are skipped.
async fn summaries(
    store: &dyn Store,
    ids: impl IntoIterator<Item = Id<UserMarker>>,
) -> Result<HashMap<Id<UserMarker>, UserSummary>> {
    let mut ids: Vec<_> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let users = store.fetch_users(&ids).await?;

    Ok(users
        .iter()
        .map(|user| (user.id, UserSummary::from(user)))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use foodshare_common::model::{
        BoundedText,
        post::{Location, PostDraft, PostKind},
        user::{CreateUser, User},
    };
    use foodshare_db::{memory::MemoryStore, store::Store};
    use time::{Duration, OffsetDateTime, macros::datetime};

    pub(crate) const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    pub(crate) fn store() -> MemoryStore {
        MemoryStore::default()
    }

    pub(crate) async fn user(store: &dyn Store, name: &str) -> User {
        let create = CreateUser {
            name: BoundedText::new(name).unwrap(),
        };
        store.create_user(&create, NOW).await.unwrap()
    }

    pub(crate) fn draft(kind: PostKind, expires_in: Duration) -> PostDraft {
        PostDraft {
            kind,
            title: BoundedText::new("Vegetable soup").unwrap(),
            description: BoundedText::new("A pot of homemade soup").unwrap(),
            quantity: BoundedText::new("4 portions").unwrap(),
            location: Location {
                address: BoundedText::new("Harbour Lane 3").unwrap(),
                coordinates: None,
            },
            expiry_date: NOW + expires_in,
            images: Vec::new(),
        }
    }
}
