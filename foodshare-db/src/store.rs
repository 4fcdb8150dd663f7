use async_trait::async_trait;
use foodshare_common::{
    model::{
        FoodshareSnowflake, Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication},
        notification::{Notification, NotificationDraft, NotificationMarker},
        post::{Post, PostMarker},
        rating::{Rating, RatingMarker, RatingSummary, Score},
        user::{CreateUser, User, UserCounter, UserMarker},
    },
    query::{Page, Pagination, PostQuery},
    snowflake::SnowflakeTimestampError,
};
use std::fmt::Debug;
use thiserror::Error;
use time::OffsetDateTime;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence port of the marketplace.
///
/// Methods returning `bool` report whether a row was affected. Post writes
/// are conditional on the [`Post::revision`] the caller last read, which
/// makes them compare-and-swap operations.
#[async_trait]
pub trait Store: Send + Sync + Debug {
    fn next_id(&self) -> Result<FoodshareSnowflake>;

    async fn create_user(&self, user: &CreateUser, now: OffsetDateTime) -> Result<User>;

    async fn fetch_user(&self, id: Id<UserMarker>) -> Result<Option<User>>;

    /// Users among `ids` that exist, in no particular order.
    async fn fetch_users(&self, ids: &[Id<UserMarker>]) -> Result<Vec<User>>;

    /// Writes the editable profile fields of `user`.
    async fn update_profile(&self, user: &User) -> Result<bool>;

    async fn increment_counter(&self, id: Id<UserMarker>, counter: UserCounter) -> Result<()>;

    async fn set_rating_summary(&self, id: Id<UserMarker>, summary: RatingSummary) -> Result<()>;

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()>;

    async fn fetch_authentication(&self, hash: &AuthTokenHash) -> Result<Option<Authentication>>;

    async fn insert_post(&self, post: &Post) -> Result<()>;

    async fn fetch_post(&self, id: Id<PostMarker>) -> Result<Option<Post>>;

    /// Replaces the stored post if its revision still equals `post.revision`.
    /// The stored revision becomes `post.revision + 1`.
    async fn replace_post(&self, post: &Post) -> Result<bool>;

    /// Deletes the post if its revision still equals `post.revision`.
    async fn delete_post(&self, post: &Post) -> Result<bool>;

    /// Matching posts in the query's order. Without `pagination` every match
    /// is returned.
    async fn fetch_posts(
        &self,
        query: &PostQuery,
        pagination: Option<Pagination>,
    ) -> Result<Page<Post>>;

    async fn count_posts(&self, query: &PostQuery) -> Result<u64>;

    /// Inserts unless the giver already rated the post.
    async fn insert_rating(&self, rating: &Rating) -> Result<bool>;

    async fn fetch_rating(&self, id: Id<RatingMarker>) -> Result<Option<Rating>>;

    async fn update_rating(&self, rating: &Rating) -> Result<bool>;

    async fn delete_rating(&self, id: Id<RatingMarker>) -> Result<bool>;

    /// Newest first.
    async fn fetch_post_ratings(&self, post: Id<PostMarker>) -> Result<Vec<Rating>>;

    /// Ratings received by `user`, newest first.
    async fn fetch_user_ratings(
        &self,
        user: Id<UserMarker>,
        pagination: Pagination,
    ) -> Result<Page<Rating>>;

    async fn fetch_received_scores(&self, user: Id<UserMarker>) -> Result<Vec<Score>>;

    async fn insert_notification(
        &self,
        draft: &NotificationDraft,
        now: OffsetDateTime,
    ) -> Result<Notification>;

    /// Inserts unless a notification of the same kind about the same post
    /// already went to the recipient. Only meaningful for expiring-soon notices.
    async fn insert_notification_once(
        &self,
        draft: &NotificationDraft,
        now: OffsetDateTime,
    ) -> Result<Option<Notification>>;

    async fn fetch_notification(&self, id: Id<NotificationMarker>)
    -> Result<Option<Notification>>;

    /// Newest first.
    async fn fetch_notifications(
        &self,
        recipient: Id<UserMarker>,
        unread_only: bool,
        pagination: Pagination,
    ) -> Result<Page<Notification>>;

    async fn count_unread(&self, recipient: Id<UserMarker>) -> Result<u64>;

    async fn mark_read(&self, id: Id<NotificationMarker>) -> Result<bool>;

    /// Returns how many notifications changed.
    async fn mark_all_read(&self, recipient: Id<UserMarker>) -> Result<u64>;

    async fn delete_notification(&self, id: Id<NotificationMarker>) -> Result<bool>;
}
