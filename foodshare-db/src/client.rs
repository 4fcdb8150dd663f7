use crate::{
    record::{AuthenticationRecord, NotificationRecord, PostRecord, RatingRecord, UserRecord},
    store::{Result, Store},
};
use async_trait::async_trait;
use foodshare_common::{
    model::{
        FoodshareSnowflake, FoodshareSnowflakeGenerator, Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication},
        notification::{Notification, NotificationDraft, NotificationMarker},
        post::{Post, PostMarker, PostStatus},
        rating::{Rating, RatingMarker, RatingSummary, Score},
        user::{CreateUser, User, UserCounter, UserMarker},
    },
    query::{Page, Pagination, Participant, PostOrder, PostQuery, StatusFilter},
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{
    PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions, query, query_as, query_scalar,
    types::Json,
};
use std::sync::{Arc, Mutex, PoisonError};
use time::OffsetDateTime;
use tracing::{debug, info};

const USER_COLUMNS: &str = "user_snowflake, name, bio, phone, location, average_rating, \
    total_ratings, donations_made, donations_received, created_at";

const POST_COLUMNS: &str = "post_snowflake, kind, title, description, quantity, address, \
    longitude, latitude, expiry_date, images, owner_snowflake, status, claimed_by_snowflake, \
    claimed_at, picked_up_at, completed_at, status_timeline, created_at, updated_at, revision";

const RATING_COLUMNS: &str = "rating_snowflake, post_snowflake, giver_snowflake, \
    recipient_snowflake, score, comment, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "notification_snowflake, recipient_snowflake, \
    sender_snowflake, post_snowflake, kind, message, read, redirect_url, created_at";

/// Postgres-backed [`Store`].
#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Arc<Mutex<FoodshareSnowflakeGenerator>>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator = Arc::new(Mutex::new(FoodshareSnowflakeGenerator::new(
            worker_id, process_id,
        )));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, worker_id, process_id))
    }

    /// A client on a separate pool that shares this client's id generator.
    pub async fn sibling(&self, database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool,
            snowflake_generator: Arc::clone(&self.snowflake_generator),
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");

        Ok(())
    }

    async fn fetch_page<T, R>(
        &self,
        mut select: QueryBuilder<'_, Postgres>,
        mut count: QueryBuilder<'_, Postgres>,
        pagination: Pagination,
    ) -> Result<Page<T>>
    where
        R: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
        T: TryFrom<R, Error = ModelValidationError>,
    {
        push_pagination(&mut select, pagination);

        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        let items = select
            .build_query_as::<R>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(T::try_from)
            .collect::<Result<_, _>>()?;

        Ok(Page {
            items,
            total: total.cast_unsigned(),
        })
    }
}

fn status_names(statuses: &[PostStatus]) -> Vec<&'static str> {
    statuses.iter().map(|status| status.as_str()).collect()
}

fn push_post_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PostQuery) {
    builder.push(" WHERE TRUE");

    if let Some(kind) = query.kind {
        builder.push(" AND kind = ").push_bind(kind.as_str());
    }
    match query.status {
        StatusFilter::Any => {}
        StatusFilter::Only(status) => {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        StatusFilter::OneOf(statuses) => {
            builder
                .push(" AND status = ANY(")
                .push_bind(status_names(statuses))
                .push(")");
        }
        StatusFilter::NoneOf(statuses) => {
            builder
                .push(" AND status <> ALL(")
                .push_bind(status_names(statuses))
                .push(")");
        }
    }
    if let Some(after) = query.expires_after {
        builder.push(" AND expiry_date > ").push_bind(after);
    }
    if let Some(before) = query.expires_before {
        builder.push(" AND expiry_date < ").push_bind(before);
    }
    if let Some(geo) = query.geo {
        // Haversine, matching GeoPoint::angular_distance.
        let center = geo.center;
        builder
            .push(" AND latitude IS NOT NULL AND 2 * asin(least(1, sqrt(power(sin(radians(latitude - ")
            .push_bind(center.latitude())
            .push(") / 2), 2) + cos(radians(")
            .push_bind(center.latitude())
            .push(")) * cos(radians(latitude)) * power(sin(radians(longitude - ")
            .push_bind(center.longitude())
            .push(") / 2), 2)))) <= ")
            .push_bind(geo.radius_radians());
    }
    if query.require_coordinates {
        builder.push(" AND latitude IS NOT NULL");
    }
    match query.participant {
        None => {}
        Some(Participant::Owner(user)) => {
            builder.push(" AND owner_snowflake = ").push_bind(user.to_db());
        }
        Some(Participant::Claimer(user)) => {
            builder
                .push(" AND claimed_by_snowflake = ")
                .push_bind(user.to_db());
        }
        Some(Participant::Either(user)) => {
            builder
                .push(" AND (owner_snowflake = ")
                .push_bind(user.to_db())
                .push(" OR claimed_by_snowflake = ")
                .push_bind(user.to_db())
                .push(")");
        }
    }
}

fn push_pagination(builder: &mut QueryBuilder<'_, Postgres>, pagination: Pagination) {
    builder
        .push(" LIMIT ")
        .push_bind(i64::from(pagination.limit()))
        .push(" OFFSET ")
        .push_bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX));
}

fn post_select(query: &PostQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts.posts"));
    push_post_filters(&mut builder, query);
    builder.push(match query.order {
        PostOrder::Newest => " ORDER BY created_at DESC, post_snowflake DESC",
        PostOrder::RecentlyClaimed => {
            " ORDER BY claimed_at DESC NULLS LAST, post_snowflake DESC"
        }
    });
    builder
}

fn post_count(query: &PostQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM posts.posts");
    push_post_filters(&mut builder, query);
    builder
}

fn optional_text<T: ToString>(value: Option<&T>) -> Option<String> {
    value.map(ToString::to_string)
}

fn db_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl Store for DbClient {
    fn next_id(&self) -> Result<FoodshareSnowflake> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake)
    }

    async fn create_user(&self, user: &CreateUser, now: OffsetDateTime) -> Result<User> {
        let user_id: Id<UserMarker> = self.next_id()?.into();

        let record: UserRecord = query_as(&format!(
            "
            INSERT INTO users.users (user_snowflake, name, created_at)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(user_id.to_db())
        .bind(user.name.get())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        debug!(%user_id, "Created user");
        Ok(record.try_into()?)
    }

    async fn fetch_user(&self, id: Id<UserMarker>) -> Result<Option<User>> {
        let record: Option<UserRecord> = query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users.users WHERE user_snowflake = $1"
        ))
        .bind(id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    async fn fetch_users(&self, ids: &[Id<UserMarker>]) -> Result<Vec<User>> {
        let snowflakes: Vec<i64> = ids.iter().map(|id| id.to_db()).collect();

        let records: Vec<UserRecord> = query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users.users WHERE user_snowflake = ANY($1)"
        ))
        .bind(snowflakes)
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(User::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn update_profile(&self, user: &User) -> Result<bool> {
        let result = query(
            "
            UPDATE users.users
            SET name = $2, bio = $3, phone = $4, location = $5
            WHERE user_snowflake = $1
            ",
        )
        .bind(user.id.to_db())
        .bind(user.name.get())
        .bind(optional_text(user.bio.as_ref()))
        .bind(optional_text(user.phone.as_ref()))
        .bind(optional_text(user.location.as_ref()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_counter(&self, id: Id<UserMarker>, counter: UserCounter) -> Result<()> {
        let sql = match counter {
            UserCounter::DonationsMade => {
                "UPDATE users.users SET donations_made = donations_made + 1 WHERE user_snowflake = $1"
            }
            UserCounter::DonationsReceived => {
                "UPDATE users.users SET donations_received = donations_received + 1 WHERE user_snowflake = $1"
            }
        };

        query(sql).bind(id.to_db()).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_rating_summary(&self, id: Id<UserMarker>, summary: RatingSummary) -> Result<()> {
        query(
            "
            UPDATE users.users
            SET average_rating = $2, total_ratings = $3
            WHERE user_snowflake = $1
            ",
        )
        .bind(id.to_db())
        .bind(summary.average)
        .bind(db_count(summary.count))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO users.authentications
                (token_hash, user_snowflake, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&authentication.token_hash.0[..])
        .bind(authentication.user.to_db())
        .bind(authentication.created_at)
        .bind(
            authentication
                .expires_after
                .map(|duration| duration.whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_authentication(&self, hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record: Option<AuthenticationRecord> = query_as(
            "
            SELECT user_snowflake, token_hash, created_at, expires_after_seconds
            FROM users.authentications
            WHERE token_hash = $1
            ",
        )
        .bind(&hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Authentication::try_from).transpose()?)
    }

    async fn insert_post(&self, post: &Post) -> Result<()> {
        let coordinates = post.location.coordinates;
        let lifecycle = &post.lifecycle;

        query(&format!(
            "
            INSERT INTO posts.posts ({POST_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "
        ))
        .bind(post.id.to_db())
        .bind(post.kind.as_str())
        .bind(post.title.get())
        .bind(post.description.get())
        .bind(post.quantity.get())
        .bind(post.location.address.get())
        .bind(coordinates.map(|point| point.longitude()))
        .bind(coordinates.map(|point| point.latitude()))
        .bind(post.expiry_date)
        .bind(&post.images)
        .bind(post.owner.to_db())
        .bind(lifecycle.status().as_str())
        .bind(lifecycle.claimed_by().map(Id::to_db))
        .bind(lifecycle.claimed_at())
        .bind(lifecycle.picked_up_at())
        .bind(lifecycle.completed_at())
        .bind(Json(lifecycle.timeline()))
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(post.revision)
        .execute(&self.pool)
        .await?;

        debug!(post_id = %post.id, "Inserted post");
        Ok(())
    }

    async fn fetch_post(&self, id: Id<PostMarker>) -> Result<Option<Post>> {
        let record: Option<PostRecord> = query_as(&format!(
            "SELECT {POST_COLUMNS} FROM posts.posts WHERE post_snowflake = $1"
        ))
        .bind(id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Post::try_from).transpose()?)
    }

    async fn replace_post(&self, post: &Post) -> Result<bool> {
        let coordinates = post.location.coordinates;
        let lifecycle = &post.lifecycle;

        let result = query(
            "
            UPDATE posts.posts
            SET title = $3, description = $4, quantity = $5, address = $6,
                longitude = $7, latitude = $8, expiry_date = $9, images = $10,
                status = $11, claimed_by_snowflake = $12, claimed_at = $13,
                picked_up_at = $14, completed_at = $15, status_timeline = $16,
                updated_at = $17, revision = revision + 1
            WHERE post_snowflake = $1 AND revision = $2
            ",
        )
        .bind(post.id.to_db())
        .bind(post.revision)
        .bind(post.title.get())
        .bind(post.description.get())
        .bind(post.quantity.get())
        .bind(post.location.address.get())
        .bind(coordinates.map(|point| point.longitude()))
        .bind(coordinates.map(|point| point.latitude()))
        .bind(post.expiry_date)
        .bind(&post.images)
        .bind(lifecycle.status().as_str())
        .bind(lifecycle.claimed_by().map(Id::to_db))
        .bind(lifecycle.claimed_at())
        .bind(lifecycle.picked_up_at())
        .bind(lifecycle.completed_at())
        .bind(Json(lifecycle.timeline()))
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_post(&self, post: &Post) -> Result<bool> {
        let result = query("DELETE FROM posts.posts WHERE post_snowflake = $1 AND revision = $2")
            .bind(post.id.to_db())
            .bind(post.revision)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch_posts(
        &self,
        query: &PostQuery,
        pagination: Option<Pagination>,
    ) -> Result<Page<Post>> {
        if let Some(pagination) = pagination {
            return self
                .fetch_page::<Post, PostRecord>(post_select(query), post_count(query), pagination)
                .await;
        }

        let items: Vec<Post> = post_select(query)
            .build_query_as::<PostRecord>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;

        Ok(Page {
            total: items.len() as u64,
            items,
        })
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<u64> {
        let count = post_count(query)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    async fn insert_rating(&self, rating: &Rating) -> Result<bool> {
        let result = query(&format!(
            "
            INSERT INTO posts.ratings ({RATING_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (post_snowflake, giver_snowflake) DO NOTHING
            "
        ))
        .bind(rating.id.to_db())
        .bind(rating.post.to_db())
        .bind(rating.giver.to_db())
        .bind(rating.recipient.to_db())
        .bind(i16::from(rating.score.get()))
        .bind(rating.comment.get())
        .bind(rating.created_at)
        .bind(rating.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch_rating(&self, id: Id<RatingMarker>) -> Result<Option<Rating>> {
        let record: Option<RatingRecord> = query_as(&format!(
            "SELECT {RATING_COLUMNS} FROM posts.ratings WHERE rating_snowflake = $1"
        ))
        .bind(id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Rating::try_from).transpose()?)
    }

    async fn update_rating(&self, rating: &Rating) -> Result<bool> {
        let result = query(
            "
            UPDATE posts.ratings
            SET score = $2, comment = $3, updated_at = $4
            WHERE rating_snowflake = $1
            ",
        )
        .bind(rating.id.to_db())
        .bind(i16::from(rating.score.get()))
        .bind(rating.comment.get())
        .bind(rating.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_rating(&self, id: Id<RatingMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts.ratings WHERE rating_snowflake = $1")
            .bind(id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch_post_ratings(&self, post: Id<PostMarker>) -> Result<Vec<Rating>> {
        let records: Vec<RatingRecord> = query_as(&format!(
            "
            SELECT {RATING_COLUMNS} FROM posts.ratings
            WHERE post_snowflake = $1
            ORDER BY created_at DESC, rating_snowflake DESC
            "
        ))
        .bind(post.to_db())
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(Rating::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn fetch_user_ratings(
        &self,
        user: Id<UserMarker>,
        pagination: Pagination,
    ) -> Result<Page<Rating>> {
        let mut select = QueryBuilder::new(format!(
            "SELECT {RATING_COLUMNS} FROM posts.ratings WHERE recipient_snowflake = "
        ));
        select
            .push_bind(user.to_db())
            .push(" ORDER BY created_at DESC, rating_snowflake DESC");

        let mut count =
            QueryBuilder::new("SELECT COUNT(*) FROM posts.ratings WHERE recipient_snowflake = ");
        count.push_bind(user.to_db());

        self.fetch_page::<Rating, RatingRecord>(select, count, pagination)
            .await
    }

    async fn fetch_received_scores(&self, user: Id<UserMarker>) -> Result<Vec<Score>> {
        let scores: Vec<i16> =
            query_scalar("SELECT score FROM posts.ratings WHERE recipient_snowflake = $1")
                .bind(user.to_db())
                .fetch_all(&self.pool)
                .await?;

        Ok(scores
            .into_iter()
            .map(|score| Score::new(u8::try_from(score).unwrap_or_default()))
            .collect::<Result<_, _>>()
            .map_err(ModelValidationError::from)?)
    }

    async fn insert_notification(
        &self,
        draft: &NotificationDraft,
        now: OffsetDateTime,
    ) -> Result<Notification> {
        let id: Id<NotificationMarker> = self.next_id()?.into();

        let record: NotificationRecord = query_as(&format!(
            "
            INSERT INTO notifications.notifications ({NOTIFICATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $8)
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(id.to_db())
        .bind(draft.recipient.to_db())
        .bind(draft.sender.map(Id::to_db))
        .bind(draft.post.map(Id::to_db))
        .bind(draft.kind.as_str())
        .bind(&draft.message)
        .bind(&draft.redirect_url)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.try_into()?)
    }

    async fn insert_notification_once(
        &self,
        draft: &NotificationDraft,
        now: OffsetDateTime,
    ) -> Result<Option<Notification>> {
        let id: Id<NotificationMarker> = self.next_id()?.into();

        let record: Option<NotificationRecord> = query_as(&format!(
            "
            INSERT INTO notifications.notifications ({NOTIFICATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $8)
            ON CONFLICT (recipient_snowflake, post_snowflake)
                WHERE kind = 'post_expiring_soon' DO NOTHING
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(id.to_db())
        .bind(draft.recipient.to_db())
        .bind(draft.sender.map(Id::to_db))
        .bind(draft.post.map(Id::to_db))
        .bind(draft.kind.as_str())
        .bind(&draft.message)
        .bind(&draft.redirect_url)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Notification::try_from).transpose()?)
    }

    async fn fetch_notification(
        &self,
        id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>> {
        let record: Option<NotificationRecord> = query_as(&format!(
            "
            SELECT {NOTIFICATION_COLUMNS} FROM notifications.notifications
            WHERE notification_snowflake = $1
            "
        ))
        .bind(id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Notification::try_from).transpose()?)
    }

    async fn fetch_notifications(
        &self,
        recipient: Id<UserMarker>,
        unread_only: bool,
        pagination: Pagination,
    ) -> Result<Page<Notification>> {
        let mut select = QueryBuilder::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications.notifications WHERE recipient_snowflake = "
        ));
        select.push_bind(recipient.to_db());
        if unread_only {
            select.push(" AND NOT read");
        }
        select.push(" ORDER BY created_at DESC, notification_snowflake DESC");

        let mut count = QueryBuilder::new(
            "SELECT COUNT(*) FROM notifications.notifications WHERE recipient_snowflake = ",
        );
        count.push_bind(recipient.to_db());
        if unread_only {
            count.push(" AND NOT read");
        }

        self.fetch_page::<Notification, NotificationRecord>(select, count, pagination)
            .await
    }

    async fn count_unread(&self, recipient: Id<UserMarker>) -> Result<u64> {
        let count: i64 = query_scalar(
            "
            SELECT COUNT(*) FROM notifications.notifications
            WHERE recipient_snowflake = $1 AND NOT read
            ",
        )
        .bind(recipient.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.cast_unsigned())
    }

    async fn mark_read(&self, id: Id<NotificationMarker>) -> Result<bool> {
        let result = query(
            "UPDATE notifications.notifications SET read = TRUE WHERE notification_snowflake = $1",
        )
        .bind(id.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_all_read(&self, recipient: Id<UserMarker>) -> Result<u64> {
        let result = query(
            "
            UPDATE notifications.notifications SET read = TRUE
            WHERE recipient_snowflake = $1 AND NOT read
            ",
        )
        .bind(recipient.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, id: Id<NotificationMarker>) -> Result<bool> {
        let result =
            query("DELETE FROM notifications.notifications WHERE notification_snowflake = $1")
                .bind(id.to_db())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}
