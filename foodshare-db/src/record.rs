use foodshare_common::{
    geo::GeoPoint,
    lifecycle::Lifecycle,
    model::{
        BoundedText, Id, ModelValidationError,
        auth::Authentication,
        notification::Notification,
        post::{Location, Post, TimelineEntry},
        rating::{Rating, Score},
        user::User,
    },
};
use sqlx::{FromRow, types::Json};
use time::{Duration, OffsetDateTime};

#[derive(Clone, PartialEq, Debug, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub name: String,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub average_rating: f64,
    pub total_ratings: i32,
    pub donations_made: i32,
    pub donations_received: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AuthenticationRecord {
    pub user_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_after_seconds: Option<i64>,
}

#[derive(Clone, PartialEq, Debug, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub quantity: String,
    pub address: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub expiry_date: OffsetDateTime,
    pub images: Vec<String>,
    pub owner_snowflake: i64,
    pub status: String,
    pub claimed_by_snowflake: Option<i64>,
    pub claimed_at: Option<OffsetDateTime>,
    pub picked_up_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub status_timeline: Json<Vec<TimelineEntry>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub revision: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct RatingRecord {
    pub rating_snowflake: i64,
    pub post_snowflake: i64,
    pub giver_snowflake: i64,
    pub recipient_snowflake: i64,
    pub score: i16,
    pub comment: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct NotificationRecord {
    pub notification_snowflake: i64,
    pub recipient_snowflake: i64,
    pub sender_snowflake: Option<i64>,
    pub post_snowflake: Option<i64>,
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub redirect_url: String,
    pub created_at: OffsetDateTime,
}

fn optional_text<const MIN: usize, const MAX: usize>(
    value: Option<String>,
) -> Result<Option<BoundedText<MIN, MAX>>, ModelValidationError> {
    Ok(value.map(BoundedText::new).transpose()?)
}

fn counter(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_snowflake),
            name: BoundedText::new(value.name)?,
            bio: optional_text(value.bio)?,
            phone: optional_text(value.phone)?,
            location: optional_text(value.location)?,
            average_rating: value.average_rating,
            total_ratings: counter(value.total_ratings),
            donations_made: counter(value.donations_made),
            donations_received: counter(value.donations_received),
            created_at: value.created_at,
        })
    }
}

impl TryFrom<AuthenticationRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: AuthenticationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: Id::from_db(value.user_snowflake),
            token_hash: value.token_hash.into_boxed_slice().try_into()?,
            created_at: value.created_at,
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        let coordinates = match (value.longitude, value.latitude) {
            (Some(longitude), Some(latitude)) => Some(GeoPoint::new(longitude, latitude)?),
            _ => None,
        };
        let lifecycle = Lifecycle::restore(
            value.status.parse()?,
            value.claimed_by_snowflake.map(Id::from_db),
            value.claimed_at,
            value.picked_up_at,
            value.completed_at,
            value.status_timeline.0,
        )?;

        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            kind: value.kind.parse()?,
            title: BoundedText::new(value.title)?,
            description: BoundedText::new(value.description)?,
            quantity: BoundedText::new(value.quantity)?,
            location: Location {
                address: BoundedText::new(value.address)?,
                coordinates,
            },
            expiry_date: value.expiry_date,
            images: value.images,
            owner: Id::from_db(value.owner_snowflake),
            lifecycle,
            created_at: value.created_at,
            updated_at: value.updated_at,
            revision: value.revision,
        })
    }
}

impl TryFrom<RatingRecord> for Rating {
    type Error = ModelValidationError;

    fn try_from(value: RatingRecord) -> Result<Self, Self::Error> {
        let score = u8::try_from(value.score).unwrap_or_default();

        Ok(Self {
            id: Id::from_db(value.rating_snowflake),
            post: Id::from_db(value.post_snowflake),
            giver: Id::from_db(value.giver_snowflake),
            recipient: Id::from_db(value.recipient_snowflake),
            score: Score::new(score)?,
            comment: BoundedText::new(value.comment)?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = ModelValidationError;

    fn try_from(value: NotificationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.notification_snowflake),
            recipient: Id::from_db(value.recipient_snowflake),
            sender: value.sender_snowflake.map(Id::from_db),
            post: value.post_snowflake.map(Id::from_db),
            kind: value.kind.parse()?,
            message: value.message,
            read: value.read,
            redirect_url: value.redirect_url,
            created_at: value.created_at,
        })
    }
}
