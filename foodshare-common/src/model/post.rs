use crate::{
    geo::GeoPoint,
    lifecycle::Lifecycle,
    model::{
        BoundedText, Id, ModelValidationError,
        user::{UserMarker, UserSummary},
    },
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use time::OffsetDateTime;

pub type Title = BoundedText<1, 100>;
pub type Description = BoundedText<1, 500>;
pub type Quantity = BoundedText<1, 100>;
pub type Address = BoundedText<1, 200>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub enum PostKind {
    Donate,
    Request,
}

impl PostKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PostKind::Donate => "Donate",
            PostKind::Request => "Request",
        }
    }
}

impl FromStr for PostKind {
    type Err = ModelValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Donate" => Ok(PostKind::Donate),
            "Request" => Ok(PostKind::Request),
            _ => Err(ModelValidationError::UnknownVariant {
                kind: "post type",
                value: s.to_owned(),
            }),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub enum PostStatus {
    Posted,
    Claimed,
    #[serde(rename = "Picked Up")]
    PickedUp,
    Completed,
    Expired,
    Cancelled,
}

impl PostStatus {
    pub const ALL: [PostStatus; 6] = [
        PostStatus::Posted,
        PostStatus::Claimed,
        PostStatus::PickedUp,
        PostStatus::Completed,
        PostStatus::Expired,
        PostStatus::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Posted => "Posted",
            PostStatus::Claimed => "Claimed",
            PostStatus::PickedUp => "Picked Up",
            PostStatus::Completed => "Completed",
            PostStatus::Expired => "Expired",
            PostStatus::Cancelled => "Cancelled",
        }
    }
}

impl Display for PostStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = ModelValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelValidationError::UnknownVariant {
                kind: "post status",
                value: s.to_owned(),
            })
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Location {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: PostStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub actor: Option<Id<UserMarker>>,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub title: Title,
    pub description: Description,
    pub quantity: Quantity,
    pub location: Location,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry_date: OffsetDateTime,
    pub images: Vec<String>,
    pub owner: Id<UserMarker>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Row version. Every stored write bumps it, and replacing or deleting
    /// only succeeds against the revision that was read.
    #[serde(skip)]
    pub revision: i64,
}

impl Post {
    /// A fresh post in status `Posted` whose timeline starts with the owner.
    pub fn new(
        id: Id<PostMarker>,
        owner: Id<UserMarker>,
        draft: PostDraft,
        now: OffsetDateTime,
    ) -> Result<Self, ModelValidationError> {
        ensure_future(draft.expiry_date, now)?;

        Ok(Self {
            id,
            kind: draft.kind,
            title: draft.title,
            description: draft.description,
            quantity: draft.quantity,
            location: draft.location,
            expiry_date: draft.expiry_date,
            images: draft.images,
            owner,
            lifecycle: Lifecycle::start(owner, now),
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }
}

fn ensure_future(
    expiry_date: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<(), ModelValidationError> {
    if expiry_date > now {
        Ok(())
    } else {
        Err(ModelValidationError::ExpiryNotInFuture)
    }
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub title: Title,
    pub description: Description,
    pub quantity: Quantity,
    pub location: Location,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry_date: OffsetDateTime,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Partial edit of a post's content. The type and owner never change.
#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    pub title: Option<Title>,
    pub description: Option<Description>,
    pub quantity: Option<Quantity>,
    pub location: Option<Location>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expiry_date: Option<OffsetDateTime>,
    pub images: Option<Vec<String>>,
}

impl PostUpdate {
    /// Nothing is applied when the new expiry date is not in the future.
    pub fn apply(self, post: &mut Post, now: OffsetDateTime) -> Result<(), ModelValidationError> {
        if let Some(expiry_date) = self.expiry_date {
            ensure_future(expiry_date, now)?;
            post.expiry_date = expiry_date;
        }
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(description) = self.description {
            post.description = description;
        }
        if let Some(quantity) = self.quantity {
            post.quantity = quantity;
        }
        if let Some(location) = self.location {
            post.location = location;
        }
        if let Some(images) = self.images {
            post.images = images;
        }
        post.updated_at = now;

        Ok(())
    }
}

/// A post with its owner and claimer resolved.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub owner_profile: Option<UserSummary>,
    pub claimer_profile: Option<UserSummary>,
}

/// The reduced projection rendered as map markers.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPost {
    pub id: Id<PostMarker>,
    pub title: Title,
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub location: Location,
    pub status: PostStatus,
    pub owner_profile: Option<UserSummary>,
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::model::{
        BoundedText, Id,
        post::{Location, Post, PostDraft, PostKind, PostStatus, PostUpdate},
        user::UserMarker,
    };
    use time::{Duration, OffsetDateTime, macros::datetime};

    pub(crate) const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);
    pub(crate) const OWNER: u64 = 1;

    pub(crate) fn draft(kind: PostKind, expires_in: Duration) -> PostDraft {
        PostDraft {
            kind,
            title: text("Fresh bread"),
            description: text("Two loaves from this morning"),
            quantity: text("2 loaves"),
            location: Location {
                address: text("Main Street 1"),
                coordinates: None,
            },
            expiry_date: NOW + expires_in,
            images: Vec::new(),
        }
    }

    pub(crate) fn post(kind: PostKind) -> Post {
        Post::new(
            Id::from(100),
            Id::<UserMarker>::from(OWNER),
            draft(kind, Duration::hours(1)),
            NOW,
        )
        .unwrap()
    }

    pub(crate) fn text<const MIN: usize, const MAX: usize>(value: &str) -> BoundedText<MIN, MAX> {
        BoundedText::new(value).unwrap()
    }

    #[test]
    fn status_names_round_trip() {
        for status in PostStatus::ALL {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&PostStatus::PickedUp).unwrap(),
            "\"Picked Up\""
        );
        assert!("Lost".parse::<PostStatus>().is_err());
    }

    #[test]
    fn new_post_starts_posted() {
        let post = post(PostKind::Donate);

        assert_eq!(post.lifecycle.status(), PostStatus::Posted);
        assert_eq!(post.lifecycle.timeline().len(), 1);
        assert_eq!(post.lifecycle.timeline()[0].actor, Some(post.owner));
        assert_eq!(post.lifecycle.claimed_by(), None);
    }

    #[test]
    fn expiry_must_be_in_the_future() {
        let result = Post::new(
            Id::from(1),
            Id::from(OWNER),
            draft(PostKind::Request, Duration::ZERO),
            NOW,
        );
        assert!(result.is_err());
    }

    #[test]
    fn update_is_partial() {
        let mut post = post(PostKind::Donate);
        let update = PostUpdate {
            quantity: Some(text("3 loaves")),
            ..PostUpdate::default()
        };

        update.apply(&mut post, NOW + Duration::minutes(5)).unwrap();

        assert_eq!(post.quantity.get(), "3 loaves");
        assert_eq!(post.title.get(), "Fresh bread");
        assert_eq!(post.updated_at, NOW + Duration::minutes(5));
    }

    #[test]
    fn update_rejects_past_expiry() {
        let mut post = post(PostKind::Donate);
        let update = PostUpdate {
            title: Some(text("Changed")),
            expiry_date: Some(NOW - Duration::hours(1)),
            ..PostUpdate::default()
        };

        assert!(update.apply(&mut post, NOW).is_err());
        assert_eq!(post.title.get(), "Fresh bread");
    }

    #[test]
    fn draft_parses_client_json() {
        let json = r#"{
            "type": "Request",
            "title": "Rice",
            "description": "Need rice for a family dinner",
            "quantity": "1 kg",
            "location": { "address": "Elm Road 5", "coordinates": [13.4, 52.5] },
            "expiryDate": "2026-03-02T12:00:00Z"
        }"#;

        let draft: PostDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.kind, PostKind::Request);
        assert!(draft.location.coordinates.is_some());
        assert!(draft.images.is_empty());
    }
}
