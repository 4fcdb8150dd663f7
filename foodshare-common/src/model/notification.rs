use crate::{
    lifecycle::{Notice, NoticeKind},
    model::{
        Id, ModelValidationError,
        post::{Post, PostMarker},
        rating::Rating,
        user::{UserMarker, UserName},
    },
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct NotificationMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ClaimRequest,
    ClaimApproved,
    ClaimRejected,
    PostExpiringSoon,
    PostExpired,
    PickupConfirmed,
    PostCompleted,
    NewRating,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 8] = [
        NotificationKind::ClaimRequest,
        NotificationKind::ClaimApproved,
        NotificationKind::ClaimRejected,
        NotificationKind::PostExpiringSoon,
        NotificationKind::PostExpired,
        NotificationKind::PickupConfirmed,
        NotificationKind::PostCompleted,
        NotificationKind::NewRating,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::ClaimRequest => "claim_request",
            NotificationKind::ClaimApproved => "claim_approved",
            NotificationKind::ClaimRejected => "claim_rejected",
            NotificationKind::PostExpiringSoon => "post_expiring_soon",
            NotificationKind::PostExpired => "post_expired",
            NotificationKind::PickupConfirmed => "pickup_confirmed",
            NotificationKind::PostCompleted => "post_completed",
            NotificationKind::NewRating => "new_rating",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = ModelValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ModelValidationError::UnknownVariant {
                kind: "notification type",
                value: s.to_owned(),
            })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Id<NotificationMarker>,
    pub recipient: Id<UserMarker>,
    pub sender: Option<Id<UserMarker>>,
    pub post: Option<Id<PostMarker>>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub read: bool,
    pub redirect_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An unsent notification. The store assigns id and creation time.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NotificationDraft {
    pub recipient: Id<UserMarker>,
    pub sender: Option<Id<UserMarker>>,
    pub post: Option<Id<PostMarker>>,
    pub kind: NotificationKind,
    pub message: String,
    pub redirect_url: String,
}

fn post_url(post: Id<PostMarker>) -> String {
    format!("/posts/{post}")
}

impl NotificationDraft {
    /// Renders a lifecycle notice about `post`, sent by `sender`.
    #[must_use]
    pub fn about_post(notice: Notice, sender: (Id<UserMarker>, &UserName), post: &Post) -> Self {
        let (sender_id, sender_name) = sender;
        let title = &post.title;
        let message = match notice.kind {
            NoticeKind::ClaimRequest => format!("{sender_name} has claimed your post \"{title}\""),
            NoticeKind::ClaimApproved => format!("Your claim on \"{title}\" has been approved"),
            NoticeKind::ClaimRejected => {
                format!("{sender_name} has cancelled their claim on \"{title}\"")
            }
            NoticeKind::PickupConfirmed => format!("{sender_name} has picked up \"{title}\""),
            NoticeKind::PostCompleted => {
                format!("Your transaction for \"{title}\" has been marked complete")
            }
        };

        Self {
            recipient: notice.recipient,
            sender: Some(sender_id),
            post: Some(post.id),
            kind: notice.kind.into(),
            message,
            redirect_url: post_url(post.id),
        }
    }

    /// The sweep's reminder to the owner; it has no sender.
    #[must_use]
    pub fn expiring_soon(post: &Post) -> Self {
        Self {
            recipient: post.owner,
            sender: None,
            post: Some(post.id),
            kind: NotificationKind::PostExpiringSoon,
            message: format!(
                "Your post \"{}\" is expiring in less than 24 hours",
                post.title
            ),
            redirect_url: post_url(post.id),
        }
    }

    #[must_use]
    pub fn new_rating(rating: &Rating, giver_name: &UserName) -> Self {
        Self {
            recipient: rating.recipient,
            sender: Some(rating.giver),
            post: Some(rating.post),
            kind: NotificationKind::NewRating,
            message: format!("{giver_name} has rated you {} stars", rating.score.get()),
            redirect_url: "/profile/ratings".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        lifecycle::{Notice, NoticeKind},
        model::{
            Id,
            notification::{NotificationDraft, NotificationKind},
            post::{
                PostKind,
                tests::{OWNER, post, text},
            },
            user::UserName,
        },
    };

    #[test]
    fn kinds_use_snake_case() {
        for kind in NotificationKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn claim_request_message() {
        let post = post(PostKind::Donate);
        let name: UserName = text("Bea");
        let notice = Notice {
            kind: NoticeKind::ClaimRequest,
            recipient: Id::from(OWNER),
        };

        let draft = NotificationDraft::about_post(notice, (Id::from(2), &name), &post);

        assert_eq!(draft.message, "Bea has claimed your post \"Fresh bread\"");
        assert_eq!(draft.kind, NotificationKind::ClaimRequest);
        assert_eq!(draft.redirect_url, "/posts/100");
        assert_eq!(draft.recipient, Id::from(OWNER));
        assert_eq!(draft.sender, Some(Id::from(2)));
    }

    #[test]
    fn expiring_soon_goes_to_owner() {
        let post = post(PostKind::Request);
        let draft = NotificationDraft::expiring_soon(&post);

        assert_eq!(draft.recipient, post.owner);
        assert_eq!(draft.sender, None);
        assert_eq!(draft.kind, NotificationKind::PostExpiringSoon);
    }
}
