use crate::{
    model::{
        BoundedText, Id,
        post::{Post, PostMarker, PostStatus},
        user::{UserMarker, UserSummary},
    },
    util::round_to_tenth,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

pub type Comment = BoundedText<0, 200>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct RatingMarker;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("Rating score must be between {MIN_SCORE} and {MAX_SCORE}, got {0}")]
pub struct InvalidScoreError(u8);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub fn new(score: u8) -> Result<Self, InvalidScoreError> {
        if (MIN_SCORE..=MAX_SCORE).contains(&score) {
            Ok(Self(score))
        } else {
            Err(InvalidScoreError(score))
        }
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = InvalidScoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for u8 {
    fn from(value: Score) -> Self {
        value.0
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: Id<RatingMarker>,
    pub post: Id<PostMarker>,
    pub giver: Id<UserMarker>,
    pub recipient: Id<UserMarker>,
    pub score: Score,
    pub comment: Comment,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingDraft {
    pub post_id: Id<PostMarker>,
    pub recipient_id: Id<UserMarker>,
    pub score: Score,
    #[serde(default = "Comment::empty")]
    pub comment: Comment,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct RatingUpdate {
    pub score: Option<Score>,
    pub comment: Option<Comment>,
}

impl RatingUpdate {
    pub fn apply(self, rating: &mut Rating, now: OffsetDateTime) {
        if let Some(score) = self.score {
            rating.score = score;
        }
        if let Some(comment) = self.comment {
            rating.comment = comment;
        }
        rating.updated_at = now;
    }
}

/// A rating with the giver resolved, as listed on posts and profiles.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingView {
    #[serde(flatten)]
    pub rating: Rating,
    pub giver_profile: Option<UserSummary>,
}

/// Derived rating figures of one user.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u32,
}

impl RatingSummary {
    /// Mean of all received scores rounded to one decimal, zero without any.
    #[must_use]
    pub fn from_scores(scores: impl IntoIterator<Item = Score>) -> Self {
        let (sum, count) = scores
            .into_iter()
            .fold((0_u32, 0_u32), |(sum, count), score| {
                (sum + u32::from(score.get()), count + 1)
            });

        if count == 0 {
            return Self::default();
        }

        Self {
            average: round_to_tenth(f64::from(sum) / f64::from(count)),
            count,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum RatingError {
    #[error("Can only rate completed posts")]
    NotCompleted(PostStatus),
    #[error("Not authorized to rate this post")]
    NotParticipant,
    #[error("You cannot rate yourself")]
    SelfRating,
    #[error("Invalid recipient")]
    InvalidRecipient,
    #[error("You have already rated this post")]
    AlreadyRated,
    #[error("Not authorized to modify this rating")]
    NotGiver,
}

/// Checks whether `giver` may rate `recipient` for `post`. Uniqueness per
/// (post, giver) is left to the store.
pub fn check_submission(
    post: &Post,
    giver: Id<UserMarker>,
    recipient: Id<UserMarker>,
) -> Result<(), RatingError> {
    let status = post.status();
    if status != PostStatus::Completed {
        return Err(RatingError::NotCompleted(status));
    }

    let is_participant = |user| user == post.owner || post.claimed_by() == Some(user);
    if !is_participant(giver) {
        return Err(RatingError::NotParticipant);
    }
    if recipient == giver {
        return Err(RatingError::SelfRating);
    }
    if !is_participant(recipient) {
        return Err(RatingError::InvalidRecipient);
    }

    Ok(())
}

impl Rating {
    pub fn ensure_giver(&self, caller: Id<UserMarker>) -> Result<(), RatingError> {
        if self.giver == caller {
            Ok(())
        } else {
            Err(RatingError::NotGiver)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        post::{
            Post, PostKind, PostStatus,
            tests::{NOW, OWNER, post},
        },
        rating::{RatingError, RatingSummary, Score, check_submission},
    };

    const CLAIMER: u64 = 2;

    fn completed_post() -> Post {
        let mut post = post(PostKind::Donate);
        post.claim(Id::from(CLAIMER), NOW).unwrap();
        post.change_status(Id::from(CLAIMER), PostStatus::PickedUp, NOW)
            .unwrap();
        post.change_status(Id::from(OWNER), PostStatus::Completed, NOW)
            .unwrap();
        post
    }

    fn scores(values: &[u8]) -> Vec<Score> {
        values.iter().map(|&value| Score::new(value).unwrap()).collect()
    }

    #[test]
    fn score_range() {
        assert!(Score::new(0).is_err());
        assert!(Score::new(6).is_err());
        assert_eq!(Score::new(5).unwrap().get(), 5);
        assert!(serde_json::from_str::<Score>("7").is_err());
        assert_eq!(serde_json::from_str::<Score>("3").unwrap().get(), 3);
    }

    #[test]
    fn summary_average_is_rounded() {
        let summary = RatingSummary::from_scores(scores(&[5, 4, 4]));
        assert!((summary.average - 4.3).abs() < f64::EPSILON);
        assert_eq!(summary.count, 3);

        let single = RatingSummary::from_scores(scores(&[5]));
        assert!((single.average - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_summary_is_zero() {
        assert_eq!(RatingSummary::from_scores(Vec::new()), RatingSummary::default());
    }

    #[test]
    fn only_completed_posts_can_be_rated() {
        let post = post(PostKind::Donate);

        assert_eq!(
            check_submission(&post, Id::from(OWNER), Id::from(CLAIMER)),
            Err(RatingError::NotCompleted(PostStatus::Posted))
        );
    }

    #[test]
    fn submission_checks() {
        let post = completed_post();
        let owner = Id::from(OWNER);
        let claimer = Id::from(CLAIMER);
        let stranger = Id::from(3);

        assert_eq!(check_submission(&post, owner, claimer), Ok(()));
        assert_eq!(check_submission(&post, claimer, owner), Ok(()));
        assert_eq!(
            check_submission(&post, stranger, owner),
            Err(RatingError::NotParticipant)
        );
        assert_eq!(
            check_submission(&post, owner, owner),
            Err(RatingError::SelfRating)
        );
        assert_eq!(
            check_submission(&post, owner, stranger),
            Err(RatingError::InvalidRecipient)
        );
    }
}
