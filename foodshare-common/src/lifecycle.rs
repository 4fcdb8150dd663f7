//! The post status machine.
//!
//! [`check_transition`] is the transition table and [`authorize`] the matrix
//! of who may request which status. Both are pure; [`Post::claim`] and
//! [`Post::change_status`] combine them, mutate the post and report the side
//! effects the caller has to carry out.

use crate::model::{
    Id, ModelValidationError,
    notification::NotificationKind,
    post::{Post, PostKind, PostStatus, TimelineEntry},
    user::UserMarker,
};
use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const EXPIRING_SOON_WINDOW: Duration = Duration::hours(24);

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum LifecycleError {
    #[error("Not authorized to update this post status")]
    NotParticipant,
    #[error("Only the post owner can set status {0}")]
    OwnerOnly(PostStatus),
    #[error("Only the claimer can set status {0}")]
    ClaimerOnly(PostStatus),
    #[error("Status {0} cannot be requested")]
    NotRequestable(PostStatus),
    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: PostStatus, to: PostStatus },
    #[error("The post has no claimer to approve")]
    NoClaimer,
    #[error("You cannot claim your own post")]
    OwnClaim,
    #[error("Cannot claim post that is in {0} status")]
    NotClaimable(PostStatus),
    #[error("This post has expired")]
    ClaimExpired,
    #[error("Not authorized to modify this post")]
    NotOwner,
    #[error("Cannot modify post that is in {0} status")]
    Locked(PostStatus),
}

/// How the caller relates to a post.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Role {
    Owner,
    Claimer,
    Outsider,
}

#[must_use]
pub fn successors(status: PostStatus) -> &'static [PostStatus] {
    use PostStatus::{Cancelled, Claimed, Completed, Expired, PickedUp, Posted};

    match status {
        Posted => &[Claimed, Cancelled],
        Claimed => &[PickedUp, Posted, Cancelled],
        PickedUp => &[Completed, Claimed],
        Completed => &[],
        Cancelled | Expired => &[Posted],
    }
}

pub fn check_transition(from: PostStatus, to: PostStatus) -> Result<(), LifecycleError> {
    if successors(from).contains(&to) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition { from, to })
    }
}

/// A claimer may release their own claim (`Claimed` to `Posted`); every
/// other `Posted` request belongs to the owner.
pub fn authorize(role: Role, from: PostStatus, to: PostStatus) -> Result<(), LifecycleError> {
    use PostStatus::{Cancelled, Claimed, Completed, Expired, PickedUp, Posted};

    match (role, to) {
        (_, Expired) => Err(LifecycleError::NotRequestable(to)),
        (Role::Outsider, _) => Err(LifecycleError::NotParticipant),
        (Role::Claimer, Posted) if from == Claimed => Ok(()),
        (Role::Claimer, Posted | Cancelled | Completed) => Err(LifecycleError::OwnerOnly(to)),
        (Role::Owner, PickedUp) => Err(LifecycleError::ClaimerOnly(to)),
        (Role::Owner | Role::Claimer, _) => Ok(()),
    }
}

impl PostStatus {
    /// Content edits and deletion are blocked while a hand-over is underway
    /// or done.
    #[must_use]
    pub fn is_locked(self) -> bool {
        matches!(
            self,
            PostStatus::Claimed | PostStatus::PickedUp | PostStatus::Completed
        )
    }

    /// States the expiry sweep leaves alone.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            PostStatus::Completed | PostStatus::Expired | PostStatus::Cancelled
        )
    }
}

/// Notifications a transition can raise.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum NoticeKind {
    ClaimRequest,
    ClaimApproved,
    ClaimRejected,
    PickupConfirmed,
    PostCompleted,
}

impl From<NoticeKind> for NotificationKind {
    fn from(kind: NoticeKind) -> Self {
        match kind {
            NoticeKind::ClaimRequest => NotificationKind::ClaimRequest,
            NoticeKind::ClaimApproved => NotificationKind::ClaimApproved,
            NoticeKind::ClaimRejected => NotificationKind::ClaimRejected,
            NoticeKind::PickupConfirmed => NotificationKind::PickupConfirmed,
            NoticeKind::PostCompleted => NotificationKind::PostCompleted,
        }
    }
}

/// A notification the lifecycle asks to be sent.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Notice {
    pub kind: NoticeKind,
    pub recipient: Id<UserMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct StatusChange {
    pub from: PostStatus,
    pub to: PostStatus,
    pub notice: Option<Notice>,
    /// Receiver of a completed donation, whose received counter goes up.
    pub credited_receiver: Option<Id<UserMarker>>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    status: PostStatus,
    claimed_by: Option<Id<UserMarker>>,
    #[serde(with = "time::serde::rfc3339::option")]
    claimed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    picked_up_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    completed_at: Option<OffsetDateTime>,
    status_timeline: Vec<TimelineEntry>,
}

impl Lifecycle {
    #[must_use]
    pub fn start(owner: Id<UserMarker>, at: OffsetDateTime) -> Self {
        Self {
            status: PostStatus::Posted,
            claimed_by: None,
            claimed_at: None,
            picked_up_at: None,
            completed_at: None,
            status_timeline: vec![TimelineEntry {
                status: PostStatus::Posted,
                timestamp: at,
                actor: Some(owner),
            }],
        }
    }

    /// Rebuilds a stored lifecycle, rejecting timelines that do not end in
    /// `status` or go back in time.
    pub fn restore(
        status: PostStatus,
        claimed_by: Option<Id<UserMarker>>,
        claimed_at: Option<OffsetDateTime>,
        picked_up_at: Option<OffsetDateTime>,
        completed_at: Option<OffsetDateTime>,
        status_timeline: Vec<TimelineEntry>,
    ) -> Result<Self, ModelValidationError> {
        let ends_in_status = status_timeline
            .last()
            .is_some_and(|entry| entry.status == status);
        let ordered = status_timeline
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp);

        if !ends_in_status || !ordered {
            return Err(ModelValidationError::InconsistentTimeline);
        }

        Ok(Self {
            status,
            claimed_by,
            claimed_at,
            picked_up_at,
            completed_at,
            status_timeline,
        })
    }

    #[must_use]
    pub fn status(&self) -> PostStatus {
        self.status
    }

    #[must_use]
    pub fn claimed_by(&self) -> Option<Id<UserMarker>> {
        self.claimed_by
    }

    #[must_use]
    pub fn claimed_at(&self) -> Option<OffsetDateTime> {
        self.claimed_at
    }

    #[must_use]
    pub fn picked_up_at(&self) -> Option<OffsetDateTime> {
        self.picked_up_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<OffsetDateTime> {
        self.completed_at
    }

    #[must_use]
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.status_timeline
    }

    fn enter(&mut self, status: PostStatus, actor: Option<Id<UserMarker>>, at: OffsetDateTime) {
        let at = self
            .status_timeline
            .last()
            .map_or(at, |last| at.max(last.timestamp));

        self.status = status;
        match status {
            PostStatus::Claimed => {
                self.claimed_at.get_or_insert(at);
            }
            PostStatus::PickedUp => {
                self.picked_up_at.get_or_insert(at);
            }
            PostStatus::Completed => {
                self.completed_at.get_or_insert(at);
            }
            PostStatus::Posted | PostStatus::Expired | PostStatus::Cancelled => {}
        }
        self.status_timeline.push(TimelineEntry {
            status,
            timestamp: at,
            actor,
        });
    }
}

impl Post {
    #[must_use]
    pub fn status(&self) -> PostStatus {
        self.lifecycle.status()
    }

    #[must_use]
    pub fn claimed_by(&self) -> Option<Id<UserMarker>> {
        self.lifecycle.claimed_by()
    }

    #[must_use]
    pub fn role_of(&self, user: Id<UserMarker>) -> Role {
        if user == self.owner {
            Role::Owner
        } else if self.claimed_by() == Some(user) {
            Role::Claimer
        } else {
            Role::Outsider
        }
    }

    pub fn claim(
        &mut self,
        claimer: Id<UserMarker>,
        now: OffsetDateTime,
    ) -> Result<StatusChange, LifecycleError> {
        let from = self.status();
        if claimer == self.owner {
            return Err(LifecycleError::OwnClaim);
        }
        if from != PostStatus::Posted {
            return Err(LifecycleError::NotClaimable(from));
        }
        if self.expiry_date <= now {
            return Err(LifecycleError::ClaimExpired);
        }

        self.lifecycle.claimed_by = Some(claimer);
        self.lifecycle.enter(PostStatus::Claimed, Some(claimer), now);
        self.updated_at = now;

        Ok(StatusChange {
            from,
            to: PostStatus::Claimed,
            notice: Some(Notice {
                kind: NoticeKind::ClaimRequest,
                recipient: self.owner,
            }),
            credited_receiver: None,
        })
    }

    pub fn change_status(
        &mut self,
        caller: Id<UserMarker>,
        to: PostStatus,
        now: OffsetDateTime,
    ) -> Result<StatusChange, LifecycleError> {
        let from = self.status();
        let role = self.role_of(caller);

        authorize(role, from, to)?;
        check_transition(from, to)?;

        let claimer = self.claimed_by();
        if to == PostStatus::Claimed && claimer.is_none() {
            return Err(LifecycleError::NoClaimer);
        }

        self.lifecycle.enter(to, Some(caller), now);
        if to == PostStatus::Posted {
            self.lifecycle.claimed_by = None;
        }
        self.updated_at = now;

        let notice = match to {
            PostStatus::Claimed => claimer.map(|recipient| Notice {
                kind: NoticeKind::ClaimApproved,
                recipient,
            }),
            PostStatus::Posted if role == Role::Claimer => Some(Notice {
                kind: NoticeKind::ClaimRejected,
                recipient: self.owner,
            }),
            PostStatus::PickedUp => Some(Notice {
                kind: NoticeKind::PickupConfirmed,
                recipient: self.owner,
            }),
            PostStatus::Completed => claimer.map(|recipient| Notice {
                kind: NoticeKind::PostCompleted,
                recipient,
            }),
            _ => None,
        };
        let credited_receiver = claimer
            .filter(|_| to == PostStatus::Completed && self.kind == PostKind::Donate);

        Ok(StatusChange {
            from,
            to,
            notice,
            credited_receiver,
        })
    }

    /// Forces an overdue, unsettled post into `Expired`. Returns whether
    /// anything changed, so repeated sweeps are no-ops.
    pub fn expire(&mut self, now: OffsetDateTime) -> bool {
        if self.expiry_date >= now || self.status().is_settled() {
            return false;
        }

        self.lifecycle.enter(PostStatus::Expired, None, now);
        self.updated_at = now;
        true
    }

    pub fn ensure_editable_by(&self, caller: Id<UserMarker>) -> Result<(), LifecycleError> {
        if caller != self.owner {
            return Err(LifecycleError::NotOwner);
        }
        if self.status().is_locked() {
            return Err(LifecycleError::Locked(self.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        lifecycle::{
            Lifecycle, LifecycleError, Notice, NoticeKind, Role, authorize, check_transition,
            successors,
        },
        model::{
            Id,
            post::{
                PostKind, PostStatus,
                tests::{NOW, OWNER, post},
            },
            user::UserMarker,
        },
    };
    use time::Duration;

    const CLAIMER: u64 = 2;
    const STRANGER: u64 = 3;

    fn user(id: u64) -> Id<UserMarker> {
        Id::from(id)
    }

    #[test]
    fn transition_table_is_exhaustive() {
        use PostStatus::{Cancelled, Claimed, Completed, Expired, PickedUp, Posted};

        let allowed = [
            (Posted, Claimed),
            (Posted, Cancelled),
            (Claimed, PickedUp),
            (Claimed, Posted),
            (Claimed, Cancelled),
            (PickedUp, Completed),
            (PickedUp, Claimed),
            (Cancelled, Posted),
            (Expired, Posted),
        ];

        for from in PostStatus::ALL {
            for to in PostStatus::ALL {
                let result = check_transition(from, to);
                if allowed.contains(&(from, to)) {
                    assert_eq!(result, Ok(()), "{from} -> {to}");
                } else {
                    assert_eq!(
                        result,
                        Err(LifecycleError::InvalidTransition { from, to }),
                        "{from} -> {to}"
                    );
                }
            }
        }
        assert!(successors(Completed).is_empty());
    }

    #[test]
    fn authorization_matrix() {
        use PostStatus::{Cancelled, Claimed, Completed, Expired, PickedUp, Posted};

        for to in PostStatus::ALL {
            assert!(authorize(Role::Outsider, Posted, to).is_err());
        }
        assert_eq!(
            authorize(Role::Owner, Claimed, Expired),
            Err(LifecycleError::NotRequestable(Expired))
        );
        assert_eq!(
            authorize(Role::Claimer, PickedUp, Completed),
            Err(LifecycleError::OwnerOnly(Completed))
        );
        assert_eq!(
            authorize(Role::Claimer, Claimed, Cancelled),
            Err(LifecycleError::OwnerOnly(Cancelled))
        );
        assert_eq!(
            authorize(Role::Claimer, Cancelled, Posted),
            Err(LifecycleError::OwnerOnly(Posted))
        );
        assert_eq!(
            authorize(Role::Owner, Claimed, PickedUp),
            Err(LifecycleError::ClaimerOnly(PickedUp))
        );
        assert_eq!(authorize(Role::Claimer, Claimed, Posted), Ok(()));
        assert_eq!(authorize(Role::Claimer, Claimed, PickedUp), Ok(()));
        assert_eq!(authorize(Role::Owner, PickedUp, Completed), Ok(()));
        assert_eq!(authorize(Role::Owner, PickedUp, Claimed), Ok(()));
        assert_eq!(authorize(Role::Claimer, PickedUp, Claimed), Ok(()));
    }

    #[test]
    fn claim_rules() {
        let mut own = post(PostKind::Donate);
        assert_eq!(own.claim(user(OWNER), NOW), Err(LifecycleError::OwnClaim));

        let mut expired = post(PostKind::Donate);
        assert_eq!(
            expired.claim(user(CLAIMER), NOW + Duration::hours(1)),
            Err(LifecycleError::ClaimExpired)
        );

        let mut taken = post(PostKind::Donate);
        taken.claim(user(CLAIMER), NOW).unwrap();
        assert_eq!(
            taken.claim(user(STRANGER), NOW),
            Err(LifecycleError::NotClaimable(PostStatus::Claimed))
        );
    }

    #[test]
    fn claim_sets_claimer_and_notifies_owner() {
        let mut post = post(PostKind::Donate);
        let change = post.claim(user(CLAIMER), NOW + Duration::minutes(1)).unwrap();

        assert_eq!(post.status(), PostStatus::Claimed);
        assert_eq!(post.claimed_by(), Some(user(CLAIMER)));
        assert_eq!(post.lifecycle.claimed_at(), Some(NOW + Duration::minutes(1)));
        assert_eq!(
            change.notice,
            Some(Notice {
                kind: NoticeKind::ClaimRequest,
                recipient: user(OWNER),
            })
        );
        let last = post.lifecycle.timeline().last().unwrap();
        assert_eq!(last.status, PostStatus::Claimed);
        assert_eq!(last.actor, Some(user(CLAIMER)));
    }

    #[test]
    fn full_hand_over() {
        let mut post = post(PostKind::Donate);
        post.claim(user(CLAIMER), NOW).unwrap();

        let picked_up = post
            .change_status(user(CLAIMER), PostStatus::PickedUp, NOW + Duration::minutes(10))
            .unwrap();
        assert_eq!(
            picked_up.notice.map(|notice| notice.kind),
            Some(NoticeKind::PickupConfirmed)
        );

        let completed = post
            .change_status(user(OWNER), PostStatus::Completed, NOW + Duration::minutes(20))
            .unwrap();
        assert_eq!(
            completed.notice,
            Some(Notice {
                kind: NoticeKind::PostCompleted,
                recipient: user(CLAIMER),
            })
        );
        assert_eq!(completed.credited_receiver, Some(user(CLAIMER)));
        assert_eq!(post.lifecycle.completed_at(), Some(NOW + Duration::minutes(20)));

        let statuses: Vec<_> = post.lifecycle.timeline().iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            [
                PostStatus::Posted,
                PostStatus::Claimed,
                PostStatus::PickedUp,
                PostStatus::Completed
            ]
        );
    }

    #[test]
    fn completing_a_request_credits_nobody() {
        let mut post = post(PostKind::Request);
        post.claim(user(CLAIMER), NOW).unwrap();
        post.change_status(user(CLAIMER), PostStatus::PickedUp, NOW)
            .unwrap();

        let change = post
            .change_status(user(OWNER), PostStatus::Completed, NOW)
            .unwrap();
        assert_eq!(change.credited_receiver, None);
    }

    #[test]
    fn completing_from_claimed_is_rejected() {
        let mut post = post(PostKind::Donate);
        post.claim(user(CLAIMER), NOW).unwrap();

        assert_eq!(
            post.change_status(user(OWNER), PostStatus::Completed, NOW),
            Err(LifecycleError::InvalidTransition {
                from: PostStatus::Claimed,
                to: PostStatus::Completed,
            })
        );
        assert_eq!(post.status(), PostStatus::Claimed);
        assert_eq!(post.lifecycle.timeline().len(), 2);
    }

    #[test]
    fn reverting_to_posted_clears_claimer() {
        for (caller, expected_notice) in [
            (OWNER, None),
            (CLAIMER, Some(NoticeKind::ClaimRejected)),
        ] {
            let mut post = post(PostKind::Donate);
            post.claim(user(CLAIMER), NOW).unwrap();

            let change = post
                .change_status(user(caller), PostStatus::Posted, NOW)
                .unwrap();

            assert_eq!(post.status(), PostStatus::Posted);
            assert_eq!(post.claimed_by(), None);
            assert_eq!(change.notice.map(|notice| notice.kind), expected_notice);
        }
    }

    #[test]
    fn outsiders_are_rejected() {
        let mut post = post(PostKind::Donate);
        post.claim(user(CLAIMER), NOW).unwrap();

        assert_eq!(
            post.change_status(user(STRANGER), PostStatus::PickedUp, NOW),
            Err(LifecycleError::NotParticipant)
        );
    }

    #[test]
    fn approving_needs_a_claimer() {
        let mut post = post(PostKind::Donate);

        assert_eq!(
            post.change_status(user(OWNER), PostStatus::Claimed, NOW),
            Err(LifecycleError::NoClaimer)
        );
    }

    #[test]
    fn reverting_pick_up_approves_again() {
        let mut post = post(PostKind::Donate);
        post.claim(user(CLAIMER), NOW).unwrap();
        post.change_status(user(CLAIMER), PostStatus::PickedUp, NOW)
            .unwrap();

        let change = post
            .change_status(user(OWNER), PostStatus::Claimed, NOW + Duration::minutes(1))
            .unwrap();

        assert_eq!(
            change.notice,
            Some(Notice {
                kind: NoticeKind::ClaimApproved,
                recipient: user(CLAIMER),
            })
        );
        assert_eq!(post.lifecycle.claimed_at(), Some(NOW));
    }

    #[test]
    fn expiry_is_idempotent() {
        let mut post = post(PostKind::Donate);
        let later = NOW + Duration::hours(2);

        assert!(!post.expire(NOW));
        assert!(post.expire(later));
        assert!(!post.expire(later));

        assert_eq!(post.status(), PostStatus::Expired);
        assert_eq!(post.lifecycle.timeline().len(), 2);
        assert_eq!(post.lifecycle.timeline()[1].actor, None);
    }

    #[test]
    fn expired_posts_can_be_reactivated() {
        let mut post = post(PostKind::Donate);
        post.expire(NOW + Duration::hours(2));

        post.change_status(user(OWNER), PostStatus::Posted, NOW + Duration::hours(3))
            .unwrap();
        assert_eq!(post.status(), PostStatus::Posted);
    }

    #[test]
    fn settled_posts_do_not_expire() {
        let mut post = post(PostKind::Donate);
        post.change_status(user(OWNER), PostStatus::Cancelled, NOW)
            .unwrap();

        assert!(!post.expire(NOW + Duration::days(1)));
        assert_eq!(post.status(), PostStatus::Cancelled);
    }

    #[test]
    fn edits_are_owner_only_and_blocked_while_locked() {
        let mut post = post(PostKind::Donate);
        assert_eq!(post.ensure_editable_by(user(OWNER)), Ok(()));
        assert_eq!(
            post.ensure_editable_by(user(STRANGER)),
            Err(LifecycleError::NotOwner)
        );

        post.claim(user(CLAIMER), NOW).unwrap();
        assert_eq!(
            post.ensure_editable_by(user(OWNER)),
            Err(LifecycleError::Locked(PostStatus::Claimed))
        );

        post.change_status(user(OWNER), PostStatus::Cancelled, NOW)
            .unwrap();
        assert_eq!(post.ensure_editable_by(user(OWNER)), Ok(()));
    }

    #[test]
    fn timeline_never_goes_back_in_time() {
        let mut post = post(PostKind::Donate);
        post.claim(user(CLAIMER), NOW - Duration::minutes(5)).unwrap();

        let timeline = post.lifecycle.timeline();
        assert!(timeline[0].timestamp <= timeline[1].timestamp);
    }

    #[test]
    fn restore_checks_consistency() {
        let post = post(PostKind::Donate);
        let timeline = post.lifecycle.timeline().to_vec();

        assert!(
            Lifecycle::restore(PostStatus::Posted, None, None, None, None, timeline.clone())
                .is_ok()
        );
        assert!(
            Lifecycle::restore(PostStatus::Claimed, None, None, None, None, timeline).is_err()
        );
        assert!(Lifecycle::restore(PostStatus::Posted, None, None, None, None, Vec::new()).is_err());
    }
}
