//! Post filters shared by the listing endpoints, the profile views and the
//! sweep. [`PostQuery::matches`] is the reference semantics; the Postgres
//! store translates the same fields into SQL.

use crate::{
    geo::GeoFilter,
    lifecycle::EXPIRING_SOON_WINDOW,
    model::{
        Id,
        post::{Post, PostKind, PostStatus},
        user::UserMarker,
    },
};
use serde::Serialize;
use time::OffsetDateTime;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Hidden from the public list unless asked for explicitly.
pub const LIST_HIDDEN: &[PostStatus] = &[PostStatus::Expired, PostStatus::Cancelled];
/// Hidden from the map unless asked for explicitly.
pub const MAP_HIDDEN: &[PostStatus] = &[
    PostStatus::Expired,
    PostStatus::Cancelled,
    PostStatus::Completed,
];
pub const SETTLED: &[PostStatus] = &[
    PostStatus::Completed,
    PostStatus::Expired,
    PostStatus::Cancelled,
];

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub enum StatusFilter {
    #[default]
    Any,
    Only(PostStatus),
    OneOf(&'static [PostStatus]),
    NoneOf(&'static [PostStatus]),
}

impl StatusFilter {
    #[must_use]
    pub fn or_default(requested: Option<PostStatus>, hidden: &'static [PostStatus]) -> Self {
        requested.map_or(StatusFilter::NoneOf(hidden), StatusFilter::Only)
    }

    #[must_use]
    pub fn matches(self, status: PostStatus) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Only(only) => status == only,
            StatusFilter::OneOf(statuses) => statuses.contains(&status),
            StatusFilter::NoneOf(statuses) => !statuses.contains(&status),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Participant {
    Owner(Id<UserMarker>),
    Claimer(Id<UserMarker>),
    Either(Id<UserMarker>),
}

impl Participant {
    #[must_use]
    pub fn matches(self, post: &Post) -> bool {
        match self {
            Participant::Owner(user) => post.owner == user,
            Participant::Claimer(user) => post.claimed_by() == Some(user),
            Participant::Either(user) => post.owner == user || post.claimed_by() == Some(user),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub enum PostOrder {
    /// By creation time, newest first.
    #[default]
    Newest,
    /// By claim time, most recent first.
    RecentlyClaimed,
}

#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct PostQuery {
    pub kind: Option<PostKind>,
    pub status: StatusFilter,
    /// Exclusive lower bound on the expiry date.
    pub expires_after: Option<OffsetDateTime>,
    /// Exclusive upper bound on the expiry date.
    pub expires_before: Option<OffsetDateTime>,
    pub geo: Option<GeoFilter>,
    pub require_coordinates: bool,
    pub participant: Option<Participant>,
    pub order: PostOrder,
}

impl PostQuery {
    /// Restricts the query to posts expiring within the next day.
    #[must_use]
    pub fn expiring_soon(mut self, now: OffsetDateTime) -> Self {
        self.expires_after = Some(now);
        self.expires_before = Some(now + EXPIRING_SOON_WINDOW);
        self
    }

    /// Unsettled posts whose expiry date has passed.
    #[must_use]
    pub fn overdue(now: OffsetDateTime) -> Self {
        Self {
            status: StatusFilter::NoneOf(SETTLED),
            expires_before: Some(now),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn matches(&self, post: &Post) -> bool {
        let coordinates = post.location.coordinates;

        self.kind.is_none_or(|kind| post.kind == kind)
            && self.status.matches(post.status())
            && self.expires_after.is_none_or(|after| post.expiry_date > after)
            && self.expires_before.is_none_or(|before| post.expiry_date < before)
            && self
                .geo
                .is_none_or(|geo| coordinates.is_some_and(|point| geo.contains(point)))
            && (!self.require_coordinates || coordinates.is_some())
            && self.participant.is_none_or(|participant| participant.matches(post))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    /// Missing or zero values fall back to page 1 and the default limit.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let page = page.filter(|&page| page > 0).unwrap_or(1);
        let limit = limit
            .filter(|&limit| limit > 0)
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .min(MAX_PAGE_LIMIT);

        Self { page, limit }
    }

    #[must_use]
    pub fn page(self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn limit(self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn offset(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    #[must_use]
    pub fn pages(self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }
}

/// One page of results plus the size of the whole result set.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    /// Cuts the requested page out of a full, already ordered result.
    #[must_use]
    pub fn slice(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(pagination.limit() as usize)
            .collect();

        Self { items, total }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// Pagination block of list replies.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct PageInfo {
    pub total: u64,
    pub page: u32,
    pub pages: u64,
}

impl PageInfo {
    #[must_use]
    pub fn new(total: u64, pagination: Pagination) -> Self {
        Self {
            total,
            page: pagination.page(),
            pages: pagination.pages(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        geo::{GeoFilter, GeoPoint},
        model::{
            Id,
            post::{
                PostKind, PostStatus,
                tests::{NOW, OWNER, post},
            },
        },
        query::{
            LIST_HIDDEN, MAP_HIDDEN, Page, Pagination, Participant, PostQuery, StatusFilter,
        },
    };
    use time::Duration;

    #[test]
    fn default_status_filters() {
        let list = StatusFilter::or_default(None, LIST_HIDDEN);
        assert!(list.matches(PostStatus::Completed));
        assert!(!list.matches(PostStatus::Expired));

        let map = StatusFilter::or_default(None, MAP_HIDDEN);
        assert!(!map.matches(PostStatus::Completed));
        assert!(map.matches(PostStatus::Claimed));

        let explicit = StatusFilter::or_default(Some(PostStatus::Expired), LIST_HIDDEN);
        assert!(explicit.matches(PostStatus::Expired));
        assert!(!explicit.matches(PostStatus::Posted));
    }

    #[test]
    fn kind_and_participant() {
        let mut post = post(PostKind::Donate);
        post.claim(Id::from(2), NOW).unwrap();

        let donations = PostQuery {
            kind: Some(PostKind::Donate),
            ..PostQuery::default()
        };
        let requests = PostQuery {
            kind: Some(PostKind::Request),
            ..PostQuery::default()
        };
        assert!(donations.matches(&post));
        assert!(!requests.matches(&post));

        let claims = PostQuery {
            participant: Some(Participant::Claimer(Id::from(2))),
            ..PostQuery::default()
        };
        let owned = PostQuery {
            participant: Some(Participant::Owner(Id::from(2))),
            ..PostQuery::default()
        };
        assert!(claims.matches(&post));
        assert!(!owned.matches(&post));
        assert!(Participant::Either(Id::from(OWNER)).matches(&post));
    }

    #[test]
    fn expiry_windows() {
        let post = post(PostKind::Donate);

        assert!(PostQuery::default().expiring_soon(NOW).matches(&post));
        assert!(
            !PostQuery::default()
                .expiring_soon(NOW - Duration::days(2))
                .matches(&post)
        );
        assert!(!PostQuery::overdue(NOW).matches(&post));
        assert!(PostQuery::overdue(NOW + Duration::hours(2)).matches(&post));
    }

    #[test]
    fn geo_filter_needs_coordinates() {
        let mut post = post(PostKind::Donate);
        let center = GeoPoint::new(13.405, 52.52).unwrap();
        let query = PostQuery {
            geo: Some(GeoFilter::new(center, 5)),
            ..PostQuery::default()
        };
        assert!(!query.matches(&post));

        post.location.coordinates = Some(GeoPoint::new(13.41, 52.52).unwrap());
        assert!(query.matches(&post));

        let on_map = PostQuery {
            require_coordinates: true,
            ..PostQuery::default()
        };
        assert!(on_map.matches(&post));
    }

    #[test]
    fn pagination_defaults_and_pages() {
        let default = Pagination::new(None, Some(0));
        assert_eq!((default.page(), default.limit()), (1, 10));
        assert_eq!(default.offset(), 0);

        let third = Pagination::new(Some(3), Some(4));
        assert_eq!(third.offset(), 8);
        assert_eq!(third.pages(9), 3);
        assert_eq!(third.pages(0), 0);

        assert_eq!(Pagination::new(None, Some(10_000)).limit(), 100);
    }

    #[test]
    fn page_slicing() {
        let page = Page::slice((1..=9).collect::<Vec<_>>(), Pagination::new(Some(3), Some(4)));
        assert_eq!(page.items, [9]);
        assert_eq!(page.total, 9);

        let past_end = Page::slice(vec![1, 2], Pagination::new(Some(5), None));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 2);
    }
}
