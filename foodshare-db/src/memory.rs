use crate::store::{Result, Store};
use async_trait::async_trait;
use foodshare_common::{
    model::{
        FoodshareSnowflake, FoodshareSnowflakeGenerator, Id,
        auth::{AuthTokenHash, Authentication},
        notification::{Notification, NotificationDraft, NotificationKind, NotificationMarker},
        post::{Post, PostMarker},
        rating::{Rating, RatingMarker, RatingSummary, Score},
        user::{CreateUser, User, UserCounter, UserMarker},
    },
    query::{Page, Pagination, PostOrder, PostQuery},
    snowflake::{ProcessId, WorkerId},
};
use std::{
    cmp::Reverse,
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Id<UserMarker>, User>,
    authentications: HashMap<AuthTokenHash, Authentication>,
    posts: HashMap<Id<PostMarker>, Post>,
    ratings: HashMap<Id<RatingMarker>, Rating>,
    notifications: HashMap<Id<NotificationMarker>, Notification>,
}

/// [`Store`] kept in process memory, used without a database and in tests.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snowflake_generator: Mutex<FoodshareSnowflakeGenerator>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            tables: RwLock::default(),
            snowflake_generator: Mutex::new(FoodshareSnowflakeGenerator::new(
                worker_id, process_id,
            )),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

/// Newest first, ties broken by id so equal timestamps keep insertion order.
fn newest_first<T, M: Ord>(items: &mut [T], key: impl Fn(&T) -> (OffsetDateTime, Id<M>)) {
    items.sort_by_key(|item| Reverse(key(item)));
}

fn new_notification(
    id: Id<NotificationMarker>,
    draft: &NotificationDraft,
    now: OffsetDateTime,
) -> Notification {
    Notification {
        id,
        recipient: draft.recipient,
        sender: draft.sender,
        post: draft.post,
        kind: draft.kind,
        message: draft.message.clone(),
        read: false,
        redirect_url: draft.redirect_url.clone(),
        created_at: now,
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn next_id(&self) -> Result<FoodshareSnowflake> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake)
    }

    async fn create_user(&self, user: &CreateUser, now: OffsetDateTime) -> Result<User> {
        let user = User {
            id: self.next_id()?.into(),
            name: user.name.clone(),
            bio: None,
            phone: None,
            location: None,
            average_rating: 0.0,
            total_ratings: 0,
            donations_made: 0,
            donations_received: 0,
            created_at: now,
        };

        self.tables.write().await.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn fetch_user(&self, id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn fetch_users(&self, ids: &[Id<UserMarker>]) -> Result<Vec<User>> {
        let tables = self.tables.read().await;

        Ok(ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .cloned()
            .collect())
    }

    async fn update_profile(&self, user: &User) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.users.get_mut(&user.id) else {
            return Ok(false);
        };

        stored.name = user.name.clone();
        stored.bio.clone_from(&user.bio);
        stored.phone.clone_from(&user.phone);
        stored.location.clone_from(&user.location);
        Ok(true)
    }

    async fn increment_counter(&self, id: Id<UserMarker>, counter: UserCounter) -> Result<()> {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            match counter {
                UserCounter::DonationsMade => user.donations_made += 1,
                UserCounter::DonationsReceived => user.donations_received += 1,
            }
        }

        Ok(())
    }

    async fn set_rating_summary(&self, id: Id<UserMarker>, summary: RatingSummary) -> Result<()> {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            user.average_rating = summary.average;
            user.total_ratings = summary.count;
        }

        Ok(())
    }

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        self.tables
            .write()
            .await
            .authentications
            .insert(authentication.token_hash.clone(), authentication.clone());

        Ok(())
    }

    async fn fetch_authentication(&self, hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        Ok(self.tables.read().await.authentications.get(hash).cloned())
    }

    async fn insert_post(&self, post: &Post) -> Result<()> {
        self.tables.write().await.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn fetch_post(&self, id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn replace_post(&self, post: &Post) -> Result<bool> {
        let mut tables = self.tables.write().await;

        match tables.posts.get_mut(&post.id) {
            Some(stored) if stored.revision == post.revision => {
                *stored = Post {
                    revision: post.revision + 1,
                    ..post.clone()
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_post(&self, post: &Post) -> Result<bool> {
        let mut tables = self.tables.write().await;

        if tables
            .posts
            .get(&post.id)
            .is_some_and(|stored| stored.revision == post.revision)
        {
            tables.posts.remove(&post.id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn fetch_posts(
        &self,
        query: &PostQuery,
        pagination: Option<Pagination>,
    ) -> Result<Page<Post>> {
        let mut posts: Vec<Post> = self
            .tables
            .read()
            .await
            .posts
            .values()
            .filter(|post| query.matches(post))
            .cloned()
            .collect();

        match query.order {
            PostOrder::Newest => newest_first(&mut posts, |post| (post.created_at, post.id)),
            PostOrder::RecentlyClaimed => {
                posts.sort_by_key(|post| Reverse((post.lifecycle.claimed_at(), post.id)));
            }
        }

        Ok(match pagination {
            Some(pagination) => Page::slice(posts, pagination),
            None => Page {
                total: posts.len() as u64,
                items: posts,
            },
        })
    }

    async fn count_posts(&self, query: &PostQuery) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables.posts.values().filter(|post| query.matches(post)).count();

        Ok(count as u64)
    }

    async fn insert_rating(&self, rating: &Rating) -> Result<bool> {
        let mut tables = self.tables.write().await;

        let duplicate = tables
            .ratings
            .values()
            .any(|existing| existing.post == rating.post && existing.giver == rating.giver);
        if duplicate {
            return Ok(false);
        }

        tables.ratings.insert(rating.id, rating.clone());
        Ok(true)
    }

    async fn fetch_rating(&self, id: Id<RatingMarker>) -> Result<Option<Rating>> {
        Ok(self.tables.read().await.ratings.get(&id).cloned())
    }

    async fn update_rating(&self, rating: &Rating) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.ratings.get_mut(&rating.id) else {
            return Ok(false);
        };

        stored.score = rating.score;
        stored.comment = rating.comment.clone();
        stored.updated_at = rating.updated_at;
        Ok(true)
    }

    async fn delete_rating(&self, id: Id<RatingMarker>) -> Result<bool> {
        Ok(self.tables.write().await.ratings.remove(&id).is_some())
    }

    async fn fetch_post_ratings(&self, post: Id<PostMarker>) -> Result<Vec<Rating>> {
        let mut ratings: Vec<Rating> = self
            .tables
            .read()
            .await
            .ratings
            .values()
            .filter(|rating| rating.post == post)
            .cloned()
            .collect();

        newest_first(&mut ratings, |rating| (rating.created_at, rating.id));
        Ok(ratings)
    }

    async fn fetch_user_ratings(
        &self,
        user: Id<UserMarker>,
        pagination: Pagination,
    ) -> Result<Page<Rating>> {
        let mut ratings: Vec<Rating> = self
            .tables
            .read()
            .await
            .ratings
            .values()
            .filter(|rating| rating.recipient == user)
            .cloned()
            .collect();

        newest_first(&mut ratings, |rating| (rating.created_at, rating.id));
        Ok(Page::slice(ratings, pagination))
    }

    async fn fetch_received_scores(&self, user: Id<UserMarker>) -> Result<Vec<Score>> {
        Ok(self
            .tables
            .read()
            .await
            .ratings
            .values()
            .filter(|rating| rating.recipient == user)
            .map(|rating| rating.score)
            .collect())
    }

    async fn insert_notification(
        &self,
        draft: &NotificationDraft,
        now: OffsetDateTime,
    ) -> Result<Notification> {
        let notification = new_notification(self.next_id()?.into(), draft, now);

        self.tables
            .write()
            .await
            .notifications
            .insert(notification.id, notification.clone());

        Ok(notification)
    }

    async fn insert_notification_once(
        &self,
        draft: &NotificationDraft,
        now: OffsetDateTime,
    ) -> Result<Option<Notification>> {
        let mut tables = self.tables.write().await;

        let exists = draft.kind == NotificationKind::PostExpiringSoon
            && tables.notifications.values().any(|existing| {
                existing.kind == draft.kind
                    && existing.recipient == draft.recipient
                    && existing.post == draft.post
            });
        if exists {
            return Ok(None);
        }

        let notification = new_notification(self.next_id()?.into(), draft, now);
        tables
            .notifications
            .insert(notification.id, notification.clone());

        Ok(Some(notification))
    }

    async fn fetch_notification(
        &self,
        id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>> {
        Ok(self.tables.read().await.notifications.get(&id).cloned())
    }

    async fn fetch_notifications(
        &self,
        recipient: Id<UserMarker>,
        unread_only: bool,
        pagination: Pagination,
    ) -> Result<Page<Notification>> {
        let mut notifications: Vec<Notification> = self
            .tables
            .read()
            .await
            .notifications
            .values()
            .filter(|notification| {
                notification.recipient == recipient && !(unread_only && notification.read)
            })
            .cloned()
            .collect();

        newest_first(&mut notifications, |notification| {
            (notification.created_at, notification.id)
        });
        Ok(Page::slice(notifications, pagination))
    }

    async fn count_unread(&self, recipient: Id<UserMarker>) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables
            .notifications
            .values()
            .filter(|notification| notification.recipient == recipient && !notification.read)
            .count();

        Ok(count as u64)
    }

    async fn mark_read(&self, id: Id<NotificationMarker>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(notification) = tables.notifications.get_mut(&id) else {
            return Ok(false);
        };

        notification.read = true;
        Ok(true)
    }

    async fn mark_all_read(&self, recipient: Id<UserMarker>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;

        for notification in tables.notifications.values_mut() {
            if notification.recipient == recipient && !notification.read {
                notification.read = true;
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn delete_notification(&self, id: Id<NotificationMarker>) -> Result<bool> {
        Ok(self.tables.write().await.notifications.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::{memory::MemoryStore, store::Store};
    use foodshare_common::{
        model::{
            BoundedText, Id,
            notification::NotificationDraft,
            post::{Location, Post, PostDraft, PostKind, PostStatus},
            rating::{Rating, Score},
            user::{CreateUser, User},
        },
        query::{Pagination, PostQuery},
    };
    use time::{Duration, OffsetDateTime, macros::datetime};

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    async fn user(store: &MemoryStore, name: &str) -> User {
        let create = CreateUser {
            name: BoundedText::new(name).unwrap(),
        };
        store.create_user(&create, NOW).await.unwrap()
    }

    async fn post(store: &MemoryStore, owner: &User, created_at: OffsetDateTime) -> Post {
        let draft = PostDraft {
            kind: PostKind::Donate,
            title: BoundedText::new("Apples").unwrap(),
            description: BoundedText::new("A bag of apples").unwrap(),
            quantity: BoundedText::new("1 bag").unwrap(),
            location: Location {
                address: BoundedText::new("Park Lane 3").unwrap(),
                coordinates: None,
            },
            expiry_date: created_at + Duration::days(1),
            images: Vec::new(),
        };
        let post = Post::new(store.next_id().unwrap().into(), owner.id, draft, created_at).unwrap();
        store.insert_post(&post).await.unwrap();
        post
    }

    fn rating(store: &MemoryStore, post: &Post, giver: &User, recipient: &User) -> Rating {
        Rating {
            id: store.next_id().unwrap().into(),
            post: post.id,
            giver: giver.id,
            recipient: recipient.id,
            score: Score::new(4).unwrap(),
            comment: BoundedText::new("").unwrap(),
            created_at: NOW,
            updated_at: NOW,
        }
    }

    #[tokio::test]
    async fn replace_is_conditional_on_revision() {
        let store = MemoryStore::default();
        let owner = user(&store, "Ann").await;
        let claimer = user(&store, "Ben").await;
        let stored = post(&store, &owner, NOW).await;

        let mut first = stored.clone();
        first.claim(claimer.id, NOW).unwrap();
        let mut second = stored.clone();
        second.change_status(owner.id, PostStatus::Cancelled, NOW).unwrap();

        assert!(store.replace_post(&first).await.unwrap());
        assert!(!store.replace_post(&second).await.unwrap());

        let fetched = store.fetch_post(stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.status(), PostStatus::Claimed);
        assert_eq!(fetched.revision, stored.revision + 1);
        assert!(!store.delete_post(&stored).await.unwrap());
        assert!(store.delete_post(&fetched).await.unwrap());
    }

    #[tokio::test]
    async fn stale_copy_with_same_status_is_rejected() {
        let store = MemoryStore::default();
        let owner = user(&store, "Ann").await;
        let stored = post(&store, &owner, NOW).await;
        let later = stored.expiry_date + Duration::hours(1);

        let mut stale = stored.clone();
        let mut edited = stored.clone();
        edited.expiry_date = later + Duration::days(2);
        assert!(store.replace_post(&edited).await.unwrap());

        assert!(stale.expire(later));
        assert!(!store.replace_post(&stale).await.unwrap());

        let fetched = store.fetch_post(stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.status(), PostStatus::Posted);
        assert_eq!(fetched.expiry_date, edited.expiry_date);
    }

    #[tokio::test]
    async fn posts_are_listed_newest_first() {
        let store = MemoryStore::default();
        let owner = user(&store, "Ann").await;
        let older = post(&store, &owner, NOW).await;
        let newer = post(&store, &owner, NOW + Duration::minutes(1)).await;

        let page = store
            .fetch_posts(&PostQuery::default(), Some(Pagination::new(Some(1), Some(1))))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, newer.id);

        let all = store.fetch_posts(&PostQuery::default(), None).await.unwrap();
        assert_eq!(all.items.last().map(|post| post.id), Some(older.id));
        assert_eq!(store.count_posts(&PostQuery::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn one_rating_per_post_and_giver() {
        let store = MemoryStore::default();
        let owner = user(&store, "Ann").await;
        let claimer = user(&store, "Ben").await;
        let post = post(&store, &owner, NOW).await;

        assert!(store.insert_rating(&rating(&store, &post, &owner, &claimer)).await.unwrap());
        assert!(!store.insert_rating(&rating(&store, &post, &owner, &claimer)).await.unwrap());
        assert!(store.insert_rating(&rating(&store, &post, &claimer, &owner)).await.unwrap());

        let scores = store.fetch_received_scores(claimer.id).await.unwrap();
        assert_eq!(scores.len(), 1);
    }

    #[tokio::test]
    async fn expiring_soon_notice_is_inserted_once() {
        let store = MemoryStore::default();
        let owner = user(&store, "Ann").await;
        let post = post(&store, &owner, NOW).await;
        let draft = NotificationDraft::expiring_soon(&post);

        assert!(store.insert_notification_once(&draft, NOW).await.unwrap().is_some());
        assert!(store.insert_notification_once(&draft, NOW).await.unwrap().is_none());
        assert_eq!(store.count_unread(owner.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unread_filter_and_mark_all_read() {
        let store = MemoryStore::default();
        let owner = user(&store, "Ann").await;
        let post = post(&store, &owner, NOW).await;
        let draft = NotificationDraft::expiring_soon(&post);

        let first = store.insert_notification(&draft, NOW).await.unwrap();
        store
            .insert_notification(&draft, NOW + Duration::seconds(1))
            .await
            .unwrap();
        assert!(store.mark_read(first.id).await.unwrap());

        let unread = store
            .fetch_notifications(owner.id, true, Pagination::default())
            .await
            .unwrap();
        assert_eq!(unread.total, 1);

        assert_eq!(store.mark_all_read(owner.id).await.unwrap(), 1);
        assert_eq!(store.count_unread(owner.id).await.unwrap(), 0);
        assert_eq!(store.count_unread(Id::from(999)).await.unwrap(), 0);
    }
}
