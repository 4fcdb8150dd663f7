use crate::service::{Result, ServiceError, fetch_user, posts::fetch_post, summaries};
use foodshare_common::{
    model::{
        Id,
        notification::NotificationDraft,
        post::PostMarker,
        rating::{
            Rating, RatingDraft, RatingError, RatingMarker, RatingSummary, RatingUpdate,
            RatingView, check_submission,
        },
        user::UserMarker,
    },
    query::{Page, Pagination},
};
use foodshare_db::store::Store;
use time::OffsetDateTime;
use tracing::{debug, info};

async fn fetch_rating(store: &dyn Store, id: Id<RatingMarker>) -> Result<Rating> {
    store
        .fetch_rating(id)
        .await?
        .ok_or(ServiceError::RatingNotFound(id))
}

/// Recomputes the recipient's average from every score they received.
async fn refresh_summary(store: &dyn Store, user: Id<UserMarker>) -> Result<RatingSummary> {
    let scores = store.fetch_received_scores(user).await?;
    let summary = RatingSummary::from_scores(scores);
    store.set_rating_summary(user, summary).await?;

    debug!(%user, average = summary.average, count = summary.count, "Refreshed rating summary");
    Ok(summary)
}

async fn with_givers(store: &dyn Store, ratings: Vec<Rating>) -> Result<Vec<RatingView>> {
    let profiles = summaries(store, ratings.iter().map(|rating| rating.giver)).await?;

    Ok(ratings
        .into_iter()
        .map(|rating| RatingView {
            giver_profile: profiles.get(&rating.giver).cloned(),
            rating,
        })
        .collect())
}

pub async fn submit(
    store: &dyn Store,
    giver: Id<UserMarker>,
    draft: RatingDraft,
    now: OffsetDateTime,
) -> Result<Rating> {
    let post = fetch_post(store, draft.post_id).await?;
    check_submission(&post, giver, draft.recipient_id)?;
    let giver_name = fetch_user(store, giver).await?.name;

    let rating = Rating {
        id: store.next_id()?.into(),
        post: post.id,
        giver,
        recipient: draft.recipient_id,
        score: draft.score,
        comment: draft.comment,
        created_at: now,
        updated_at: now,
    };
    if !store.insert_rating(&rating).await? {
        return Err(RatingError::AlreadyRated.into());
    }

    refresh_summary(store, rating.recipient).await?;
    store
        .insert_notification(&NotificationDraft::new_rating(&rating, &giver_name), now)
        .await?;

    info!(
        rating = %rating.id,
        post = %rating.post,
        %giver,
        recipient = %rating.recipient,
        score = rating.score.get(),
        "Submitted rating"
    );
    Ok(rating)
}

pub async fn update(
    store: &dyn Store,
    caller: Id<UserMarker>,
    id: Id<RatingMarker>,
    update: RatingUpdate,
    now: OffsetDateTime,
) -> Result<Rating> {
    let mut rating = fetch_rating(store, id).await?;
    rating.ensure_giver(caller)?;

    update.apply(&mut rating, now);
    if !store.update_rating(&rating).await? {
        return Err(ServiceError::RatingNotFound(id));
    }

    refresh_summary(store, rating.recipient).await?;
    Ok(rating)
}

pub async fn delete(store: &dyn Store, caller: Id<UserMarker>, id: Id<RatingMarker>) -> Result<()> {
    let rating = fetch_rating(store, id).await?;
    rating.ensure_giver(caller)?;

    if !store.delete_rating(id).await? {
        return Err(ServiceError::RatingNotFound(id));
    }

    refresh_summary(store, rating.recipient).await?;
    info!(rating = %id, "Deleted rating");
    Ok(())
}

pub async fn list_for_post(store: &dyn Store, post: Id<PostMarker>) -> Result<Vec<RatingView>> {
    fetch_post(store, post).await?;
    let ratings = store.fetch_post_ratings(post).await?;

    with_givers(store, ratings).await
}

pub async fn list_for_user(
    store: &dyn Store,
    user: Id<UserMarker>,
    pagination: Pagination,
) -> Result<Page<RatingView>> {
    fetch_user(store, user).await?;
    let page = store.fetch_user_ratings(user, pagination).await?;

    Ok(Page {
        items: with_givers(store, page.items).await?,
        total: page.total,
    })
}

#[cfg(test)]
mod tests {
    use crate::service::{
        ErrorKind, ServiceError, posts, ratings,
        tests::{NOW, draft, store, user},
    };
    use foodshare_common::{
        model::{
            Id,
            notification::NotificationKind,
            post::{PostKind, PostMarker, PostStatus},
            rating::{Comment, RatingDraft, RatingError, RatingUpdate, Score},
            user::{User, UserMarker},
        },
        query::Pagination,
    };
    use foodshare_db::{memory::MemoryStore, store::Store};
    use time::Duration;

    struct Deal {
        store: MemoryStore,
        owner: User,
        claimer: User,
        post: Id<PostMarker>,
    }

    async fn completed_deal() -> Deal {
        let store = store();
        let owner = user(&store, "Ada").await;
        let claimer = user(&store, "Bea").await;
        let post = posts::create(&store, owner.id, draft(PostKind::Donate, Duration::hours(1)), NOW)
            .await
            .unwrap()
            .post
            .id;
        posts::claim(&store, claimer.id, post, NOW).await.unwrap();
        posts::change_status(&store, claimer.id, post, PostStatus::PickedUp, NOW)
            .await
            .unwrap();
        posts::change_status(&store, owner.id, post, PostStatus::Completed, NOW)
            .await
            .unwrap();

        Deal {
            store,
            owner,
            claimer,
            post,
        }
    }

    fn rating(post: Id<PostMarker>, recipient: Id<UserMarker>, score: u8) -> RatingDraft {
        RatingDraft {
            post_id: post,
            recipient_id: recipient,
            score: Score::new(score).unwrap(),
            comment: Comment::empty(),
        }
    }

    #[tokio::test]
    async fn rating_updates_recipient_summary_once() {
        let Deal {
            store,
            owner,
            claimer,
            post,
        } = completed_deal().await;

        ratings::submit(&store, owner.id, rating(post, claimer.id, 5), NOW)
            .await
            .unwrap();

        let rated = store.fetch_user(claimer.id).await.unwrap().unwrap();
        assert!((rated.average_rating - 5.0).abs() < f64::EPSILON);
        assert_eq!(rated.total_ratings, 1);

        let inbox = store
            .fetch_notifications(claimer.id, true, Pagination::default())
            .await
            .unwrap();
        assert_eq!(inbox.items[0].kind, NotificationKind::NewRating);
        assert_eq!(inbox.items[0].message, "Ada has rated you 5 stars");

        let again = ratings::submit(&store, owner.id, rating(post, claimer.id, 3), NOW)
            .await
            .unwrap_err();
        assert!(matches!(again, ServiceError::Rating(RatingError::AlreadyRated)));
        assert_eq!(again.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn unfinished_posts_cannot_be_rated() {
        let store = store();
        let owner = user(&store, "Ada").await;
        let claimer = user(&store, "Bea").await;
        let post = posts::create(&store, owner.id, draft(PostKind::Donate, Duration::hours(1)), NOW)
            .await
            .unwrap()
            .post
            .id;
        posts::claim(&store, claimer.id, post, NOW).await.unwrap();

        let error = ratings::submit(&store, owner.id, rating(post, claimer.id, 4), NOW)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn submission_authorization() {
        let Deal {
            store,
            owner,
            claimer,
            post,
        } = completed_deal().await;
        let stranger = user(&store, "Cy").await;

        let outsider = ratings::submit(&store, stranger.id, rating(post, owner.id, 4), NOW)
            .await
            .unwrap_err();
        assert_eq!(outsider.kind(), ErrorKind::Forbidden);

        let own = ratings::submit(&store, claimer.id, rating(post, claimer.id, 4), NOW)
            .await
            .unwrap_err();
        assert_eq!(own.kind(), ErrorKind::Forbidden);

        let wrong_recipient = ratings::submit(&store, claimer.id, rating(post, stranger.id, 4), NOW)
            .await
            .unwrap_err();
        assert_eq!(wrong_recipient.kind(), ErrorKind::Validation);

        let missing = ratings::submit(&store, owner.id, rating(Id::from(1), claimer.id, 4), NOW)
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn update_and_delete_refresh_summary() {
        let Deal {
            store,
            owner,
            claimer,
            post,
        } = completed_deal().await;

        let given = ratings::submit(&store, owner.id, rating(post, claimer.id, 5), NOW)
            .await
            .unwrap();

        let not_giver = ratings::delete(&store, claimer.id, given.id).await.unwrap_err();
        assert_eq!(not_giver.kind(), ErrorKind::Forbidden);

        let update = RatingUpdate {
            score: Some(Score::new(2).unwrap()),
            comment: None,
        };
        let updated = ratings::update(&store, owner.id, given.id, update, NOW + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(updated.score.get(), 2);
        let rated = store.fetch_user(claimer.id).await.unwrap().unwrap();
        assert!((rated.average_rating - 2.0).abs() < f64::EPSILON);

        ratings::delete(&store, owner.id, given.id).await.unwrap();
        let rated = store.fetch_user(claimer.id).await.unwrap().unwrap();
        assert!(rated.average_rating.abs() < f64::EPSILON);
        assert_eq!(rated.total_ratings, 0);

        let gone = ratings::delete(&store, owner.id, given.id).await.unwrap_err();
        assert_eq!(gone.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn listings_resolve_givers() {
        let Deal {
            store,
            owner,
            claimer,
            post,
        } = completed_deal().await;

        ratings::submit(&store, owner.id, rating(post, claimer.id, 4), NOW)
            .await
            .unwrap();
        ratings::submit(&store, claimer.id, rating(post, owner.id, 5), NOW)
            .await
            .unwrap();

        let on_post = ratings::list_for_post(&store, post).await.unwrap();
        assert_eq!(on_post.len(), 2);
        assert!(on_post.iter().all(|view| view.giver_profile.is_some()));

        let received = ratings::list_for_user(&store, claimer.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(received.total, 1);
        assert_eq!(received.items[0].giver_profile.as_ref().unwrap().id, owner.id);

        let unknown = ratings::list_for_user(&store, Id::from(1), Pagination::default())
            .await
            .unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::NotFound);
    }
}
