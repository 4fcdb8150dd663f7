use crate::model::{BoundedText, Id};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const USER_NAME_MAX_LEN: usize = 50;

pub type UserName = BoundedText<1, USER_NAME_MAX_LEN>;
pub type Bio = BoundedText<0, 500>;
pub type Phone = BoundedText<0, 30>;
pub type HomeLocation = BoundedText<0, 200>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id<UserMarker>,
    pub name: UserName,
    pub bio: Option<Bio>,
    pub phone: Option<Phone>,
    pub location: Option<HomeLocation>,
    pub average_rating: f64,
    pub total_ratings: u32,
    pub donations_made: u32,
    pub donations_received: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The slice of a user embedded into posts and ratings.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Id<UserMarker>,
    pub name: UserName,
    pub average_rating: f64,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            average_rating: user.average_rating,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CreateUser {
    pub name: UserName,
}

/// Partial profile edit; absent fields stay as they are.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<UserName>,
    pub phone: Option<Phone>,
    pub location: Option<HomeLocation>,
    pub bio: Option<Bio>,
}

impl ProfileUpdate {
    pub fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(phone) = self.phone {
            user.phone = Some(phone);
        }
        if let Some(location) = self.location {
            user.location = Some(location);
        }
        if let Some(bio) = self.bio {
            user.bio = Some(bio);
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum UserCounter {
    DonationsMade,
    DonationsReceived,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats<P> {
    pub donations_made: u64,
    pub donations_received: u64,
    pub requests_made: u64,
    pub requests_fulfilled: u64,
    pub average_rating: f64,
    pub total_ratings: u32,
    pub recent_posts: Vec<P>,
    pub recent_claims: Vec<P>,
}
