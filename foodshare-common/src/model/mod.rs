pub mod auth;
pub mod notification;
pub mod post;
pub mod rating;
pub mod user;

use crate::{
    geo::InvalidGeoPointError,
    model::{auth::InvalidAuthTokenHashError, rating::InvalidScoreError},
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
    util::NonPositiveDurationError,
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Unexpected, Visitor},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
    str::FromStr,
};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    TextLength(#[from] InvalidTextLengthError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidAuthTokenHashError),
    #[error(transparent)]
    GeoPoint(#[from] InvalidGeoPointError),
    #[error(transparent)]
    Score(#[from] InvalidScoreError),
    #[error("Unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("Status timeline is inconsistent with the post status")]
    InconsistentTimeline,
    #[error("Expiry date must be in the future")]
    ExpiryNotInFuture,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct FoodshareEpoch;
impl Epoch for FoodshareEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type FoodshareSnowflake = Snowflake<FoodshareEpoch>;
pub type FoodshareSnowflakeGenerator = SnowflakeGenerator<FoodshareEpoch>;

/// Ids travel as decimal strings on the wire since snowflakes exceed the
/// integer precision of JSON consumers. Numbers are still accepted.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Id<Marker>(FoodshareSnowflake, PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: FoodshareSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> FoodshareSnowflake {
        self.0
    }

    /// The id as stored in signed 64 bit database columns.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(u64::from_str(s)?.into())
    }
}

impl<Marker> From<FoodshareSnowflake> for Id<Marker> {
    fn from(value: FoodshareSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(FoodshareSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

impl<Marker> Serialize for Id<Marker> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

struct IdVisitor<Marker>(PhantomData<Marker>);

impl<Marker> Visitor<'_> for IdVisitor<Marker> {
    type Value = Id<Marker>;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a snowflake id as a string or unsigned integer")
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.into())
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u64::try_from(value)
            .map(Id::from)
            .map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        value
            .parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
    }
}

impl<'de, Marker> Deserialize<'de> for Id<Marker> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(IdVisitor(PhantomData))
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("Text must be between {min} and {max} characters long, got {len}")]
pub struct InvalidTextLengthError {
    min: usize,
    max: usize,
    len: usize,
}

/// Trimmed text whose length in chars lies within `MIN..=MAX`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct BoundedText<const MIN: usize, const MAX: usize>(String);

impl<const MIN: usize, const MAX: usize> BoundedText<MIN, MAX> {
    pub fn new(text: impl AsRef<str>) -> Result<Self, InvalidTextLengthError> {
        let trimmed = text.as_ref().trim();
        let len = trimmed.chars().count();

        if (MIN..=MAX).contains(&len) {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(InvalidTextLengthError {
                min: MIN,
                max: MAX,
                len,
            })
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<const MAX: usize> BoundedText<0, MAX> {
    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }
}

impl<const MIN: usize, const MAX: usize> Display for BoundedText<MIN, MAX> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de, const MIN: usize, const MAX: usize> Deserialize<'de> for BoundedText<MIN, MAX> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Self::new(inner).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{BoundedText, Id, post::PostMarker};

    type Short = BoundedText<1, 5>;

    #[test]
    fn bounded_text_trims_and_checks_length() {
        assert_eq!(Short::new("  abc ").unwrap().get(), "abc");
        assert_eq!(Short::new("äöüßé").unwrap().get(), "äöüßé");
        assert!(Short::new("   ").is_err());
        assert!(Short::new("abcdef").is_err());
        assert!(BoundedText::<0, 5>::new("").is_ok());
    }

    #[test]
    fn bounded_text_rejects_during_deserialization() {
        assert!(serde_json::from_str::<Short>("\"ok\"").is_ok());
        assert!(serde_json::from_str::<Short>("\"too long\"").is_err());
    }

    #[test]
    fn ids_are_strings_on_the_wire() {
        let id = Id::<PostMarker>::from(9_007_199_254_740_993);

        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"9007199254740993\""
        );
        assert_eq!(
            serde_json::from_str::<Id<PostMarker>>("\"9007199254740993\"").unwrap(),
            id
        );
        assert_eq!(serde_json::from_str::<Id<PostMarker>>("42").unwrap(), Id::from(42));
        assert!(serde_json::from_str::<Id<PostMarker>>("\"abc\"").is_err());
        assert!(serde_json::from_str::<Id<PostMarker>>("-1").is_err());
    }

    #[test]
    fn db_representation_round_trips() {
        let id = Id::<PostMarker>::from(u64::MAX - 7);
        assert_eq!(Id::<PostMarker>::from_db(id.to_db()), id);
    }
}
