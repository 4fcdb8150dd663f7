//! Time-ordered 64 bit ids.
//!
//! From the most significant bit: 42 bits of milliseconds since the epoch,
//! 5 bits worker id, 5 bits process id, 12 bits per-generator sequence.
//! Sorting snowflakes therefore sorts by creation time.

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::UtcDateTime;

pub const TIMESTAMP_BITS: u32 = 42;
pub const WORKER_ID_BITS: u32 = 5;
pub const PROCESS_ID_BITS: u32 = 5;
pub const SEQUENCE_BITS: u32 = 12;

const SEQUENCE_SHIFT: u32 = 0;
const PROCESS_ID_SHIFT: u32 = SEQUENCE_SHIFT + SEQUENCE_BITS;
const WORKER_ID_SHIFT: u32 = PROCESS_ID_SHIFT + PROCESS_ID_BITS;
const TIMESTAMP_SHIFT: u32 = WORKER_ID_SHIFT + WORKER_ID_BITS;

const fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("{part} {value} does not fit into {bits} bits")]
pub struct SnowflakePartOutOfRangeError {
    part: &'static str,
    value: u8,
    bits: u32,
}

macro_rules! snowflake_part {
    ($name:ident, $bits:ident) => {
        #[derive(
            Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "u8", into = "u8")]
        pub struct $name(u8);

        impl $name {
            #[must_use]
            pub fn new(id: u8) -> Option<Self> {
                (u64::from(id) <= mask($bits)).then_some(Self(id))
            }

            #[must_use]
            pub fn get(self) -> u8 {
                self.0
            }
        }

        impl TryFrom<u8> for $name {
            type Error = SnowflakePartOutOfRangeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(SnowflakePartOutOfRangeError {
                    part: stringify!($name),
                    value,
                    bits: $bits,
                })
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

snowflake_part!(WorkerId, WORKER_ID_BITS);
snowflake_part!(ProcessId, PROCESS_ID_BITS);

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    /// Parts wider than their field are truncated.
    #[must_use]
    pub fn from_parts(
        timestamp_millis: u64,
        worker_id: WorkerId,
        process_id: ProcessId,
        sequence: u16,
    ) -> Self {
        let snowflake = (timestamp_millis & mask(TIMESTAMP_BITS)) << TIMESTAMP_SHIFT
            | u64::from(worker_id.get()) << WORKER_ID_SHIFT
            | u64::from(process_id.get()) << PROCESS_ID_SHIFT
            | (u64::from(sequence) & mask(SEQUENCE_BITS)) << SEQUENCE_SHIFT;

        Self::new(snowflake)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp_millis(self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT) & mask(TIMESTAMP_BITS)
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        #[allow(clippy::cast_possible_truncation)]
        WorkerId(((self.0 >> WORKER_ID_SHIFT) & mask(WORKER_ID_BITS)) as u8)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        #[allow(clippy::cast_possible_truncation)]
        ProcessId(((self.0 >> PROCESS_ID_SHIFT) & mask(PROCESS_ID_BITS)) as u8)
    }

    #[must_use]
    pub fn sequence(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        {
            ((self.0 >> SEQUENCE_SHIFT) & mask(SEQUENCE_BITS)) as u16
        }
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        #[allow(clippy::cast_possible_wrap)]
        let millis = self.timestamp_millis() as i64;
        SnowflakeEpoch::EPOCH_TIME + time::Duration::milliseconds(millis)
    }
}

pub fn timestamp_millis<SnowflakeEpoch: Epoch>(
    time: UtcDateTime,
) -> Result<u64, SnowflakeTimestampError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    if millis < 0 {
        return Err(SnowflakeTimestampError::TimeBeforeEpoch);
    }

    let millis = u64::try_from(millis).map_err(|_| SnowflakeTimestampError::TimestampTooLarge)?;
    if millis > mask(TIMESTAMP_BITS) {
        return Err(SnowflakeTimestampError::TimestampTooLarge);
    }

    Ok(millis)
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    next_sequence: u16,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            next_sequence: 0,
            phantom_data: PhantomData,
        }
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        let millis = timestamp_millis::<SnowflakeEpoch>(time)?;

        let sequence = self.next_sequence;
        #[allow(clippy::cast_possible_truncation)]
        {
            self.next_sequence = ((u64::from(sequence) + 1) & mask(SEQUENCE_BITS)) as u16;
        }

        Ok(Snowflake::from_parts(
            millis,
            self.worker_id,
            self.process_id,
            sequence,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        self.generate_at(UtcDateTime::now())
    }
}
