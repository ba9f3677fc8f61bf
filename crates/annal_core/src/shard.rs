use std::fmt;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

/// Records written through the year-sharded path.
pub trait Sharded {
    fn effective_timestamp(&self) -> Option<OffsetDateTime>;
    fn stamp_timestamp(&mut self, at: OffsetDateTime);
}

/// Calendar year selecting a backing store (`DB_<year>`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ShardKey(pub i32);

impl ShardKey {
    pub const PREFIX: &'static str = "DB_";

    /// Uses the UTC calendar year.
    pub fn from_timestamp(at: OffsetDateTime) -> Self {
        Self(at.to_offset(UtcOffset::UTC).year())
    }

    pub fn current() -> Self {
        Self::from_timestamp(OffsetDateTime::now_utc())
    }

    /// Uses the record's timestamp; a record without one is stamped with `now`.
    pub fn for_record<R: Sharded + ?Sized>(record: &mut R, now: OffsetDateTime) -> Self {
        match record.effective_timestamp() {
            Some(at) => Self::from_timestamp(at),
            None => {
                record.stamp_timestamp(now);
                Self::from_timestamp(now)
            }
        }
    }

    pub fn year(self) -> i32 {
        self.0
    }

    pub fn store_key(self) -> String {
        format!("{}{}", Self::PREFIX, self.0)
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}
