//! Creation-ordered entity identities.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use parking_lot::Mutex;
use time::OffsetDateTime;
use ulid::{Generator, Ulid};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Opaque, globally unique entity identity.
///
/// Identities are 128-bit ULIDs drawn from one process-wide monotonic
/// generator, so an id created later always compares greater. Sorting by id
/// therefore sorts by creation recency.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectId(Ulid);

impl ObjectId {
    /// Generates a new identity, greater than every identity generated before it.
    #[must_use]
    pub fn new() -> Self {
        let mut generator = GENERATOR.lock();
        loop {
            // An exhausted millisecond frees up once the clock ticks.
            if let Ok(ulid) = generator.generate() {
                return Self(ulid);
            }
            std::thread::yield_now();
        }
    }

    /// Builds an identity from its raw 128-bit representation.
    ///
    /// Useful for fixtures that need a known ordering.
    #[must_use]
    pub const fn from_u128(raw: u128) -> Self {
        Self(Ulid(raw))
    }

    /// Returns the raw 128-bit representation.
    #[must_use]
    pub const fn to_u128(self) -> u128 {
        self.0 .0
    }

    /// Returns the creation time encoded in the identity.
    #[must_use]
    pub fn timestamp(self) -> OffsetDateTime {
        let millis = i128::from(self.0.timestamp_ms());
        OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// Parses the canonical 26 character string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid identity.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::new(ErrorKind::SerializationError(format!("bad id {s:?}: {e}"))))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
