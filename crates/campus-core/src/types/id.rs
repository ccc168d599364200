//! Newtype wrappers around backend-issued numeric identifiers.
//!
//! Using distinct types prevents accidentally passing an `EntryId` where a
//! `SlotId` is expected. All IDs serialize as bare JSON numbers.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapper around `i64`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Create an identifier from the raw backend value.
            pub fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Return the raw backend value.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a bookable office-hours slot.
    SlotId
);

define_id!(
    /// Identifier of a queue entry within a slot.
    EntryId
);

define_id!(
    /// Identifier of the student who owns a queue entry.
    SubjectId
);

define_id!(
    /// Identifier of a notification or announcement.
    NotificationId
);
