//! Typed ID wrappers for directory items and queue entries.
//!
//! The four root folders of the directory tree use fixed, well-known ids so
//! that every database starts with the same layout.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Borrow the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a node in the directory tree.
    DavItemId
);

uuid_id!(
    /// Identifier of a queued job. Reused as the id of its history record.
    QueueItemId
);

impl DavItemId {
    /// The root directory `/`.
    pub const ROOT: Self = Self(Uuid::from_u128(0));
    /// `/nzbs`, where submitted NZB documents are exposed.
    pub const NZBS: Self = Self(Uuid::from_u128(1));
    /// `/content`, the parent of every category folder.
    pub const CONTENT: Self = Self(Uuid::from_u128(2));
    /// `/completed-symlinks`.
    pub const SYMLINKS: Self = Self(Uuid::from_u128(3));
}
