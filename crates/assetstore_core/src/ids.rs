//! Strongly typed identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            derive_more::Display,
            derive_more::From,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

record_id!(
    /// Identifier of a configured backend.
    AssetstoreId
);
record_id!(
    /// Identifier of a logical file record.
    FileId
);
record_id!(
    /// Identifier of an in-flight upload.
    UploadId
);
record_id!(
    /// Identifier of a folder in the external hierarchy.
    FolderId
);
record_id!(
    /// Identifier of an item in the external hierarchy.
    ItemId
);
record_id!(
    /// Identifier of a user in the external hierarchy.
    UserId
);
