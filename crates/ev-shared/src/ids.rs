//! Opaque identifier newtypes.
//!
//! Kept as thin `String` wrappers rather than integers because several of
//! them (`PileId`, queue numbers embedded in `RequestId`) are assigned by
//! humans or formatted for display, not generated by a database sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

id_newtype!(PileId);
id_newtype!(UserId);
id_newtype!(RequestId);
id_newtype!(SessionId);
id_newtype!(BillId);
