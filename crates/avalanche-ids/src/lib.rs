//! Identifier types used by the Snow consensus crates.
//!
//! - [`Id`]: 32-byte identifier for blocks, vertices, transactions and chains
//! - [`NodeId`]: 20-byte identifier for validator nodes
//!
//! Both render as CB58 text; `NodeId` carries a `NodeID-` prefix.

/// Length of an [`Id`] in bytes.
pub const ID_LEN: usize = 32;

/// Length of a [`NodeId`] in bytes.
pub const NODE_ID_LEN: usize = 20;

/// Errors returned when parsing identifiers.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("cb58 decoding failed: {0}")]
    Cb58(#[from] Cb58Error),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("missing NodeID- prefix")]
    MissingPrefix,
}

/// Implements the byte-array plumbing shared by the fixed-size id types.
macro_rules! fixed_bytes {
    ($name:ident, $len:expr) => {
        impl $name {
            /// The all-zero value.
            pub const EMPTY: Self = Self([0u8; $len]);

            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Copies `bytes` into a new value; the slice must be exactly the
            /// right length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, $crate::IdError> {
                let arr: [u8; $len] =
                    bytes
                        .try_into()
                        .map_err(|_| $crate::IdError::InvalidLength {
                            expected: $len,
                            actual: bytes.len(),
                        })?;
                Ok(Self(arr))
            }

            #[must_use]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0 == [0u8; $len]
            }

            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.collect_str(self)
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let text = String::deserialize(deserializer)?;
                    text.parse().map_err(serde::de::Error::custom)
                } else {
                    let bytes = <Vec<u8>>::deserialize(deserializer)?;
                    Self::from_slice(&bytes).map_err(serde::de::Error::custom)
                }
            }
        }
    };
}

pub(crate) use fixed_bytes;

mod encoding;
mod id;
mod node_id;

pub use encoding::{decode_cb58, encode_cb58, sha256, Cb58Error};
pub use id::Id;
pub use node_id::{NodeId, NODE_ID_PREFIX};
