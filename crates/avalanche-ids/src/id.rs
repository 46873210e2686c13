//! 32-byte identifier.

use std::fmt;
use std::str::FromStr;

use crate::encoding::{decode_cb58, encode_cb58, sha256};
use crate::{fixed_bytes, IdError, ID_LEN};

/// A 32-byte identifier naming a block, vertex, transaction or chain.
///
/// Ids are ordered bytewise, which gives conflict sets a canonical order.
///
/// ```
/// use avalanche_ids::Id;
///
/// let red = Id::EMPTY.prefix(&[0]);
/// let blue = Id::EMPTY.prefix(&[1]);
/// assert_ne!(red, blue);
/// assert!(Id::EMPTY.is_empty());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id([u8; ID_LEN]);

fixed_bytes!(Id, ID_LEN);

impl Id {
    /// Number of addressable bits.
    pub const NUM_BITS: usize = ID_LEN * 8;

    /// Returns bit `index`, counting from the least significant bit of the
    /// first byte.
    ///
    /// # Panics
    ///
    /// Panics if `index >= Id::NUM_BITS`.
    #[must_use]
    pub fn bit(&self, index: usize) -> usize {
        assert!(index < Self::NUM_BITS, "bit index {index} out of range");
        usize::from((self.0[index / 8] >> (index % 8)) & 1)
    }

    /// Derives a new id by hashing the big-endian `prefixes` followed by this
    /// id's bytes.
    #[must_use]
    pub fn prefix(&self, prefixes: &[u64]) -> Self {
        let mut buf = Vec::with_capacity(prefixes.len() * 8 + ID_LEN);
        for p in prefixes {
            buf.extend_from_slice(&p.to_be_bytes());
        }
        buf.extend_from_slice(&self.0);
        Self(sha256(&buf))
    }

    /// Returns the id of the SHA-256 digest of `bytes`.
    #[must_use]
    pub fn from_hash(bytes: &[u8]) -> Self {
        Self(sha256(bytes))
    }

    /// Index of the first bit in `[from, to)` where `self` and `other`
    /// differ, or `None` if they agree on the whole range.
    #[must_use]
    pub fn first_difference(&self, other: &Self, from: usize, to: usize) -> Option<usize> {
        (from..to.min(Self::NUM_BITS)).find(|&i| self.bit(i) != other.bit(i))
    }

    /// True if `self` and `other` agree on every bit in `[from, to)`.
    #[must_use]
    pub fn equal_subset(&self, other: &Self, from: usize, to: usize) -> bool {
        self.first_difference(other, from, to).is_none()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_cb58(&self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&decode_cb58(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_form() {
        assert_eq!(Id::EMPTY.to_string(), "11111111111111111111111111111111LpoYY");
        let parsed: Id = "11111111111111111111111111111111LpoYY".parse().unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_from_slice_length() {
        assert!(Id::from_slice(&[1; 32]).is_ok());
        assert!(matches!(
            Id::from_slice(&[1, 2, 3]),
            Err(IdError::InvalidLength { expected: 32, actual: 3 })
        ));
    }

    #[test]
    fn test_bit() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0b0000_0001;
        bytes[1] = 0b0000_0010;
        let id = Id::from_bytes(bytes);
        assert_eq!(id.bit(0), 1);
        assert_eq!(id.bit(1), 0);
        assert_eq!(id.bit(9), 1);
        assert_eq!(id.bit(10), 0);
    }

    #[test]
    fn test_first_difference() {
        let a = Id::from_bytes([0u8; 32]);
        let mut bytes = [0u8; 32];
        bytes[2] = 0b0000_0100;
        let b = Id::from_bytes(bytes);
        assert_eq!(a.first_difference(&b, 0, Id::NUM_BITS), Some(18));
        assert_eq!(a.first_difference(&b, 0, 18), None);
        assert!(a.equal_subset(&b, 19, Id::NUM_BITS));
    }

    #[test]
    fn test_prefix_is_deterministic() {
        let id = Id::from_bytes([1u8; 32]);
        assert_eq!(id.prefix(&[1, 2]), id.prefix(&[1, 2]));
        assert_ne!(id.prefix(&[1, 2]), id.prefix(&[2, 1]));
    }

    #[test]
    fn test_json_uses_text_form() {
        let id = Id::from_bytes([42u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
