//! Validator node identifier.

use std::fmt;
use std::str::FromStr;

use crate::encoding::{decode_cb58, encode_cb58};
use crate::{fixed_bytes, IdError, NODE_ID_LEN};

/// Prefix of the text form of a [`NodeId`].
pub const NODE_ID_PREFIX: &str = "NodeID-";

/// A 20-byte validator identifier, rendered as `NodeID-<cb58>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId([u8; NODE_ID_LEN]);

fixed_bytes!(NodeId, NODE_ID_LEN);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{NODE_ID_PREFIX}{}", encode_cb58(&self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl FromStr for NodeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(NODE_ID_PREFIX).ok_or(IdError::MissingPrefix)?;
        Self::from_slice(&decode_cb58(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefix() {
        let id = NodeId::EMPTY;
        assert_eq!(id.to_string(), "NodeID-111111111111111111116DBWJs");
    }

    #[test]
    fn test_parse_requires_prefix() {
        assert!(matches!(
            "111111111111111111116DBWJs".parse::<NodeId>(),
            Err(IdError::MissingPrefix)
        ));
        assert!("NodeID-111111111111111111116DBWJs"
            .parse::<NodeId>()
            .unwrap()
            .is_empty());
    }
}
