//! CB58 text encoding and SHA-256 derivation.
//!
//! CB58 is Base58 with the last four bytes of the payload's SHA-256 digest
//! appended as a checksum.

use sha2::{Digest, Sha256};
use thiserror::Error;

const CHECKSUM_LEN: usize = 4;

/// Errors produced while decoding CB58 text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Cb58Error {
    #[error("base58 decoding error: {0}")]
    Base58(String),

    #[error("input is shorter than the checksum")]
    MissingChecksum,

    #[error("invalid checksum")]
    BadChecksum,
}

/// Returns the SHA-256 digest of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = sha256(data);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[32 - CHECKSUM_LEN..]);
    out
}

/// Encodes `bytes` as CB58.
///
/// ```
/// use avalanche_ids::{decode_cb58, encode_cb58};
///
/// let text = encode_cb58(&[1, 2, 3]);
/// assert_eq!(decode_cb58(&text).unwrap(), vec![1, 2, 3]);
/// ```
#[must_use]
pub fn encode_cb58(bytes: &[u8]) -> String {
    let mut payload = Vec::with_capacity(bytes.len() + CHECKSUM_LEN);
    payload.extend_from_slice(bytes);
    payload.extend_from_slice(&checksum(bytes));
    bs58::encode(payload).into_string()
}

/// Decodes CB58 text, verifying the trailing checksum.
pub fn decode_cb58(text: &str) -> Result<Vec<u8>, Cb58Error> {
    let mut decoded = bs58::decode(text)
        .into_vec()
        .map_err(|e| Cb58Error::Base58(e.to_string()))?;
    if decoded.len() < CHECKSUM_LEN {
        return Err(Cb58Error::MissingChecksum);
    }
    let provided = decoded.split_off(decoded.len() - CHECKSUM_LEN);
    if provided != checksum(&decoded) {
        return Err(Cb58Error::BadChecksum);
    }
    Ok(decoded)
}
