//! Keyed message authentication using BLAKE2b.

use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use subtle::ConstantTimeEq;

use sealvault_common::{Error, Result};

/// MAC tag size (32 bytes).
pub const TAG_SIZE: usize = 32;

type Blake2bMac256 = Blake2bMac<U32>;

/// Compute a MAC over the concatenation of `parts`.
///
/// # Errors
/// - Returns error if `key` is longer than BLAKE2b accepts (64 bytes)
pub fn compute(key: &[u8], parts: &[&[u8]]) -> Result<[u8; TAG_SIZE]> {
    let mut mac = <Blake2bMac256 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("Invalid MAC key: {}", e)))?;
    for part in parts {
        mac.update(part);
    }

    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

/// Verify a MAC tag in constant time.
///
/// # Errors
/// - Returns [`Error::Integrity`] if the tag does not match
pub fn verify(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> Result<()> {
    let expected = compute(key, parts)?;
    if bool::from(expected.as_slice().ct_eq(tag)) {
        Ok(())
    } else {
        Err(Error::Integrity("MAC mismatch".to_string()))
    }
}
