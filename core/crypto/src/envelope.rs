//! Sealed record envelope.
//!
//! Every blob sealvault writes to the Datastore is an [`Envelope`]: the
//! padded plaintext is encrypted under the record's encryption key, then a
//! MAC under the record's integrity key is computed over the nonce, the
//! ciphertext and the record's context (encrypt-then-MAC). [`open`] checks
//! the MAC in constant time before anything is decrypted.
//!
//! # Wire Format
//!
//! ```text
//! [ nonce: 24 bytes ][ tag: 32 bytes ][ ciphertext: variable ]
//! ```

use crate::aead::{self, NONCE_SIZE};
use crate::keys::SealKeys;
use crate::mac::{self, TAG_SIZE};
use sealvault_common::{Error, Result};

/// Padding granularity in bytes.
pub const BLOCK_SIZE: usize = 16;

const MAC_DOMAIN: &[u8] = b"sealvault/envelope/v1";

/// Encrypted and authenticated record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    nonce: [u8; NONCE_SIZE],
    tag: [u8; TAG_SIZE],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize to the wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.tag);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Parse the wire format.
    ///
    /// # Errors
    /// - Returns [`Error::Integrity`] if the input is too short to be an envelope
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::Integrity(format!(
                "Envelope too short: {} bytes",
                bytes.len()
            )));
        }

        let (nonce_bytes, rest) = bytes.split_at(NONCE_SIZE);
        let (tag_bytes, ciphertext) = rest.split_at(TAG_SIZE);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(nonce_bytes);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(tag_bytes);

        Ok(Self {
            nonce,
            tag,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Pad to a multiple of [`BLOCK_SIZE`].
///
/// The last byte holds the pad length (1..=BLOCK_SIZE), the other pad
/// bytes are zero. A block-aligned input gains a full block.
pub fn pad(plaintext: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - (plaintext.len() % BLOCK_SIZE);
    let mut padded = Vec::with_capacity(plaintext.len() + pad_len);
    padded.extend_from_slice(plaintext);
    padded.resize(plaintext.len() + pad_len - 1, 0);
    padded.push(pad_len as u8);
    padded
}

/// Strip padding added by [`pad`].
///
/// # Errors
/// - Returns [`Error::Integrity`] if the padding is malformed
pub fn unpad(mut padded: Vec<u8>) -> Result<Vec<u8>> {
    let malformed = || Error::Integrity("Malformed padding".to_string());

    if padded.is_empty() || padded.len() % BLOCK_SIZE != 0 {
        return Err(malformed());
    }
    let pad_len = *padded.last().ok_or_else(malformed)? as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE {
        return Err(malformed());
    }

    let body_len = padded.len() - pad_len;
    if padded[body_len..padded.len() - 1].iter().any(|&b| b != 0) {
        return Err(malformed());
    }

    padded.truncate(body_len);
    Ok(padded)
}

fn tag_parts<'a>(
    context_len: &'a [u8; 8],
    context: &'a [u8],
    nonce: &'a [u8],
    ciphertext: &'a [u8],
) -> [&'a [u8]; 5] {
    [MAC_DOMAIN, context_len, context, nonce, ciphertext]
}

/// Encrypt and authenticate `plaintext`, binding it to `context`.
///
/// `context` is normally the location the record will be written to, so
/// a valid record copied to another location no longer opens.
///
/// # Errors
/// - Returns error if a key has the wrong length
pub fn seal(keys: &SealKeys, context: &[u8], plaintext: &[u8]) -> Result<Envelope> {
    let padded = pad(plaintext);
    let (nonce, ciphertext) = aead::encrypt(keys.encryption().as_bytes(), context, &padded)?;

    let context_len = (context.len() as u64).to_be_bytes();
    let tag = mac::compute(
        keys.integrity().as_bytes(),
        &tag_parts(&context_len, context, &nonce, &ciphertext),
    )?;

    Ok(Envelope {
        nonce,
        tag,
        ciphertext,
    })
}

/// Verify and decrypt an envelope.
///
/// # Errors
/// - Returns [`Error::Integrity`] on MAC mismatch, decryption failure or
///   malformed padding. Nothing is decrypted unless the MAC verifies.
pub fn open(keys: &SealKeys, context: &[u8], envelope: &Envelope) -> Result<Vec<u8>> {
    let context_len = (context.len() as u64).to_be_bytes();
    mac::verify(
        keys.integrity().as_bytes(),
        &tag_parts(&context_len, context, &envelope.nonce, &envelope.ciphertext),
        &envelope.tag,
    )?;

    let padded = aead::decrypt(
        keys.encryption().as_bytes(),
        &envelope.nonce,
        context,
        &envelope.ciphertext,
    )?;
    unpad(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SubKey;
    use proptest::prelude::*;

    fn keys() -> SealKeys {
        SealKeys::new(SubKey::from_bytes([1u8; 32]), SubKey::from_bytes([2u8; 32]))
    }

    #[test]
    fn test_seal_open_edge_lengths() {
        let keys = keys();
        for len in [0, 1, BLOCK_SIZE - 1, BLOCK_SIZE, BLOCK_SIZE + 1, 5 * BLOCK_SIZE] {
            let plaintext = vec![0xA5u8; len];
            let envelope = seal(&keys, b"loc", &plaintext).unwrap();
            let parsed = Envelope::from_bytes(&envelope.to_bytes()).unwrap();

            assert_eq!(open(&keys, b"loc", &parsed).unwrap(), plaintext, "len {}", len);
        }
    }

    #[test]
    fn test_pad_lengths() {
        assert_eq!(pad(b"").len(), BLOCK_SIZE);
        assert_eq!(pad(&[0u8; BLOCK_SIZE - 1]).len(), BLOCK_SIZE);
        assert_eq!(pad(&[0u8; BLOCK_SIZE]).len(), 2 * BLOCK_SIZE);
        assert_eq!(*pad(b"abc").last().unwrap() as usize, BLOCK_SIZE - 3);
    }

    #[test]
    fn test_unpad_rejects_malformed() {
        let mut zero_pad = vec![0u8; BLOCK_SIZE];
        assert!(unpad(zero_pad.clone()).is_err());

        zero_pad[BLOCK_SIZE - 1] = (BLOCK_SIZE + 1) as u8;
        assert!(unpad(zero_pad).is_err());

        let mut dirty = pad(b"abc");
        dirty[BLOCK_SIZE - 2] = 0xFF;
        assert!(unpad(dirty).is_err());

        assert!(unpad(Vec::new()).is_err());
        assert!(unpad(vec![1u8; 5]).is_err());
    }

    #[test]
    fn test_wrong_keys_fail() {
        let envelope = seal(&keys(), b"loc", b"secret").unwrap();

        let wrong_mac = SealKeys::new(SubKey::from_bytes([1u8; 32]), SubKey::from_bytes([9u8; 32]));
        let wrong_enc = SealKeys::new(SubKey::from_bytes([9u8; 32]), SubKey::from_bytes([2u8; 32]));

        assert!(matches!(open(&wrong_mac, b"loc", &envelope), Err(Error::Integrity(_))));
        assert!(matches!(open(&wrong_enc, b"loc", &envelope), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_context_is_bound() {
        let envelope = seal(&keys(), b"here", b"secret").unwrap();
        assert!(open(&keys(), b"there", &envelope).is_err());
    }

    #[test]
    fn test_short_envelope_rejected() {
        assert!(matches!(
            Envelope::from_bytes(&[0u8; NONCE_SIZE + TAG_SIZE - 1]),
            Err(Error::Integrity(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_any_bit_flip_is_detected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..64),
            bit in any::<usize>(),
        ) {
            let keys = keys();
            let mut bytes = seal(&keys, b"loc", &plaintext).unwrap().to_bytes();
            let bit = bit % (bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);

            let result = Envelope::from_bytes(&bytes).and_then(|env| open(&keys, b"loc", &env));
            prop_assert!(matches!(result, Err(Error::Integrity(_))));
        }
    }
}
