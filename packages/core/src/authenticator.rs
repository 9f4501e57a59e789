//! Message authentication keyed by the handshake secret.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::key_agreement::SharedSecret;

type HmacSha256Mac = Hmac<Sha256>;

/// Capability for producing and checking message tags.
///
/// Implementations are immutable after construction and shared between
/// concurrent callers.
pub trait MessageAuthenticator: Send + Sync {
    /// Tag `message`. Deterministic for a given key.
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// `true` iff `signature` is the tag of `message`, compared in constant time.
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// HMAC-SHA256 over the shared secret.
#[derive(Clone)]
pub struct HmacSha256 {
    secret: SharedSecret,
}

impl HmacSha256 {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    fn mac(&self) -> HmacSha256Mac {
        HmacSha256Mac::new_from_slice(self.secret.as_bytes()).expect("HMAC can take key of any size")
    }
}

impl fmt::Debug for HmacSha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSha256").finish_non_exhaustive()
    }
}

impl MessageAuthenticator for HmacSha256 {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let mut mac = self.mac();
        mac.update(message);
        mac.verify_slice(signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(key: &[u8]) -> SharedSecret {
        let mut bytes = [0u8; 32];
        bytes[..key.len()].copy_from_slice(key);
        SharedSecret::from_bytes(bytes)
    }

    // HMAC zero-pads short keys to the block size, so a key followed by zeros
    // produces the same tag as the short key itself.
    const VECTORS: [(&[u8], &str); 3] = [
        (
            &[0x63],
            "9ddc24e28fce94ebe67a9846b66d593302de1f95e564b0628e034d79d504a4fd",
        ),
        (
            &[0x04, 0x05, 0x06],
            "e59a6db987e389320c24a21be1deb9726f554414314c86d86cee04dbfd790d82",
        ),
        (
            &[0x07, 0x08, 0x09],
            "b747a9c3a6d62ea317484ade42d3a3bb32c22510111c35fb8239bd8d56808100",
        ),
    ];

    #[test]
    fn known_tags_for_message_one() {
        for (key, tag_hex) in VECTORS {
            let auth = HmacSha256::new(padded(key));
            assert_eq!(auth.sign(b"1"), hex::decode(tag_hex).unwrap());
        }
    }

    #[test]
    fn known_tags_verify() {
        for (key, tag_hex) in VECTORS {
            let auth = HmacSha256::new(padded(key));
            assert!(auth.verify(b"1", &hex::decode(tag_hex).unwrap()));
        }
    }

    #[test]
    fn sign_is_deterministic() {
        let auth = HmacSha256::new(SharedSecret::from_bytes([42; 32]));
        assert_eq!(auth.sign(b"GET\n/\n"), auth.sign(b"GET\n/\n"));
        assert_eq!(auth.sign(b"x").len(), 32);
    }

    #[test]
    fn tampered_tag_rejected() {
        let auth = HmacSha256::new(SharedSecret::from_bytes([42; 32]));
        let mut tag = auth.sign(b"message");
        tag[0] ^= 0x01;
        assert!(!auth.verify(b"message", &tag));
    }

    #[test]
    fn truncated_tag_rejected() {
        let auth = HmacSha256::new(SharedSecret::from_bytes([42; 32]));
        let tag = auth.sign(b"message");
        assert!(!auth.verify(b"message", &tag[..16]));
        assert!(!auth.verify(b"message", &[]));
    }

    #[test]
    fn different_keys_disagree() {
        let a = HmacSha256::new(SharedSecret::from_bytes([1; 32]));
        let b = HmacSha256::new(SharedSecret::from_bytes([2; 32]));
        assert!(!b.verify(b"message", &a.sign(b"message")));
    }
}
