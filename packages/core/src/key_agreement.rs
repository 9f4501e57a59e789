//! Ephemeral ECDH key agreement.
//!
//! A [`KeyAgreement`] produces a fresh public key for each login handshake and,
//! once the server answers with its own public key, turns the pair into a
//! 32-byte [`SharedSecret`]:
//!
//! ```text
//! secret = SHA-256( X( private_scalar · peer_point ) )
//! ```
//!
//! The X coordinate is hashed at its fixed field width. Points travel in the
//! SEC1 uncompressed encoding `0x04 ‖ X ‖ Y`.
//!
//! [`Ecdh`] is the only implementation shipped; it is generic over the
//! RustCrypto Weierstrass curves and defaults to NIST P-256 via [`EcdhP256`].

use std::fmt;
use std::str::FromStr;

use elliptic_curve::generic_array::typenum::Unsigned;
use elliptic_curve::sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint};
use elliptic_curve::{AffinePoint, CurveArithmetic, FieldBytes, FieldBytesSize, PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// SEC1 tag byte for an uncompressed point.
const UNCOMPRESSED_TAG: u8 = 0x04;

/// Out-of-range draws are retried; the chance of a single miss on P-256 is about 2^-32.
const KEYGEN_ATTEMPTS: usize = 8;

/// Errors returned by [`KeyAgreement`] implementations.
#[derive(Debug, Error, PartialEq)]
pub enum KeyAgreementError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid peer public key: {0}")]
    InvalidPeerKey(String),

    #[error("no key pair in flight; generate a public key first")]
    MissingKeyPair,
}

/// The 32-byte key material produced by a completed handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Capability for one-shot Diffie–Hellman key agreement.
///
/// An instance carries at most one handshake at a time: each call to
/// [`generate_public_key`](KeyAgreement::generate_public_key) replaces the
/// stored private scalar, and [`derive_shared_secret`](KeyAgreement::derive_shared_secret)
/// consumes it.
pub trait KeyAgreement: Send {
    /// Generate a fresh private scalar and return the uncompressed public point.
    fn generate_public_key(&mut self) -> Result<Vec<u8>, KeyAgreementError>;

    /// Combine the stored private scalar with the peer's uncompressed point.
    ///
    /// # Errors
    ///
    /// - [`KeyAgreementError::InvalidPeerKey`] if the encoding is malformed or
    ///   the point is not on the curve.
    /// - [`KeyAgreementError::MissingKeyPair`] if no scalar is stored.
    fn derive_shared_secret(&mut self, peer_public_key: &[u8]) -> Result<SharedSecret, KeyAgreementError>;
}

/// ECDH over the curve `C`.
pub struct Ecdh<C: CurveArithmetic> {
    secret: Option<SecretKey<C>>,
}

/// ECDH over NIST P-256, the default curve.
pub type EcdhP256 = Ecdh<p256::NistP256>;

/// ECDH over NIST P-384.
pub type EcdhP384 = Ecdh<p384::NistP384>;

impl<C: CurveArithmetic> Ecdh<C> {
    pub fn new() -> Self {
        Self { secret: None }
    }

    /// Restore a known private scalar (big-endian). Rejects zero and values
    /// outside the curve order.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyAgreementError> {
        let secret = SecretKey::<C>::from_slice(bytes)
            .map_err(|_| KeyAgreementError::KeyGeneration("invalid private scalar".into()))?;
        Ok(Self {
            secret: Some(secret),
        })
    }
}

impl<C: CurveArithmetic> Default for Ecdh<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: CurveArithmetic> fmt::Debug for Ecdh<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ecdh")
            .field("key_pair_in_flight", &self.secret.is_some())
            .finish()
    }
}

impl<C> KeyAgreement for Ecdh<C>
where
    C: CurveArithmetic,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    FieldBytesSize<C>: ModulusSize,
    SecretKey<C>: Send,
{
    fn generate_public_key(&mut self) -> Result<Vec<u8>, KeyAgreementError> {
        let secret = random_secret_key::<C>()?;
        let point = secret.public_key().to_encoded_point(false);
        self.secret = Some(secret);
        Ok(point.as_bytes().to_vec())
    }

    fn derive_shared_secret(&mut self, peer_public_key: &[u8]) -> Result<SharedSecret, KeyAgreementError> {
        let peer = decode_uncompressed::<C>(peer_public_key)?;
        let secret = self.secret.take().ok_or(KeyAgreementError::MissingKeyPair)?;

        let shared = elliptic_curve::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        let digest = Sha256::digest(shared.raw_secret_bytes().as_slice());
        Ok(SharedSecret(digest.into()))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn random_secret_key<C: CurveArithmetic>() -> Result<SecretKey<C>, KeyAgreementError> {
    let mut bytes = FieldBytes::<C>::default();
    for _ in 0..KEYGEN_ATTEMPTS {
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| KeyAgreementError::KeyGeneration(e.to_string()))?;
        if let Ok(secret) = SecretKey::<C>::from_bytes(&bytes) {
            return Ok(secret);
        }
    }
    Err(KeyAgreementError::KeyGeneration(
        "random source kept producing out-of-range scalars".into(),
    ))
}

/// Decode `0x04 ‖ X ‖ Y`, rejecting anything that is not a point on `C`.
fn decode_uncompressed<C>(bytes: &[u8]) -> Result<PublicKey<C>, KeyAgreementError>
where
    C: CurveArithmetic,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    FieldBytesSize<C>: ModulusSize,
{
    let expected_len = 1 + 2 * <FieldBytesSize<C> as Unsigned>::USIZE;
    if bytes.first() != Some(&UNCOMPRESSED_TAG) {
        return Err(KeyAgreementError::InvalidPeerKey(
            "expected uncompressed point (0x04 prefix)".into(),
        ));
    }
    if bytes.len() != expected_len {
        return Err(KeyAgreementError::InvalidPeerKey(format!(
            "expected {expected_len} bytes, got {}",
            bytes.len()
        )));
    }
    PublicKey::<C>::from_sec1_bytes(bytes)
        .map_err(|_| KeyAgreementError::InvalidPeerKey("point is not on the curve".into()))
}

// ── Curve selection ──────────────────────────────────────────────────────────

/// Curves a client can be configured with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Curve {
    #[default]
    P256,
    P384,
}

impl Curve {
    /// A fresh key-agreement instance for this curve.
    pub fn key_agreement(self) -> Box<dyn KeyAgreement> {
        match self {
            Curve::P256 => Box::new(EcdhP256::new()),
            Curve::P384 => Box::new(EcdhP384::new()),
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::P256 => f.write_str("p256"),
            Curve::P384 => f.write_str("p384"),
        }
    }
}

impl FromStr for Curve {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p256" | "p-256" | "secp256r1" => Ok(Curve::P256),
            "p384" | "p-384" | "secp384r1" => Ok(Curve::P384),
            other => Err(format!("unknown curve: {other:?} (expected p256 or p384)")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
