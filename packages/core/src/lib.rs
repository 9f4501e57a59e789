//! Pure-logic request signing for WebData REST clients.
//!
//! This crate has **no I/O** — no networking, no async runtime. It provides
//! the three pieces a client needs to authenticate requests over an untrusted
//! channel without a pre-shared key; `webdata-client` wires them to HTTP.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`key_agreement`] | Ephemeral ECDH: [`KeyAgreement`], [`Ecdh`], [`SharedSecret`] |
//! | [`authenticator`] | HMAC-SHA256 tags: [`MessageAuthenticator`], [`HmacSha256`] |
//! | [`canonical`] | Canonical request strings, [`sign_request`] and [`verify_request`] |
//! | [`headers`] | Reserved header names and protocol constants |
//!
//! # Handshake and signing
//!
//! ```rust,ignore
//! use webdata_auth::{EcdhP256, HmacSha256, KeyAgreement, SignableRequest, sign_request};
//!
//! let mut ecdh = EcdhP256::new();
//! let our_public = ecdh.generate_public_key()?;      // sent as hex in Auth-Info
//! let secret = ecdh.derive_shared_secret(&server_public)?;
//! let hmac = HmacSha256::new(secret);
//!
//! let mut req = SignableRequest::new(http::Method::GET, "/API/REST/Entity/Load");
//! sign_request(&mut req, &hmac)?;                    // sets Auth-Info + Signed-Headers
//! ```

pub mod authenticator;
pub mod canonical;
pub mod headers;
pub mod key_agreement;

pub use authenticator::{HmacSha256, MessageAuthenticator};
pub use canonical::{
    canonicalize, content_hash, declared_headers, sign_request, verify_request, CanonicalRequest,
    SignableRequest, SigningError,
};
pub use key_agreement::{
    Curve, Ecdh, EcdhP256, EcdhP384, KeyAgreement, KeyAgreementError, SharedSecret,
};
