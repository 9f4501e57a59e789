//! Errors surfaced by [`ClientSession`](crate::ClientSession).
//!
//! Every variant knows which stage produced it, so callers can tell a failed
//! login from a failed signed call without inspecting messages. Nothing is
//! retried or swallowed.

use std::fmt;

use webdata_auth::{KeyAgreementError, SigningError};

use crate::transport::TransportError;

/// Where in the session lifecycle an error arose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The login handshake (`authenticate`).
    Handshake,
    /// A signed call after login (`execute_signed`).
    Request,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Handshake => f.write_str("handshake"),
            Stage::Request => f.write_str("request"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The random source or curve failed while generating the ephemeral key.
    #[error("handshake: {0}")]
    KeyGeneration(KeyAgreementError),

    /// The server's public key was malformed or not on the curve.
    #[error("handshake: {0}")]
    InvalidPeerKey(KeyAgreementError),

    /// The login call returned an error status or an unusable response.
    #[error("handshake: authentication failed: {0}")]
    Authentication(String),

    /// A signed call was attempted before a successful login.
    #[error("request: session is not authenticated")]
    NotAuthenticated,

    #[error("request: {0}")]
    Signing(SigningError),

    #[error("{stage}: transport error: {source}")]
    Transport { stage: Stage, source: TransportError },

    /// The response body was not JSON of the expected shape.
    #[error("{stage}: cannot decode response (status {status}): {reason}")]
    Decode {
        stage: Stage,
        status: u16,
        reason: String,
    },
}

impl ClientError {
    pub fn stage(&self) -> Stage {
        match self {
            ClientError::KeyGeneration(_)
            | ClientError::InvalidPeerKey(_)
            | ClientError::Authentication(_) => Stage::Handshake,
            ClientError::NotAuthenticated | ClientError::Signing(_) => Stage::Request,
            ClientError::Transport { stage, .. } | ClientError::Decode { stage, .. } => *stage,
        }
    }
}

impl From<KeyAgreementError> for ClientError {
    fn from(e: KeyAgreementError) -> Self {
        match e {
            KeyAgreementError::InvalidPeerKey(_) => ClientError::InvalidPeerKey(e),
            KeyAgreementError::KeyGeneration(_) | KeyAgreementError::MissingKeyPair => {
                ClientError::KeyGeneration(e)
            }
        }
    }
}

impl From<SigningError> for ClientError {
    fn from(e: SigningError) -> Self {
        ClientError::Signing(e)
    }
}
