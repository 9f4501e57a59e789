//! Authenticated WebData REST client.
//!
//! Builds on the pure-logic `webdata-auth` crate and adds the I/O: an async
//! [`ClientSession`] that performs the ECDH login handshake over a
//! [`Transport`], then signs and dispatches every later call.
//!
//! ```no_run
//! use webdata_client::{ClientConfig, ClientSession, SignedRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = ClientSession::from_config(ClientConfig::from_env()?)?;
//! session.authenticate("admin", "admin").await?;
//!
//! let response = session
//!     .execute_signed::<serde_json::Value>(SignedRequest::get("API/REST/Authorization/ServerTime"))
//!     .await?;
//! println!("{}", response.value);
//! # Ok(())
//! # }
//! ```
//!
//! | Module | Contents |
//! |---|---|
//! | [`session`] | [`ClientSession`] state machine and its builder |
//! | [`request`] | [`SignedRequest`] builder |
//! | [`response`] | [`SignedResponse`], BOM stripping, JSON decoding |
//! | [`transport`] | [`Transport`] trait and the reqwest implementation |
//! | [`config`] | [`ClientConfig`] from environment variables |
//! | [`error`] | [`ClientError`] tagged with the failing [`Stage`] |

pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod session;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Stage};
pub use request::SignedRequest;
pub use response::SignedResponse;
pub use session::{
    default_authenticator_factory, AuthSession, AuthenticatorFactory, ClientSession,
    ClientSessionBuilder, SessionState,
};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse};

pub use webdata_auth;
