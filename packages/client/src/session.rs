//! The authenticated client session.
//!
//! A [`ClientSession`] moves through three states:
//!
//! ```text
//! Unauthenticated ──authenticate──▶ Authenticating ──ok──▶ Authenticated
//!                                        │   ▲                  │
//!                       error: previous  │   └──authenticate────┘
//!                          state remains
//! ```
//!
//! `authenticate` performs the ECDH login handshake and installs a
//! [`MessageAuthenticator`] keyed by the derived secret. Every later
//! `execute_signed` call injects the session tokens, signs the request and
//! dispatches it. Handshakes are serialized by an internal lock; once installed,
//! the tokens and authenticator are shared read-only between concurrent callers.
//! While a re-login is in flight, signed calls keep using the previous session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use webdata_auth::headers::{
    APPLICATION_JSON, APPLICATION_TOKEN, AUTH_INFO, AUTH_TOKEN, NAME_SEPARATOR, PROTOCOL_VERSION,
    SESSION_TOKEN, SIGNED_HEADERS, WEBDATA_VERSION,
};
use webdata_auth::{
    sign_request, Curve, HmacSha256, KeyAgreement, KeyAgreementError, MessageAuthenticator,
    SharedSecret, SignableRequest,
};

use crate::config::{ClientConfig, ConfigError};
use crate::error::{ClientError, Stage};
use crate::request::SignedRequest;
use crate::response::{decode_json, strip_bom, SignedResponse};
use crate::transport::{ReqwestTransport, Transport, TransportError, TransportRequest};

/// Login endpoint, relative to the base address.
pub const LOGIN_PATH: &str = "API/REST/Authorization/LoginWith";

/// Builds the authenticator installed after a successful handshake.
pub type AuthenticatorFactory =
    Arc<dyn Fn(SharedSecret) -> Arc<dyn MessageAuthenticator> + Send + Sync>;

/// HMAC-SHA256 keyed by the shared secret.
pub fn default_authenticator_factory() -> AuthenticatorFactory {
    Arc::new(|secret| Arc::new(HmacSha256::new(secret)) as Arc<dyn MessageAuthenticator>)
}

// ---------------------------------------------------------------------------
// AuthSession
// ---------------------------------------------------------------------------

/// Tokens and user details returned by the login call.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AuthSession {
    #[serde(rename = "SessionToken")]
    pub session_token: String,
    #[serde(rename = "AuthToken")]
    pub auth_token: String,
    /// Servers send this as either a string or a number.
    #[serde(rename = "CurrentUserId", default, deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(rename = "Lang", default)]
    pub locale: String,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("session_token", &"<redacted>")
            .field("auth_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("locale", &self.locale)
            .finish()
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Text(s)) => s,
        Some(Id::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state reported by [`ClientSession::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Everything installed by one successful handshake. Never mutated afterwards.
struct Established {
    auth: AuthSession,
    authenticator: Arc<dyn MessageAuthenticator>,
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

pub struct ClientSession {
    base_url: Url,
    application_token: HeaderValue,
    transport: Arc<dyn Transport>,
    /// Held for the whole handshake, which serializes `authenticate` calls.
    key_agreement: Mutex<Box<dyn KeyAgreement>>,
    authenticator_factory: AuthenticatorFactory,
    /// Replaced only once a handshake has fully succeeded.
    established: RwLock<Option<Arc<Established>>>,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ClientSession {
    pub fn builder(config: ClientConfig) -> ClientSessionBuilder {
        ClientSessionBuilder::new(config)
    }

    /// A session with the default reqwest transport, the configured curve and
    /// HMAC-SHA256.
    pub fn from_config(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn state(&self) -> SessionState {
        if self.key_agreement.try_lock().is_err() {
            return SessionState::Authenticating;
        }
        match *self.established.read().await {
            Some(_) => SessionState::Authenticated,
            None => SessionState::Unauthenticated,
        }
    }

    /// Tokens from the most recent successful login.
    pub async fn auth_session(&self) -> Option<AuthSession> {
        self.established().await.map(|e| e.auth.clone())
    }

    /// The installed authenticator, e.g. for checking signatures on responses.
    pub async fn authenticator(&self) -> Option<Arc<dyn MessageAuthenticator>> {
        self.established()
            .await
            .map(|e| Arc::clone(&e.authenticator))
    }

    async fn established(&self) -> Option<Arc<Established>> {
        self.established.read().await.clone()
    }

    /// Log in and install a fresh shared secret and tokens.
    ///
    /// On failure, or if the returned future is dropped before it completes, the
    /// session is left exactly as it was before the call.
    ///
    /// # Errors
    ///
    /// - [`ClientError::KeyGeneration`] — the ephemeral key could not be generated.
    /// - [`ClientError::Transport`] — the login call did not complete.
    /// - [`ClientError::Authentication`] — error status, malformed body, or no
    ///   server key.
    /// - [`ClientError::InvalidPeerKey`] — the server key is not a valid point.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let mut key_agreement = self.key_agreement.lock().await;

        match self.handshake(&mut **key_agreement, username, password).await {
            Ok(established) => {
                info!(
                    "session: authenticated {username} (user id {})",
                    established.auth.user_id
                );
                *self.established.write().await = Some(Arc::new(established));
                Ok(())
            }
            Err(e) => {
                warn!("session: login for {username} failed: {e}");
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        key_agreement: &mut dyn KeyAgreement,
        username: &str,
        password: &str,
    ) -> Result<Established, ClientError> {
        let public_key = key_agreement.generate_public_key()?;

        let mut url = self
            .base_url
            .join(LOGIN_PATH)
            .map_err(|e| invalid_url(Stage::Handshake, e))?;
        url.query_pairs_mut().append_pair("username", username);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(APPLICATION_TOKEN, self.application_token.clone());
        headers.insert(AUTH_INFO, handshake_header(&hex::encode(&public_key))?);

        let body = serde_json::to_vec(password)
            .map_err(|e| ClientError::Authentication(format!("cannot encode password: {e}")))?;

        let response = self
            .transport
            .execute(TransportRequest {
                method: Method::POST,
                url,
                headers,
                body: Some(Bytes::from(body)),
            })
            .await
            .map_err(|source| ClientError::Transport {
                stage: Stage::Handshake,
                source,
            })?;

        if response.status.as_u16() >= 400 {
            return Err(ClientError::Authentication(format!(
                "login returned {}",
                response.status
            )));
        }

        let auth: AuthSession = serde_json::from_slice(&strip_bom(response.body)).map_err(|e| {
            ClientError::Authentication(format!("malformed login response: {e}"))
        })?;

        let server_key = response.headers.get(AUTH_INFO).ok_or_else(|| {
            ClientError::Authentication("login response carries no Auth-Info key".into())
        })?;
        let server_key = hex::decode(server_key.as_bytes()).map_err(|e| {
            ClientError::InvalidPeerKey(KeyAgreementError::InvalidPeerKey(format!(
                "server key is not hex: {e}"
            )))
        })?;

        let secret = key_agreement.derive_shared_secret(&server_key)?;
        let authenticator = (self.authenticator_factory)(secret);

        Ok(Established {
            auth,
            authenticator,
        })
    }

    /// Sign and dispatch `request`, decoding the JSON response.
    ///
    /// A non-success status is returned in [`SignedResponse::status`], not as an
    /// error; a body that is not JSON of shape `T` is a [`ClientError::Decode`].
    pub async fn execute_signed<T: DeserializeOwned>(
        &self,
        request: SignedRequest,
    ) -> Result<SignedResponse<T>, ClientError> {
        let response = self.execute_signed_raw(request).await?;
        let value = decode_json(Stage::Request, response.status, response.value)?;
        Ok(SignedResponse {
            status: response.status,
            headers: response.headers,
            value,
        })
    }

    /// Like [`execute_signed`](Self::execute_signed) but returns the body bytes,
    /// with any byte-order mark removed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotAuthenticated`] without touching the network if
    /// no login has succeeded.
    pub async fn execute_signed_raw(
        &self,
        request: SignedRequest,
    ) -> Result<SignedResponse<Bytes>, ClientError> {
        let established = self
            .established()
            .await
            .ok_or(ClientError::NotAuthenticated)?;

        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|e| invalid_url(Stage::Request, e))?;
        if let Some(query) = &request.query {
            url.set_query(Some(query));
        }

        let mut headers = request.headers;
        headers.insert(APPLICATION_TOKEN, self.application_token.clone());
        headers.insert(SESSION_TOKEN, header_value(&established.auth.session_token)?);
        headers.insert(AUTH_TOKEN, header_value(&established.auth.auth_token)?);
        headers.insert(WEBDATA_VERSION, HeaderValue::from_static(PROTOCOL_VERSION));
        if headers.get(CONTENT_TYPE).map_or(true, |v| v.is_empty()) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        }

        let tokens = [AUTH_TOKEN, SESSION_TOKEN, APPLICATION_TOKEN];
        let declared: Vec<&str> = tokens
            .iter()
            .chain(request.signed.iter())
            .map(|name| name.as_str())
            .collect();
        let declared = declared.join(&NAME_SEPARATOR.to_string());
        headers.append(SIGNED_HEADERS, header_value(&declared)?);

        let mut signable = SignableRequest {
            method: request.method,
            path: url.path().to_string(),
            query: url.query().unwrap_or_default().to_string(),
            headers,
            body: request.body,
        };
        let canonical = sign_request(&mut signable, established.authenticator.as_ref())?;
        debug!(
            "session: {} {} signed over [{}]",
            signable.method,
            signable.path,
            canonical.signed_headers.join(", ")
        );

        let path = signable.path;
        let response = self
            .transport
            .execute(TransportRequest {
                method: signable.method,
                url,
                headers: signable.headers,
                body: signable.body,
            })
            .await
            .map_err(|source| ClientError::Transport {
                stage: Stage::Request,
                source,
            })?;

        if response.status.is_client_error() || response.status.is_server_error() {
            warn!("session: {path} returned {}", response.status);
        }

        Ok(SignedResponse {
            status: response.status,
            headers: response.headers,
            value: strip_bom(response.body),
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|e| webdata_auth::SigningError::InvalidHeaderValue(e.to_string()).into())
}

fn handshake_header(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::Authentication(format!("cannot encode login header: {e}")))
}

fn invalid_url(stage: Stage, e: impl fmt::Display) -> ClientError {
    ClientError::Transport {
        stage,
        source: TransportError::InvalidUrl(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`ClientSession`], with the collaborators replaceable.
pub struct ClientSessionBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    key_agreement: Option<Box<dyn KeyAgreement>>,
    authenticator_factory: Option<AuthenticatorFactory>,
}

impl ClientSessionBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            key_agreement: None,
            authenticator_factory: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the configured curve.
    pub fn key_agreement(mut self, key_agreement: Box<dyn KeyAgreement>) -> Self {
        self.key_agreement = Some(key_agreement);
        self
    }

    pub fn authenticator_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(SharedSecret) -> Arc<dyn MessageAuthenticator> + Send + Sync + 'static,
    {
        self.authenticator_factory = Some(Arc::new(factory));
        self
    }

    pub fn curve(mut self, curve: Curve) -> Self {
        self.config.curve = curve;
        self
    }

    /// Timeout for the default transport. Ignored when a transport is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ClientSession, ConfigError> {
        let config = self.config;

        let application_token =
            HeaderValue::from_str(&config.application_token).map_err(|e| ConfigError::Invalid {
                name: "application token".into(),
                reason: e.to_string(),
            })?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_timeout(config.timeout).map_err(|e| {
                ConfigError::Invalid {
                    name: "transport".into(),
                    reason: e.to_string(),
                }
            })?),
        };

        Ok(ClientSession {
            base_url: config.base_url,
            application_token,
            transport,
            key_agreement: Mutex::new(
                self.key_agreement
                    .unwrap_or_else(|| config.curve.key_agreement()),
            ),
            authenticator_factory: self
                .authenticator_factory
                .unwrap_or_else(default_authenticator_factory),
            established: RwLock::new(None),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
