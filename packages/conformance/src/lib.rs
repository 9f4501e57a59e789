//! Shared helpers for the WebData conformance test suite.
//!
//! Provides [`spawn_server`], an in-process mock of the WebData server half of
//! the protocol. It answers the login handshake with its own ephemeral ECDH key
//! and verifies the signature of every other request against the secret it
//! derived, recording what it saw so tests can assert on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use webdata_auth::headers::{
    APPLICATION_JSON, APPLICATION_TOKEN, AUTH_INFO, AUTH_TOKEN, SESSION_TOKEN,
};
use webdata_auth::{declared_headers, verify_request, Curve, HmacSha256, SignableRequest};
use webdata_client::session::LOGIN_PATH;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Credentials and curve the mock server accepts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub application_token: String,
    pub username: String,
    pub password: String,
    pub curve: Curve,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            application_token: "conformance-app".into(),
            username: "admin".into(),
            password: "s3cret \"quoted\"".into(),
            curve: Curve::P256,
        }
    }
}

/// A signed request as observed by the server.
#[derive(Debug, Clone)]
pub struct ReceivedCall {
    pub method: String,
    pub path: String,
    pub query: String,
    /// Names listed in `Signed-Headers`, as received.
    pub signed_headers: Vec<String>,
    pub verified: bool,
}

struct ServerSession {
    session_token: String,
    auth_token: String,
    authenticator: HmacSha256,
}

/// State shared between the mock server task and the test.
pub struct MockServer {
    config: ServerConfig,
    session: Mutex<Option<ServerSession>>,
    calls: Mutex<Vec<ReceivedCall>>,
    logins: AtomicU32,
}

impl MockServer {
    /// Signed requests received so far, oldest first.
    pub fn calls(&self) -> Vec<ReceivedCall> {
        self.calls.lock().expect("mock state poisoned").clone()
    }

    /// Number of successful handshakes.
    pub fn login_count(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Start the mock server and return `(base_url, state)`.
///
/// The server runs in a background `tokio` task bound to an OS-assigned port
/// on `127.0.0.1`. The returned URL has no trailing path, e.g.
/// `http://127.0.0.1:51234`.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound or the server fails to start.
pub async fn spawn_server(config: ServerConfig) -> (String, Arc<MockServer>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");

    let server = Arc::new(MockServer {
        config,
        session: Mutex::new(None),
        calls: Mutex::new(Vec::new()),
        logins: AtomicU32::new(0),
    });

    let router = Router::new()
        .route(&format!("/{LOGIN_PATH}"), post(login))
        .fallback(signed)
        .with_state(Arc::clone(&server));

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("conformance server error");
    });

    (format!("http://{addr}"), server)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn login(
    State(server): State<Arc<MockServer>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let config = &server.config;
    if header_str(&headers, &APPLICATION_TOKEN) != Some(config.application_token.as_str()) {
        return reject(StatusCode::BAD_REQUEST, "unknown application token");
    }

    let password: String = match serde_json::from_slice(&body) {
        Ok(password) => password,
        Err(_) => return reject(StatusCode::BAD_REQUEST, "password must be a JSON string"),
    };
    if params.get("username") != Some(&config.username) || password != config.password {
        return reject(StatusCode::UNAUTHORIZED, "invalid credentials");
    }

    let Some(client_key) = headers
        .get(AUTH_INFO)
        .and_then(|v| hex::decode(v.as_bytes()).ok())
    else {
        return reject(StatusCode::BAD_REQUEST, "Auth-Info must carry a hex public key");
    };

    let mut ecdh = config.curve.key_agreement();
    let server_key = match ecdh.generate_public_key() {
        Ok(key) => key,
        Err(e) => return reject(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };
    let secret = match ecdh.derive_shared_secret(&client_key) {
        Ok(secret) => secret,
        Err(e) => return reject(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let n = server.logins.fetch_add(1, Ordering::SeqCst) + 1;
    let session = ServerSession {
        session_token: format!("session-{n}"),
        auth_token: format!("auth-{n}"),
        authenticator: HmacSha256::new(secret),
    };
    let reply = json!({
        "SessionToken": session.session_token,
        "AuthToken": session.auth_token,
        "CurrentUserId": n,
        "Lang": "en",
    });
    *server.session.lock().expect("mock state poisoned") = Some(session);

    (
        [
            (AUTH_INFO, hex::encode(server_key)),
            (CONTENT_TYPE, APPLICATION_JSON.to_string()),
        ],
        with_bom(&reply),
    )
        .into_response()
}

/// Every non-login request must carry the current tokens and a valid signature.
async fn signed(State(server): State<Arc<MockServer>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => return reject(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let signable = SignableRequest::from_parts(&parts, (!body.is_empty()).then(|| body.clone()));

    let verified = {
        let session = server.session.lock().expect("mock state poisoned");
        match session.as_ref() {
            Some(session) => {
                header_str(&parts.headers, &SESSION_TOKEN) == Some(session.session_token.as_str())
                    && header_str(&parts.headers, &AUTH_TOKEN) == Some(session.auth_token.as_str())
                    && verify_request(&signable, &session.authenticator).unwrap_or(false)
            }
            None => false,
        }
    };

    let call = ReceivedCall {
        method: signable.method.to_string(),
        path: signable.path.clone(),
        query: signable.query.clone(),
        signed_headers: declared_headers(&parts.headers),
        verified,
    };
    server
        .calls
        .lock()
        .expect("mock state poisoned")
        .push(call.clone());

    if !verified {
        return reject(StatusCode::UNAUTHORIZED, "signature rejected");
    }

    let reply = json!({
        "Verified": true,
        "Method": call.method,
        "Path": call.path,
        "Query": call.query,
        "SignedHeaders": call.signed_headers,
        "Body": String::from_utf8_lossy(&body),
    });
    ([(CONTENT_TYPE, APPLICATION_JSON)], with_bom(&reply)).into_response()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "Message": message }))).into_response()
}

/// The real server prefixes JSON with a byte-order mark; so does the mock.
fn with_bom(value: &Value) -> Vec<u8> {
    let mut body = UTF8_BOM.to_vec();
    body.extend_from_slice(value.to_string().as_bytes());
    body
}
