//! Canonical request strings and request signatures.
//!
//! The canonical string is the HMAC input for every signed call. It is built
//! from the request alone, so the server can rebuild it byte for byte:
//!
//! ```text
//! {METHOD}\n
//! {path}\n
//! {raw query}\n
//! {name}:{value}\n        one line per signed header, sorted by name
//! {hex sha256(body)}\n    empty when there is no body
//! {content-type}\n
//! ```
//!
//! The headers to sign are named in `Signed-Headers`. After signing, that header
//! is rewritten to list exactly the names that went into the string, and the
//! base64 signature is placed in `Auth-Info`.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::authenticator::MessageAuthenticator;
use crate::headers::{AUTH_INFO, NAME_SEPARATOR, SIGNED_HEADERS};

/// Errors returned by [`sign_request`] and [`verify_request`].
#[derive(Debug, Error, PartialEq)]
pub enum SigningError {
    #[error("header value cannot be encoded: {0}")]
    InvalidHeaderValue(String),

    #[error("request carries no Auth-Info signature")]
    MissingSignature,

    #[error("signature is not valid base64: {0}")]
    MalformedSignature(String),
}

// ---------------------------------------------------------------------------
// SignableRequest
// ---------------------------------------------------------------------------

/// The fields of a request that take part in the signature.
///
/// The body is held as [`Bytes`]: hashing reads the same buffer that is later
/// sent, and cloning it for transmission does not copy.
#[derive(Debug, Clone)]
pub struct SignableRequest {
    pub method: Method,
    /// Path exactly as it appears on the request line.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl SignableRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Build from received request parts, e.g. on the verifying side.
    pub fn from_parts(parts: &http::request::Parts, body: Option<Bytes>) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            headers: parts.headers.clone(),
            body,
        }
    }
}

// ---------------------------------------------------------------------------
// Canonicalization
// ---------------------------------------------------------------------------

/// A canonical string together with the header names it covers.
///
/// `text` is raw bytes: header values may carry non-UTF-8 octets, and those are
/// signed exactly as they go out on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub text: Vec<u8>,
    /// Lowercased, sorted names of the headers rendered into `text`.
    pub signed_headers: Vec<String>,
}

/// Build the canonical string for `request`.
///
/// Pure: the output depends only on the request fields and the names listed in
/// its `Signed-Headers` header(s).
pub fn canonicalize(request: &SignableRequest) -> CanonicalRequest {
    // BTreeMap gives both deduplication and ascending order.
    let mut signed = BTreeMap::new();
    for name in declared_headers(&request.headers) {
        if let Some(value) = request.headers.get(name.as_str()) {
            signed.insert(name, normalize_value(value));
        }
    }

    let mut text = Vec::new();
    push_line(&mut text, request.method.as_str().to_uppercase().as_bytes());
    push_line(&mut text, request.path.as_bytes());
    push_line(&mut text, request.query.as_bytes());
    for (name, value) in &signed {
        text.extend_from_slice(name.as_bytes());
        text.push(b':');
        push_line(&mut text, value);
    }
    push_line(&mut text, content_hash(request.body.as_deref()).as_bytes());
    push_line(
        &mut text,
        request
            .headers
            .get(CONTENT_TYPE)
            .map_or(&[][..], HeaderValue::as_bytes),
    );

    CanonicalRequest {
        text,
        signed_headers: signed.into_keys().collect(),
    }
}

/// Header names declared in `Signed-Headers`, lowercased and deduplicated, in
/// declaration order. Repeated `Signed-Headers` headers are flattened.
pub fn declared_headers(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for value in headers.get_all(SIGNED_HEADERS) {
        let value = String::from_utf8_lossy(value.as_bytes());
        for name in value.split(NAME_SEPARATOR) {
            let name = name.trim().to_lowercase();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Lowercase hex SHA-256 of a non-empty body; empty string otherwise.
pub fn content_hash(body: Option<&[u8]>) -> String {
    match body {
        Some(bytes) if !bytes.is_empty() => hex::encode(Sha256::digest(bytes)),
        _ => String::new(),
    }
}

/// Strip leading and trailing spaces and newlines, byte for byte.
fn normalize_value(value: &HeaderValue) -> &[u8] {
    let is_trimmed = |b: &u8| *b == b' ' || *b == b'\n';
    let bytes = value.as_bytes();
    let start = bytes.iter().position(|b| !is_trimmed(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_trimmed(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn push_line(out: &mut Vec<u8>, line: &[u8]) {
    out.extend_from_slice(line);
    out.push(b'\n');
}

// ---------------------------------------------------------------------------
// Signing and verification
// ---------------------------------------------------------------------------

/// Signatures travel as standard padded base64.
pub fn encode_signature(signature: &[u8]) -> String {
    general_purpose::STANDARD.encode(signature)
}

pub fn decode_signature(encoded: &str) -> Result<Vec<u8>, SigningError> {
    general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| SigningError::MalformedSignature(e.to_string()))
}

/// Sign `request` in place.
///
/// Rewrites `Signed-Headers` to the names actually covered and sets `Auth-Info`
/// to the encoded signature. Returns the canonical request that was signed.
///
/// # Errors
///
/// Returns [`SigningError::InvalidHeaderValue`] if a rewritten header cannot be
/// represented as a header value.
pub fn sign_request(
    request: &mut SignableRequest,
    authenticator: &dyn MessageAuthenticator,
) -> Result<CanonicalRequest, SigningError> {
    let canonical = canonicalize(request);
    let signature = encode_signature(&authenticator.sign(&canonical.text));

    let names = canonical.signed_headers.join(&NAME_SEPARATOR.to_string());
    request.headers.insert(SIGNED_HEADERS, header_value(&names)?);
    request.headers.insert(AUTH_INFO, header_value(&signature)?);
    Ok(canonical)
}

/// Check the `Auth-Info` signature carried by `request`.
///
/// Returns `Ok(false)` when the signature is well-formed but does not match.
///
/// # Errors
///
/// - [`SigningError::MissingSignature`] — no `Auth-Info` header.
/// - [`SigningError::MalformedSignature`] — `Auth-Info` is not base64.
pub fn verify_request(
    request: &SignableRequest,
    authenticator: &dyn MessageAuthenticator,
) -> Result<bool, SigningError> {
    let encoded = request
        .headers
        .get(AUTH_INFO)
        .ok_or(SigningError::MissingSignature)?;
    let encoded = encoded
        .to_str()
        .map_err(|e| SigningError::MalformedSignature(e.to_string()))?;
    let signature = decode_signature(encoded)?;

    let canonical = canonicalize(request);
    Ok(authenticator.verify(&canonical.text, &signature))
}

fn header_value(value: &str) -> Result<HeaderValue, SigningError> {
    HeaderValue::from_str(value).map_err(|e| SigningError::InvalidHeaderValue(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::HmacSha256;
    use crate::key_agreement::SharedSecret;

    fn authenticator() -> HmacSha256 {
        HmacSha256::new(SharedSecret::from_bytes([9; 32]))
    }

    fn text_of(req: &SignableRequest) -> String {
        String::from_utf8(canonicalize(req).text).unwrap()
    }

    fn request_with(declared: &[&str]) -> SignableRequest {
        let mut req = SignableRequest::new(Method::GET, "/API/REST/Entity/Load");
        req.query = "type=42302b9a&id=1".into();
        req.headers.insert("sessiontoken", HeaderValue::from_static("st1"));
        req.headers.insert("authtoken", HeaderValue::from_static("at1"));
        req.headers.insert("applicationtoken", HeaderValue::from_static("app"));
        req.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for d in declared {
            req.headers.append(SIGNED_HEADERS, HeaderValue::from_str(d).unwrap());
        }
        req
    }

    #[test]
    fn canonical_string_layout() {
        let req = request_with(&["AuthToken,SessionToken,ApplicationToken"]);
        let canonical = canonicalize(&req);
        assert_eq!(
            canonical.text,
            b"GET\n\
             /API/REST/Entity/Load\n\
             type=42302b9a&id=1\n\
             applicationtoken:app\n\
             authtoken:at1\n\
             sessiontoken:st1\n\
             \n\
             application/json\n"
        );
        assert_eq!(
            canonical.signed_headers,
            vec!["applicationtoken", "authtoken", "sessiontoken"]
        );
    }

    #[test]
    fn declaration_order_does_not_matter() {
        let a = canonicalize(&request_with(&["SessionToken,AuthToken,ApplicationToken"]));
        let b = canonicalize(&request_with(&["ApplicationToken,SessionToken,AuthToken"]));
        assert_eq!(a, b);
    }

    #[test]
    fn repeated_declarations_are_flattened_and_deduplicated() {
        let split = canonicalize(&request_with(&["AuthToken", "SessionToken, authtoken", "APPLICATIONTOKEN"]));
        let joined = canonicalize(&request_with(&["AuthToken,SessionToken,ApplicationToken"]));
        assert_eq!(split, joined);
    }

    #[test]
    fn method_is_uppercased() {
        let mut req = request_with(&[]);
        req.method = Method::from_bytes(b"post").unwrap();
        assert!(text_of(&req).starts_with("POST\n"));
    }

    #[test]
    fn absent_headers_are_skipped() {
        let req = request_with(&["AuthToken,X-Missing"]);
        let canonical = canonicalize(&req);
        assert_eq!(canonical.signed_headers, vec!["authtoken"]);
        assert!(!text_of(&req).contains("x-missing"));
    }

    #[test]
    fn present_empty_header_is_signed() {
        let mut req = request_with(&["X-Empty"]);
        req.headers.insert("x-empty", HeaderValue::from_static(""));
        let canonical = canonicalize(&req);
        assert_eq!(canonical.signed_headers, vec!["x-empty"]);
        assert!(text_of(&req).contains("\nx-empty:\n"));
    }

    #[test]
    fn values_are_trimmed_of_spaces() {
        let mut req = request_with(&["X-Padded"]);
        req.headers.insert("x-padded", HeaderValue::from_static("  value  "));
        assert!(text_of(&req).contains("\nx-padded:value\n"));
    }

    #[test]
    fn blank_value_trims_to_empty() {
        let mut req = request_with(&["X-Blank"]);
        req.headers.insert("x-blank", HeaderValue::from_static("   "));
        assert!(text_of(&req).contains("\nx-blank:\n"));
    }

    #[test]
    fn non_utf8_values_are_signed_as_raw_bytes() {
        let mut req = request_with(&["X-Bin"]);
        req.headers.insert("x-bin", HeaderValue::from_bytes(b" caf\xe9 ").unwrap());
        req.headers.insert(CONTENT_TYPE, HeaderValue::from_bytes(b"text/plain; x=\xff").unwrap());
        let text = canonicalize(&req).text;

        assert!(text.windows(11).any(|w| w == b"\nx-bin:caf\xe9"));
        assert!(text.ends_with(b"\ntext/plain; x=\xff\n"));

        sign_request(&mut req, &authenticator()).unwrap();
        assert_eq!(verify_request(&req, &authenticator()), Ok(true));
    }

    #[test]
    fn first_value_of_repeated_header_is_signed() {
        let mut req = request_with(&["X-Multi"]);
        req.headers.append("x-multi", HeaderValue::from_static("one"));
        req.headers.append("x-multi", HeaderValue::from_static("two"));
        let text = text_of(&req);
        assert!(text.contains("\nx-multi:one\n"));
        assert!(!text.contains("two"));
    }

    #[test]
    fn empty_body_hashes_to_empty_line() {
        let mut req = request_with(&[]);
        req.body = Some(Bytes::new());
        let with_empty = canonicalize(&req).text;
        req.body = None;
        let without = canonicalize(&req).text;
        assert_eq!(with_empty, without);
        assert_eq!(content_hash(Some(&b""[..])), "");
        assert_eq!(content_hash(None), "");
    }

    #[test]
    fn body_hash_is_lowercase_hex_sha256() {
        assert_eq!(
            content_hash(Some(&b"abc"[..])),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_content_type_renders_empty_line() {
        let mut req = request_with(&[]);
        req.headers.remove(CONTENT_TYPE);
        assert!(text_of(&req).ends_with("\n\n\n"));
    }

    #[test]
    fn sign_rewrites_signed_headers_and_sets_signature() {
        let mut req = request_with(&["AuthToken,SessionToken", "ApplicationToken,X-Missing"]);
        sign_request(&mut req, &authenticator()).unwrap();

        let listed: Vec<_> = req.headers.get_all(SIGNED_HEADERS).iter().collect();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], "applicationtoken,authtoken,sessiontoken");

        let sig = req.headers.get(AUTH_INFO).unwrap().to_str().unwrap();
        assert_eq!(decode_signature(sig).unwrap().len(), 32);
    }

    #[test]
    fn signed_request_verifies() {
        let mut req = request_with(&["AuthToken,SessionToken,ApplicationToken"]);
        req.method = Method::POST;
        req.body = Some(Bytes::from_static(br#"{"a":1}"#));
        sign_request(&mut req, &authenticator()).unwrap();
        assert_eq!(verify_request(&req, &authenticator()), Ok(true));
    }

    #[test]
    fn independent_recomputation_matches() {
        let mut req = request_with(&["SessionToken,AuthToken,ApplicationToken"]);
        let canonical = sign_request(&mut req, &authenticator()).unwrap();

        // A verifier only sees the rewritten request.
        let recomputed = canonicalize(&req);
        assert_eq!(recomputed.text, canonical.text);
        assert_eq!(
            authenticator().sign(&recomputed.text),
            decode_signature(req.headers.get(AUTH_INFO).unwrap().to_str().unwrap()).unwrap()
        );
    }

    #[test]
    fn tampered_body_fails_verification() {
        let mut req = request_with(&["AuthToken"]);
        req.body = Some(Bytes::from_static(b"original"));
        sign_request(&mut req, &authenticator()).unwrap();
        req.body = Some(Bytes::from_static(b"tampered"));
        assert_eq!(verify_request(&req, &authenticator()), Ok(false));
    }

    #[test]
    fn tampered_signed_header_fails_verification() {
        let mut req = request_with(&["SessionToken"]);
        sign_request(&mut req, &authenticator()).unwrap();
        req.headers.insert("sessiontoken", HeaderValue::from_static("stolen"));
        assert_eq!(verify_request(&req, &authenticator()), Ok(false));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let mut req = request_with(&["AuthToken"]);
        sign_request(&mut req, &authenticator()).unwrap();
        let other = HmacSha256::new(SharedSecret::from_bytes([10; 32]));
        assert_eq!(verify_request(&req, &other), Ok(false));
    }

    #[test]
    fn missing_signature_is_an_error() {
        let req = request_with(&["AuthToken"]);
        assert_eq!(
            verify_request(&req, &authenticator()),
            Err(SigningError::MissingSignature)
        );
    }

    #[test]
    fn malformed_signature_is_an_error() {
        let mut req = request_with(&["AuthToken"]);
        req.headers.insert(AUTH_INFO, HeaderValue::from_static("not base64!!"));
        assert!(matches!(
            verify_request(&req, &authenticator()),
            Err(SigningError::MalformedSignature(_))
        ));
    }

    #[test]
    fn from_parts_splits_path_and_query() {
        let req = http::Request::builder()
            .method("PUT")
            .uri("http://example.com/API/REST/Entity/Update?id=5&x=a%20b")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        let signable = SignableRequest::from_parts(&parts, None);
        assert_eq!(signable.path, "/API/REST/Entity/Update");
        assert_eq!(signable.query, "id=5&x=a%20b");
        assert_eq!(signable.method, Method::PUT);
    }
}
