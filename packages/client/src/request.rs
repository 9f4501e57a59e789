//! Builder for calls dispatched through
//! [`ClientSession::execute_signed`](crate::ClientSession::execute_signed).

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;

/// A request awaiting tokens and a signature.
///
/// `path` is relative to the session's base address. The body is buffered once
/// here; the same bytes are hashed for the signature and then transmitted.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) signed: Vec<HeaderName>,
    pub(crate) body: Option<Bytes>,
}

impl SignedRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            signed: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Raw query string, without the leading `?`. Replaces any query already in
    /// `path`.
    pub fn query(mut self, raw: impl Into<String>) -> Self {
        self.query = Some(raw.into());
        self
    }

    /// Add a header. Repeated calls with the same name append.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Include `name` in the signature alongside the session tokens.
    pub fn sign_header(mut self, name: HeaderName) -> Self {
        if !self.signed.contains(&name) {
            self.signed.push(name);
        }
        self
    }

    /// Add a header and include it in the signature.
    pub fn signed_header(self, name: HeaderName, value: HeaderValue) -> Self {
        self.header(name.clone(), value).sign_header(name)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.body(body))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_fields() {
        let req = SignedRequest::post("API/REST/Entity/Insert")
            .query("type=42302b9a")
            .signed_header(HeaderName::from_static("x-trace"), HeaderValue::from_static("t1"))
            .body("payload");

        assert_eq!(req.method(), &Method::POST);
        assert_eq!(req.path(), "API/REST/Entity/Insert");
        assert_eq!(req.query.as_deref(), Some("type=42302b9a"));
        assert_eq!(req.headers.get("x-trace").unwrap(), "t1");
        assert_eq!(req.signed, vec![HeaderName::from_static("x-trace")]);
        assert_eq!(req.body.as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn sign_header_deduplicates() {
        let name = HeaderName::from_static("x-trace");
        let req = SignedRequest::get("p").sign_header(name.clone()).sign_header(name);
        assert_eq!(req.signed.len(), 1);
    }

    #[test]
    fn json_body_is_serialized() {
        let req = SignedRequest::put("p")
            .json(&serde_json::json!({"Id": 5}))
            .unwrap();
        assert_eq!(req.body.unwrap(), Bytes::from_static(br#"{"Id":5}"#));
    }
}
