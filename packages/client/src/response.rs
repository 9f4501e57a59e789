//! Response decoding.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Stage};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// The outcome of a signed call: transport metadata plus the decoded body.
#[derive(Debug, Clone)]
pub struct SignedResponse<T> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub value: T,
}

/// Drop a leading UTF-8 byte-order mark. Some servers prepend one to JSON.
pub fn strip_bom(body: Bytes) -> Bytes {
    if body.starts_with(UTF8_BOM) {
        body.slice(UTF8_BOM.len()..)
    } else {
        body
    }
}

/// Strip any BOM and decode `body` as JSON.
pub fn decode_json<T: DeserializeOwned>(
    stage: Stage,
    status: StatusCode,
    body: Bytes,
) -> Result<T, ClientError> {
    let body = strip_bom(body);
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
        stage,
        status: status.as_u16(),
        reason: e.to_string(),
    })
}
