//! Reserved header names and fixed values of the WebData wire protocol.
//!
//! | Header | Carries |
//! |---|---|
//! | `Auth-Info` | hex public key during login; base64 HMAC signature afterwards |
//! | `Signed-Headers` | comma-separated names covered by the signature |
//! | `ApplicationToken` | static application identifier |
//! | `SessionToken` / `AuthToken` | tokens issued by the login call |
//! | `WebData-Version` | protocol version |

use http::HeaderName;

pub const AUTH_INFO: HeaderName = HeaderName::from_static("auth-info");
pub const SIGNED_HEADERS: HeaderName = HeaderName::from_static("signed-headers");
pub const APPLICATION_TOKEN: HeaderName = HeaderName::from_static("applicationtoken");
pub const SESSION_TOKEN: HeaderName = HeaderName::from_static("sessiontoken");
pub const AUTH_TOKEN: HeaderName = HeaderName::from_static("authtoken");
pub const WEBDATA_VERSION: HeaderName = HeaderName::from_static("webdata-version");

/// Default media type for request bodies.
pub const APPLICATION_JSON: &str = "application/json";

/// Protocol version sent with every signed request.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Separator inside `Signed-Headers`.
pub const NAME_SEPARATOR: char = ',';
