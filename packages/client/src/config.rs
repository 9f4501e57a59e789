//! Client configuration, populated from environment variables.

use std::time::Duration;

use reqwest::Url;
use webdata_auth::Curve;

/// Errors raised while assembling a [`ClientConfig`] or a session from it.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(String),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Runtime configuration for a WebData client.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `WEBDATA_BASE_URL` | (required) | Base address all request paths are resolved against |
/// | `WEBDATA_APPLICATION_TOKEN` | (required) | Static `ApplicationToken` sent with every call |
/// | `WEBDATA_CURVE` | `p256` | ECDH curve for the login handshake (`p256` or `p384`) |
/// | `WEBDATA_TIMEOUT_SECS` | `30` | Timeout applied to each HTTP call |
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Always ends with `/`, so relative paths resolve beneath it.
    pub base_url: Url,
    pub application_token: String,
    pub curve: Curve,
    pub timeout: Duration,
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl ClientConfig {
    pub fn new(base_url: &str, application_token: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            application_token: application_token.into(),
            curve: Curve::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Populate config from environment variables, applying defaults where absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Populate config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &str| lookup(name).ok_or_else(|| ConfigError::Missing(name.into()));

        let mut config = Self::new(
            &required("WEBDATA_BASE_URL")?,
            required("WEBDATA_APPLICATION_TOKEN")?,
        )?;

        if let Some(curve) = lookup("WEBDATA_CURVE") {
            config.curve = curve.parse().map_err(|reason| ConfigError::Invalid {
                name: "WEBDATA_CURVE".into(),
                reason,
            })?;
        }

        if let Some(secs) = lookup("WEBDATA_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "WEBDATA_TIMEOUT_SECS".into(),
                reason: e.to_string(),
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Parse a base address and make sure its path ends with `/`.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name: "base URL".into(),
        reason: e.to_string(),
    })?;
    Ok(normalize_base_url(url))
}

/// Without a trailing slash, joining `API/...` would replace the last path
/// segment of the base instead of nesting beneath it.
pub fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("WEBDATA_BASE_URL", "http://elma.example.com:4300"),
            ("WEBDATA_APPLICATION_TOKEN", "93DA2C71"),
        ]))
        .unwrap();
        assert_eq!(config.base_url.as_str(), "http://elma.example.com:4300/");
        assert_eq!(config.application_token, "93DA2C71");
        assert_eq!(config.curve, Curve::P256);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_apply() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("WEBDATA_BASE_URL", "https://elma.example.com/app"),
            ("WEBDATA_APPLICATION_TOKEN", "t"),
            ("WEBDATA_CURVE", "p384"),
            ("WEBDATA_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.base_url.as_str(), "https://elma.example.com/app/");
        assert_eq!(config.curve, Curve::P384);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_base_url() {
        let err = ClientConfig::from_lookup(lookup(&[("WEBDATA_APPLICATION_TOKEN", "t")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("WEBDATA_BASE_URL".into()));
    }

    #[test]
    fn missing_application_token() {
        let err = ClientConfig::from_lookup(lookup(&[("WEBDATA_BASE_URL", "http://h")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("WEBDATA_APPLICATION_TOKEN".into()));
    }

    #[test]
    fn invalid_values_rejected() {
        for (name, value) in [
            ("WEBDATA_CURVE", "ed25519"),
            ("WEBDATA_TIMEOUT_SECS", "soon"),
            ("WEBDATA_BASE_URL", "not a url"),
        ] {
            let mut vars = vec![
                ("WEBDATA_BASE_URL", "http://h"),
                ("WEBDATA_APPLICATION_TOKEN", "t"),
            ];
            vars.retain(|(k, _)| *k != name);
            vars.push((name, value));
            let err = ClientConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{name}: {err:?}");
        }
    }

    #[test]
    fn relative_paths_nest_under_base() {
        let base = parse_base_url("http://h/app").unwrap();
        assert_eq!(
            base.join("API/REST/Authorization/LoginWith").unwrap().as_str(),
            "http://h/app/API/REST/Authorization/LoginWith"
        );
    }
}
