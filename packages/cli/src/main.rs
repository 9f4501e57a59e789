//! `webdata` — command-line client for the WebData REST API.
//!
//! Logs in with the ECDH handshake, issues one signed request and prints the
//! JSON response. Connection settings come from flags or the same environment
//! variables the client library reads.
//!
//! ```text
//! webdata -u admin -p admin API/REST/Authorization/ServerTime
//! webdata -u admin -p admin -X POST --data '{"Name":"x"}' \
//!     --sign-header 'X-Request-Id: 42' API/REST/Entity/Insert --query type=42302b9a
//! ```

use std::process;
use std::time::Duration;

use clap::Parser;
use http::{HeaderName, HeaderValue, Method};
use tracing::debug;
use webdata_client::webdata_auth::Curve;
use webdata_client::{ClientConfig, ClientSession, SignedRequest};

/// webdata — signed WebData REST calls
#[derive(Parser)]
#[command(name = "webdata", version, about, long_about = None)]
struct Cli {
    /// Base address of the server, e.g. http://localhost:4300
    #[arg(long, env = "WEBDATA_BASE_URL", value_name = "URL")]
    base_url: String,

    /// Static application token.
    #[arg(long, env = "WEBDATA_APPLICATION_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    app_token: String,

    /// Curve for the login handshake: p256 | p384
    #[arg(long, env = "WEBDATA_CURVE", default_value = "p256")]
    curve: Curve,

    /// Per-call timeout in seconds.
    #[arg(long, env = "WEBDATA_TIMEOUT_SECS", default_value_t = 30, value_name = "SECS")]
    timeout: u64,

    #[arg(short = 'u', long, env = "WEBDATA_USERNAME")]
    username: String,

    #[arg(short = 'p', long, env = "WEBDATA_PASSWORD", hide_env_values = true)]
    password: String,

    /// HTTP method of the signed request.
    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,

    /// Request path relative to the base address.
    path: String,

    /// Raw query string, without the leading `?`.
    #[arg(short = 'q', long)]
    query: Option<String>,

    /// Request body, sent as-is.
    #[arg(short = 'd', long, value_name = "BODY")]
    data: Option<String>,

    /// Extra unsigned header. Repeatable.
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    headers: Vec<(HeaderName, HeaderValue)>,

    /// Extra header covered by the signature. Repeatable.
    #[arg(long = "sign-header", value_name = "NAME:VALUE", value_parser = parse_header)]
    signed_headers: Vec<(HeaderName, HeaderValue)>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webdata_client=info,webdata=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::new(&cli.base_url, cli.app_token)
        .unwrap_or_else(|e| fatal(&e.to_string()));
    config.curve = cli.curve;
    config.timeout = Duration::from_secs(cli.timeout);
    debug!("using {} against {}", config.curve, config.base_url);

    let session = ClientSession::from_config(config).unwrap_or_else(|e| fatal(&e.to_string()));
    if let Err(e) = session.authenticate(&cli.username, &cli.password).await {
        fatal(&e.to_string());
    }

    let mut request = SignedRequest::new(cli.method, cli.path);
    if let Some(query) = cli.query {
        request = request.query(query);
    }
    if let Some(data) = cli.data {
        request = request.body(data);
    }
    for (name, value) in cli.headers {
        request = request.header(name, value);
    }
    for (name, value) in cli.signed_headers {
        request = request.signed_header(name, value);
    }

    let response = session
        .execute_signed::<serde_json::Value>(request)
        .await
        .unwrap_or_else(|e| fatal(&e.to_string()));

    match serde_json::to_string_pretty(&response.value) {
        Ok(pretty) => println!("{pretty}"),
        Err(e) => fatal(&format!("cannot print response: {e}")),
    }
    if !response.status.is_success() {
        eprintln!("webdata: server returned {}", response.status);
        process::exit(1);
    }
}

/// Parse `NAME:VALUE`, trimming whitespace around the value.
fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {raw:?}"))?;
    let name = HeaderName::try_from(name.trim()).map_err(|e| e.to_string())?;
    let value = HeaderValue::try_from(value.trim()).map_err(|e| e.to_string())?;
    Ok((name, value))
}

/// Print an error message to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("webdata: {msg}");
    process::exit(2);
}
