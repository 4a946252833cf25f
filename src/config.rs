//! Process configuration (port, CORS allow-list) read once at startup.
//!
//! Invalid values fail fast with a descriptive error rather than silently
//! falling back to a default, so a typo in the environment is caught at
//! boot instead of quietly producing a differently-configured server.

use std::env;
use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use axum::http::HeaderValue;

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var, defaulting to 3001 if unset, and binds to
/// 0.0.0.0. Errors if `PORT` is set but isn't a valid `u16`.
pub fn server_addr() -> Result<SocketAddr> {
    let port = match env::var("PORT") {
        Ok(raw) => raw
            .parse::<u16>()
            .with_context(|| format!("PORT={raw:?} is not a valid port number"))?,
        Err(env::VarError::NotPresent) => 3001,
        Err(env::VarError::NotUnicode(_)) => {
            anyhow::bail!("PORT is set but isn't valid unicode");
        }
    };
    Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
}

/// Parse the `CLIENT_URL` env var into a CORS allow-list.
///
/// Comma-separated origins. Unset or empty means no cross-origin browser
/// traffic is allowed (fail closed). Errors if any origin fails to parse as
/// an HTTP header value.
pub fn cors_allowed_origins() -> Result<Vec<HeaderValue>> {
    let raw = match env::var("CLIENT_URL") {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(Vec::new()),
        Err(env::VarError::NotUnicode(_)) => {
            anyhow::bail!("CLIENT_URL is set but isn't valid unicode");
        }
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("CLIENT_URL origin {origin:?} is not a valid header value"))
        })
        .collect()
}
