use std::io;

use thiserror::Error;

use crate::types::Family;

/// Invalid run configuration. Always fatal, raised before any probing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target list is empty")]
    NoTargets,

    #[error("{flag} is required when using {mode}")]
    MissingOption {
        flag: &'static str,
        mode: &'static str,
    },

    #[error("{tool} is required for {mode} but was not found on PATH")]
    MissingTool {
        tool: &'static str,
        mode: &'static str,
    },

    #[error("invalid value for {flag}: {reason}")]
    InvalidValue { flag: &'static str, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no targets to probe")]
    NoTargets,

    #[error("scoring weights must not both be zero")]
    ZeroWeights,
}

/// Why a single probe failed. Rendered into the outcome's `error` text.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("DNS resolution failed: {0}")]
    Resolve(io::Error),

    #[error("no {0} address for host")]
    NoAddress(Family),

    #[error("connect failed: {0}")]
    Connect(io::Error),

    #[error("TLS handshake failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed HTTP response")]
    MalformedResponse,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("timeout")]
    Timeout,
}

/// Failure of one result sink. Reported as a warning, never fatal.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}{}", status_hint(.status))]
    HttpStatus { status: u16, body: String },

    #[error("`{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

fn status_hint(status: &u16) -> &'static str {
    match *status {
        401 | 403 => " (check that the token is correct)",
        429 => " (rate limit exceeded, wait before retrying)",
        500..=599 => " (server error, try again later)",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_carry_hints() {
        let e = SubmitError::HttpStatus {
            status: 401,
            body: "unauthorized".into(),
        };
        assert_eq!(
            e.to_string(),
            "HTTP 401: unauthorized (check that the token is correct)"
        );

        let e = SubmitError::HttpStatus {
            status: 429,
            body: String::new(),
        };
        assert!(e.to_string().contains("rate limit"));

        let e = SubmitError::HttpStatus {
            status: 503,
            body: "down".into(),
        };
        assert!(e.to_string().ends_with("(server error, try again later)"));

        let e = SubmitError::HttpStatus {
            status: 404,
            body: "missing".into(),
        };
        assert_eq!(e.to_string(), "HTTP 404: missing");
    }

    #[test]
    fn probe_error_mentions_family() {
        assert_eq!(
            ProbeError::NoAddress(Family::V6).to_string(),
            "no IPv6 address for host"
        );
    }
}
