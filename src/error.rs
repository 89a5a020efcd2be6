//! Error taxonomy shared by every layer of the pipeline.
//!
//! Fatal classes (auth, missing config, upstream fetch, store) abort the
//! current run and are mapped to HTTP responses by the server. Non-fatal
//! conditions (an unlinkable charge, a failed coupon replacement) are not
//! errors at all: they are absorbed into per-run counters.

use thiserror::Error;

/// Maximum number of bytes of an upstream error body carried in an error.
pub const MAX_ERROR_BODY_BYTES: usize = 512;

#[derive(Debug, Error)]
pub enum Error {
    /// Trigger request without a matching shared secret. No writes occur.
    #[error("unauthorized: missing or invalid trigger secret")]
    Unauthorized,

    /// A required credential or endpoint setting is absent from the
    /// environment. Surfaced before any upstream call is attempted.
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// Non-success HTTP response from an upstream platform. Aborts the
    /// page loop; pages already written stay committed.
    #[error("upstream responded {status}: {body}")]
    UpstreamFetch { status: u16, body: String },

    /// Transport-level failure reaching an upstream (DNS, TLS, timeout).
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A record passed HTTP but not shape validation.
    #[error("malformed upstream record: {0}")]
    MalformedRecord(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl Error {
    /// Build an `UpstreamFetch` from a status and raw body, truncating the
    /// body so error payloads stay bounded.
    pub fn upstream(status: u16, body: &str) -> Self {
        Error::UpstreamFetch {
            status,
            body: truncate_body(body),
        }
    }
}

/// Truncate an upstream response body on a char boundary.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_BYTES {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

pub type Result<T> = std::result::Result<T, Error>;
