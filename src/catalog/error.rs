//! Shared error type for catalog access: input validation, HTTP, decoding, and media checks.

use thiserror::Error;

/// Catalog error for bad requests, transport failures, upstream errors, and unexpected bodies.
#[derive(Debug, Error)]
pub enum CatalogError {
    // Input validation (raised before any request)
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    // Transport and upstream
    #[error("Network error: could not reach {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when fetching {url}: {detail}")]
    Upstream {
        status: u16,
        url: String,
        /// API error list rendered as text, or empty when the body carried none.
        detail: String,
    },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    // Page downloads
    #[error("Unexpected media type '{content_type}' for page {url}")]
    UnexpectedMediaType { url: String, content_type: String },
}

impl CatalogError {
    /// True for errors raised before any network activity.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            CatalogError::BadInput(_) | CatalogError::InvalidUrl { .. }
        )
    }
}
