//! Mastodon REST access for tootline.
//!
//! [`TimelineSource`] is the seam the sync engine pulls pages through;
//! [`MastodonClient`] is its production implementation over HTTPS. Tests
//! substitute their own sources, so everything above this crate is exercised
//! without a network.
//!
//! Errors split three ways and the engine treats each differently:
//! transport failures and non-2xx responses are part of life on a federated
//! network and become a retryable failure state upstream; a body that fails
//! to decode means this client and the server disagree about the protocol,
//! which is a bug worth surfacing loudly.

pub mod client;
pub mod paging;
pub mod source;

pub use client::MastodonClient;
pub use paging::{PageLinks, parse_link_header};
pub use source::{PageQuery, TimelinePage, TimelineSource};

/// Failure while talking to the server.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never completed: DNS, TLS, timeouts, dropped connections.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned HTTP {status}")]
    Http { status: u16 },

    /// The response body was not what the API promises.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Errors the engine absorbs into a retryable failure state instead of
    /// propagating. Decode failures are excluded: those mean a bug, not a
    /// bad network day.
    pub fn is_expected(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Http { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
