//! Error types for the circuit coordination core.
//!
//! Nothing in this crate is allowed to escape to the surrounding transfer
//! engine as a fatal failure: circuit setup is an optimization layered on a
//! transfer that must succeed or fail on its own merits. These types exist so
//! components can report *why* something was skipped or degraded.

use thiserror::Error;

/// Result type alias using the lightpath error type.
pub type Result<T> = std::result::Result<T, LightpathError>;

/// Main error type for the circuit coordination core.
#[derive(Error, Debug)]
pub enum LightpathError {
    /// Transfer announcement missing the "source => destination" separator
    #[error("malformed transfer announcement: {0}")]
    MalformedAnnouncement(String),

    /// Source endpoint could not be statted
    #[error("could not stat {uri}: {message}")]
    Stat { uri: String, message: String },

    /// Passive endpoint description did not match the host:[ip]:port grammar
    #[error("unparsable passive endpoint description: {0}")]
    UnparsableEndpoint(String),

    /// Controller rejected or failed a circuit reservation
    #[error("circuit reservation failed: {0}")]
    Reservation(String),

    /// Controller rejected or failed a circuit release
    #[error("circuit release failed: {0}")]
    Release(String),

    /// HTTP transport error talking to the controller
    #[error("controller request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
