//! Passive-connection endpoint parsing.
//!
//! Before data movement begins, the transfer engine emits the destination
//! endpoint a transfer will connect to as a description of the form
//! `host:[ip]:port`. The ip is between brackets even for IPv4.

use crate::error::{LightpathError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// The description is searched for the first match of this grammar, not
/// anchored to the whole string.
static ENDPOINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9._-]+):\[([0-9a-f.:]+)\]:([0-9]+)")
        .expect("passive endpoint pattern is valid")
});

/// Destination endpoint for a passive connection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PassiveEndpoint {
    /// Destination hostname
    pub host: String,
    /// Literal IP, IPv4 dotted quad or IPv6
    pub ip: String,
    /// Destination port
    pub port: u16,
}

impl PassiveEndpoint {
    /// Parse an engine-supplied endpoint description.
    ///
    /// # Errors
    /// Returns `UnparsableEndpoint` if the grammar does not match or the
    /// port does not fit in a u16.
    pub fn parse(description: &str) -> Result<Self> {
        let captures = ENDPOINT_RE
            .captures(description)
            .ok_or_else(|| LightpathError::UnparsableEndpoint(description.to_string()))?;

        let port = captures[3]
            .parse::<u16>()
            .map_err(|_| LightpathError::UnparsableEndpoint(description.to_string()))?;

        Ok(Self {
            host: captures[1].to_string(),
            ip: captures[2].to_string(),
            port,
        })
    }
}

impl std::fmt::Display for PassiveEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:[{}]:{}", self.host, self.ip, self.port)
    }
}
