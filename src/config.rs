//! Configuration for batch listeners.

/// Configuration for a batch listener.
///
/// Resolved once at listener creation and fixed for the lifetime of the
/// batch. The controller endpoint is optional: when absent, SDN integration
/// is disabled for that batch and every passive-endpoint notification is a
/// logged skip.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ListenerConfig {
    /// Address of the SDN controller (e.g. "http://controller.example:8181").
    /// `None` disables circuit setup for the batch.
    pub controller_endpoint: Option<String>,

    /// Timeout for the reservation call in milliseconds
    pub reserve_timeout_ms: u64,

    /// Timeout for the release call in milliseconds
    pub release_timeout_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            controller_endpoint: None,
            reserve_timeout_ms: 10_000,
            release_timeout_ms: 10_000,
        }
    }
}

impl ListenerConfig {
    /// Config with a controller endpoint and default timeouts.
    pub fn with_controller(endpoint: impl Into<String>) -> Self {
        Self {
            controller_endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }
}
