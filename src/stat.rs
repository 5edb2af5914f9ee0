//! Source stat capability.
//!
//! The surrounding transfer engine owns the actual protocol machinery for
//! resolving a source URI to a size. This module defines the `StatProvider`
//! trait to abstract that capability, enabling testability with a mock that
//! returns canned sizes without touching any storage endpoint.

use crate::error::{LightpathError, Result};
use async_trait::async_trait;

/// Size information for a source endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SourceStat {
    /// Size of the source in bytes
    pub size: u64,
}

/// Trait for resolving the size/existence of a source endpoint.
///
/// A failed stat is a per-item soft failure: the registry logs it and
/// excludes the pair from the aggregate, it never aborts the batch.
#[async_trait]
pub trait StatProvider: Send + Sync {
    /// Stat a source URI.
    ///
    /// # Errors
    /// Returns an error if the source is unreachable or cannot be statted.
    async fn stat_source(&self, uri: &str) -> Result<SourceStat>;
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Mock stat provider for testing.
///
/// Sources registered with [`MockStatProvider::set_size`] resolve to that
/// size; anything else fails as unreachable. Every call is recorded.
#[derive(Clone, Default)]
pub struct MockStatProvider {
    sizes: Arc<Mutex<HashMap<String, u64>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockStatProvider {
    /// Create a new mock stat provider with no known sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source URI with a canned size.
    pub fn set_size(&self, uri: &str, size: u64) {
        self.sizes.lock().insert(uri.to_string(), size);
    }

    /// Get all URIs that have been statted, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Get the number of stat calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl StatProvider for MockStatProvider {
    async fn stat_source(&self, uri: &str) -> Result<SourceStat> {
        self.calls.lock().push(uri.to_string());

        match self.sizes.lock().get(uri) {
            Some(size) => Ok(SourceStat { size: *size }),
            None => Err(LightpathError::Stat {
                uri: uri.to_string(),
                message: "no such source configured".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_stat_known_source() {
        let stat = MockStatProvider::new();
        stat.set_size("gsiftp://source.example/file1", 1024);

        let result = stat
            .stat_source("gsiftp://source.example/file1")
            .await
            .unwrap();
        assert_eq!(result.size, 1024);
        assert_eq!(stat.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_stat_unknown_source_fails() {
        let stat = MockStatProvider::new();

        let result = stat.stat_source("gsiftp://missing.example/file").await;
        assert!(matches!(result, Err(LightpathError::Stat { .. })));
        assert_eq!(stat.calls(), vec!["gsiftp://missing.example/file"]);
    }
}
