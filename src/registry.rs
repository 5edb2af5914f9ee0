//! Transfer pair registry.
//!
//! Holds the ordered collection of source/destination endpoints announced
//! for the current batch. The engine announces each pair as a
//! `"source => destination"` string; fields may be escaped, and unescaping
//! is the collaborator URI layer's concern, not ours.

use crate::error::{LightpathError, Result};
use crate::stat::StatProvider;

/// Separator between the two endpoints of an announcement.
const PAIR_SEPARATOR: &str = " => ";

/// One source/destination pair announced for the batch.
///
/// Immutable once created; owned by the registry for the duration of one
/// batch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TransferPair {
    pub source: String,
    pub destination: String,
}

impl TransferPair {
    /// Parse an engine announcement of the form `"source => destination"`.
    ///
    /// # Errors
    /// Returns `MalformedAnnouncement` if the separator is absent.
    pub fn parse(announcement: &str) -> Result<Self> {
        let (source, destination) = announcement
            .split_once(PAIR_SEPARATOR)
            .ok_or_else(|| LightpathError::MalformedAnnouncement(announcement.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            destination: destination.to_string(),
        })
    }
}

/// Aggregated size information over a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SizeSummary {
    /// Sum of the sizes of the stattable sources
    pub total_bytes: u64,
    /// Number of sources that could be statted
    pub reachable: u64,
}

/// Ordered collection of the pairs announced for the current batch.
#[derive(Debug, Default)]
pub struct PairRegistry {
    pairs: Vec<TransferPair>,
}

impl PairRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all pairs. Used at the start of a new listing phase.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Parse an announcement and append the pair, preserving announcement
    /// order.
    ///
    /// # Errors
    /// Returns `MalformedAnnouncement` if the separator is absent. The
    /// caller decides whether to skip or abort; the dispatcher skips.
    pub fn append(&mut self, announcement: &str) -> Result<()> {
        self.pairs.push(TransferPair::parse(announcement)?);
        Ok(())
    }

    /// Number of pairs currently registered.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the registry holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The first announced pair, used as a representative label in logs.
    pub fn first(&self) -> Option<&TransferPair> {
        self.pairs.first()
    }

    /// Iterate over the pairs in announcement order.
    pub fn iter(&self) -> impl Iterator<Item = &TransferPair> {
        self.pairs.iter()
    }

    /// Stat every pair's source and accumulate byte sizes.
    ///
    /// Sources are statted sequentially in registry order. A failed stat is
    /// logged and excluded from both totals; it never aborts the
    /// aggregation. Idempotent when re-invoked against an unchanged
    /// registry.
    pub async fn aggregate_size<S: StatProvider + ?Sized>(&self, stat: &S) -> SizeSummary {
        let mut summary = SizeSummary::default();

        for pair in &self.pairs {
            match stat.stat_source(&pair.source).await {
                Ok(source_stat) => {
                    summary.total_bytes += source_stat.size;
                    summary.reachable += 1;
                }
                Err(e) => {
                    tracing::error!(
                        source = %pair.source,
                        error = %e,
                        "Could not stat source, excluding it from the aggregate"
                    );
                }
            }
        }

        summary
    }
}
