//! Batch event listener and dispatcher.
//!
//! The transfer engine registers one listener per copy operation (bulk or
//! single) and invokes it synchronously, in order, for every lifecycle
//! notification of that batch. The listener owns the whole of the batch's
//! state: the pair registry, the circuit manager, and the completion
//! tracker. Concurrent batches each own an independent listener with no
//! shared mutable state between them.

use std::sync::Arc;

use metrics::counter;
use uuid::Uuid;

use crate::circuit::{CircuitManager, CircuitState};
use crate::config::ListenerConfig;
use crate::controller::ControllerClient;
use crate::endpoint::PassiveEndpoint;
use crate::progress::ProgressTracker;
use crate::registry::PairRegistry;
use crate::stat::StatProvider;

/// Unique identifier for a batch, generated at listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Lifecycle notification delivered by the transfer engine.
///
/// Descriptions are opaque per-notification strings; the relevant component
/// parses them.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// The engine starts listing the files of the batch
    ListEnter,
    /// One announced pair, of the form `"source => destination"`
    ListItem(String),
    /// Listing finished, the pair set is complete
    ListExit,
    /// Destination endpoint a transfer will connect to, `host:[ip]:port`
    PassiveEndpoint(String),
    /// One transfer finished
    TransferExit,
}

impl TransferEvent {
    /// Stage label for logging.
    pub fn stage(&self) -> &'static str {
        match self {
            TransferEvent::ListEnter => "list-enter",
            TransferEvent::ListItem(_) => "list-item",
            TransferEvent::ListExit => "list-exit",
            TransferEvent::PassiveEndpoint(_) => "passive-endpoint",
            TransferEvent::TransferExit => "transfer-exit",
        }
    }
}

/// Event listener for one batch.
///
/// Routes notifications to the pair registry, the circuit manager, and the
/// progress tracker. No notification handling is allowed to fail the batch:
/// bad entries are skipped and controller trouble degrades to transferring
/// without a circuit.
pub struct BatchListener<C: ControllerClient, S: StatProvider> {
    batch_id: BatchId,
    registry: PairRegistry,
    circuit: CircuitManager<C>,
    progress: ProgressTracker,
    stat: Arc<S>,
    total_bytes: u64,
}

impl<C: ControllerClient, S: StatProvider> BatchListener<C, S> {
    /// Register a listener for a new batch.
    ///
    /// The controller endpoint is resolved from the config here, once; its
    /// absence disables circuit setup for the whole batch.
    pub fn new(config: &ListenerConfig, controller: Arc<C>, stat: Arc<S>) -> Self {
        let batch_id = BatchId::from(Uuid::new_v4());

        tracing::info!(
            batch_id = %batch_id,
            controller = config.controller_endpoint.as_deref().unwrap_or("<none>"),
            "Batch event listener registered"
        );

        Self {
            batch_id,
            registry: PairRegistry::new(),
            circuit: CircuitManager::new(config, controller),
            progress: ProgressTracker::new(),
            stat,
            total_bytes: 0,
        }
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// The pairs announced so far.
    pub fn registry(&self) -> &PairRegistry {
        &self.registry
    }

    /// Aggregated byte volume of the batch, as of the last completed
    /// listing.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Transfers still awaiting completion.
    pub fn pending(&self) -> u64 {
        self.progress.pending()
    }

    /// Current circuit manager state.
    pub fn circuit_state(&self) -> &CircuitState {
        self.circuit.state()
    }

    /// Handle one lifecycle notification.
    ///
    /// Invoked by the engine once per notification, synchronously and in
    /// emission order. Never returns an error: every failure is absorbed
    /// here with a log record.
    #[tracing::instrument(skip(self, event), fields(batch_id = %self.batch_id, stage = event.stage()))]
    pub async fn on_event(&mut self, event: TransferEvent) {
        match event {
            TransferEvent::ListEnter => {
                tracing::debug!("Listing starts, clearing pair registry");
                self.registry.clear();
                self.total_bytes = 0;
            }

            TransferEvent::ListItem(description) => {
                if let Err(e) = self.registry.append(&description) {
                    counter!("lightpath_malformed_announcements_total").increment(1);
                    tracing::warn!(error = %e, "Skipping malformed announcement");
                }
            }

            TransferEvent::ListExit => {
                let summary = self.registry.aggregate_size(self.stat.as_ref()).await;
                self.total_bytes = summary.total_bytes;
                self.progress.set_pending(summary.reachable);

                match self.registry.first() {
                    Some(pair) => {
                        tracing::info!(
                            source = %pair.source,
                            destination = %pair.destination,
                            pair_count = self.registry.len(),
                            total_bytes = summary.total_bytes,
                            reachable = summary.reachable,
                            "Batch listing complete"
                        );
                    }
                    None => {
                        tracing::info!("Batch listing complete with no pairs");
                    }
                }
            }

            TransferEvent::PassiveEndpoint(description) => {
                let endpoint = match PassiveEndpoint::parse(&description) {
                    Ok(endpoint) => endpoint,
                    Err(e) => {
                        counter!("lightpath_endpoint_parse_failures_total").increment(1);
                        tracing::error!(
                            description = %description,
                            error = %e,
                            "Ignoring unparsable passive endpoint"
                        );
                        return;
                    }
                };

                tracing::debug!(
                    endpoint = %endpoint,
                    pending = self.progress.pending(),
                    "Passive endpoint notification"
                );

                self.circuit
                    .ensure_circuit(&endpoint, self.total_bytes, self.registry.len())
                    .await;
            }

            TransferEvent::TransferExit => {
                let remaining = self.progress.on_transfer_finish();
                tracing::debug!(remaining, "Transfer finished");
                if remaining == 0 {
                    self.circuit.release_circuit(0).await;
                }
            }
        }
    }

    /// Best-effort teardown when the owning copy operation is aborted
    /// externally. Attempts to release an active circuit before the batch
    /// state is discarded.
    pub async fn abort(&mut self) {
        tracing::info!(batch_id = %self.batch_id, "Batch aborted, tearing down");
        self.circuit.release_on_abort().await;
    }
}
