//! Circuit manager state machine.
//!
//! Holds at most one active circuit reservation per batch and decides when a
//! circuit must be requested, reused, or released. The remote controller is
//! treated as unreliable and optional: every interaction degrades to
//! "proceed without a circuit" rather than blocking or failing the transfer.
//!
//! States:
//!
//! ```text
//! Idle ──request──> Requesting ──success──> Active
//!  ^ ^                  │                      │
//!  │ └────failure───────┘                      │
//!  │                                           │
//!  └─────── Releasing <──release, pending == 0─┘
//! ```
//!
//! `Requesting` and `Releasing` cover the awaited remote call; events for
//! one batch never overlap, so neither state is observable between
//! dispatches. Any controller error, timeouts included, sends the manager
//! back to `Idle`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::config::ListenerConfig;
use crate::controller::{ControllerClient, ReservationRequest};
use crate::endpoint::PassiveEndpoint;
use crate::error::LightpathError;

/// Opaque circuit identifier allocated by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct CircuitId(pub String);

impl From<String> for CircuitId {
    fn from(id: String) -> Self {
        CircuitId(id)
    }
}

impl From<&str> for CircuitId {
    fn from(id: &str) -> Self {
        CircuitId(id.to_string())
    }
}

impl CircuitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CircuitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A held circuit reservation.
///
/// Created by a successful reservation call; never mutated; released exactly
/// once.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Circuit {
    pub id: CircuitId,
    pub acquired_at: DateTime<Utc>,
}

/// Current state of the circuit manager.
#[derive(Debug, Clone, serde::Serialize)]
pub enum CircuitState {
    /// No circuit, no request outstanding
    Idle,
    /// Reservation call in flight
    Requesting,
    /// Circuit held for the batch
    Active(Circuit),
    /// Release call in flight
    Releasing,
}

/// Small state machine coordinating circuit setup and teardown with the
/// controller for one batch.
pub struct CircuitManager<C: ControllerClient> {
    controller_endpoint: Option<String>,
    client: Arc<C>,
    reserve_timeout_ms: u64,
    release_timeout_ms: u64,
    state: CircuitState,
}

impl<C: ControllerClient> CircuitManager<C> {
    /// Create a manager for one batch. The controller endpoint is taken from
    /// the config as resolved at listener creation.
    pub fn new(config: &ListenerConfig, client: Arc<C>) -> Self {
        Self {
            controller_endpoint: config.controller_endpoint.clone(),
            client,
            reserve_timeout_ms: config.reserve_timeout_ms,
            release_timeout_ms: config.release_timeout_ms,
            state: CircuitState::Idle,
        }
    }

    /// Current state, for inspection and logging.
    pub fn state(&self) -> &CircuitState {
        &self.state
    }

    /// The circuit currently held for the batch, if any.
    pub fn active_circuit(&self) -> Option<&Circuit> {
        match &self.state {
            CircuitState::Active(circuit) => Some(circuit),
            _ => None,
        }
    }

    /// Make sure a circuit exists for the batch, reusing the held one when
    /// present.
    ///
    /// Idempotent: once a reservation has succeeded, every further call
    /// returns the same id without a remote call. With no controller
    /// endpoint configured this is a logged skip. A failed reservation
    /// leaves the manager `Idle` and the batch proceeds without a circuit.
    pub async fn ensure_circuit(
        &mut self,
        endpoint: &PassiveEndpoint,
        volume_hint: u64,
        pair_count: usize,
    ) -> Option<CircuitId> {
        if let CircuitState::Active(circuit) = &self.state {
            tracing::info!(circuit_id = %circuit.id, "Reusing circuit for this batch");
            counter!("lightpath_circuit_reuse_total").increment(1);
            return Some(circuit.id.clone());
        }

        let Some(controller) = self.controller_endpoint.clone() else {
            tracing::info!("No controller endpoint configured, skipping circuit setup");
            counter!("lightpath_reservations_total", "outcome" => "skipped").increment(1);
            return None;
        };

        if !matches!(self.state, CircuitState::Idle) {
            // Events for one batch never overlap; seeing a transient state
            // here means the engine broke that contract.
            tracing::warn!(state = ?self.state, "Circuit manager busy, ignoring endpoint notification");
            return None;
        }

        tracing::info!(
            controller = %controller,
            endpoint = %endpoint,
            volume_hint,
            pair_count,
            "Requesting circuit from controller"
        );
        self.state = CircuitState::Requesting;

        let request = ReservationRequest {
            controller,
            endpoint: endpoint.clone(),
            volume_hint,
            pair_count,
        };

        // The bound holds even when the client does not enforce its own
        let outcome = tokio::time::timeout(
            Duration::from_millis(self.reserve_timeout_ms),
            self.client.reserve(&request, self.reserve_timeout_ms),
        )
        .await
        .unwrap_or_else(|_| {
            Err(LightpathError::Reservation(format!(
                "reservation timed out after {}ms",
                self.reserve_timeout_ms
            )))
        });

        match outcome {
            Ok(id) => {
                tracing::info!(circuit_id = %id, "Controller allocated circuit for this batch");
                counter!("lightpath_reservations_total", "outcome" => "ok").increment(1);
                let circuit = Circuit {
                    id: id.clone(),
                    acquired_at: Utc::now(),
                };
                self.state = CircuitState::Active(circuit);
                Some(id)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Circuit reservation failed, proceeding without circuit"
                );
                counter!("lightpath_reservations_total", "outcome" => "error").increment(1);
                self.state = CircuitState::Idle;
                None
            }
        }
    }

    /// Release the held circuit once no transfers remain.
    ///
    /// No-op while `pending > 0` or when no circuit is held, so it is safe
    /// to call any number of times. The remote release is attempted exactly
    /// once; whether or not it succeeds the manager returns to `Idle`, and a
    /// failure is logged at error severity since a leaked circuit needs
    /// operator attention.
    pub async fn release_circuit(&mut self, pending: u64) {
        if pending > 0 {
            tracing::info!(pending, "Files still waiting to be transferred, keeping circuit");
            return;
        }

        match std::mem::replace(&mut self.state, CircuitState::Releasing) {
            CircuitState::Active(circuit) => {
                if let Some(controller) = self.controller_endpoint.clone() {
                    tracing::info!(
                        circuit_id = %circuit.id,
                        controller = %controller,
                        "Releasing circuit at controller"
                    );

                    let outcome = tokio::time::timeout(
                        Duration::from_millis(self.release_timeout_ms),
                        self.client
                            .release(&controller, &circuit.id, self.release_timeout_ms),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        Err(LightpathError::Release(format!(
                            "release timed out after {}ms",
                            self.release_timeout_ms
                        )))
                    });

                    match outcome {
                        Ok(()) => {
                            tracing::info!(circuit_id = %circuit.id, "Circuit released");
                            counter!("lightpath_releases_total", "outcome" => "ok").increment(1);
                        }
                        Err(e) => {
                            tracing::error!(
                                circuit_id = %circuit.id,
                                error = %e,
                                "Circuit release failed, the circuit may be leaked"
                            );
                            counter!("lightpath_releases_total", "outcome" => "error").increment(1);
                        }
                    }
                }
                self.state = CircuitState::Idle;
            }
            state => {
                tracing::info!("There is no circuit to release");
                self.state = state;
            }
        }
    }

    /// Best-effort release when the owning batch is torn down externally,
    /// regardless of how many transfers are still pending. Advisory: an
    /// abandoned circuit must eventually be reclaimable controller-side.
    pub async fn release_on_abort(&mut self) {
        if matches!(self.state, CircuitState::Active(_)) {
            tracing::warn!("Batch aborted with an active circuit, attempting release");
            self.release_circuit(0).await;
        }
    }
}
