//! SDN controller client abstraction.
//!
//! This module defines the `ControllerClient` trait to abstract the two
//! remote calls the circuit manager makes (reserve, release), enabling
//! testability with mock implementations that return canned results without
//! a real controller round trip.
//!
//! The wire protocol of the controller is not pinned down upstream, so the
//! production client speaks a minimal JSON-over-HTTP shape. Everything above
//! the trait is protocol-agnostic.

use crate::circuit::CircuitId;
use crate::endpoint::PassiveEndpoint;
use crate::error::{LightpathError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Parameters for a circuit reservation.
///
/// The byte volume and pair count travel to the controller as scheduling
/// hints; the controller is free to ignore them.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReservationRequest {
    /// Address of the controller to call
    pub controller: String,
    /// Destination endpoint the transfers will connect to
    pub endpoint: PassiveEndpoint,
    /// Total bytes expected to move over the circuit
    pub volume_hint: u64,
    /// Number of transfer pairs in the batch
    pub pair_count: usize,
}

/// Trait for the controller's reservation and release calls.
///
/// Both calls may block on a network round trip and must honor the supplied
/// timeout. The circuit manager treats any error, including expiry, as
/// "proceed without a circuit" — implementations never need to retry.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Reserve a circuit for a batch.
    ///
    /// # Errors
    /// Returns an error if the controller is unreachable, rejects the
    /// reservation, or the call times out.
    async fn reserve(&self, request: &ReservationRequest, timeout_ms: u64) -> Result<CircuitId>;

    /// Release a previously reserved circuit.
    ///
    /// # Errors
    /// Returns an error if the controller is unreachable, rejects the
    /// release, or the call times out.
    async fn release(&self, controller: &str, circuit: &CircuitId, timeout_ms: u64) -> Result<()>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Body of a successful reservation response.
#[derive(serde::Deserialize)]
struct ReserveResponse {
    circuit_id: String,
}

/// Production controller client using reqwest.
///
/// Speaks `POST {controller}/circuits` to reserve and
/// `DELETE {controller}/circuits/{id}` to release.
#[derive(Clone)]
pub struct HttpControllerClient {
    client: reqwest::Client,
}

impl HttpControllerClient {
    /// Create a new reqwest-based controller client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpControllerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    #[tracing::instrument(skip(self, request), fields(controller = %request.controller, host = %request.endpoint.host))]
    async fn reserve(&self, request: &ReservationRequest, timeout_ms: u64) -> Result<CircuitId> {
        let url = format!("{}/circuits", request.controller.trim_end_matches('/'));

        tracing::debug!(
            url = %url,
            volume_hint = request.volume_hint,
            pair_count = request.pair_count,
            timeout_ms,
            "Requesting circuit reservation"
        );

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(timeout_ms))
            .json(&serde_json::json!({
                "host": request.endpoint.host,
                "ip": request.endpoint.ip,
                "port": request.endpoint.port,
                "volume_bytes": request.volume_hint,
                "pair_count": request.pair_count,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LightpathError::Reservation(format!(
                "controller returned {status}: {body}"
            )));
        }

        let body: ReserveResponse = response.json().await?;

        tracing::info!(circuit_id = %body.circuit_id, "Controller allocated circuit");

        Ok(CircuitId::from(body.circuit_id))
    }

    #[tracing::instrument(skip(self), fields(controller = %controller, circuit_id = %circuit))]
    async fn release(&self, controller: &str, circuit: &CircuitId, timeout_ms: u64) -> Result<()> {
        let url = format!(
            "{}/circuits/{}",
            controller.trim_end_matches('/'),
            circuit.as_str()
        );

        tracing::debug!(url = %url, timeout_ms, "Releasing circuit");

        let response = self
            .client
            .delete(&url)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LightpathError::Release(format!(
                "controller returned {status}: {body}"
            )));
        }

        tracing::info!("Controller released circuit");

        Ok(())
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::sync::Arc;

/// Record of a call made to the mock controller client.
#[derive(Debug, Clone)]
pub enum ControllerCall {
    Reserve {
        controller: String,
        host: String,
        ip: String,
        port: u16,
        volume_hint: u64,
        pair_count: usize,
        timeout_ms: u64,
    },
    Release {
        controller: String,
        circuit: CircuitId,
        timeout_ms: u64,
    },
}

/// Mock controller client for testing.
///
/// Canned results are queued per operation and consumed in FIFO order; a
/// call with nothing queued fails, which exercises the degrade-to-no-circuit
/// paths. Every call is recorded for assertion.
///
/// # Example
/// ```ignore
/// let mock = MockControllerClient::new();
/// mock.push_reserve_result(Ok(CircuitId::from("vlan-21000")));
/// ```
#[derive(Clone, Default)]
pub struct MockControllerClient {
    reserve_results: Arc<Mutex<Vec<Result<CircuitId>>>>,
    release_results: Arc<Mutex<Vec<Result<()>>>>,
    calls: Arc<Mutex<Vec<ControllerCall>>>,
}

impl MockControllerClient {
    /// Create a new mock controller client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for the next unconsumed reserve call.
    pub fn push_reserve_result(&self, result: Result<CircuitId>) {
        self.reserve_results.lock().push(result);
    }

    /// Queue a result for the next unconsumed release call.
    pub fn push_release_result(&self, result: Result<()>) {
        self.release_results.lock().push(result);
    }

    /// Get all calls that have been made to this mock client.
    pub fn calls(&self) -> Vec<ControllerCall> {
        self.calls.lock().clone()
    }

    /// Get the number of reserve calls made.
    pub fn reserve_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ControllerCall::Reserve { .. }))
            .count()
    }

    /// Get the number of release calls made.
    pub fn release_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ControllerCall::Release { .. }))
            .count()
    }
}

#[async_trait]
impl ControllerClient for MockControllerClient {
    async fn reserve(&self, request: &ReservationRequest, timeout_ms: u64) -> Result<CircuitId> {
        self.calls.lock().push(ControllerCall::Reserve {
            controller: request.controller.clone(),
            host: request.endpoint.host.clone(),
            ip: request.endpoint.ip.clone(),
            port: request.endpoint.port,
            volume_hint: request.volume_hint,
            pair_count: request.pair_count,
            timeout_ms,
        });

        let mut results = self.reserve_results.lock();
        if results.is_empty() {
            return Err(LightpathError::Reservation(
                "no mock reservation result configured".to_string(),
            ));
        }
        results.remove(0)
    }

    async fn release(&self, controller: &str, circuit: &CircuitId, timeout_ms: u64) -> Result<()> {
        self.calls.lock().push(ControllerCall::Release {
            controller: controller.to_string(),
            circuit: circuit.clone(),
            timeout_ms,
        });

        let mut results = self.release_results.lock();
        if results.is_empty() {
            return Err(LightpathError::Release(
                "no mock release result configured".to_string(),
            ));
        }
        results.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> PassiveEndpoint {
        PassiveEndpoint {
            host: "dest.example".to_string(),
            ip: "192.168.0.1".to_string(),
            port: 2811,
        }
    }

    #[tokio::test]
    async fn test_mock_reserve_fifo_order() {
        let mock = MockControllerClient::new();
        mock.push_reserve_result(Ok(CircuitId::from("vlan-20001")));
        mock.push_reserve_result(Ok(CircuitId::from("vlan-20002")));

        let request = ReservationRequest {
            controller: "http://controller.example".to_string(),
            endpoint: endpoint(),
            volume_hint: 4096,
            pair_count: 2,
        };

        let first = mock.reserve(&request, 5000).await.unwrap();
        let second = mock.reserve(&request, 5000).await.unwrap();
        assert_eq!(first.as_str(), "vlan-20001");
        assert_eq!(second.as_str(), "vlan-20002");
        assert_eq!(mock.reserve_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_reserve_unconfigured_fails() {
        let mock = MockControllerClient::new();

        let request = ReservationRequest {
            controller: "http://controller.example".to_string(),
            endpoint: endpoint(),
            volume_hint: 0,
            pair_count: 0,
        };

        let result = mock.reserve(&request, 5000).await;
        assert!(matches!(result, Err(LightpathError::Reservation(_))));
        // The failed call is still recorded
        assert_eq!(mock.reserve_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_release_records_circuit() {
        let mock = MockControllerClient::new();
        mock.push_release_result(Ok(()));

        let circuit = CircuitId::from("vlan-25000");
        mock.release("http://controller.example", &circuit, 5000)
            .await
            .unwrap();

        assert_eq!(mock.release_count(), 1);
        match &mock.calls()[0] {
            ControllerCall::Release {
                controller,
                circuit,
                timeout_ms,
            } => {
                assert_eq!(controller, "http://controller.example");
                assert_eq!(circuit.as_str(), "vlan-25000");
                assert_eq!(*timeout_ms, 5000);
            }
            other => panic!("expected a release call, got {:?}", other),
        }
    }
}
