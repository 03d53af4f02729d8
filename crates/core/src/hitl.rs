//! HITL Coordinator (spec §4.10, C10).
//!
//! Grounded in `querymt_agent::elicitation`'s pending-request map and
//! timeout-then-auto-resolve pattern, narrowed to the spec's single
//! `option` request kind. A `oneshot` channel per request stands in for the
//! teacher's MCP elicitation promise.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::WorldError;
use crate::event_bus::EventBus;
use crate::events::{EventKind, SystemEventType};
use crate::model::HitlOption;

pub const DEFAULT_HITL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitlResponse {
    Option(String),
    Cancelled,
}

pub struct HitlCoordinator {
    bus: Arc<EventBus>,
    pending: Mutex<HashMap<String, oneshot::Sender<HitlResponse>>>,
}

impl HitlCoordinator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus, pending: Mutex::new(HashMap::new()) }
    }

    /// Publishes a `hitl_option_request` system event and waits for a
    /// response, auto-resolving to `Cancelled` after `timeout` (spec §4.10,
    /// default 60s).
    pub async fn request_option(
        &self,
        world_id: &str,
        prompt: &str,
        options: Vec<HitlOption>,
    ) -> Result<HitlResponse, WorldError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        self.bus.publish(
            world_id,
            EventKind::System {
                event_type: SystemEventType::HitlOptionRequest,
                chat_id: None,
                message_id: None,
                content: Some(prompt.to_string()),
                request_id: Some(request_id.clone()),
                options: Some(options),
            },
        );

        match tokio::time::timeout(DEFAULT_HITL_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Ok(HitlResponse::Cancelled),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Ok(HitlResponse::Cancelled)
            }
        }
    }

    /// Resolves a pending request with the chosen option (spec §4.10's
    /// `submitWorldOptionResponse`). Errors with `InvalidRequest`-shaped
    /// `ToolNotFound`-sibling semantics when unknown/already resolved —
    /// modeled here as a plain `WorldError::Internal` carrying the code.
    pub fn submit_response(&self, request_id: &str, option_id: &str) -> Result<(), WorldError> {
        let sender = self.pending.lock().remove(request_id);
        match sender {
            Some(sender) => {
                let _ = sender.send(HitlResponse::Option(option_id.to_string()));
                Ok(())
            }
            None => Err(WorldError::Internal(format!("INVALID_REQUEST: unknown or resolved hitl request {request_id}"))),
        }
    }

    /// Cancels every pending request for this coordinator (spec §4.3:
    /// "cancellation of the world cancels all pending HITL requests").
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock();
        for (_, sender) in pending.drain() {
            let _ = sender.send(HitlResponse::Cancelled);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: &str) -> HitlOption {
        HitlOption { id: id.to_string(), label: id.to_string() }
    }

    #[tokio::test]
    async fn submit_response_resolves_pending_request() {
        let bus = Arc::new(EventBus::new());
        let coordinator = Arc::new(HitlCoordinator::new(bus));
        let coordinator_clone = coordinator.clone();

        let handle = tokio::spawn(async move {
            coordinator_clone.request_option("w1", "pick one", vec![option("a"), option("b")]).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let request_id = {
            let pending = coordinator.pending.lock();
            pending.keys().next().unwrap().clone()
        };
        coordinator.submit_response(&request_id, "a").unwrap();

        let response = handle.await.unwrap().unwrap();
        assert_eq!(response, HitlResponse::Option("a".to_string()));
    }

    #[test]
    fn submit_response_errors_on_unknown_request() {
        let bus = Arc::new(EventBus::new());
        let coordinator = HitlCoordinator::new(bus);
        let result = coordinator.submit_response("missing", "a");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancel_all_resolves_every_pending_request() {
        let bus = Arc::new(EventBus::new());
        let coordinator = Arc::new(HitlCoordinator::new(bus));
        let coordinator_clone = coordinator.clone();

        let handle = tokio::spawn(async move { coordinator_clone.request_option("w1", "pick", vec![option("a")]).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coordinator.pending_count(), 1);
        coordinator.cancel_all();

        let response = handle.await.unwrap().unwrap();
        assert_eq!(response, HitlResponse::Cancelled);
    }
}
