//! Transition events
//!
//! Emitted after every committed transition for an external audit logger.
//! This crate does not persist them.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::TransferStatus;
use crate::core_types::{TransferId, UserId};

/// One committed transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub transfer_id: TransferId,
    /// `None` for creation
    pub from_status: Option<TransferStatus>,
    pub to_status: TransferStatus,
    pub actor_user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    pub fn new(
        transfer_id: TransferId,
        from_status: Option<TransferStatus>,
        to_status: TransferStatus,
        actor_user_id: UserId,
    ) -> Self {
        Self {
            transfer_id,
            from_status,
            to_status,
            actor_user_id,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of transition events. Must not fail the transition.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: TransitionEvent);
}

/// Writes every event as a structured `tracing` record on target `audit`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: TransitionEvent) {
        tracing::info!(
            target: "audit",
            transfer_id = event.transfer_id,
            from_status = event.from_status.map(|s| s.as_str()).unwrap_or("NONE"),
            to_status = event.to_status.as_str(),
            actor_user_id = event.actor_user_id,
            timestamp = %event.timestamp.to_rfc3339(),
            "Transfer transition"
        );
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<TransitionEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn events_for(&self, transfer_id: TransferId) -> Vec<TransitionEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.transfer_id == transfer_id)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: TransitionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_collects_in_order() {
        let sink = MemoryAuditSink::new();
        sink.record(TransitionEvent::new(1, None, TransferStatus::Pending, 5))
            .await;
        sink.record(TransitionEvent::new(
            1,
            Some(TransferStatus::Pending),
            TransferStatus::Approved,
            6,
        ))
        .await;
        sink.record(TransitionEvent::new(2, None, TransferStatus::Draft, 5))
            .await;

        let events = sink.events_for(1);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].from_status, None);
        assert_eq!(events[1].to_status, TransferStatus::Approved);
        assert_eq!(events[1].actor_user_id, 6);
        assert_eq!(sink.events().len(), 3);
    }

    #[tokio::test]
    async fn test_tracing_sink_does_not_panic_without_subscriber() {
        TracingAuditSink
            .record(TransitionEvent::new(1, None, TransferStatus::Draft, 1))
            .await;
    }

    #[test]
    fn test_event_serializes_status_names() {
        let e = TransitionEvent::new(3, Some(TransferStatus::Approved), TransferStatus::Delivered, 9);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["from_status"], "APPROVED");
        assert_eq!(json["to_status"], "DELIVERED");
        assert_eq!(json["actor_user_id"], 9);
    }
}
