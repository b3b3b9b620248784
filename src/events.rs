//! Relation change events.
//!
//! Every mutation made through the service is published on a
//! `tokio::sync::broadcast` channel. Subscribers (alarm propagation, field
//! recomputation, cluster fan-out) live outside this crate and receive the
//! events they keep up with; lagging receivers lose the oldest events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::entity::{EntityRef, TenantId};
use crate::graph::{Relation, RelationTypeGroup};

const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationOperation {
    AddOrUpdate,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationChangeEvent {
    pub tenant: TenantId,
    pub from: EntityRef,
    pub to: EntityRef,
    pub relation_type: String,
    pub type_group: RelationTypeGroup,
    pub operation: RelationOperation,
    pub timestamp: DateTime<Utc>,
}

impl RelationChangeEvent {
    pub fn new(tenant: TenantId, relation: &Relation, operation: RelationOperation) -> Self {
        Self {
            tenant,
            from: relation.from,
            to: relation.to,
            relation_type: relation.relation_type.clone(),
            type_group: relation.type_group,
            operation,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts relation change events to any number of subscribers.
#[derive(Clone)]
pub struct ChangeEventPublisher {
    sender: broadcast::Sender<RelationChangeEvent>,
    published: Arc<AtomicU64>,
}

impl ChangeEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelationChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published since construction.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Publish one event. Having no subscribers is not an error.
    pub fn publish(&self, event: RelationChangeEvent) {
        log::trace!(
            "{:?} {} -[{}/{}]-> {}",
            event.operation,
            event.from,
            event.type_group,
            event.relation_type,
            event.to
        );
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(event).is_err() {
            log::trace!("No subscribers for relation change event");
        }
    }

    pub fn relation_changed(&self, tenant: TenantId, relation: &Relation, operation: RelationOperation) {
        self.publish(RelationChangeEvent::new(tenant, relation, operation));
    }
}

impl Default for ChangeEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::graph::CONTAINS_TYPE;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let publisher = ChangeEventPublisher::default();
        let mut rx = publisher.subscribe();
        let tenant = TenantId(Uuid::new_v4());
        let rel = Relation::new(
            EntityRef::random(EntityType::Asset),
            EntityRef::random(EntityType::Device),
            CONTAINS_TYPE,
        );

        publisher.relation_changed(tenant, &rel, RelationOperation::AddOrUpdate);
        publisher.relation_changed(tenant, &rel, RelationOperation::Delete);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.operation, RelationOperation::AddOrUpdate);
        assert_eq!(first.tenant, tenant);
        assert_eq!(first.from, rel.from);
        assert_eq!(first.relation_type, CONTAINS_TYPE);
        assert_eq!(rx.recv().await.unwrap().operation, RelationOperation::Delete);
        assert_eq!(publisher.published(), 2);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = ChangeEventPublisher::new(4);
        let rel = Relation::new(
            EntityRef::random(EntityType::Asset),
            EntityRef::random(EntityType::Asset),
            CONTAINS_TYPE,
        );
        publisher.relation_changed(TenantId::SYSTEM, &rel, RelationOperation::Delete);
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(publisher.published(), 1);
    }

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(
            serde_json::to_string(&RelationOperation::AddOrUpdate).unwrap(),
            "\"ADD_OR_UPDATE\""
        );
    }
}
