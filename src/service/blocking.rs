use std::future::Future;

use tokio::runtime::Handle;

use crate::entity::{EntityRef, TenantId};
use crate::graph::{GraphQuery, Relation, RelationKey, RelationTypeGroup};
use crate::service::RelationService;
use crate::Result;

/// Synchronous front for [`RelationService`] for callers outside the runtime.
///
/// Each call blocks the current thread on the runtime behind `handle`.
/// Calling it from one of that runtime's worker threads panics.
#[derive(Clone)]
pub struct BlockingRelationService {
    inner: RelationService,
    handle: Handle,
}

impl BlockingRelationService {
    pub fn new(inner: RelationService, handle: Handle) -> Self {
        Self { inner, handle }
    }

    pub fn inner(&self) -> &RelationService {
        &self.inner
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }

    pub fn save_relation(&self, tenant: TenantId, relation: &Relation) -> Result<Relation> {
        self.block_on(self.inner.save_relation(tenant, relation))
    }

    pub fn save_relations(&self, tenant: TenantId, relations: &[Relation]) -> Result<Vec<Relation>> {
        self.block_on(self.inner.save_relations(tenant, relations))
    }

    pub fn delete_relation(&self, tenant: TenantId, key: &RelationKey) -> Result<Option<Relation>> {
        self.block_on(self.inner.delete_relation(tenant, key))
    }

    pub fn remove_all_relations(&self, tenant: TenantId, entity: &EntityRef) -> Result<Vec<Relation>> {
        self.block_on(self.inner.remove_all_relations(tenant, entity))
    }

    pub fn find_by_from(&self, from: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        self.block_on(self.inner.find_by_from(from, group))
    }

    pub fn find_by_from_and_type(
        &self,
        from: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        self.block_on(self.inner.find_by_from_and_type(from, relation_type, group))
    }

    pub fn find_by_to(&self, to: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        self.block_on(self.inner.find_by_to(to, group))
    }

    pub fn find_by_to_and_type(
        &self,
        to: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        self.block_on(self.inner.find_by_to_and_type(to, relation_type, group))
    }

    pub fn find_by_query(&self, query: &GraphQuery) -> Result<Vec<Relation>> {
        self.block_on(self.inner.find_by_query(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, ServiceConfig, TraversalConfig};
    use crate::entity::EntityType;
    use crate::graph::{Direction, CONTAINS_TYPE};
    use crate::store::InMemoryRelationStore;
    use std::sync::Arc;

    #[test]
    fn test_blocking_round_trip() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let service = RelationService::new(
            Arc::new(InMemoryRelationStore::new()),
            &CacheConfig::default(),
            &TraversalConfig::default(),
            &ServiceConfig::default(),
        );
        let blocking = BlockingRelationService::new(service, runtime.handle().clone());

        let a = EntityRef::random(EntityType::Asset);
        let b = EntityRef::random(EntityType::Asset);
        let c = EntityRef::random(EntityType::Device);
        blocking
            .save_relations(
                TenantId::SYSTEM,
                &[Relation::new(a, b, CONTAINS_TYPE), Relation::new(b, c, CONTAINS_TYPE)],
            )
            .unwrap();

        assert_eq!(blocking.find_by_from(&a, RelationTypeGroup::Common).unwrap().len(), 1);
        assert_eq!(
            blocking
                .find_by_to_and_type(&c, CONTAINS_TYPE, RelationTypeGroup::Common)
                .unwrap()
                .len(),
            1
        );
        let all = blocking
            .find_by_query(&GraphQuery::new(a, Direction::Outgoing).max_level(3))
            .unwrap();
        assert_eq!(all.len(), 2);

        assert_eq!(blocking.remove_all_relations(TenantId::SYSTEM, &b).unwrap().len(), 2);
        assert!(blocking.find_by_from(&a, RelationTypeGroup::Common).unwrap().is_empty());
    }
}
