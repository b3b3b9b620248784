use std::sync::Arc;

use crate::cache::key::RelationCacheKey;
use crate::cache::relation_cache::RelationCache;
use crate::entity::EntityRef;
use crate::error::Result;
use crate::graph::{Direction, Relation, RelationKey, RelationTypeGroup};
use crate::store::RelationStore;

/// Read path shared by the service and the traversal engine: store lookups
/// served through the relation cache.
#[derive(Clone)]
pub struct CachedLookup {
    store: Arc<dyn RelationStore>,
    cache: RelationCache,
}

impl CachedLookup {
    pub fn new(store: Arc<dyn RelationStore>, cache: RelationCache) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<dyn RelationStore> {
        &self.store
    }

    pub fn cache(&self) -> &RelationCache {
        &self.cache
    }

    pub async fn get(&self, key: &RelationKey) -> Result<Option<Relation>> {
        let found = self
            .cache
            .get_or_compute(RelationCacheKey::exact(key), || async {
                Ok(self.store.get(key).await?.into_iter().collect())
            })
            .await?;
        Ok(found.into_iter().next())
    }

    pub async fn find_by_from(&self, from: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        self.cache
            .get_or_compute(RelationCacheKey::outgoing(*from, None, group), || {
                self.store.find_by_from(from, group)
            })
            .await
    }

    pub async fn find_by_from_and_type(
        &self,
        from: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        self.cache
            .get_or_compute(RelationCacheKey::outgoing(*from, Some(relation_type), group), || {
                self.store.find_by_from_and_type(from, relation_type, group)
            })
            .await
    }

    pub async fn find_by_to(&self, to: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        self.cache
            .get_or_compute(RelationCacheKey::incoming(*to, None, group), || {
                self.store.find_by_to(to, group)
            })
            .await
    }

    pub async fn find_by_to_and_type(
        &self,
        to: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        self.cache
            .get_or_compute(RelationCacheKey::incoming(*to, Some(relation_type), group), || {
                self.store.find_by_to_and_type(to, relation_type, group)
            })
            .await
    }

    /// One hop away from `entity` in `direction`, any relation type.
    pub async fn find(
        &self,
        entity: &EntityRef,
        direction: Direction,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        match direction {
            Direction::Outgoing => self.find_by_from(entity, group).await,
            Direction::Incoming => self.find_by_to(entity, group).await,
        }
    }

    /// One hop away from `entity` in `direction`, restricted to one type.
    pub async fn find_typed(
        &self,
        entity: &EntityRef,
        direction: Direction,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        match direction {
            Direction::Outgoing => self.find_by_from_and_type(entity, relation_type, group).await,
            Direction::Incoming => self.find_by_to_and_type(entity, relation_type, group).await,
        }
    }
}
