//! Relation service: the single entry point for reading and mutating the
//! relation graph.
//!
//! Every write is validated, persisted through the [`RelationStore`], then
//! followed by cache eviction of the five affected key shapes and one
//! change event per edge. Eviction goes through the transaction signal, so
//! writes made inside [`Transaction::scope`](crate::cache::Transaction::scope)
//! only invalidate once the transaction ends.

mod blocking;
mod naming;
mod validation;


pub use blocking::BlockingRelationService;
pub use naming::{EntityNameResolver, UNKNOWN_NAME};

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::cache::{CacheStats, CachedLookup, RelationCache};
use crate::config::{CacheConfig, Config, ServiceConfig, TraversalConfig};
use crate::entity::{EntityRef, TenantId};
use crate::events::{ChangeEventPublisher, RelationChangeEvent, RelationOperation};
use crate::graph::{
    Direction, GraphQuery, Relation, RelationInfo, RelationKey, RelationPathQuery, RelationTypeGroup,
    TraversalEngine,
};
use crate::store::RelationStore;
use crate::Result;

use validation::{validate_entity, validate_key, validate_relation, validate_relation_type};

#[derive(Clone)]
pub struct RelationService {
    lookup: CachedLookup,
    engine: TraversalEngine,
    events: ChangeEventPublisher,
    names: Option<Arc<dyn EntityNameResolver>>,
    batch_size: usize,
    max_path_query_results: usize,
}

impl RelationService {
    pub fn new(
        store: Arc<dyn RelationStore>,
        cache: &CacheConfig,
        traversal: &TraversalConfig,
        service: &ServiceConfig,
    ) -> Self {
        let cache = if cache.enabled {
            RelationCache::new(cache.capacity)
        } else {
            RelationCache::disabled()
        };
        let lookup = CachedLookup::new(store, cache);
        Self {
            engine: TraversalEngine::new(lookup.clone(), traversal),
            lookup,
            events: ChangeEventPublisher::default(),
            names: None,
            batch_size: service.batch_size.max(1),
            max_path_query_results: service.max_path_query_results,
        }
    }

    pub fn from_config(store: Arc<dyn RelationStore>, config: &Config) -> Self {
        Self::new(store, &config.cache, &config.traversal, &config.service)
    }

    pub fn with_name_resolver(mut self, resolver: Arc<dyn EntityNameResolver>) -> Self {
        self.names = Some(resolver);
        self
    }

    pub fn with_events(mut self, events: ChangeEventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelationChangeEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &RelationCache {
        self.lookup.cache()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lookup.cache().stats()
    }

    fn store(&self) -> &Arc<dyn RelationStore> {
        self.lookup.store()
    }

    fn changed(&self, tenant: TenantId, relation: &Relation, operation: RelationOperation) {
        self.lookup.cache().evict_relation(&relation.key());
        self.events.relation_changed(tenant, relation, operation);
    }

    // ---- writes ----

    /// Insert or update one edge.
    pub async fn save_relation(&self, tenant: TenantId, relation: &Relation) -> Result<Relation> {
        validate_relation(relation)?;
        log::trace!("Saving {} -[{}]-> {}", relation.from, relation.relation_type, relation.to);
        let saved = self.store().save(relation).await?;
        self.changed(tenant, &saved, RelationOperation::AddOrUpdate);
        Ok(saved)
    }

    /// Insert or update many edges, handed to the store in bounded chunks.
    ///
    /// All relations are validated before the first chunk is written. A
    /// failing chunk stops the batch; earlier chunks stay saved.
    pub async fn save_relations(&self, tenant: TenantId, relations: &[Relation]) -> Result<Vec<Relation>> {
        for relation in relations {
            validate_relation(relation)?;
        }
        if relations.is_empty() {
            return Ok(Vec::new());
        }

        log::info!(
            "Saving {} relations in chunks of {}",
            relations.len(),
            self.batch_size
        );
        let mut saved = Vec::with_capacity(relations.len());
        for chunk in relations.chunks(self.batch_size) {
            let stored = self.store().save_all(chunk).await?;
            for relation in &stored {
                self.changed(tenant, relation, RelationOperation::AddOrUpdate);
            }
            saved.extend(stored);
        }
        Ok(saved)
    }

    /// Delete one edge. A missing edge is `Ok(None)`.
    pub async fn delete_relation(&self, tenant: TenantId, key: &RelationKey) -> Result<Option<Relation>> {
        validate_key(key)?;
        let removed = self.store().delete(key).await?;
        match &removed {
            Some(relation) => self.changed(tenant, relation, RelationOperation::Delete),
            None => log::debug!("Relation {} -[{}]-> {} not found", key.from, key.relation_type, key.to),
        }
        Ok(removed)
    }

    /// Delete several edges, skipping the ones that do not exist.
    pub async fn delete_relations(&self, tenant: TenantId, keys: &[RelationKey]) -> Result<Vec<Relation>> {
        for key in keys {
            validate_key(key)?;
        }
        let mut removed = Vec::new();
        for key in keys {
            if let Some(relation) = self.store().delete(key).await? {
                self.changed(tenant, &relation, RelationOperation::Delete);
                removed.push(relation);
            }
        }
        Ok(removed)
    }

    /// Remove every edge touching `entity`, in every type group and both
    /// directions. Used when the entity itself is deleted.
    pub async fn remove_all_relations(&self, tenant: TenantId, entity: &EntityRef) -> Result<Vec<Relation>> {
        validate_entity(entity, "entity")?;
        let mut removed = Vec::new();
        for group in RelationTypeGroup::ALL {
            removed.extend(self.remove_group(tenant, entity, group).await?);
        }
        log::info!("Removed {} relations of {}", removed.len(), entity);
        Ok(removed)
    }

    /// Remove the COMMON-group edges touching `entity`.
    pub async fn remove_common_relations(&self, tenant: TenantId, entity: &EntityRef) -> Result<Vec<Relation>> {
        validate_entity(entity, "entity")?;
        self.remove_group(tenant, entity, RelationTypeGroup::Common).await
    }

    async fn remove_group(
        &self,
        tenant: TenantId,
        entity: &EntityRef,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        let removed = self.store().delete_all_by_entity(entity, Some(group)).await?;
        for relation in &removed {
            self.changed(tenant, relation, RelationOperation::Delete);
        }
        Ok(removed)
    }

    // ---- single-hop reads ----

    pub async fn get_relation(&self, key: &RelationKey) -> Result<Option<Relation>> {
        validate_key(key)?;
        self.lookup.get(key).await
    }

    pub async fn check_relation(&self, key: &RelationKey) -> Result<bool> {
        Ok(self.get_relation(key).await?.is_some())
    }

    pub async fn find_by_from(&self, from: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        validate_entity(from, "from")?;
        self.lookup.find_by_from(from, group).await
    }

    pub async fn find_by_from_and_type(
        &self,
        from: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        validate_entity(from, "from")?;
        validate_relation_type(relation_type)?;
        self.lookup.find_by_from_and_type(from, relation_type, group).await
    }

    pub async fn find_by_to(&self, to: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        validate_entity(to, "to")?;
        self.lookup.find_by_to(to, group).await
    }

    pub async fn find_by_to_and_type(
        &self,
        to: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        validate_entity(to, "to")?;
        validate_relation_type(relation_type)?;
        self.lookup.find_by_to_and_type(to, relation_type, group).await
    }

    // ---- multi-level reads ----

    /// Run a bounded traversal and apply the query's filters.
    ///
    /// A single-level query is answered by one cached lookup without
    /// starting a traversal.
    pub async fn find_by_query(&self, query: &GraphQuery) -> Result<Vec<Relation>> {
        validate_entity(&query.root, "root")?;
        let relations = match query.max_level {
            level if level <= 0 => return Ok(Vec::new()),
            1 => {
                self.lookup
                    .find(&query.root, query.direction, query.type_group)
                    .await?
            }
            _ => self.engine.traverse(query).await?,
        };
        Ok(query.apply_filters(relations))
    }

    /// Follow a fixed sequence of typed hops and return the last hop's edges.
    pub async fn find_by_path_query(&self, query: &RelationPathQuery) -> Result<Vec<Relation>> {
        validate_entity(&query.root, "root")?;
        for level in &query.levels {
            validate_relation_type(&level.relation_type)?;
        }

        let mut frontier = vec![query.root];
        let mut last = Vec::new();
        for level in &query.levels {
            let mut edges = Vec::new();
            for node in &frontier {
                edges.extend(
                    self.lookup
                        .find_typed(node, level.direction, &level.relation_type, RelationTypeGroup::Common)
                        .await?,
                );
            }
            let mut seen = HashSet::new();
            frontier = edges
                .iter()
                .map(|e| e.neighbor(level.direction))
                .filter(|n| seen.insert(*n))
                .collect();
            last = edges;
        }

        last.truncate(self.max_path_query_results);
        Ok(last)
    }

    // ---- decorated reads ----

    pub async fn find_info_by_from(&self, from: &EntityRef, group: RelationTypeGroup) -> Result<Vec<RelationInfo>> {
        let relations = self.find_by_from(from, group).await?;
        self.decorate(relations, Direction::Outgoing).await
    }

    pub async fn find_info_by_to(&self, to: &EntityRef, group: RelationTypeGroup) -> Result<Vec<RelationInfo>> {
        let relations = self.find_by_to(to, group).await?;
        self.decorate(relations, Direction::Incoming).await
    }

    pub async fn find_info_by_query(&self, query: &GraphQuery) -> Result<Vec<RelationInfo>> {
        let relations = self.find_by_query(query).await?;
        self.decorate(relations, query.direction).await
    }

    /// Name the endpoint away from the query anchor.
    async fn decorate(&self, relations: Vec<Relation>, direction: Direction) -> Result<Vec<RelationInfo>> {
        let resolver = self.names.as_deref();
        let mut infos = Vec::with_capacity(relations.len());
        for relation in relations {
            let name = naming::display_name(resolver, &relation.neighbor(direction)).await;
            let (from_name, to_name) = match direction {
                Direction::Outgoing => (None, Some(name)),
                Direction::Incoming => (Some(name), None),
            };
            infos.push(RelationInfo {
                relation,
                from_name,
                to_name,
            });
        }
        Ok(infos)
    }
}
