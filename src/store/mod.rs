//! Durable relation storage behind a single backend-agnostic trait.
//!
//! Every backend keeps two directional indexes (by `from` and by `to`) over
//! the same edge set. The trait carries no event or cache behaviour; the
//! service layer owns both.

mod memory;
mod sqlite;

pub use memory::InMemoryRelationStore;
pub use sqlite::SqliteRelationStore;

use async_trait::async_trait;

use crate::entity::EntityRef;
use crate::graph::{Relation, RelationKey, RelationTypeGroup};
use crate::Result;

/// CRUD over relation edges.
///
/// Backend errors are returned unchanged; implementations never retry.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Idempotent upsert on the relation key. Returns the edge as stored.
    async fn save(&self, relation: &Relation) -> Result<Relation>;

    /// Upsert several edges. Callers bound the slice size.
    async fn save_all(&self, relations: &[Relation]) -> Result<Vec<Relation>> {
        let mut saved = Vec::with_capacity(relations.len());
        for relation in relations {
            saved.push(self.save(relation).await?);
        }
        Ok(saved)
    }

    async fn get(&self, key: &RelationKey) -> Result<Option<Relation>>;

    /// Remove one edge. Not-found is `Ok(None)`, never an error.
    async fn delete(&self, key: &RelationKey) -> Result<Option<Relation>>;

    async fn find_by_from(&self, from: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>>;

    async fn find_by_from_and_type(
        &self,
        from: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>>;

    async fn find_by_to(&self, to: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>>;

    async fn find_by_to_and_type(
        &self,
        to: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>>;

    /// Delete every edge touching `entity` in either direction, optionally
    /// restricted to one type group. Returns the removed edges.
    async fn delete_all_by_entity(
        &self,
        entity: &EntityRef,
        group: Option<RelationTypeGroup>,
    ) -> Result<Vec<Relation>>;
}
