//! In-process backend laid out like a wide-column table: one partition per
//! `(entity, type_group)` for each direction, rows kept in insertion order.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::entity::EntityRef;
use crate::graph::{Relation, RelationKey, RelationTypeGroup};
use crate::store::RelationStore;
use crate::Result;

type PartitionKey = (EntityRef, RelationTypeGroup);

#[derive(Default)]
struct Partitions {
    /// Rows keyed by `from`.
    outgoing: HashMap<PartitionKey, Vec<Relation>>,
    /// Rows keyed by `to`.
    incoming: HashMap<PartitionKey, Vec<Relation>>,
}

fn same_edge(row: &Relation, key: &RelationKey) -> bool {
    row.from == key.from && row.to == key.to && row.relation_type == key.relation_type
}

fn upsert_row(partition: &mut Vec<Relation>, relation: &Relation) {
    let key = relation.key();
    match partition.iter_mut().find(|row| same_edge(row, &key)) {
        Some(row) => *row = relation.clone(),
        None => partition.push(relation.clone()),
    }
}

fn remove_row(
    partitions: &mut HashMap<PartitionKey, Vec<Relation>>,
    anchor: PartitionKey,
    key: &RelationKey,
) -> Option<Relation> {
    let partition = partitions.get_mut(&anchor)?;
    let pos = partition.iter().position(|row| same_edge(row, key))?;
    let removed = partition.remove(pos);
    if partition.is_empty() {
        partitions.remove(&anchor);
    }
    Some(removed)
}

/// Volatile store for tests, tooling and single-node deployments.
#[derive(Default)]
pub struct InMemoryRelationStore {
    partitions: RwLock<Partitions>,
}

impl InMemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored edges.
    pub fn len(&self) -> usize {
        self.partitions
            .read()
            .unwrap()
            .outgoing
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn scan(
        &self,
        by_from: bool,
        anchor: &EntityRef,
        group: RelationTypeGroup,
        relation_type: Option<&str>,
    ) -> Vec<Relation> {
        let partitions = self.partitions.read().unwrap();
        let index = if by_from { &partitions.outgoing } else { &partitions.incoming };
        index
            .get(&(*anchor, group))
            .map(|rows| {
                rows.iter()
                    .filter(|r| relation_type.map_or(true, |t| r.relation_type == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelationStore for InMemoryRelationStore {
    async fn save(&self, relation: &Relation) -> Result<Relation> {
        let relation = relation.clone().normalized();
        let mut partitions = self.partitions.write().unwrap();
        upsert_row(
            partitions
                .outgoing
                .entry((relation.from, relation.type_group))
                .or_default(),
            &relation,
        );
        upsert_row(
            partitions
                .incoming
                .entry((relation.to, relation.type_group))
                .or_default(),
            &relation,
        );
        Ok(relation)
    }

    async fn get(&self, key: &RelationKey) -> Result<Option<Relation>> {
        let partitions = self.partitions.read().unwrap();
        Ok(partitions
            .outgoing
            .get(&(key.from, key.type_group))
            .and_then(|rows| rows.iter().find(|row| same_edge(row, key)))
            .cloned())
    }

    async fn delete(&self, key: &RelationKey) -> Result<Option<Relation>> {
        let mut partitions = self.partitions.write().unwrap();
        let removed = remove_row(&mut partitions.outgoing, (key.from, key.type_group), key);
        remove_row(&mut partitions.incoming, (key.to, key.type_group), key);
        Ok(removed)
    }

    async fn find_by_from(&self, from: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        Ok(self.scan(true, from, group, None))
    }

    async fn find_by_from_and_type(
        &self,
        from: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        Ok(self.scan(true, from, group, Some(relation_type)))
    }

    async fn find_by_to(&self, to: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        Ok(self.scan(false, to, group, None))
    }

    async fn find_by_to_and_type(
        &self,
        to: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        Ok(self.scan(false, to, group, Some(relation_type)))
    }

    async fn delete_all_by_entity(
        &self,
        entity: &EntityRef,
        group: Option<RelationTypeGroup>,
    ) -> Result<Vec<Relation>> {
        let groups = match group {
            Some(g) => vec![g],
            None => RelationTypeGroup::ALL.to_vec(),
        };
        let mut partitions = self.partitions.write().unwrap();
        let mut removed = Vec::new();
        for group in groups {
            // Self-loops live in both partitions of the entity; clearing the
            // mirror row first keeps them from being reported twice.
            let outgoing = partitions.outgoing.remove(&(*entity, group)).unwrap_or_default();
            for row in outgoing {
                remove_row(&mut partitions.incoming, (row.to, group), &row.key());
                removed.push(row);
            }
            let incoming = partitions.incoming.remove(&(*entity, group)).unwrap_or_default();
            for row in incoming {
                remove_row(&mut partitions.outgoing, (row.from, group), &row.key());
                removed.push(row);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::graph::CONTAINS_TYPE;
    use crate::store::contract;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryRelationStore::new();
        contract::upsert_is_idempotent(&store).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_directional_indexes() {
        contract::directional_indexes(&InMemoryRelationStore::new()).await;
    }

    #[tokio::test]
    async fn test_delete_missing_is_none() {
        let store = InMemoryRelationStore::new();
        contract::delete_missing_is_none(&store).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_by_entity() {
        contract::delete_all_by_entity(&InMemoryRelationStore::new()).await;
    }

    #[tokio::test]
    async fn test_self_loop_removed_once() {
        let store = InMemoryRelationStore::new();
        let node = EntityRef::random(EntityType::Asset);
        store.save(&Relation::new(node, node, CONTAINS_TYPE)).await.unwrap();
        let removed = store.delete_all_by_entity(&node, None).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(store.is_empty());
    }
}
