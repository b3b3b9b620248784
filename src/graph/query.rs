//! Multi-level query shapes: graph queries with post-filters, and fixed
//! relation paths.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityRef, EntityType};
use crate::graph::{Direction, Relation, RelationTypeGroup};

/// Constrains traversal results by relation type and/or the entity type of
/// the endpoint away from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationFilter {
    /// `None` (or empty) matches any relation type.
    #[serde(default)]
    pub relation_type: Option<String>,
    /// Empty matches any entity type.
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
}

impl RelationFilter {
    pub fn new(relation_type: impl Into<String>, entity_types: Vec<EntityType>) -> Self {
        Self {
            relation_type: Some(relation_type.into()),
            entity_types,
        }
    }

    pub fn matches(&self, relation: &Relation, direction: Direction) -> bool {
        let type_ok = match self.relation_type.as_deref() {
            None | Some("") => true,
            Some(t) => t == relation.relation_type,
        };
        type_ok
            && (self.entity_types.is_empty()
                || self
                    .entity_types
                    .contains(&relation.neighbor(direction).entity_type))
    }
}

/// Bounded multi-level search rooted at one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQuery {
    pub root: EntityRef,
    pub direction: Direction,
    #[serde(default)]
    pub type_group: RelationTypeGroup,
    pub max_level: i32,
    #[serde(default)]
    pub fetch_last_level_only: bool,
    #[serde(default)]
    pub filters: Vec<RelationFilter>,
}

impl GraphQuery {
    /// Depth that no realistic hierarchy reaches.
    pub const UNLIMITED: i32 = i32::MAX;

    /// Single-hop COMMON query; widen with the builder methods.
    pub fn new(root: EntityRef, direction: Direction) -> Self {
        Self {
            root,
            direction,
            type_group: RelationTypeGroup::Common,
            max_level: 1,
            fetch_last_level_only: false,
            filters: Vec::new(),
        }
    }

    pub fn max_level(mut self, max_level: i32) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn type_group(mut self, type_group: RelationTypeGroup) -> Self {
        self.type_group = type_group;
        self
    }

    pub fn last_level_only(mut self, fetch_last_level_only: bool) -> Self {
        self.fetch_last_level_only = fetch_last_level_only;
        self
    }

    pub fn filter(mut self, filter: RelationFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Keep relations matching at least one filter; no filters keeps all.
    pub fn apply_filters(&self, relations: Vec<Relation>) -> Vec<Relation> {
        if self.filters.is_empty() {
            return relations;
        }
        relations
            .into_iter()
            .filter(|r| self.filters.iter().any(|f| f.matches(r, self.direction)))
            .collect()
    }
}

/// One hop of a [`RelationPathQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationPathLevel {
    pub direction: Direction,
    pub relation_type: String,
}

impl RelationPathLevel {
    pub fn new(direction: Direction, relation_type: impl Into<String>) -> Self {
        Self {
            direction,
            relation_type: relation_type.into(),
        }
    }
}

/// Walk an explicit sequence of typed hops (COMMON group) and return the
/// edges of the last hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationPathQuery {
    pub root: EntityRef,
    pub levels: Vec<RelationPathLevel>,
}

impl RelationPathQuery {
    pub fn new(root: EntityRef, levels: Vec<RelationPathLevel>) -> Self {
        Self { root, levels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CONTAINS_TYPE, MANAGES_TYPE};

    fn edge(to_type: EntityType, relation_type: &str) -> Relation {
        Relation::new(EntityRef::random(EntityType::Asset), EntityRef::random(to_type), relation_type)
    }

    #[test]
    fn test_filter_type_and_entity_type() {
        let filter = RelationFilter::new(CONTAINS_TYPE, vec![EntityType::Device]);
        assert!(filter.matches(&edge(EntityType::Device, CONTAINS_TYPE), Direction::Outgoing));
        assert!(!filter.matches(&edge(EntityType::Asset, CONTAINS_TYPE), Direction::Outgoing));
        assert!(!filter.matches(&edge(EntityType::Device, MANAGES_TYPE), Direction::Outgoing));
    }

    #[test]
    fn test_filter_incoming_checks_from_endpoint() {
        let filter = RelationFilter::new(CONTAINS_TYPE, vec![EntityType::Asset]);
        // from is an ASSET, to is a DEVICE
        let rel = edge(EntityType::Device, CONTAINS_TYPE);
        assert!(filter.matches(&rel, Direction::Incoming));
        assert!(!filter.matches(&rel, Direction::Outgoing));
    }

    #[test]
    fn test_wildcard_filter() {
        let filter = RelationFilter::default();
        assert!(filter.matches(&edge(EntityType::User, "Anything"), Direction::Outgoing));
        let empty_type = RelationFilter {
            relation_type: Some(String::new()),
            entity_types: vec![EntityType::User],
        };
        assert!(empty_type.matches(&edge(EntityType::User, "Anything"), Direction::Outgoing));
    }

    #[test]
    fn test_apply_filters_is_logical_or() {
        let root = EntityRef::random(EntityType::Asset);
        let query = GraphQuery::new(root, Direction::Outgoing)
            .filter(RelationFilter::new(CONTAINS_TYPE, vec![EntityType::Device]))
            .filter(RelationFilter::new(MANAGES_TYPE, vec![]));
        let relations = vec![
            edge(EntityType::Device, CONTAINS_TYPE),
            edge(EntityType::Asset, CONTAINS_TYPE),
            edge(EntityType::Asset, MANAGES_TYPE),
        ];
        let kept = query.apply_filters(relations);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].to.entity_type, EntityType::Device);
        assert_eq!(kept[1].relation_type, MANAGES_TYPE);
    }

    #[test]
    fn test_no_filters_keeps_everything() {
        let query = GraphQuery::new(EntityRef::random(EntityType::Asset), Direction::Outgoing);
        let relations = vec![edge(EntityType::Device, CONTAINS_TYPE), edge(EntityType::User, "Uses")];
        assert_eq!(query.apply_filters(relations).len(), 2);
    }
}
