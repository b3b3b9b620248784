//! Cache keys: one per query shape. Unset fields are wildcards.

use crate::entity::EntityRef;
use crate::graph::{Direction, RelationKey, RelationTypeGroup};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationCacheKey {
    pub from: Option<EntityRef>,
    pub to: Option<EntityRef>,
    pub relation_type: Option<String>,
    pub type_group: RelationTypeGroup,
    pub direction: Option<Direction>,
}

impl RelationCacheKey {
    /// A single edge.
    pub fn exact(key: &RelationKey) -> Self {
        Self {
            from: Some(key.from),
            to: Some(key.to),
            relation_type: Some(key.relation_type.clone()),
            type_group: key.type_group,
            direction: None,
        }
    }

    /// All edges leaving `from`, optionally of one type.
    pub fn outgoing(from: EntityRef, relation_type: Option<&str>, type_group: RelationTypeGroup) -> Self {
        Self {
            from: Some(from),
            to: None,
            relation_type: relation_type.map(str::to_string),
            type_group,
            direction: Some(Direction::Outgoing),
        }
    }

    /// All edges arriving at `to`, optionally of one type.
    pub fn incoming(to: EntityRef, relation_type: Option<&str>, type_group: RelationTypeGroup) -> Self {
        Self {
            from: None,
            to: Some(to),
            relation_type: relation_type.map(str::to_string),
            type_group,
            direction: Some(Direction::Incoming),
        }
    }

    /// Every cached shape that can contain the edge `key`.
    pub fn eviction_keys(key: &RelationKey) -> [RelationCacheKey; 5] {
        [
            Self::exact(key),
            Self::outgoing(key.from, Some(&key.relation_type), key.type_group),
            Self::outgoing(key.from, None, key.type_group),
            Self::incoming(key.to, Some(&key.relation_type), key.type_group),
            Self::incoming(key.to, None, key.type_group),
        ]
    }
}
