//! Relation graph model, query shapes and bounded BFS traversal.
//!
//! A [`Relation`] is a typed, directed edge between two entities. Edges are
//! unique on `(from, to, type, type_group)`; see [`RelationKey`].

mod query;
mod traversal;

pub use query::{GraphQuery, RelationFilter, RelationPathLevel, RelationPathQuery};
pub use traversal::{TraversalEngine, TraversalState};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::EntityRef;
use crate::{RelgraphError, Result};

pub const CONTAINS_TYPE: &str = "Contains";
pub const MANAGES_TYPE: &str = "Manages";
pub const USES_TYPE: &str = "Uses";

/// Namespace partition for relation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationTypeGroup {
    #[default]
    Common,
    Dashboard,
    RuleChain,
    RuleNode,
    Edge,
    EdgeAutoAssignRuleChain,
}

impl RelationTypeGroup {
    pub const ALL: [RelationTypeGroup; 6] = [
        RelationTypeGroup::Common,
        RelationTypeGroup::Dashboard,
        RelationTypeGroup::RuleChain,
        RelationTypeGroup::RuleNode,
        RelationTypeGroup::Edge,
        RelationTypeGroup::EdgeAutoAssignRuleChain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationTypeGroup::Common => "COMMON",
            RelationTypeGroup::Dashboard => "DASHBOARD",
            RelationTypeGroup::RuleChain => "RULE_CHAIN",
            RelationTypeGroup::RuleNode => "RULE_NODE",
            RelationTypeGroup::Edge => "EDGE",
            RelationTypeGroup::EdgeAutoAssignRuleChain => "EDGE_AUTO_ASSIGN_RULE_CHAIN",
        }
    }
}

impl fmt::Display for RelationTypeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationTypeGroup {
    type Err = RelgraphError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        RelationTypeGroup::ALL
            .into_iter()
            .find(|g| g.as_str() == wanted)
            .ok_or_else(|| RelgraphError::InvalidInput(format!("Unknown relation type group: {}", s)))
    }
}

/// Query orientation: `Outgoing` is anchored on `from`, `Incoming` on `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl FromStr for Direction {
    type Err = RelgraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outgoing" | "from" => Ok(Direction::Outgoing),
            "incoming" | "to" => Ok(Direction::Incoming),
            other => Err(RelgraphError::InvalidInput(format!("Unknown direction: {}", other))),
        }
    }
}

/// Identity of an edge: the uniqueness tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationKey {
    pub from: EntityRef,
    pub to: EntityRef,
    pub relation_type: String,
    pub type_group: RelationTypeGroup,
}

impl RelationKey {
    pub fn new(
        from: EntityRef,
        to: EntityRef,
        relation_type: impl Into<String>,
        type_group: RelationTypeGroup,
    ) -> Self {
        Self {
            from,
            to,
            relation_type: relation_type.into(),
            type_group,
        }
    }
}

/// A single edge in the relation graph (from --relation_type--> to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub from: EntityRef,
    pub to: EntityRef,
    /// Free-form label, e.g. `Contains`.
    pub relation_type: String,
    pub type_group: RelationTypeGroup,
    /// Opaque structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<serde_json::Value>,
}

impl Relation {
    /// COMMON-group edge without additional info.
    pub fn new(from: EntityRef, to: EntityRef, relation_type: impl Into<String>) -> Self {
        Self::with_group(from, to, relation_type, RelationTypeGroup::Common)
    }

    pub fn with_group(
        from: EntityRef,
        to: EntityRef,
        relation_type: impl Into<String>,
        type_group: RelationTypeGroup,
    ) -> Self {
        Self {
            from,
            to,
            relation_type: relation_type.into(),
            type_group,
            additional_info: None,
        }
    }

    pub fn with_info(mut self, info: serde_json::Value) -> Self {
        self.additional_info = Some(info);
        self
    }

    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.from, self.to, self.relation_type.clone(), self.type_group)
    }

    /// The endpoint reached when walking this edge in `direction`.
    pub fn neighbor(&self, direction: Direction) -> EntityRef {
        match direction {
            Direction::Outgoing => self.to,
            Direction::Incoming => self.from,
        }
    }

    /// Backends store an explicit JSON `null` the same as no payload.
    pub(crate) fn normalized(mut self) -> Self {
        if matches!(self.additional_info, Some(serde_json::Value::Null)) {
            self.additional_info = None;
        }
        self
    }
}

/// Relation decorated with display names of its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationInfo {
    #[serde(flatten)]
    pub relation: Relation,
    pub from_name: Option<String>,
    pub to_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    #[test]
    fn test_neighbor_follows_direction() {
        let a = EntityRef::random(EntityType::Asset);
        let b = EntityRef::random(EntityType::Device);
        let rel = Relation::new(a, b, CONTAINS_TYPE);
        assert_eq!(rel.neighbor(Direction::Outgoing), b);
        assert_eq!(rel.neighbor(Direction::Incoming), a);
    }

    #[test]
    fn test_key_ignores_additional_info() {
        let a = EntityRef::random(EntityType::Asset);
        let b = EntityRef::random(EntityType::Asset);
        let plain = Relation::new(a, b, CONTAINS_TYPE);
        let decorated = plain.clone().with_info(serde_json::json!({"k": 1}));
        assert_eq!(plain.key(), decorated.key());
        assert_ne!(plain, decorated);
    }

    #[test]
    fn test_normalized_drops_json_null() {
        let a = EntityRef::random(EntityType::Asset);
        let b = EntityRef::random(EntityType::Asset);
        let rel = Relation::new(a, b, CONTAINS_TYPE).with_info(serde_json::Value::Null);
        assert!(rel.normalized().additional_info.is_none());
    }

    #[test]
    fn test_type_group_parse() {
        assert_eq!("rule_chain".parse::<RelationTypeGroup>().unwrap(), RelationTypeGroup::RuleChain);
        assert!("nope".parse::<RelationTypeGroup>().is_err());
        assert_eq!(RelationTypeGroup::default(), RelationTypeGroup::Common);
    }

    #[test]
    fn test_direction_parse_accepts_platform_aliases() {
        assert_eq!("FROM".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert_eq!("to".parse::<Direction>().unwrap(), Direction::Incoming);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
