//! Entity identity: the node type of the relation graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{RelgraphError, Result};

/// Kind of platform entity an [`EntityRef`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Tenant,
    Customer,
    User,
    Dashboard,
    Asset,
    Device,
    Alarm,
    RuleChain,
    RuleNode,
    EntityView,
    Edge,
    WidgetsBundle,
    DeviceProfile,
    AssetProfile,
}

impl EntityType {
    pub const ALL: [EntityType; 14] = [
        EntityType::Tenant,
        EntityType::Customer,
        EntityType::User,
        EntityType::Dashboard,
        EntityType::Asset,
        EntityType::Device,
        EntityType::Alarm,
        EntityType::RuleChain,
        EntityType::RuleNode,
        EntityType::EntityView,
        EntityType::Edge,
        EntityType::WidgetsBundle,
        EntityType::DeviceProfile,
        EntityType::AssetProfile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Tenant => "TENANT",
            EntityType::Customer => "CUSTOMER",
            EntityType::User => "USER",
            EntityType::Dashboard => "DASHBOARD",
            EntityType::Asset => "ASSET",
            EntityType::Device => "DEVICE",
            EntityType::Alarm => "ALARM",
            EntityType::RuleChain => "RULE_CHAIN",
            EntityType::RuleNode => "RULE_NODE",
            EntityType::EntityView => "ENTITY_VIEW",
            EntityType::Edge => "EDGE",
            EntityType::WidgetsBundle => "WIDGETS_BUNDLE",
            EntityType::DeviceProfile => "DEVICE_PROFILE",
            EntityType::AssetProfile => "ASSET_PROFILE",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = RelgraphError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| RelgraphError::InvalidInput(format!("Unknown entity type: {}", s)))
    }
}

/// Typed identifier of any platform entity. Immutable value; doubles as the
/// graph node identity and as a cache-key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        Self { entity_type, id }
    }

    /// Fresh reference with a random (v4) id.
    pub fn random(entity_type: EntityType) -> Self {
        Self::new(entity_type, Uuid::new_v4())
    }

    /// The nil UUID stands for "no entity".
    pub fn is_null(&self) -> bool {
        self.id.is_nil()
    }
}

/// Rendered as `TYPE:uuid`, e.g. `DEVICE:67e55044-10b1-426f-9247-bb680e5fe0c8`.
impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = RelgraphError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| RelgraphError::InvalidInput(format!("Expected TYPE:uuid, got {}", s)))?;
        let id = Uuid::parse_str(id.trim())
            .map_err(|e| RelgraphError::InvalidInput(format!("Invalid entity id {}: {}", id, e)))?;
        Ok(EntityRef::new(kind.parse()?, id))
    }
}

/// Owning tenant of a mutation; carried on change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub const SYSTEM: TenantId = TenantId(Uuid::nil());
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
