pub mod cache;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod events;
pub mod graph;
pub mod service;
pub mod store;

pub use config::Config;
pub use entity::{EntityRef, EntityType, TenantId};
pub use error::{RelgraphError, Result};
pub use graph::{Direction, GraphQuery, Relation, RelationKey, RelationTypeGroup};
pub use service::RelationService;
