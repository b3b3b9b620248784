//! Write-path checks run before anything reaches the store.

use crate::entity::EntityRef;
use crate::error::{RelgraphError, Result};
use crate::graph::{Relation, RelationKey};

pub(crate) fn validate_entity(entity: &EntityRef, field: &str) -> Result<()> {
    if entity.is_null() {
        return Err(RelgraphError::Validation(format!(
            "{} must reference an existing entity, got {}",
            field, entity
        )));
    }
    Ok(())
}

pub(crate) fn validate_relation_type(relation_type: &str) -> Result<()> {
    if relation_type.trim().is_empty() {
        return Err(RelgraphError::Validation("relation type must not be empty".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_key(key: &RelationKey) -> Result<()> {
    validate_entity(&key.from, "from")?;
    validate_entity(&key.to, "to")?;
    validate_relation_type(&key.relation_type)
}

pub(crate) fn validate_relation(relation: &Relation) -> Result<()> {
    validate_entity(&relation.from, "from")?;
    validate_entity(&relation.to, "to")?;
    validate_relation_type(&relation.relation_type)
}
