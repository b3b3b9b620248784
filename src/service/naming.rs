use async_trait::async_trait;

use crate::entity::EntityRef;
use crate::error::Result;

/// Shown in place of a name that could not be resolved.
pub const UNKNOWN_NAME: &str = "Unknown";

/// External lookup of human-readable entity names.
#[async_trait]
pub trait EntityNameResolver: Send + Sync {
    async fn resolve_display_name(&self, entity: &EntityRef) -> Result<Option<String>>;
}

/// Resolve `entity`, falling back to [`UNKNOWN_NAME`]. Never fails.
pub(crate) async fn display_name(resolver: Option<&dyn EntityNameResolver>, entity: &EntityRef) -> String {
    let Some(resolver) = resolver else {
        return UNKNOWN_NAME.to_string();
    };
    match resolver.resolve_display_name(entity).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            log::debug!("No display name for {}", entity);
            UNKNOWN_NAME.to_string()
        }
        Err(e) => {
            log::warn!("Failed to resolve name of {}: {}", entity, e);
            UNKNOWN_NAME.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::RelgraphError;

    struct Failing;

    #[async_trait]
    impl EntityNameResolver for Failing {
        async fn resolve_display_name(&self, _entity: &EntityRef) -> Result<Option<String>> {
            Err(RelgraphError::Storage("naming service down".to_string()))
        }
    }

    struct Fixed;

    #[async_trait]
    impl EntityNameResolver for Fixed {
        async fn resolve_display_name(&self, entity: &EntityRef) -> Result<Option<String>> {
            Ok((entity.entity_type == EntityType::Device).then(|| "Boiler sensor".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failures_degrade_to_placeholder() {
        let device = EntityRef::random(EntityType::Device);
        assert_eq!(display_name(Some(&Failing), &device).await, UNKNOWN_NAME);
        assert_eq!(display_name(None, &device).await, UNKNOWN_NAME);
    }

    #[tokio::test]
    async fn test_resolved_and_absent_names() {
        let device = EntityRef::random(EntityType::Device);
        let asset = EntityRef::random(EntityType::Asset);
        assert_eq!(display_name(Some(&Fixed), &device).await, "Boiler sensor");
        assert_eq!(display_name(Some(&Fixed), &asset).await, UNKNOWN_NAME);
    }
}
