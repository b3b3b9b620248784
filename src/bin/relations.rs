//! Relation CLI: add, delete and query edges in the configured database.

use clap::{Parser, Subcommand};
use relgraph::db::Db;
use relgraph::graph::{RelationFilter, RelationPathLevel, RelationPathQuery};
use relgraph::store::SqliteRelationStore;
use relgraph::{
    Config, Direction, EntityRef, EntityType, GraphQuery, Relation, RelationService, RelationTypeGroup,
    TenantId,
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "relations")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update an edge.
    Add {
        /// Source entity as TYPE:uuid
        from: EntityRef,
        /// Target entity as TYPE:uuid
        to: EntityRef,
        #[arg(long = "type", default_value = "Contains")]
        relation_type: String,
        #[arg(long, default_value = "COMMON")]
        group: RelationTypeGroup,
        /// Additional info as a JSON document.
        #[arg(long)]
        info: Option<String>,
    },
    /// Delete one edge.
    Delete {
        from: EntityRef,
        to: EntityRef,
        #[arg(long = "type", default_value = "Contains")]
        relation_type: String,
        #[arg(long, default_value = "COMMON")]
        group: RelationTypeGroup,
    },
    /// List the edges one hop away from an entity.
    Find {
        entity: EntityRef,
        #[arg(long, default_value = "outgoing")]
        direction: Direction,
        #[arg(long = "type")]
        relation_type: Option<String>,
        #[arg(long, default_value = "COMMON")]
        group: RelationTypeGroup,
    },
    /// Bounded multi-level search.
    Query {
        root: EntityRef,
        #[arg(long, default_value = "outgoing")]
        direction: Direction,
        #[arg(long, default_value_t = 1)]
        max_level: i32,
        #[arg(long, default_value = "COMMON")]
        group: RelationTypeGroup,
        #[arg(long)]
        last_level_only: bool,
        /// Keep only edges of this type.
        #[arg(long = "type")]
        relation_type: Option<String>,
        /// Keep only edges whose far endpoint has one of these types.
        #[arg(long = "entity-type")]
        entity_types: Vec<EntityType>,
    },
    /// Follow typed hops, each given as DIRECTION:TYPE (e.g. outgoing:Contains).
    Path {
        root: EntityRef,
        #[arg(required = true)]
        levels: Vec<String>,
    },
    /// Remove every edge touching an entity.
    Purge {
        entity: EntityRef,
        /// Only the COMMON group.
        #[arg(long)]
        common_only: bool,
    },
}

fn parse_level(level: &str) -> anyhow::Result<RelationPathLevel> {
    let (direction, relation_type) = level
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid path level '{}', expected DIRECTION:TYPE", level))?;
    Ok(RelationPathLevel::new(direction.parse()?, relation_type))
}

fn print_relations(relations: &[Relation]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(relations)?);
    eprintln!("{} relation(s)", relations.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let db = Db::new(config.db_path());
    db.migrate().await?;

    let service = RelationService::from_config(Arc::new(SqliteRelationStore::new(db)), &config);
    let tenant = TenantId::SYSTEM;

    match args.command {
        Command::Add {
            from,
            to,
            relation_type,
            group,
            info,
        } => {
            let mut relation = Relation::with_group(from, to, relation_type, group);
            if let Some(info) = info {
                let value = serde_json::from_str(&info)
                    .map_err(|e| anyhow::anyhow!("Invalid --info JSON: {}", e))?;
                relation = relation.with_info(value);
            }
            let saved = service.save_relation(tenant, &relation).await?;
            print_relations(&[saved])?;
        }
        Command::Delete {
            from,
            to,
            relation_type,
            group,
        } => {
            let key = relgraph::RelationKey::new(from, to, relation_type, group);
            match service.delete_relation(tenant, &key).await? {
                Some(removed) => print_relations(&[removed])?,
                None => println!("Relation not found"),
            }
        }
        Command::Find {
            entity,
            direction,
            relation_type,
            group,
        } => {
            let found = match (direction, relation_type.as_deref()) {
                (Direction::Outgoing, None) => service.find_by_from(&entity, group).await?,
                (Direction::Outgoing, Some(t)) => service.find_by_from_and_type(&entity, t, group).await?,
                (Direction::Incoming, None) => service.find_by_to(&entity, group).await?,
                (Direction::Incoming, Some(t)) => service.find_by_to_and_type(&entity, t, group).await?,
            };
            print_relations(&found)?;
        }
        Command::Query {
            root,
            direction,
            max_level,
            group,
            last_level_only,
            relation_type,
            entity_types,
        } => {
            let mut query = GraphQuery::new(root, direction)
                .max_level(max_level)
                .type_group(group)
                .last_level_only(last_level_only);
            if relation_type.is_some() || !entity_types.is_empty() {
                query = query.filter(RelationFilter {
                    relation_type,
                    entity_types,
                });
            }
            print_relations(&service.find_by_query(&query).await?)?;
        }
        Command::Path { root, levels } => {
            let levels = levels
                .iter()
                .map(|l| parse_level(l))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let found = service
                .find_by_path_query(&RelationPathQuery::new(root, levels))
                .await?;
            print_relations(&found)?;
        }
        Command::Purge { entity, common_only } => {
            let removed = if common_only {
                service.remove_common_relations(tenant, &entity).await?
            } else {
                service.remove_all_relations(tenant, &entity).await?
            };
            println!("Removed {} relation(s) of {}", removed.len(), entity);
        }
    }

    Ok(())
}
