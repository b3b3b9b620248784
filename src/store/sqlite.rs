//! Relational backend on SQLite. One `relation` table keyed by the
//! uniqueness tuple, plus `from` and `to` indexes (see `migrations/`).

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::Db;
use crate::entity::EntityRef;
use crate::error::{RelgraphError, Result};
use crate::graph::{Relation, RelationKey, RelationTypeGroup};
use crate::store::RelationStore;

const COLUMNS: &str =
    "from_id, from_type, to_id, to_type, relation_type_group, relation_type, additional_info";

/// Row as stored; converted to a typed [`Relation`] outside the rusqlite closure.
struct RelationRow {
    from_id: String,
    from_type: String,
    to_id: String,
    to_type: String,
    type_group: String,
    relation_type: String,
    additional_info: Option<String>,
}

impl RelationRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            from_id: row.get(0)?,
            from_type: row.get(1)?,
            to_id: row.get(2)?,
            to_type: row.get(3)?,
            type_group: row.get(4)?,
            relation_type: row.get(5)?,
            additional_info: row.get(6)?,
        })
    }

    fn into_relation(self) -> Result<Relation> {
        let from = EntityRef::new(parse_column(&self.from_type, "from_type")?, parse_uuid(&self.from_id)?);
        let to = EntityRef::new(parse_column(&self.to_type, "to_type")?, parse_uuid(&self.to_id)?);
        let additional_info: Option<serde_json::Value> = self
            .additional_info
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RelgraphError::Storage(format!("corrupt additional_info: {}", e)))?;
        Ok(Relation {
            from,
            to,
            relation_type: self.relation_type,
            type_group: parse_column(&self.type_group, "relation_type_group")?,
            additional_info,
        }
        .normalized())
    }
}

/// A stored value that no longer parses is a backend fault, not bad input.
fn parse_column<T>(raw: &str, column: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| RelgraphError::Storage(format!("corrupt {} {}: {}", column, raw, e)))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| RelgraphError::Storage(format!("corrupt entity id {}: {}", raw, e)))
}

fn into_relations(rows: Vec<RelationRow>) -> Result<Vec<Relation>> {
    rows.into_iter().map(RelationRow::into_relation).collect()
}

fn encode_info(relation: &Relation) -> Result<Option<String>> {
    Ok(relation
        .additional_info
        .as_ref()
        .filter(|v| !v.is_null())
        .map(serde_json::to_string)
        .transpose()?)
}

fn upsert(conn: &Connection, relation: &Relation, info: Option<&str>) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO relation (
            from_id, from_type, to_id, to_type,
            relation_type_group, relation_type, additional_info
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(from_id, from_type, relation_type_group, relation_type, to_id, to_type)
        DO UPDATE SET additional_info = excluded.additional_info
        "#,
        params![
            relation.from.id.to_string(),
            relation.from.entity_type.as_str(),
            relation.to.id.to_string(),
            relation.to.entity_type.as_str(),
            relation.type_group.as_str(),
            relation.relation_type,
            info,
        ],
    )?;
    Ok(())
}

/// [`RelationStore`] over a SQLite file. Run the migrations before use.
#[derive(Debug, Clone)]
pub struct SqliteRelationStore {
    db: Db,
}

impl SqliteRelationStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Indexed lookup by one endpoint, optionally narrowed to a relation type.
    async fn find_by_endpoint(
        &self,
        by_from: bool,
        anchor: &EntityRef,
        relation_type: Option<&str>,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        let (id_col, type_col) = if by_from { ("from_id", "from_type") } else { ("to_id", "to_type") };
        let query = format!(
            "SELECT {} FROM relation \
             WHERE {} = ?1 AND {} = ?2 AND relation_type_group = ?3 \
             AND (?4 IS NULL OR relation_type = ?4) \
             ORDER BY rowid",
            COLUMNS, id_col, type_col
        );
        let id = anchor.id.to_string();
        let entity_type = anchor.entity_type.as_str();
        let relation_type = relation_type.map(str::to_string);

        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                let rows = stmt
                    .query_map(
                        params![id, entity_type, group.as_str(), relation_type],
                        RelationRow::read,
                    )?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        into_relations(rows)
    }
}

#[async_trait]
impl RelationStore for SqliteRelationStore {
    async fn save(&self, relation: &Relation) -> Result<Relation> {
        let relation = relation.clone().normalized();
        let info = encode_info(&relation)?;
        let stored = relation.clone();
        self.db
            .with_connection(move |conn| {
                upsert(conn, &stored, info.as_deref())?;
                Ok(())
            })
            .await?;
        Ok(relation)
    }

    async fn save_all(&self, relations: &[Relation]) -> Result<Vec<Relation>> {
        if relations.is_empty() {
            return Ok(Vec::new());
        }
        let relations: Vec<Relation> = relations.iter().cloned().map(Relation::normalized).collect();
        let encoded = relations
            .iter()
            .map(encode_info)
            .collect::<Result<Vec<_>>>()?;
        let batch = relations.clone();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                for (relation, info) in batch.iter().zip(&encoded) {
                    upsert(&tx, relation, info.as_deref())?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        log::debug!("Saved batch of {} relations", relations.len());
        Ok(relations)
    }

    async fn get(&self, key: &RelationKey) -> Result<Option<Relation>> {
        let key = key.clone();
        let row = self
            .db
            .with_connection(move |conn| {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM relation \
                             WHERE from_id = ?1 AND from_type = ?2 AND to_id = ?3 AND to_type = ?4 \
                             AND relation_type_group = ?5 AND relation_type = ?6",
                            COLUMNS
                        ),
                        key_params(&key),
                        RelationRow::read,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(RelationRow::into_relation).transpose()
    }

    async fn delete(&self, key: &RelationKey) -> Result<Option<Relation>> {
        let key = key.clone();
        let row = self
            .db
            .with_connection(move |conn| {
                let row = conn
                    .query_row(
                        &format!(
                            "DELETE FROM relation \
                             WHERE from_id = ?1 AND from_type = ?2 AND to_id = ?3 AND to_type = ?4 \
                             AND relation_type_group = ?5 AND relation_type = ?6 \
                             RETURNING {}",
                            COLUMNS
                        ),
                        key_params(&key),
                        RelationRow::read,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(RelationRow::into_relation).transpose()
    }

    async fn find_by_from(&self, from: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        self.find_by_endpoint(true, from, None, group).await
    }

    async fn find_by_from_and_type(
        &self,
        from: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        self.find_by_endpoint(true, from, Some(relation_type), group).await
    }

    async fn find_by_to(&self, to: &EntityRef, group: RelationTypeGroup) -> Result<Vec<Relation>> {
        self.find_by_endpoint(false, to, None, group).await
    }

    async fn find_by_to_and_type(
        &self,
        to: &EntityRef,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<Relation>> {
        self.find_by_endpoint(false, to, Some(relation_type), group).await
    }

    async fn delete_all_by_entity(
        &self,
        entity: &EntityRef,
        group: Option<RelationTypeGroup>,
    ) -> Result<Vec<Relation>> {
        let id = entity.id.to_string();
        let entity_type = entity.entity_type.as_str();
        let group = group.map(|g| g.as_str());

        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "DELETE FROM relation \
                     WHERE ((from_id = ?1 AND from_type = ?2) OR (to_id = ?1 AND to_type = ?2)) \
                     AND (?3 IS NULL OR relation_type_group = ?3) \
                     RETURNING {}",
                    COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![id, entity_type, group], RelationRow::read)?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        into_relations(rows)
    }
}

fn key_params(key: &RelationKey) -> [String; 6] {
    [
        key.from.id.to_string(),
        key.from.entity_type.as_str().to_string(),
        key.to.id.to_string(),
        key.to.entity_type.as_str().to_string(),
        key.type_group.as_str().to_string(),
        key.relation_type.clone(),
    ]
}
