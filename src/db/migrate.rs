//! Schema migrations, compiled into the binary.
//!
//! Each entry in [`MIGRATIONS`] is applied at most once per database, in
//! version order, inside its own transaction. Applied versions are recorded
//! in `schema_migrations`.

use rusqlite::{params, Connection};

use crate::error::{RelgraphError, Result};

/// One embedded schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Every schema step of the `relation` store, oldest first.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "001_relations",
    sql: include_str!("../../migrations/001_relations.sql"),
}];

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )?;
    Ok(())
}

/// Names of the applied migrations, by version.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

/// Highest applied version, or `None` on a fresh database.
pub fn current_version(conn: &Connection) -> Result<Option<u32>> {
    ensure_migrations_table(conn)?;
    let version = conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
        row.get::<_, Option<u32>>(0)
    })?;
    Ok(version)
}

/// Apply the embedded migrations. Returns how many were newly applied.
pub fn run_migrations(conn: &mut Connection) -> Result<usize> {
    apply(conn, MIGRATIONS)
}

/// Apply `migrations` that are newer than the database's current version.
///
/// Versions must be strictly increasing; a list out of order is rejected
/// before anything is written.
pub fn apply(conn: &mut Connection, migrations: &[Migration]) -> Result<usize> {
    if let Some(pair) = migrations.windows(2).find(|w| w[0].version >= w[1].version) {
        return Err(RelgraphError::Config(format!(
            "Migration {} is not newer than {}",
            pair[1].name, pair[0].name
        )));
    }

    let current = current_version(conn)?.unwrap_or(0);
    let mut applied = 0;

    for migration in migrations.iter().filter(|m| m.version > current) {
        log::info!("Applying migration {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            RelgraphError::Storage(format!("migration {} failed: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        applied += 1;
    }

    if applied == 0 {
        log::debug!("Schema up to date at version {}", current);
    } else {
        log::info!("{} migration(s) applied", applied);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table_names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap()
    }

    #[test]
    fn test_embedded_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        assert_eq!(run_migrations(&mut conn).unwrap(), MIGRATIONS.len());
        // Second run is a no-op
        assert_eq!(run_migrations(&mut conn).unwrap(), 0);

        let tables = table_names(&conn, "table");
        assert!(tables.contains(&"relation".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        let indexes = table_names(&conn, "index");
        assert!(indexes.contains(&"idx_relation_from".to_string()));
        assert!(indexes.contains(&"idx_relation_to".to_string()));

        assert_eq!(applied_migrations(&conn).unwrap(), vec!["001_relations".to_string()]);
        assert_eq!(current_version(&conn).unwrap(), Some(1));
    }

    #[test]
    fn test_independent_of_working_directory() {
        let temp_dir = TempDir::new().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        let result = Connection::open("relative.db")
            .map_err(RelgraphError::from)
            .and_then(|mut conn| run_migrations(&mut conn));

        std::env::set_current_dir(previous).unwrap();
        assert_eq!(result.unwrap(), MIGRATIONS.len());
        assert!(!temp_dir.path().join("migrations").exists());
    }

    #[test]
    fn test_only_newer_versions_apply() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let first = Migration {
            version: 1,
            name: "001_first",
            sql: "CREATE TABLE first (id INTEGER);",
        };
        let second = Migration {
            version: 2,
            name: "002_second",
            sql: "CREATE TABLE second (id INTEGER);",
        };

        assert_eq!(apply(&mut conn, &[first]).unwrap(), 1);
        assert_eq!(apply(&mut conn, &[first, second]).unwrap(), 1);
        assert_eq!(current_version(&conn).unwrap(), Some(2));
        assert_eq!(applied_migrations(&conn).unwrap(), vec!["001_first", "002_second"]);
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let broken = Migration {
            version: 1,
            name: "001_broken",
            sql: "CREATE TABLE half (id INTEGER); NOT SQL;",
        };

        let err = apply(&mut conn, &[broken]).unwrap_err();
        assert!(err.is_storage());
        assert!(!table_names(&conn, "table").contains(&"half".to_string()));
        assert_eq!(current_version(&conn).unwrap(), None);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let a = Migration { version: 2, name: "002_a", sql: "SELECT 1;" };
        let b = Migration { version: 1, name: "001_b", sql: "SELECT 1;" };
        let err = apply(&mut conn, &[a, b]).unwrap_err();
        assert!(matches!(err, RelgraphError::Config(_)));
    }
}
