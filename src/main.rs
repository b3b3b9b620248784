use relgraph::db::{migrate, Db};
use relgraph::Config;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "migrate" => {
            let config = Config::load()?;
            run_migrations(&Db::new(config.db_path())).await?;
        }
        "verify" => {
            run_schema_verification().await?;
        }
        other => {
            anyhow::bail!("Unknown command: {} (expected migrate or verify)", other);
        }
    }

    Ok(())
}

async fn run_migrations(db: &Db) -> Result<()> {
    let applied = db.migrate().await?;
    log::info!(
        "Database initialized at {} ({} migration(s) applied)",
        db.path().display(),
        applied
    );
    Ok(())
}

/// Run database schema verification
async fn run_schema_verification() -> Result<()> {
    log::info!("Starting relgraph v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Database path: {}", config.db_path().display());
    log::info!(
        "Cache: {} (capacity {}), traversal timeout {}ms",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.capacity,
        config.traversal.timeout_ms
    );

    let db = Db::new(config.db_path());
    run_migrations(&db).await?;

    verify_database_schema(&db).await?;

    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    use relgraph::error::RelgraphError;

    db.with_connection(|conn| {
        // Check tables
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for table in ["relation", "schema_migrations"] {
            if !tables.iter().any(|t| t == table) {
                return Err(RelgraphError::Config(format!("Missing table: {}", table)));
            }
            log::debug!("✓ Table exists: {}", table);
        }

        // Check directional indexes
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")?;
        let indexes: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for index_name in ["idx_relation_from", "idx_relation_to"] {
            if !indexes.iter().any(|i| i == index_name) {
                return Err(RelgraphError::Config(format!("Missing index: {}", index_name)));
            }
            log::debug!("✓ Index exists: {}", index_name);
        }

        let applied = migrate::applied_migrations(conn)?;
        if applied.len() != migrate::MIGRATIONS.len() {
            return Err(RelgraphError::Config(format!(
                "Schema has {} of {} migrations applied",
                applied.len(),
                migrate::MIGRATIONS.len()
            )));
        }
        log::debug!("✓ {} migrations applied", applied.len());

        // Check pragmas
        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(RelgraphError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }
        log::debug!("✓ Journal mode: WAL");

        // Integrity check
        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(RelgraphError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
