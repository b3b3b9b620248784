use relgraph::{config::Config, db::Db, error::RelgraphError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let db = Db::new(config.db_path());
    db.migrate().await?;

    println!("\n=== Relation Graph Statistics ===\n");

    let by_group = db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT
                relation_type_group,
                COUNT(*) as edges,
                COUNT(DISTINCT relation_type) as types,
                COUNT(DISTINCT from_id) as sources,
                COUNT(DISTINCT to_id) as targets
            FROM relation
            GROUP BY relation_type_group
            ORDER BY edges DESC
            "#
        )?;

        let mut rows = stmt.query([])?;
        let mut results = Vec::new();

        while let Some(row) = rows.next()? {
            results.push((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?, // edges
                row.get::<_, i64>(2)?, // distinct types
                row.get::<_, i64>(3)?, // distinct sources
                row.get::<_, i64>(4)?, // distinct targets
            ));
        }

        Ok::<Vec<_>, RelgraphError>(results)
    }).await?;

    if by_group.is_empty() {
        println!("No relations stored.");
        println!("\nAdd some with the `relations add` command.");
        return Ok(());
    }

    println!("Edges by Relation Type Group:\n");
    println!("{:-<80}", "");
    println!(
        "{:<30} {:>10} {:>10} {:>12} {:>12}",
        "Group", "Edges", "Types", "Sources", "Targets"
    );
    println!("{:-<80}", "");

    for (group, edges, types, sources, targets) in &by_group {
        println!(
            "{:<30} {:>10} {:>10} {:>12} {:>12}",
            group, edges, types, sources, targets
        );
    }
    println!("{:-<80}", "");

    // Most used relation types
    let top_types = db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT relation_type, relation_type_group, COUNT(*) as edges
            FROM relation
            GROUP BY relation_type, relation_type_group
            ORDER BY edges DESC
            LIMIT 10
            "#
        )?;

        let mut rows = stmt.query([])?;
        let mut types = Vec::new();

        while let Some(row) = rows.next()? {
            types.push((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ));
        }

        Ok::<Vec<_>, RelgraphError>(types)
    }).await?;

    println!("\nTop Relation Types:\n");
    println!("{:-<60}", "");
    for (relation_type, group, edges) in &top_types {
        println!("{:<25} {:<25} {:>8}", relation_type, group, edges);
    }
    println!("{:-<60}", "");

    // Widest fan-out
    let fan_out = db.with_connection(|conn| {
        conn.query_row(
            r#"
            SELECT from_type, from_id, COUNT(*) as edges
            FROM relation
            GROUP BY from_type, from_id
            ORDER BY edges DESC
            LIMIT 1
            "#,
            [],
            |row| Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        ).map_err(RelgraphError::from)
    }).await?;

    println!("\nWidest Fan-out:");
    println!("  {}:{} with {} outgoing edges", fan_out.0, fan_out.1, fan_out.2);

    let total: i64 = by_group.iter().map(|(_, edges, ..)| edges).sum();
    println!("\nTotal relations: {}", total);

    println!();

    Ok(())
}
