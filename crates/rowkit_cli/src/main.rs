//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `rowkit_core` linkage with one in-memory save/find round trip.
//! - Keep output deterministic for quick local sanity checks.

use rowkit_core::db::open_db_in_memory;
use rowkit_core::{attributes, EntityCatalog, FindOptions, Repository, SaveOutcome};
use std::error::Error;

const SMOKE_CATALOG: &str = r#"[
    {
        "record": "user",
        "table": "users",
        "primary_key": "id",
        "fields": ["id", "name", "email"],
        "required": ["name"],
        "defaults": { "email": "unknown@example.com" }
    }
]"#;

fn main() -> Result<(), Box<dyn Error>> {
    println!("rowkit_core version={}", rowkit_core::core_version());

    let conn = open_db_in_memory()?;
    conn.execute_batch(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL
        );",
    )?;

    let catalog = EntityCatalog::from_json(SMOKE_CATALOG)?;
    let users = catalog.table("user").ok_or("catalog has no `user` entity")?;
    let repo = Repository::new(&conn, users);

    let record = repo.create(attributes([("name", "smoke")]))?;
    let SaveOutcome::Inserted { row_id } = repo.save(&record)? else {
        return Err("smoke record was updated instead of inserted".into());
    };

    let loaded = repo
        .find(row_id, &FindOptions::default())?
        .into_one()
        .ok_or("smoke record not found")?;
    println!(
        "rowkit_core smoke row_id={row_id} email={}",
        loaded.get("email").map(ToString::to_string).unwrap_or_default()
    );
    Ok(())
}
