//! Schema versions for the libSQL backend.
//!
//! Applied versions are recorded in `schema_versions`. Each pending version
//! runs in its own transaction together with its history row, so a failed
//! upgrade leaves the database at the last complete version.

use std::collections::BTreeSet;

use chrono::Utc;
use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only; versions are applied in this order.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "questionnaire_records",
        sql: r#"
            CREATE TABLE IF NOT EXISTS questionnaire_records (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                answers TEXT,
                contact_info TEXT,
                final_flag INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (owner_id, step)
            );
            CREATE INDEX IF NOT EXISTS idx_records_owner ON questionnaire_records(owner_id);
            CREATE INDEX IF NOT EXISTS idx_records_final ON questionnaire_records(final_flag);
        "#,
    },
    Migration {
        version: 2,
        name: "identities",
        sql: r#"
            CREATE TABLE IF NOT EXISTS identities (
                identity_id TEXT PRIMARY KEY,
                email TEXT,
                phone TEXT,
                full_name TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_identities_email ON identities(email COLLATE NOCASE);
            CREATE INDEX IF NOT EXISTS idx_identities_phone ON identities(phone);
        "#,
    },
];

/// Bring the schema up to date. Returns the latest applied version.
pub async fn migrate(conn: &Connection) -> Result<i64, DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("schema_versions: {e}")))?;

    let applied = applied_versions(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)).collect();

    for m in &pending {
        apply(conn, m).await?;
    }

    let latest = MIGRATIONS.last().map_or(0, |m| m.version);
    if pending.is_empty() {
        tracing::debug!(version = latest, "Schema up to date");
    } else {
        tracing::info!(version = latest, applied = pending.len(), "Schema migrated");
    }
    Ok(latest)
}

async fn applied_versions(conn: &Connection) -> Result<BTreeSet<i64>, DatabaseError> {
    let read_err = |e: libsql::Error| DatabaseError::Migration(format!("reading schema_versions: {e}"));

    let mut rows = conn
        .query("SELECT version FROM schema_versions", ())
        .await
        .map_err(read_err)?;
    let mut versions = BTreeSet::new();
    while let Some(row) = rows.next().await.map_err(read_err)? {
        versions.insert(row.get::<i64>(0).map_err(read_err)?);
    }
    Ok(versions)
}

async fn apply(conn: &Connection, m: &Migration) -> Result<(), DatabaseError> {
    let fail = |e: libsql::Error| DatabaseError::Migration(format!("V{} {}: {e}", m.version, m.name));

    tracing::info!(version = m.version, name = m.name, "Applying schema version");
    let tx = conn.transaction().await.map_err(fail)?;
    tx.execute_batch(m.sql).await.map_err(fail)?;
    tx.execute(
        "INSERT INTO schema_versions (version, name, applied_at) VALUES (?1, ?2, ?3)",
        libsql::params![m.version, m.name, Utc::now().to_rfc3339()],
    )
    .await
    .map_err(fail)?;
    tx.commit().await.map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn conn() -> Connection {
        libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap()
            .connect()
            .unwrap()
    }

    async fn tables(conn: &Connection) -> Vec<String> {
        let mut rows = conn
            .query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name", ())
            .await
            .unwrap();
        let mut names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            names.push(row.get::<String>(0).unwrap());
        }
        names
    }

    #[tokio::test]
    async fn fresh_database_gets_full_schema() {
        let conn = conn().await;
        assert_eq!(migrate(&conn).await.unwrap(), 2);
        assert_eq!(tables(&conn).await, vec!["identities", "questionnaire_records", "schema_versions"]);
        assert_eq!(applied_versions(&conn).await.unwrap(), BTreeSet::from([1, 2]));

        // Second run is a no-op.
        assert_eq!(migrate(&conn).await.unwrap(), 2);
        assert_eq!(applied_versions(&conn).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn only_missing_versions_are_applied() {
        let conn = conn().await;
        conn.execute_batch(MIGRATIONS[0].sql).await.unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_versions (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL);
             INSERT INTO schema_versions VALUES (1, 'questionnaire_records', '2026-01-01T00:00:00Z');",
        )
        .await
        .unwrap();

        migrate(&conn).await.unwrap();
        assert!(tables(&conn).await.contains(&"identities".to_string()));

        let mut rows = conn
            .query("SELECT applied_at FROM schema_versions WHERE version = 1", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "2026-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn owner_and_step_are_unique() {
        let conn = conn().await;
        migrate(&conn).await.unwrap();

        let insert = "INSERT INTO questionnaire_records (id, owner_id, step, created_at, updated_at) VALUES (?1, 'o', 1, '2026-01-01', '2026-01-01')";
        conn.execute(insert, libsql::params!["a"]).await.unwrap();
        assert!(conn.execute(insert, libsql::params!["b"]).await.is_err());
    }
}
