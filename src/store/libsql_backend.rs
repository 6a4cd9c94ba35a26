//! libSQL backend — async `PersistenceGateway` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DatabaseError, PersistError};
use crate::store::migrations;
use crate::store::traits::{IdentityRecord, PartialStoredRecord, PersistenceGateway, StoredRecord};

/// libSQL gateway.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlGateway {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlGateway {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let gateway = Self::from_database(db)?;
        migrations::migrate(gateway.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(gateway)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let gateway = Self::from_database(db)?;
        migrations::migrate(gateway.conn()).await?;
        Ok(gateway)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Constraint violations are the store rejecting the record; anything else
/// (locked database, IO, dropped connection) may pass on a second try.
fn classify(op: &str, e: libsql::Error) -> PersistError {
    let message = format!("{op}: {e}");
    if message.contains("constraint failed") {
        PersistError::Permanent(message)
    } else {
        PersistError::Transient(message)
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, PersistError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| PersistError::Permanent(format!("serialize payload: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: Option<String>,
) -> Result<Option<T>, PersistError> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| PersistError::Permanent(format!("corrupt {column} column: {e}")))
}

/// Map a libsql Row to a StoredRecord.
///
/// Column order matches RECORD_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<StoredRecord, PersistError> {
    let read = |e: libsql::Error| PersistError::Permanent(format!("record row parse: {e}"));

    let record_id: String = row.get(0).map_err(read)?;
    let owner_id: String = row.get(1).map_err(read)?;
    let step: i64 = row.get(2).map_err(read)?;
    let answers: Option<String> = row.get::<String>(3).ok();
    let contact_info: Option<String> = row.get::<String>(4).ok();
    let final_flag: i64 = row.get(5).map_err(read)?;
    let created_str: String = row.get(6).map_err(read)?;
    let updated_str: String = row.get(7).map_err(read)?;

    Ok(StoredRecord {
        record_id,
        owner_id,
        step: u8::try_from(step).map_err(|_| PersistError::Permanent(format!("step out of range: {step}")))?,
        answers: from_json("answers", answers)?,
        contact_info: from_json("contact_info", contact_info)?,
        final_flag: final_flag != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const RECORD_COLUMNS: &str =
    "id, owner_id, step, answers, contact_info, final_flag, created_at, updated_at";

impl LibSqlGateway {
    async fn find_identity(&self, sql: &str, value: &str) -> Result<Option<String>, PersistError> {
        let mut rows = self
            .conn()
            .query(sql, params![value])
            .await
            .map_err(|e| classify("find_identity", e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(classify("find_identity", e)),
        }
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl PersistenceGateway for LibSqlGateway {
    async fn write(&self, record: &PartialStoredRecord) -> Result<(), PersistError> {
        record.validate()?;
        let now = Utc::now().to_rfc3339();
        let answers = to_json(&record.answers)?;
        let contact_info = to_json(&record.contact_info)?;

        self.conn()
            .execute(
                "INSERT INTO questionnaire_records (id, owner_id, step, answers, contact_info, final_flag, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT (owner_id, step) DO UPDATE SET
                    answers = COALESCE(excluded.answers, questionnaire_records.answers),
                    contact_info = COALESCE(excluded.contact_info, questionnaire_records.contact_info),
                    final_flag = excluded.final_flag,
                    updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    record.owner_id.clone(),
                    i64::from(record.step),
                    opt_text(answers),
                    opt_text(contact_info),
                    i64::from(record.final_flag),
                    now,
                ],
            )
            .await
            .map_err(|e| classify("write", e))?;

        debug!(owner_id = %record.owner_id, step = record.step, final_flag = record.final_flag, "Record upserted");
        Ok(())
    }

    async fn records_for_owner(&self, owner_id: &str) -> Result<Vec<StoredRecord>, PersistError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM questionnaire_records WHERE owner_id = ?1 ORDER BY step"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| classify("records_for_owner", e))?;

        let mut records = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => records.push(row_to_record(&row)?),
                Ok(None) => break,
                Err(e) => return Err(classify("records_for_owner", e)),
            }
        }
        Ok(records)
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<String>, PersistError> {
        self.find_identity(
            "SELECT identity_id FROM identities WHERE email = ?1 COLLATE NOCASE ORDER BY created_at LIMIT 1",
            email,
        )
        .await
    }

    async fn find_identity_by_phone(&self, phone: &str) -> Result<Option<String>, PersistError> {
        self.find_identity(
            "SELECT identity_id FROM identities WHERE phone = ?1 ORDER BY created_at LIMIT 1",
            phone,
        )
        .await
    }

    async fn register_identity(&self, identity: &IdentityRecord) -> Result<(), PersistError> {
        if identity.identity_id.trim().is_empty() {
            return Err(PersistError::Permanent("identity_id is required".to_string()));
        }
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO identities (identity_id, email, phone, full_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (identity_id) DO UPDATE SET
                    email = COALESCE(excluded.email, identities.email),
                    phone = COALESCE(excluded.phone, identities.phone),
                    full_name = COALESCE(excluded.full_name, identities.full_name),
                    updated_at = excluded.updated_at",
                params![
                    identity.identity_id.clone(),
                    opt_text(identity.email.clone()),
                    opt_text(identity.phone.clone()),
                    opt_text(identity.full_name.clone()),
                    now,
                ],
            )
            .await
            .map_err(|e| classify("register_identity", e))?;

        debug!(identity_id = %identity.identity_id, "Identity registered");
        Ok(())
    }
}
