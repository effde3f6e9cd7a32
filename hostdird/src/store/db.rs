use std::path::Path;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use shared::types::HostRecord;
use super::{NewHost, merge_object, new_host_id};

const HOST_COLUMNS: &str = "id, address, port, code, created_at, updated_at";

pub struct HostDb {
    conn: Connection,
}

impl HostDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                id          TEXT PRIMARY KEY,
                address     TEXT NOT NULL,
                port        INTEGER NOT NULL,
                code        TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_hosts_created_at ON hosts(created_at);

            CREATE TABLE IF NOT EXISTS settings (
                id          INTEGER PRIMARY KEY CHECK (id = 1),
                body        TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Insert a host under a fresh id. Returns None if the code is already taken.
    pub fn insert_host(&self, host: NewHost) -> Result<Option<HostRecord>> {
        let record = host.into_record(new_host_id());

        let result = self.conn.execute(
            "INSERT INTO hosts (id, address, port, code, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &record.id,
                &record.address,
                record.port,
                &record.code,
                timestamp(&record.created_at),
                timestamp(&record.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(Some(record)),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to insert host"),
        }
    }

    pub fn get_host(&self, id: &str) -> Result<Option<HostRecord>> {
        self.query_one("id", id).context("Failed to query host by id")
    }

    pub fn get_host_by_code(&self, code: &str) -> Result<Option<HostRecord>> {
        self.query_one("code", code).context("Failed to query host by code")
    }

    /// Remove a host by id, returning the removed record
    pub fn delete_host(&self, id: &str) -> Result<Option<HostRecord>> {
        let Some(host) = self.get_host(id)? else {
            return Ok(None);
        };
        self.conn
            .execute("DELETE FROM hosts WHERE id = ?1", params![id])
            .context("Failed to delete host")?;
        Ok(Some(host))
    }

    /// Remove a host by join code, returning the removed record
    pub fn delete_host_by_code(&self, code: &str) -> Result<Option<HostRecord>> {
        let Some(host) = self.get_host_by_code(code)? else {
            return Ok(None);
        };
        self.conn
            .execute("DELETE FROM hosts WHERE id = ?1", params![&host.id])
            .context("Failed to delete host")?;
        Ok(Some(host))
    }

    /// Every stored host, oldest first
    pub fn get_all_hosts(&self) -> Result<Vec<HostRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {HOST_COLUMNS} FROM hosts ORDER BY created_at, id"))
            .context("Failed to prepare query")?;

        let hosts = stmt
            .query_map([], Self::row_to_host)
            .context("Failed to query hosts")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect hosts")?;

        Ok(hosts)
    }

    /// Bump `updated_at` for a host
    pub fn touch_host(&self, id: &str, at: DateTime<Utc>) -> Result<Option<HostRecord>> {
        let count = self.conn
            .execute(
                "UPDATE hosts SET updated_at = ?1 WHERE id = ?2",
                params![timestamp(&at), id],
            )
            .context("Failed to refresh host")?;

        if count == 0 {
            return Ok(None);
        }
        self.get_host(id)
    }

    pub fn get_settings(&self) -> Result<Option<serde_json::Value>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM settings WHERE id = 1", [], |row| row.get(0))
            .optional()
            .context("Failed to query settings")?;

        body.map(|b| serde_json::from_str(&b).context("Stored settings are not valid JSON"))
            .transpose()
    }

    pub fn merge_settings(
        &self,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let merged = merge_object(self.get_settings()?, patch);
        let body = serde_json::to_string(&merged)
            .context("Failed to serialize settings")?;

        self.conn
            .execute(
                "INSERT INTO settings (id, body, updated_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![body, timestamp(&Utc::now())],
            )
            .context("Failed to store settings")?;

        Ok(merged)
    }

    fn query_one(&self, column: &str, value: &str) -> rusqlite::Result<Option<HostRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {HOST_COLUMNS} FROM hosts WHERE {column} = ?1"),
                params![value],
                Self::row_to_host,
            )
            .optional()
    }

    fn row_to_host(row: &rusqlite::Row) -> Result<HostRecord, rusqlite::Error> {
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;

        Ok(HostRecord {
            id: row.get(0)?,
            address: row.get(1)?,
            port: row.get::<_, u16>(2)?,
            code: row.get(3)?,
            created_at: parse_timestamp(4, &created_at)?,
            updated_at: parse_timestamp(5, &updated_at)?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(column: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))
}
