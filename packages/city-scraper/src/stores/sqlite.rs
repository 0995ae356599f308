//! SQLite snapshot sink.
//!
//! Upserts every record of a snapshot into a single `records` table keyed by
//! `(kind, natural_key)`, so repeated runs accumulate one row per listing or
//! observation. Field values are stored as a JSON object.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::{ExportError, ExportResult};
use crate::stores::Snapshot;
use crate::traits::sink::{PersistReport, SnapshotSink};
use crate::types::target::SourceKind;

/// SQLite-backed sink.
pub struct SqliteSink {
    pool: SqlitePool,
}

fn storage(error: impl std::error::Error + Send + Sync + 'static) -> ExportError {
    ExportError::Storage(Box::new(error))
}

impl SqliteSink {
    /// Connect and create the schema if needed.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - in-memory database (ephemeral)
    /// - `sqlite://data/city_data.db?mode=rwc` - file, created if missing
    pub async fn new(database_url: &str) -> ExportResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(storage)?;

        let sink = Self { pool };
        sink.run_migrations().await?;
        Ok(sink)
    }

    /// In-memory database (for testing).
    pub async fn in_memory() -> ExportResult<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> ExportResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                natural_key TEXT NOT NULL,
                source_url TEXT NOT NULL,
                fields TEXT NOT NULL DEFAULT '{}',
                scraped_at TEXT NOT NULL,
                PRIMARY KEY (kind, natural_key)
            );

            CREATE INDEX IF NOT EXISTS idx_records_scraped_at ON records(scraped_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// Number of stored rows of `kind`.
    pub async fn count(&self, kind: SourceKind) -> ExportResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        Ok(count)
    }

    /// Stored field JSON for one record.
    pub async fn fields(
        &self,
        kind: SourceKind,
        natural_key: &str,
    ) -> ExportResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT fields FROM records WHERE kind = ? AND natural_key = ?")
                .bind(kind.as_str())
                .bind(natural_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        Ok(row.map(|(fields,)| fields))
    }
}

#[async_trait]
impl SnapshotSink for SqliteSink {
    async fn persist(&self, snapshot: &Snapshot) -> ExportResult<PersistReport> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        for record in snapshot.records() {
            let fields = serde_json::to_string(&record.fields).map_err(storage)?;

            sqlx::query(
                r#"
                INSERT INTO records (kind, natural_key, source_url, fields, scraped_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(kind, natural_key) DO UPDATE SET
                    source_url = excluded.source_url,
                    fields = excluded.fields,
                    scraped_at = excluded.scraped_at
                "#,
            )
            .bind(record.kind().as_str())
            .bind(record.key.value())
            .bind(record.source_url.as_str())
            .bind(fields)
            .bind(record.scraped_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;

        info!(records = snapshot.len(), "Snapshot stored in SQLite");

        Ok(PersistReport {
            files: Vec::new(),
            records: snapshot.len(),
        })
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::RecordStore;
    use crate::types::record::{NaturalKey, Record};

    fn property(id: &str, price: i64) -> Record {
        Record::new(NaturalKey::new(SourceKind::Property, [id]), "https://listings.example.com/p1")
            .with_field("property_id", id)
            .with_field("price", price)
    }

    #[tokio::test]
    async fn test_persist_upserts_by_key() {
        let sink = SqliteSink::in_memory().await.unwrap();
        let store = RecordStore::new();

        store.ingest([property("A", 1), property("B", 2)]);
        sink.persist(&store.flush()).await.unwrap();

        store.ingest([property("A", 99)]);
        let report = sink.persist(&store.flush()).await.unwrap();

        assert_eq!(report.records, 2);
        assert!(report.files.is_empty());
        assert_eq!(sink.count(SourceKind::Property).await.unwrap(), 2);
        assert_eq!(sink.count(SourceKind::Environment).await.unwrap(), 0);

        let fields = sink.fields(SourceKind::Property, "A").await.unwrap().unwrap();
        assert_eq!(fields, r#"{"property_id":"A","price":99}"#);
    }
}
