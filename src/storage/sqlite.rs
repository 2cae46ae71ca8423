//! SQLite sink implementation
//!
//! This module provides a SQLite-based implementation of the Sink trait.

use crate::checkpoint::Checkpoint;
use crate::extract::Record;
use crate::query::{CategoryId, CrawlTarget};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Sink, StorageError, StorageResult};
use crate::storage::{FailedTargetRecord, RunRecord, RunStatus};
use crate::HarvestError;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite sink backend
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Creates a new SqliteSink instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Gets a stored record by id
    pub fn get_record(&self, id: &str) -> StorageResult<Option<Record>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, url, category, date_iso, fields_json FROM records WHERE id = ?1",
                params![id],
                record_row,
            )
            .optional()?;

        row.map(decode_record).transpose()
    }

    /// Visits every stored record ordered by date, category and URL
    ///
    /// Rows are decoded one at a time so large archives are never held in
    /// memory. Stops at the first error returned by `visit`.
    ///
    /// # Returns
    ///
    /// The number of records visited
    pub fn for_each_record<E, F>(&self, mut visit: F) -> Result<u64, E>
    where
        E: From<StorageError>,
        F: FnMut(Record) -> Result<(), E>,
    {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, url, category, date_iso, fields_json FROM records
                 ORDER BY date_iso, category, url",
            )
            .map_err(StorageError::from)?;
        let rows = stmt.query_map([], record_row).map_err(StorageError::from)?;

        let mut visited = 0;
        for row in rows {
            let record = decode_record(row.map_err(StorageError::from)?)?;
            visit(record)?;
            visited += 1;
        }
        Ok(visited)
    }
}

type RecordRow = (String, String, String, String, String);

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_record((id, url, category, date_iso, fields_json): RecordRow) -> StorageResult<Record> {
    let fields: BTreeMap<String, String> = serde_json::from_str(&fields_json)?;
    let date_iso = date_iso
        .parse::<NaiveDate>()
        .map_err(|e| StorageError::Serialization(format!("date_iso '{}': {}", date_iso, e)))?;

    Ok(Record {
        id,
        url,
        category: CategoryId::new(category),
        fields,
        date_iso,
    })
}

impl Sink for SqliteSink {
    // ===== Records =====

    fn upsert_batch(&mut self, records: &[Record]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (id, url, category, date_iso, fields_json, first_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    url = excluded.url,
                    category = excluded.category,
                    date_iso = excluded.date_iso,
                    fields_json = excluded.fields_json,
                    updated_at = excluded.updated_at",
            )?;

            for record in records {
                let fields_json = serde_json::to_string(&record.fields)?;
                stmt.execute(params![
                    record.id,
                    record.url,
                    record.category.as_str(),
                    record.date_iso.to_string(),
                    fields_json,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    // ===== Checkpoint =====

    fn read_checkpoint(&self) -> StorageResult<Option<Checkpoint>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM checkpoint WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match body {
            Some(body) => Ok(Some(Checkpoint::from_json(&body)?)),
            None => Ok(None),
        }
    }

    fn write_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let body = checkpoint.to_json()?;
        self.conn.execute(
            "INSERT INTO checkpoint (id, body, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![body, checkpoint.updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn clear_checkpoint(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM checkpoint", [])?;
        Ok(())
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                })
            })
            .optional()?;

        Ok(run)
    }

    // ===== Failed Targets =====

    fn record_failed_target(
        &mut self,
        target: &CrawlTarget,
        reason: &str,
        run_id: i64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO failed_targets (date, category, page, reason, run_id, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                target.date.to_string(),
                target.category.as_str(),
                target.page,
                reason,
                run_id,
                now
            ],
        )?;
        Ok(())
    }

    fn get_failed_targets(&self) -> StorageResult<Vec<FailedTargetRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, category, page, reason, run_id, failed_at
             FROM failed_targets ORDER BY id DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(FailedTargetRecord {
                date: row.get(0)?,
                category: row.get(1)?,
                page: row.get(2)?,
                reason: row.get(3)?,
                run_id: row.get(4)?,
                failed_at: row.get(5)?,
            })
        })?;

        let mut failed = Vec::new();
        for row in rows {
            failed.push(row?);
        }
        Ok(failed)
    }

    // ===== Statistics =====

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_records_by_category(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM records GROUP BY category ORDER BY category",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::LocalDate;
    use crate::extract::record_id;

    fn record(url: &str, title: &str) -> Record {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), title.to_string());
        Record {
            id: record_id(url),
            url: url.to_string(),
            category: CategoryId::from("politics"),
            fields,
            date_iso: NaiveDate::from_ymd_opt(2024, 10, 4).unwrap(),
        }
    }

    fn target(category: &str) -> CrawlTarget {
        CrawlTarget::first_page(LocalDate::new(1403, 7, 13).unwrap(), CategoryId::from(category))
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteSink::new_in_memory().is_ok());
    }

    #[test]
    fn test_upsert_batch_is_idempotent() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let batch = vec![
            record("https://news.example/1", "One"),
            record("https://news.example/2", "Two"),
        ];

        assert_eq!(sink.upsert_batch(&batch).unwrap(), 2);
        let first = sink.get_record(&batch[0].id).unwrap();

        assert_eq!(sink.upsert_batch(&batch).unwrap(), 2);
        assert_eq!(sink.count_records().unwrap(), 2);
        assert_eq!(sink.get_record(&batch[0].id).unwrap(), first);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.upsert_batch(&[record("https://news.example/1", "Old")])
            .unwrap();
        sink.upsert_batch(&[record("https://news.example/1", "New")])
            .unwrap();

        assert_eq!(sink.count_records().unwrap(), 1);
        let stored = sink
            .get_record(&record_id("https://news.example/1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.fields["title"], "New");
        assert_eq!(stored.date_iso.to_string(), "2024-10-04");
    }

    #[test]
    fn test_get_missing_record() {
        let sink = SqliteSink::new_in_memory().unwrap();
        assert!(sink.get_record("nope").unwrap().is_none());
    }

    #[test]
    fn test_for_each_record_orders_by_date_then_category() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let mut early = record("https://news.example/9", "Early");
        early.date_iso = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        let mut economy = record("https://news.example/5", "Economy");
        economy.category = CategoryId::from("economy");
        sink.upsert_batch(&[record("https://news.example/2", "Two"), economy, early])
            .unwrap();

        let mut seen = Vec::new();
        let visited = sink
            .for_each_record(|record| -> StorageResult<()> {
                seen.push(record.fields["title"].clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, 3);
        assert_eq!(seen, vec!["Early", "Economy", "Two"]);
    }

    #[test]
    fn test_for_each_record_stops_on_error() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.upsert_batch(&[
            record("https://news.example/1", "One"),
            record("https://news.example/2", "Two"),
        ])
        .unwrap();

        let mut calls = 0;
        let result = sink.for_each_record(|_| {
            calls += 1;
            Err(StorageError::Database("stop".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        assert!(sink.read_checkpoint().unwrap().is_none());

        let checkpoint = Checkpoint::at(target("politics"), Some("abc".to_string()));
        sink.write_checkpoint(&checkpoint).unwrap();
        assert_eq!(sink.read_checkpoint().unwrap(), Some(checkpoint));

        let newer = Checkpoint::at(target("economy"), None);
        sink.write_checkpoint(&newer).unwrap();
        assert_eq!(sink.read_checkpoint().unwrap(), Some(newer));

        sink.clear_checkpoint().unwrap();
        assert!(sink.read_checkpoint().unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_with_unknown_fields() {
        let sink = SqliteSink::new_in_memory().unwrap();
        sink.conn
            .execute(
                "INSERT INTO checkpoint (id, body, updated_at) VALUES (1, ?1, 'now')",
                params![
                    r#"{"schema_version": 7, "future_field": [1, 2],
                        "last_completed_target": {"date": "1403/07/13", "category": "sport", "page": 1}}"#
                ],
            )
            .unwrap();

        let checkpoint = sink.read_checkpoint().unwrap().unwrap();
        assert_eq!(checkpoint.schema_version, 7);
        assert_eq!(checkpoint.last_completed_target, Some(target("sport")));
    }

    #[test]
    fn test_run_lifecycle() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let run_id = sink.create_run("hash").unwrap();
        assert!(run_id > 0);

        let latest = sink.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Running);
        assert!(latest.finished_at.is_none());

        sink.finish_run(run_id, RunStatus::Completed).unwrap();
        let latest = sink.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Completed);
        assert!(latest.finished_at.is_some());

        assert!(matches!(
            sink.finish_run(999, RunStatus::Failed),
            Err(StorageError::RunNotFound(999))
        ));
    }

    #[test]
    fn test_failed_targets() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let run_id = sink.create_run("hash").unwrap();
        sink.record_failed_target(&target("politics"), "transient failure", run_id)
            .unwrap();

        let failed = sink.get_failed_targets().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].date, "1403/07/13");
        assert_eq!(failed[0].category, "politics");
        assert_eq!(failed[0].page, 1);
        assert_eq!(failed[0].run_id, run_id);
    }

    #[test]
    fn test_count_by_category() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let mut other = record("https://news.example/3", "Three");
        other.category = CategoryId::from("economy");
        sink.upsert_batch(&[
            record("https://news.example/1", "One"),
            record("https://news.example/2", "Two"),
            other,
        ])
        .unwrap();

        assert_eq!(
            sink.count_records_by_category().unwrap(),
            vec![("economy".to_string(), 1), ("politics".to_string(), 2)]
        );
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.db");

        {
            let mut sink = SqliteSink::new(&path).unwrap();
            sink.upsert_batch(&[record("https://news.example/1", "One")])
                .unwrap();
            sink.write_checkpoint(&Checkpoint::at(target("politics"), None))
                .unwrap();
        }

        let sink = SqliteSink::new(&path).unwrap();
        assert_eq!(sink.count_records().unwrap(), 1);
        assert_eq!(
            sink.read_checkpoint().unwrap().unwrap().last_completed_target,
            Some(target("politics"))
        );
    }
}
