//! libSQL storage layer for law records and crawl state.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding the
//! `laws` table, per-origin crawl state, and the queries behind dataset
//! exports and pipeline work queues.
//!
//! **Access rules:**
//! - pipeline commands: read-write via [`Storage::open`]
//! - `search`/`stats`/`state`: read-only via [`Storage::open_readonly`]

pub mod export;
mod migrations;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use leizilla_shared::{
    CrawlState, ExportFormat, LawFilter, LawRecord, LawStatus, LeizillaError, ProcessingStage,
    Result, RetryConfig, StorageConfig, StorageStats, normalize_text, with_retry_if,
};
use libsql::params::Params;
use libsql::{Connection, Database, Value, params};
use tracing::{debug, instrument};

/// Columns selected for every [`LawRecord`] read, in [`row_to_law`] order.
const LAW_COLUMNS: &str = "id, title, origin, law_type, number, year, publication_date, \
     original_url, pdf_url, archive_url, archive_item_id, local_pdf_path, collection_metadata, \
     full_text, normalized_text, content_hash, status, stage, text_attempts, created_at, updated_at";

/// Insert-or-update by id. Optional fields only overwrite when present,
/// metadata objects are merged, and status/stage never move backwards.
const UPSERT_LAW_SQL: &str = "
INSERT INTO laws (id, title, origin, law_type, number, year, publication_date,
                  original_url, pdf_url, archive_url, archive_item_id, local_pdf_path,
                  collection_metadata, full_text, normalized_text, content_hash,
                  status, stage, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
ON CONFLICT(id) DO UPDATE SET
  title = excluded.title,
  law_type = COALESCE(excluded.law_type, laws.law_type),
  number = COALESCE(excluded.number, laws.number),
  year = COALESCE(excluded.year, laws.year),
  publication_date = COALESCE(excluded.publication_date, laws.publication_date),
  original_url = COALESCE(excluded.original_url, laws.original_url),
  pdf_url = COALESCE(excluded.pdf_url, laws.pdf_url),
  archive_url = COALESCE(excluded.archive_url, laws.archive_url),
  archive_item_id = COALESCE(excluded.archive_item_id, laws.archive_item_id),
  local_pdf_path = COALESCE(excluded.local_pdf_path, laws.local_pdf_path),
  collection_metadata = CASE
    WHEN excluded.collection_metadata IS NULL THEN laws.collection_metadata
    WHEN laws.collection_metadata IS NULL THEN excluded.collection_metadata
    ELSE json_patch(laws.collection_metadata, excluded.collection_metadata)
  END,
  full_text = COALESCE(excluded.full_text, laws.full_text),
  normalized_text = COALESCE(excluded.normalized_text, laws.normalized_text),
  content_hash = COALESCE(excluded.content_hash, laws.content_hash),
  status = CASE
    WHEN (CASE excluded.status WHEN 'revoked' THEN 2 WHEN 'suspended' THEN 1 ELSE 0 END)
       > (CASE laws.status WHEN 'revoked' THEN 2 WHEN 'suspended' THEN 1 ELSE 0 END)
    THEN excluded.status ELSE laws.status
  END,
  stage = CASE
    WHEN (CASE excluded.stage WHEN 'text_extracted' THEN 3 WHEN 'archived' THEN 2
                              WHEN 'downloaded' THEN 1 ELSE 0 END)
       > (CASE laws.stage WHEN 'text_extracted' THEN 3 WHEN 'archived' THEN 2
                          WHEN 'downloaded' THEN 1 ELSE 0 END)
    THEN excluded.stage ELSE laws.stage
  END,
  updated_at = excluded.updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    retry: RetryConfig,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &StorageConfig::default()).await
    }

    /// Open in read-write mode with explicit busy-retry settings.
    pub async fn open_with(path: &Path, config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LeizillaError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeizillaError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeizillaError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            retry: busy_retry(config),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LeizillaError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeizillaError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeizillaError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            retry: busy_retry(&StorageConfig::default()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LeizillaError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeizillaError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Busy-aware primitives
    // -----------------------------------------------------------------------

    /// Execute a write, retrying on lock contention.
    async fn execute(&self, sql: &str, values: Vec<Value>) -> Result<u64> {
        self.check_writable()?;
        let result = with_retry_if(
            &self.retry,
            || {
                let values = values.clone();
                async move {
                    self.conn
                        .execute(sql, Params::Positional(values))
                        .await
                        .map_err(classify)
                }
            },
            LeizillaError::is_retryable,
        )
        .await;
        result.map_err(exhausted)
    }

    /// Run a read, retrying on lock contention.
    async fn query(&self, sql: &str, values: Vec<Value>) -> Result<libsql::Rows> {
        let result = with_retry_if(
            &self.retry,
            || {
                let values = values.clone();
                async move {
                    self.conn
                        .query(sql, Params::Positional(values))
                        .await
                        .map_err(classify)
                }
            },
            LeizillaError::is_retryable,
        )
        .await;
        result.map_err(exhausted)
    }

    async fn collect_laws(&self, sql: &str, values: Vec<Value>) -> Result<Vec<LawRecord>> {
        let mut rows = self.query(sql, values).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(classify)? {
            results.push(row_to_law(&row)?);
        }
        Ok(results)
    }

    async fn count(&self, sql: &str, values: Vec<Value>) -> Result<u64> {
        let mut rows = self.query(sql, values).await?;
        match rows.next().await.map_err(classify)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(classify)? as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Law operations
    // -----------------------------------------------------------------------

    /// Insert a law, or update the stored one with the same id.
    ///
    /// `None` fields leave stored values untouched. `status` and `stage`
    /// are only applied when they rank above the stored value.
    #[instrument(skip_all, fields(id = %law.id))]
    pub async fn upsert_law(&self, law: &LawRecord) -> Result<()> {
        self.execute(UPSERT_LAW_SQL, law_values(law)?).await?;
        debug!(stage = %law.stage, "law upserted");
        Ok(())
    }

    /// Strict insert. A duplicate id is a [`LeizillaError::StorageConstraint`].
    pub async fn insert_law(&self, law: &LawRecord) -> Result<()> {
        self.execute(
            "INSERT INTO laws (id, title, origin, law_type, number, year, publication_date,
                               original_url, pdf_url, archive_url, archive_item_id, local_pdf_path,
                               collection_metadata, full_text, normalized_text, content_hash,
                               status, stage, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20)",
            law_values(law)?,
        )
        .await?;
        Ok(())
    }

    /// Get a law by id.
    pub async fn get_law(&self, id: &str) -> Result<Option<LawRecord>> {
        let laws = self
            .collect_laws(
                &format!("SELECT {LAW_COLUMNS} FROM laws WHERE id = ?1"),
                vec![Value::Text(id.to_string())],
            )
            .await?;
        Ok(laws.into_iter().next())
    }

    /// Whether any stored law carries this content hash.
    pub async fn exists_by_hash(&self, hash: &str) -> Result<bool> {
        Ok(self.find_id_by_hash(hash).await?.is_some())
    }

    /// The id of the first stored law carrying this content hash.
    pub async fn find_id_by_hash(&self, hash: &str) -> Result<Option<String>> {
        let mut rows = self
            .query(
                "SELECT id FROM laws WHERE content_hash = ?1 ORDER BY id LIMIT 1",
                vec![Value::Text(hash.to_string())],
            )
            .await?;
        match rows.next().await.map_err(classify)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(classify)?)),
            None => Ok(None),
        }
    }

    /// Laws matching `filter`, ordered by id.
    pub async fn query_laws(&self, filter: &LawFilter) -> Result<Vec<LawRecord>> {
        let (where_sql, mut values) = filter_clause(filter);
        let mut sql = format!("SELECT {LAW_COLUMNS} FROM laws{where_sql} ORDER BY id");
        if let Some(limit) = filter.limit {
            values.push(Value::Integer(i64::from(limit)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }
        self.collect_laws(&sql, values).await
    }

    /// Write every law matching `filter` to `path`. Returns the row count.
    #[instrument(skip_all, fields(path = %path.display(), format = ?format))]
    pub async fn export(&self, filter: &LawFilter, format: ExportFormat, path: &Path) -> Result<usize> {
        let laws = self.query_laws(filter).await?;
        let rows = laws.len();
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || export::write_dataset(&target, format, &laws))
            .await
            .map_err(|e| LeizillaError::Export(format!("export task failed: {e}")))??;
        tracing::info!(rows, "dataset exported");
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Work queues
    // -----------------------------------------------------------------------

    /// Discovered laws with a PDF URL that have not been downloaded yet.
    pub async fn pending_downloads(&self, origin: Option<&str>, limit: u32) -> Result<Vec<LawRecord>> {
        self.pending(
            "stage = 'discovered' AND pdf_url IS NOT NULL AND local_pdf_path IS NULL",
            origin,
            limit,
            Vec::new(),
        )
        .await
    }

    /// Downloaded laws not yet archived.
    pub async fn pending_archival(&self, origin: Option<&str>, limit: u32) -> Result<Vec<LawRecord>> {
        self.pending(
            "local_pdf_path IS NOT NULL AND archive_url IS NULL",
            origin,
            limit,
            Vec::new(),
        )
        .await
    }

    /// Archived laws still waiting for OCR text, below the attempt bound.
    pub async fn pending_text(
        &self,
        origin: Option<&str>,
        limit: u32,
        max_attempts: u32,
    ) -> Result<Vec<LawRecord>> {
        self.pending(
            "archive_item_id IS NOT NULL AND full_text IS NULL AND text_attempts < ?1",
            origin,
            limit,
            vec![Value::Integer(i64::from(max_attempts))],
        )
        .await
    }

    async fn pending(
        &self,
        condition: &str,
        origin: Option<&str>,
        limit: u32,
        mut values: Vec<Value>,
    ) -> Result<Vec<LawRecord>> {
        let mut sql = format!("SELECT {LAW_COLUMNS} FROM laws WHERE {condition}");
        if let Some(origin) = origin {
            values.push(Value::Text(origin.to_string()));
            sql.push_str(&format!(" AND origin = ?{}", values.len()));
        }
        values.push(Value::Integer(i64::from(limit)));
        sql.push_str(&format!(" ORDER BY id LIMIT ?{}", values.len()));
        self.collect_laws(&sql, values).await
    }

    /// Count one more OCR text fetch for `id`.
    pub async fn record_text_attempt(&self, id: &str) -> Result<()> {
        self.execute(
            "UPDATE laws SET text_attempts = text_attempts + 1, updated_at = ?1 WHERE id = ?2",
            vec![
                Value::Text(Utc::now().to_rfc3339()),
                Value::Text(id.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Crawl state
    // -----------------------------------------------------------------------

    /// Load the crawl state for `origin`, if any run has been recorded.
    pub async fn get_crawl_state(&self, origin: &str) -> Result<Option<CrawlState>> {
        let mut rows = self
            .query(
                "SELECT origin, resume_marker, status, last_successful_run_at,
                        last_items_discovered, last_error, updated_at
                 FROM crawl_state WHERE origin = ?1",
                vec![Value::Text(origin.to_string())],
            )
            .await?;
        match rows.next().await.map_err(classify)? {
            Some(row) => Ok(Some(row_to_crawl_state(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_crawl_states(&self) -> Result<Vec<CrawlState>> {
        let mut rows = self
            .query(
                "SELECT origin, resume_marker, status, last_successful_run_at,
                        last_items_discovered, last_error, updated_at
                 FROM crawl_state ORDER BY origin",
                Vec::new(),
            )
            .await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(classify)? {
            results.push(row_to_crawl_state(&row)?);
        }
        Ok(results)
    }

    /// Persist the crawl state for `state.origin` (upserts).
    pub async fn save_crawl_state(&self, state: &CrawlState) -> Result<()> {
        self.execute(
            "INSERT INTO crawl_state (origin, resume_marker, status, last_successful_run_at,
                                      last_items_discovered, last_error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(origin) DO UPDATE SET
               resume_marker = excluded.resume_marker,
               status = excluded.status,
               last_successful_run_at = excluded.last_successful_run_at,
               last_items_discovered = excluded.last_items_discovered,
               last_error = excluded.last_error,
               updated_at = excluded.updated_at",
            vec![
                Value::Text(state.origin.clone()),
                opt_text(state.resume_marker.clone()),
                Value::Text(state.status.clone()),
                opt_text(state.last_successful_run_at.map(|t| t.to_rfc3339())),
                Value::Integer(state.last_items_discovered as i64),
                opt_text(state.last_error.clone()),
                Value::Text(Utc::now().to_rfc3339()),
            ],
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    /// Aggregate counts for the `stats` command.
    pub async fn stats(&self) -> Result<StorageStats> {
        let total = self.count("SELECT COUNT(*) FROM laws", Vec::new()).await?;
        let with_text = self
            .count("SELECT COUNT(*) FROM laws WHERE full_text IS NOT NULL", Vec::new())
            .await?;

        let by_origin = self
            .grouped("SELECT origin, COUNT(*) FROM laws GROUP BY origin ORDER BY origin")
            .await?;
        let by_stage = self
            .grouped("SELECT stage, COUNT(*) FROM laws GROUP BY stage ORDER BY stage")
            .await?;
        let by_status = self
            .grouped("SELECT status, COUNT(*) FROM laws GROUP BY status ORDER BY status")
            .await?;

        let mut by_year = Vec::new();
        let mut rows = self
            .query(
                "SELECT year, COUNT(*) FROM laws WHERE year IS NOT NULL
                 GROUP BY year ORDER BY year DESC LIMIT 10",
                Vec::new(),
            )
            .await?;
        while let Some(row) = rows.next().await.map_err(classify)? {
            let year: i64 = row.get(0).map_err(classify)?;
            let count: i64 = row.get(1).map_err(classify)?;
            by_year.push((year as i32, count as u64));
        }

        Ok(StorageStats {
            total,
            by_origin,
            by_year,
            by_stage,
            by_status,
            with_text,
            crawl_states: self.list_crawl_states().await?,
        })
    }

    async fn grouped(&self, sql: &str) -> Result<Vec<(String, u64)>> {
        let mut rows = self.query(sql, Vec::new()).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(classify)? {
            let key: String = row.get(0).map_err(classify)?;
            let count: i64 = row.get(1).map_err(classify)?;
            results.push((key, count as u64));
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

fn busy_retry(config: &StorageConfig) -> RetryConfig {
    RetryConfig::with_delays(
        config.busy_retries,
        config.busy_backoff_ms,
        config.busy_backoff_ms.saturating_mul(16),
    )
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CONSTRAINT: i32 = 19;

/// Primary result code of a local SQLite failure (extended codes keep it
/// in the low byte).
fn sqlite_code(e: &libsql::Error) -> Option<i32> {
    match e {
        libsql::Error::SqliteFailure(code, _) => Some(code & 0xff),
        _ => None,
    }
}

/// Map a libSQL error onto the storage taxonomy.
fn classify(e: libsql::Error) -> LeizillaError {
    let code = sqlite_code(&e);
    let message = e.to_string();
    let lower = message.to_ascii_lowercase();
    if code == Some(SQLITE_CONSTRAINT) || lower.contains("unique constraint failed") {
        LeizillaError::StorageConstraint(message)
    } else if matches!(code, Some(SQLITE_BUSY | SQLITE_LOCKED))
        || lower.contains("database is locked")
        || lower.contains("database table is locked")
    {
        LeizillaError::StorageBusy(message)
    } else {
        LeizillaError::Storage(message)
    }
}

/// Busy errors that survive the retry budget surface as plain storage errors.
fn exhausted(e: LeizillaError) -> LeizillaError {
    match e {
        LeizillaError::StorageBusy(message) => {
            LeizillaError::Storage(format!("database still busy after retries: {message}"))
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn opt_text(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

fn law_values(law: &LawRecord) -> Result<Vec<Value>> {
    let metadata = law
        .collection_metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| LeizillaError::validation(format!("collection metadata for {}: {e}", law.id)))?;

    let normalized = law
        .normalized_text
        .clone()
        .or_else(|| law.full_text.as_deref().map(normalize_text));

    Ok(vec![
        Value::Text(law.id.clone()),
        Value::Text(law.title.clone()),
        Value::Text(law.origin.clone()),
        opt_text(law.law_type.clone()),
        opt_text(law.number.clone()),
        law.year.map(|y| Value::Integer(i64::from(y))).unwrap_or(Value::Null),
        opt_text(law.publication_date.map(|d| d.format("%Y-%m-%d").to_string())),
        opt_text(law.original_url.clone()),
        opt_text(law.pdf_url.clone()),
        opt_text(law.archive_url.clone()),
        opt_text(law.archive_item_id.clone()),
        opt_text(law.local_pdf_path.clone()),
        opt_text(metadata),
        opt_text(law.full_text.clone()),
        opt_text(normalized),
        opt_text(law.content_hash.clone()),
        Value::Text(law.status.as_str().to_string()),
        Value::Text(law.stage.as_str().to_string()),
        Value::Text(law.created_at.to_rfc3339()),
        Value::Text(Utc::now().to_rfc3339()),
    ])
}

/// Build the `WHERE` clause and positional values for a [`LawFilter`].
fn filter_clause(filter: &LawFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(origin) = &filter.origin {
        values.push(Value::Text(origin.clone()));
        clauses.push(format!("origin = ?{}", values.len()));
    }
    if let Some(year) = filter.year {
        values.push(Value::Integer(i64::from(year)));
        clauses.push(format!("year = ?{}", values.len()));
    }
    if let Some(from) = filter.date_from {
        values.push(Value::Text(from.format("%Y-%m-%d").to_string()));
        clauses.push(format!("publication_date >= ?{}", values.len()));
    }
    if let Some(to) = filter.date_to {
        values.push(Value::Text(to.format("%Y-%m-%d").to_string()));
        clauses.push(format!("publication_date <= ?{}", values.len()));
    }
    if let Some(text) = filter.text.as_deref().map(normalize_text).filter(|t| !t.is_empty()) {
        let escaped = text
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        values.push(Value::Text(format!("%{escaped}%")));
        clauses.push(format!("normalized_text LIKE ?{} ESCAPE '\\'", values.len()));
    }
    if let Some(stage) = filter.stage {
        values.push(Value::Text(stage.as_str().to_string()));
        clauses.push(format!("stage = ?{}", values.len()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeizillaError::Storage(format!("invalid timestamp '{s}': {e}")))
}

/// Convert a database row (selected with [`LAW_COLUMNS`]) to a [`LawRecord`].
fn row_to_law(row: &libsql::Row) -> Result<LawRecord> {
    let text = |i: i32| row.get::<String>(i).ok();

    let publication_date = match text(6) {
        Some(s) => Some(
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| LeizillaError::Storage(format!("invalid date '{s}': {e}")))?,
        ),
        None => None,
    };
    let collection_metadata = match text(12) {
        Some(s) => Some(
            serde_json::from_str(&s)
                .map_err(|e| LeizillaError::Storage(format!("invalid metadata json: {e}")))?,
        ),
        None => None,
    };
    let status: LawStatus = row.get::<String>(16).map_err(classify)?.parse()?;
    let stage: ProcessingStage = row.get::<String>(17).map_err(classify)?.parse()?;

    Ok(LawRecord {
        id: row.get::<String>(0).map_err(classify)?,
        title: row.get::<String>(1).map_err(classify)?,
        origin: row.get::<String>(2).map_err(classify)?,
        law_type: text(3),
        number: text(4),
        year: row.get::<i64>(5).ok().map(|y| y as i32),
        publication_date,
        original_url: text(7),
        pdf_url: text(8),
        archive_url: text(9),
        archive_item_id: text(10),
        local_pdf_path: text(11),
        collection_metadata,
        full_text: text(13),
        normalized_text: text(14),
        content_hash: text(15),
        status,
        stage,
        text_attempts: row.get::<i64>(18).unwrap_or(0) as u32,
        created_at: parse_timestamp(&row.get::<String>(19).map_err(classify)?)?,
        updated_at: parse_timestamp(&row.get::<String>(20).map_err(classify)?)?,
    })
}

fn row_to_crawl_state(row: &libsql::Row) -> Result<CrawlState> {
    let last_successful_run_at = match row.get::<String>(3).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };
    Ok(CrawlState {
        origin: row.get::<String>(0).map_err(classify)?,
        resume_marker: row.get::<String>(1).ok(),
        status: row.get::<String>(2).map_err(classify)?,
        last_successful_run_at,
        last_items_discovered: row.get::<i64>(4).unwrap_or(0) as u64,
        last_error: row.get::<String>(5).ok(),
        updated_at: parse_timestamp(&row.get::<String>(6).map_err(classify)?)?,
    })
}
