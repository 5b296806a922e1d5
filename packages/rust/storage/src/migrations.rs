//! SQL migration definitions for the Leizilla database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: laws, crawl_state",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per law, keyed by {origin}-{type}-{year}-{number}
CREATE TABLE IF NOT EXISTS laws (
    id                  TEXT PRIMARY KEY,
    title               TEXT NOT NULL,
    origin              TEXT NOT NULL,
    law_type            TEXT,
    number              TEXT,
    year                INTEGER,
    publication_date    TEXT,
    original_url        TEXT,
    pdf_url             TEXT,
    archive_url         TEXT,
    archive_item_id     TEXT,
    local_pdf_path      TEXT,
    collection_metadata TEXT,
    full_text           TEXT,
    normalized_text     TEXT,
    content_hash        TEXT,
    status              TEXT NOT NULL DEFAULT 'active',
    stage               TEXT NOT NULL DEFAULT 'discovered',
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_laws_origin ON laws(origin);
CREATE INDEX IF NOT EXISTS idx_laws_year ON laws(year);
CREATE INDEX IF NOT EXISTS idx_laws_publication_date ON laws(publication_date);
CREATE INDEX IF NOT EXISTS idx_laws_law_type ON laws(law_type);
CREATE INDEX IF NOT EXISTS idx_laws_stage ON laws(stage);
CREATE INDEX IF NOT EXISTS idx_laws_content_hash ON laws(content_hash);

-- Per-origin resume markers
CREATE TABLE IF NOT EXISTS crawl_state (
    origin                 TEXT PRIMARY KEY,
    resume_marker          TEXT,
    status                 TEXT NOT NULL,
    last_successful_run_at TEXT,
    last_items_discovered  INTEGER NOT NULL DEFAULT 0,
    last_error             TEXT,
    updated_at             TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Track OCR text fetch attempts",
            sql: r#"
ALTER TABLE laws ADD COLUMN text_attempts INTEGER NOT NULL DEFAULT 0;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
