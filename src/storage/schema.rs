//! Database schema definitions
//!
//! Timestamps are stored as RFC 3339 text. Article analysis and index
//! documents are stored as JSON next to the columns queries filter on.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Registered content sources
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    kind TEXT NOT NULL,
    plugin TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    crawl_interval_secs INTEGER NOT NULL,
    last_crawl_at TEXT
);

-- Extracted articles, keyed by URL-derived id
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    author TEXT,
    publish_time TEXT,
    category TEXT,
    source_id TEXT NOT NULL,
    source_name TEXT NOT NULL,
    extracted_at TEXT NOT NULL,
    status TEXT NOT NULL,
    analysis TEXT,
    fingerprint TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);
CREATE INDEX IF NOT EXISTS idx_articles_fingerprint ON articles(fingerprint);
CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source_id);

-- Search index documents
CREATE TABLE IF NOT EXISTS index_documents (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    category TEXT NOT NULL,
    document TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_index_documents_category ON index_documents(category);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
