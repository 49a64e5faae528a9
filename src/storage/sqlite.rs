//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.
//! The connection is guarded by a mutex so one backend can be shared by all
//! workers.

use crate::plugins::ExtractedArticle;
use crate::processing::{article_fingerprint, ArticleAnalysis};
use crate::storage::article_id;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ArticleStore, SearchIndex, SourceStore, StorageError, StorageResult};
use crate::storage::{ArticleStatus, IndexDocument, Source, SourceKind, StoredArticle};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SOURCE_COLUMNS: &str =
    "id, name, url, kind, plugin, active, crawl_interval_secs, last_crawl_at";

const ARTICLE_COLUMNS: &str = "id, url, title, content, author, publish_time, category, \
     source_id, source_name, extracted_at, status, analysis, created_at, updated_at, fingerprint";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
    let kind: String = row.get(3)?;
    let interval: i64 = row.get(6)?;
    let last_crawl_at = match row.get::<_, Option<String>>(7)? {
        Some(value) => Some(parse_time(7, &value)?),
        None => None,
    };

    Ok(Source {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        kind: SourceKind::from_db_string(&kind).unwrap_or(SourceKind::Website),
        plugin: row.get(4)?,
        active: row.get(5)?,
        crawl_interval_secs: interval.max(0) as u64,
        last_crawl_at,
    })
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<StoredArticle> {
    let extracted_at: String = row.get(9)?;
    let status: String = row.get(10)?;
    let analysis = match row.get::<_, Option<String>>(11)? {
        Some(json) => Some(
            serde_json::from_str::<ArticleAnalysis>(&json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e))
            })?,
        ),
        None => None,
    };
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;
    let article = ExtractedArticle {
        url: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        author: row.get(4)?,
        publish_time: row.get(5)?,
        category: row.get(6)?,
        source_id: row.get(7)?,
        source_name: row.get(8)?,
        extracted_at: parse_time(9, &extracted_at)?,
    };
    // rows written before fingerprints were stored on upsert
    let fingerprint = row
        .get::<_, Option<String>>(14)?
        .unwrap_or_else(|| article_fingerprint(&article));

    Ok(StoredArticle {
        id: row.get(0)?,
        article,
        status: ArticleStatus::from_db_string(&status).unwrap_or(ArticleStatus::Pending),
        fingerprint,
        analysis,
        created_at: parse_time(12, &created_at)?,
        updated_at: parse_time(13, &updated_at)?,
    })
}

impl SourceStore for SqliteStorage {
    fn upsert_source(&self, source: &Source) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sources (id, name, url, kind, plugin, active, crawl_interval_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                kind = excluded.kind,
                plugin = excluded.plugin,
                active = excluded.active,
                crawl_interval_secs = excluded.crawl_interval_secs",
            params![
                source.id,
                source.name,
                source.url,
                source.kind.to_db_string(),
                source.plugin,
                source.active,
                source.crawl_interval_secs as i64,
            ],
        )?;
        Ok(())
    }

    fn get_source(&self, id: &str) -> StorageResult<Option<Source>> {
        let conn = self.conn()?;
        let source = conn
            .query_row(
                &format!("SELECT {} FROM sources WHERE id = ?1", SOURCE_COLUMNS),
                params![id],
                row_to_source,
            )
            .optional()?;
        Ok(source)
    }

    fn list_sources(&self) -> StorageResult<Vec<Source>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sources ORDER BY id",
            SOURCE_COLUMNS
        ))?;
        let sources = stmt
            .query_map([], row_to_source)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    fn set_active(&self, id: &str, active: bool) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sources SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if changed == 0 {
            return Err(StorageError::SourceNotFound(id.to_string()));
        }
        Ok(())
    }

    fn record_crawl(&self, id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sources SET last_crawl_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StorageError::SourceNotFound(id.to_string()));
        }
        Ok(())
    }
}

impl ArticleStore for SqliteStorage {
    fn upsert_article(&self, article: &ExtractedArticle) -> StorageResult<String> {
        let id = article_id(&article.url);
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO articles (id, url, title, content, author, publish_time, category,
                source_id, source_name, extracted_at, status, fingerprint, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
             ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                content = excluded.content,
                author = excluded.author,
                publish_time = excluded.publish_time,
                category = excluded.category,
                source_id = excluded.source_id,
                source_name = excluded.source_name,
                extracted_at = excluded.extracted_at,
                fingerprint = excluded.fingerprint,
                updated_at = excluded.updated_at",
            params![
                id,
                article.url,
                article.title,
                article.content,
                article.author,
                article.publish_time,
                article.category,
                article.source_id,
                article.source_name,
                article.extracted_at.to_rfc3339(),
                ArticleStatus::Pending.to_db_string(),
                article_fingerprint(article),
                now,
            ],
        )?;

        Ok(id)
    }

    fn get_article(&self, id: &str) -> StorageResult<Option<StoredArticle>> {
        let conn = self.conn()?;
        let article = conn
            .query_row(
                &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS),
                params![id],
                row_to_article,
            )
            .optional()?;
        Ok(article)
    }

    fn list_by_status(
        &self,
        status: ArticleStatus,
        limit: usize,
    ) -> StorageResult<Vec<StoredArticle>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM articles WHERE status = ?1 ORDER BY created_at, id LIMIT ?2",
            ARTICLE_COLUMNS
        ))?;
        let articles = stmt
            .query_map(
                params![status.to_db_string(), limit.min(i64::MAX as usize) as i64],
                row_to_article,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(articles)
    }

    fn save_analysis(
        &self,
        id: &str,
        analysis: &ArticleAnalysis,
        status: ArticleStatus,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(analysis)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE articles SET analysis = ?1, fingerprint = ?2, status = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                json,
                analysis.fingerprint,
                status.to_db_string(),
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::ArticleNotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_status(&self, id: &str, status: ArticleStatus) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE articles SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StorageError::ArticleNotFound(id.to_string()));
        }
        Ok(())
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM articles WHERE fingerprint = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![fingerprint], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<ArticleStatus, u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM articles GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = ArticleStatus::from_db_string(&status) {
                counts.insert(status, count.max(0) as u64);
            }
        }
        Ok(counts)
    }
}

impl SearchIndex for SqliteStorage {
    fn index_document(&self, document: &IndexDocument) -> StorageResult<()> {
        let json = serde_json::to_string(document)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO index_documents (id, source_id, category, document, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                document.id,
                document.source_id,
                document.category,
                json,
                document.indexed_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn get_document(&self, id: &str) -> StorageResult<Option<IndexDocument>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT document FROM index_documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn remove_document(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM index_documents WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn document_ids(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM index_documents ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn clear_index(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM index_documents", [])?;
        Ok(removed as u64)
    }

    fn document_count(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM index_documents", [], |row| {
            row.get(0)
        })?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::analyze;
    use tempfile::TempDir;

    fn article(url: &str, title: &str) -> ExtractedArticle {
        ExtractedArticle {
            title: title.to_string(),
            content: "经济 growth reported today".to_string(),
            url: url.to_string(),
            author: Some("Reporter".to_string()),
            publish_time: Some("2024-05-01 10:00".to_string()),
            category: None,
            source_id: "s1".to_string(),
            source_name: "Source".to_string(),
            extracted_at: Utc::now(),
        }
    }

    fn source() -> Source {
        Source {
            id: "s1".to_string(),
            name: "Source".to_string(),
            url: "https://example.com/news".to_string(),
            kind: SourceKind::Rss,
            plugin: "rss".to_string(),
            active: true,
            crawl_interval_secs: 600,
            last_crawl_at: None,
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_source_roundtrip() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_source(&source()).unwrap();

        let stored = storage.get_source("s1").unwrap().unwrap();
        assert_eq!(stored, source());
        assert!(storage.get_source("missing").unwrap().is_none());
    }

    #[test]
    fn test_record_crawl_survives_reregistration() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_source(&source()).unwrap();
        storage.record_crawl("s1", Utc::now()).unwrap();
        storage.upsert_source(&source()).unwrap();

        let stored = storage.get_source("s1").unwrap().unwrap();
        assert!(stored.last_crawl_at.is_some());
    }

    #[test]
    fn test_set_active() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_source(&source()).unwrap();
        storage.set_active("s1", false).unwrap();
        assert!(!storage.get_source("s1").unwrap().unwrap().active);
        assert!(matches!(
            storage.set_active("missing", true),
            Err(StorageError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_article_roundtrip_with_analysis() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let a = article("https://example.com/a1", "Report A");
        let id = storage.upsert_article(&a).unwrap();

        let analysis = analyze(&a);
        storage
            .save_analysis(&id, &analysis, ArticleStatus::Processed)
            .unwrap();

        let stored = storage.get_article(&id).unwrap().unwrap();
        assert_eq!(stored.article.title, "Report A");
        assert_eq!(stored.article.publish_time.as_deref(), Some("2024-05-01 10:00"));
        assert_eq!(stored.status, ArticleStatus::Processed);
        assert_eq!(stored.analysis, Some(analysis.clone()));
        assert_eq!(
            storage.find_by_fingerprint(&analysis.fingerprint).unwrap(),
            vec![id]
        );
    }

    #[test]
    fn test_pending_articles_share_fingerprint() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let a = article("https://example.com/a1", "Same");
        let id_a = storage.upsert_article(&a).unwrap();
        let id_b = storage
            .upsert_article(&article("https://example.com/a2", "Same"))
            .unwrap();
        storage
            .upsert_article(&article("https://example.com/a3", "Other"))
            .unwrap();

        let stored = storage.get_article(&id_a).unwrap().unwrap();
        assert_eq!(stored.fingerprint, analyze(&a).fingerprint);

        let mut expected = vec![id_a, id_b];
        expected.sort();
        assert_eq!(storage.find_by_fingerprint(&stored.fingerprint).unwrap(), expected);
    }

    #[test]
    fn test_upsert_article_keeps_status() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let a = article("https://example.com/a1", "Report A");
        let id = storage.upsert_article(&a).unwrap();
        storage.set_status(&id, ArticleStatus::Indexed).unwrap();

        let again = storage
            .upsert_article(&article("https://www.example.com/a1/", "Report A v2"))
            .unwrap();
        assert_eq!(again, id);

        let stored = storage.get_article(&id).unwrap().unwrap();
        assert_eq!(stored.status, ArticleStatus::Indexed);
        assert_eq!(stored.article.title, "Report A v2");
    }

    #[test]
    fn test_list_and_count_by_status() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        for i in 0..4 {
            storage
                .upsert_article(&article(&format!("https://example.com/a{}", i), "T"))
                .unwrap();
        }
        let pending = storage.list_by_status(ArticleStatus::Pending, 2).unwrap();
        assert_eq!(pending.len(), 2);

        storage
            .set_status(&pending[0].id, ArticleStatus::Duplicate)
            .unwrap();
        let counts = storage.count_by_status().unwrap();
        assert_eq!(counts[&ArticleStatus::Pending], 3);
        assert_eq!(counts[&ArticleStatus::Duplicate], 1);
    }

    #[test]
    fn test_missing_article_updates_fail() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.set_status("nope", ArticleStatus::Indexed),
            Err(StorageError::ArticleNotFound(_))
        ));
    }

    #[test]
    fn test_index_documents() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let a = article("https://example.com/a1", "Report A");
        let id = storage.upsert_article(&a).unwrap();
        storage
            .save_analysis(&id, &analyze(&a), ArticleStatus::Processed)
            .unwrap();
        let stored = storage.get_article(&id).unwrap().unwrap();
        let doc = IndexDocument::from_article(&stored, Utc::now()).unwrap();

        storage.index_document(&doc).unwrap();
        storage.index_document(&doc).unwrap();
        assert_eq!(storage.document_count().unwrap(), 1);
        assert_eq!(storage.get_document(&id).unwrap(), Some(doc.clone()));
        assert_eq!(storage.document_ids().unwrap(), vec![id.clone()]);
        assert!(storage.remove_document(&id).unwrap());
        assert!(!storage.remove_document(&id).unwrap());

        storage.index_document(&doc).unwrap();
        assert_eq!(storage.clear_index().unwrap(), 1);
        assert!(storage.get_document(&id).unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("news.db");

        {
            let storage = SqliteStorage::new(&path).unwrap();
            storage.upsert_source(&source()).unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.list_sources().unwrap().len(), 1);
    }
}
