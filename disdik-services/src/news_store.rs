//! News Storage Service
//!
//! SQLite-backed store for finalized articles, keyed by URL. Re-scraping an
//! article merges field by field: a fresh title always wins, other fields
//! only overwrite when the new value is present.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection, Row};
use tokio::sync::OnceCell;
use tracing::info;

use disdik_core::{Article, NewsQuery, StoredArticle, UpsertOutcome};

const UPSERT_SQL: &str = r#"
    INSERT INTO news (url, title, summary, source, published_at, image_url)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(url) DO UPDATE SET
        title = excluded.title,
        summary = COALESCE(excluded.summary, news.summary),
        source = COALESCE(excluded.source, news.source),
        published_at = COALESCE(excluded.published_at, news.published_at),
        image_url = COALESCE(excluded.image_url, news.image_url)
"#;

/// Article store using SQLite
pub struct NewsStore {
    conn: Mutex<Connection>,
}

impl NewsStore {
    /// Open (or create) the database file
    ///
    /// The schema is not touched; call [`NewsStore::ensure_schema`] before use.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Io(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the table and indexes if they don't exist
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                summary TEXT,
                source TEXT,
                published_at TEXT,
                image_url TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_news_published_at
            ON news(published_at DESC);
            "#,
        )?;

        Ok(())
    }

    /// Merge articles by URL in one transaction
    pub fn upsert(&self, articles: &[Article]) -> Result<UpsertOutcome, StoreError> {
        let mut outcome = UpsertOutcome::default();
        if articles.is_empty() {
            return Ok(outcome);
        }

        let mut conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let tx = conn.transaction()?;
        {
            let mut exists = tx.prepare("SELECT 1 FROM news WHERE url = ?1")?;
            let mut upsert = tx.prepare(UPSERT_SQL)?;

            for article in articles {
                let existed = exists.exists(params![article.url])?;
                upsert.execute(params![
                    article.url,
                    article.title,
                    article.summary,
                    article.source,
                    article.published_at.map(format_timestamp),
                    article.image_url,
                ])?;

                if existed {
                    outcome.updated += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit()?;

        info!(
            "Stored {} articles ({} new, {} updated)",
            articles.len(),
            outcome.inserted,
            outcome.updated
        );
        Ok(outcome)
    }

    /// Page through stored articles, newest first.
    ///
    /// Every whitespace-separated word of the search text must appear in the
    /// title or summary (case-insensitive).
    pub fn query(&self, query: &NewsQuery) -> Result<Vec<StoredArticle>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        for word in query
            .search_text
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
        {
            values.push(Value::Text(format!("%{}%", escape_like(&word.to_lowercase()))));
            let n = values.len();
            clauses.push(format!(
                "(lower(title) LIKE ?{n} ESCAPE '\\' OR lower(coalesce(summary, '')) LIKE ?{n} ESCAPE '\\')"
            ));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        values.push(Value::Integer(query.limit as i64));
        values.push(Value::Integer(query.offset as i64));
        let (limit_n, offset_n) = (values.len() - 1, values.len());

        let sql = format!(
            r#"
            SELECT id, url, title, summary, source, image_url, published_at, created_at
            FROM news
            {where_sql}
            ORDER BY published_at DESC NULLS LAST, created_at DESC, id DESC
            LIMIT ?{limit_n} OFFSET ?{offset_n}
            "#
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_article)?;

        let mut articles = Vec::new();
        for row in rows {
            articles.push(row?);
        }
        Ok(articles)
    }

    /// Number of stored articles
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM news", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<StoredArticle> {
    let published_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;

    Ok(StoredArticle {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        source: row.get(4)?,
        image_url: row.get(5)?,
        published_at: published_at.as_deref().and_then(parse_timestamp),
        created_at: parse_timestamp(&created_at).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                format!("invalid created_at: {}", created_at).into(),
            )
        })?,
    })
}

/// Fixed-width UTC timestamps so text order matches time order
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn escape_like(word: &str) -> String {
    word.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Lazily opened, shared [`NewsStore`]
///
/// The database is opened and its schema ensured on the first call to
/// [`StoreHandle::get`]; later calls return the same store.
pub struct StoreHandle {
    path: PathBuf,
    store: OnceCell<Arc<NewsStore>>,
}

impl StoreHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store: OnceCell::new(),
        }
    }

    /// Path from `NEWS_DB_PATH`, defaulting to `data/news.db`
    pub fn from_env() -> Self {
        let path = std::env::var("NEWS_DB_PATH").unwrap_or_else(|_| "data/news.db".to_string());
        Self::new(path)
    }

    /// Wrap an already-open store
    pub fn with_store(store: Arc<NewsStore>) -> Self {
        Self {
            path: PathBuf::new(),
            store: OnceCell::new_with(Some(store)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.store.initialized()
    }

    pub async fn get(&self) -> Result<Arc<NewsStore>, StoreError> {
        let store = self
            .store
            .get_or_try_init(|| async {
                info!("Opening news store at: {}", self.path.display());
                let store = NewsStore::open(&self.path)?;
                store.ensure_schema()?;
                Ok::<_, StoreError>(Arc::new(store))
            })
            .await?;
        Ok(Arc::clone(store))
    }
}

/// Errors that can occur in news storage
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to acquire lock")]
    LockError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(url: &str, title: &str, day: Option<u32>) -> Article {
        Article {
            url: url.to_string(),
            title: title.to_string(),
            summary: Some(format!("Ringkasan {}", title)),
            source: Some("pub.example".to_string()),
            published_at: day.map(|d| Utc.with_ymd_and_hms(2024, 5, d, 8, 0, 0).unwrap()),
            image_url: None,
        }
    }

    fn store() -> NewsStore {
        let store = NewsStore::new_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let store = store();
        store.ensure_schema().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_upsert_counts_inserted_and_updated() {
        let store = store();

        let first = store
            .upsert(&[
                article("https://pub.example/a", "Disdik Gowa A", Some(1)),
                article("https://pub.example/b", "Disdik Gowa B", Some(2)),
            ])
            .unwrap();
        assert_eq!(first, UpsertOutcome { inserted: 2, updated: 0 });

        let second = store
            .upsert(&[
                article("https://pub.example/b", "Disdik Gowa B (revisi)", Some(2)),
                article("https://pub.example/c", "Disdik Gowa C", None),
            ])
            .unwrap();
        assert_eq!(second, UpsertOutcome { inserted: 1, updated: 1 });
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.upsert(&[]).unwrap(), UpsertOutcome::default());
    }

    #[test]
    fn test_upsert_coalesces_missing_fields() {
        let store = store();

        let mut original = article("https://pub.example/a", "Judul Lama", Some(1));
        original.image_url = Some("https://pub.example/a.jpg".to_string());
        store.upsert(&[original]).unwrap();

        let sparse = Article {
            url: "https://pub.example/a".to_string(),
            title: "Judul Baru".to_string(),
            summary: None,
            source: None,
            published_at: None,
            image_url: None,
        };
        store.upsert(&[sparse]).unwrap();

        let rows = store.query(&NewsQuery::default()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.title, "Judul Baru");
        assert_eq!(row.summary.as_deref(), Some("Ringkasan Judul Lama"));
        assert_eq!(row.source.as_deref(), Some("pub.example"));
        assert_eq!(row.image_url.as_deref(), Some("https://pub.example/a.jpg"));
        assert_eq!(
            row.published_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_query_orders_newest_first_with_nulls_last() {
        let store = store();
        store
            .upsert(&[
                article("https://pub.example/undated", "Disdik Gowa tanpa tanggal", None),
                article("https://pub.example/old", "Disdik Gowa lama", Some(1)),
                article("https://pub.example/new", "Disdik Gowa baru", Some(20)),
            ])
            .unwrap();

        let rows = store.query(&NewsQuery::default()).unwrap();
        let urls: Vec<_> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://pub.example/new",
                "https://pub.example/old",
                "https://pub.example/undated"
            ]
        );

        let page = store
            .query(&NewsQuery {
                search_text: None,
                limit: 1,
                offset: 1,
            })
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].url, "https://pub.example/old");
    }

    #[test]
    fn test_query_filters_by_every_word() {
        let store = store();
        store
            .upsert(&[
                article("https://pub.example/a", "Beasiswa Pendidikan Gowa", Some(1)),
                article("https://pub.example/b", "Lomba Sekolah Gowa", Some(2)),
                article("https://pub.example/c", "Diskon 50% untuk guru", Some(3)),
            ])
            .unwrap();

        let query = |text: &str| NewsQuery::from_params(Some(text.to_string()), None, None).unwrap();

        let rows = store.query(&query("gowa")).unwrap();
        assert_eq!(rows.len(), 2);

        let rows = store.query(&query("BEASISWA gowa")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://pub.example/a");

        let rows = store.query(&query("50%")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://pub.example/c");

        assert!(store.query(&query("korupsi")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_handle_opens_once() {
        let dir = std::env::temp_dir().join(format!("disdik-store-{}", std::process::id()));
        let handle = StoreHandle::new(dir.join("nested").join("news.db"));
        assert!(!handle.is_initialized());

        let first = handle.get().await.unwrap();
        let second = handle.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(handle.is_initialized());
        assert_eq!(first.count().unwrap(), 0);

        drop((first, second));
        let _ = std::fs::remove_dir_all(dir);
    }
}
