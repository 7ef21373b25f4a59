//! SQLite Item Catalog
//!
//! Items are stored whole as JSON with a few denormalized columns. Separate
//! writer and reader connections share one WAL database.

use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{CatalogError, ItemCache, ItemCatalog};
use crate::models::MusicItem;

type Result<T> = std::result::Result<T, CatalogError>;

/// File name inside the data directory
pub const CATALOG_FILE: &str = "catalog.db";

/// Persistent item catalog
pub struct SqliteCatalog {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteCatalog {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (creating if needed) the catalog at `db_path`, or in the platform
    /// data directory when `None`
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("com", "music-rag", "music-rag").ok_or_else(|| {
                    CatalogError::Init("Could not determine project directories".to_string())
                })?;
                proj_dirs.data_dir().join(CATALOG_FILE)
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        tracing::debug!(path = %path.display(), "Opened item catalog");

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path,
        })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| CatalogError::LockPoisoned("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| CatalogError::LockPoisoned("Reader lock poisoned".into()))
    }

    fn upsert_row(conn: &Connection, item: &MusicItem) -> Result<()> {
        let json = serde_json::to_string(item)?;
        conn.execute(
            "INSERT INTO music_items (id, title, artist, genre, item_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                genre = excluded.genre,
                item_json = excluded.item_json,
                updated_at = excluded.updated_at",
            params![
                item.id,
                item.title,
                item.artist,
                item.metadata.genre,
                json,
                item.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Items whose genre equals `genre`, ordered by id
    pub fn items_by_genre(&self, genre: &str) -> Result<Vec<MusicItem>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare("SELECT item_json FROM music_items WHERE genre = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![genre], |row| row.get::<_, String>(0))?;
        rows.map(|json| -> Result<MusicItem> { Ok(serde_json::from_str(&json?)?) })
            .collect()
    }
}

impl ItemCache for SqliteCatalog {
    fn get_item(&self, id: &str) -> Result<Option<MusicItem>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT item_json FROM music_items WHERE id = ?1")?;

        let json: Option<String> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(CatalogError::from))
            .transpose()
    }
}

impl ItemCatalog for SqliteCatalog {
    fn put_item(&self, item: &MusicItem) -> Result<()> {
        let writer = self.writer()?;
        Self::upsert_row(&writer, item)
    }

    /// All-or-nothing within one transaction
    fn put_items(&self, items: &[MusicItem]) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        for item in items {
            Self::upsert_row(&tx, item)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_item(&self, id: &str) -> Result<bool> {
        let writer = self.writer()?;
        let deleted = writer.execute("DELETE FROM music_items WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn count(&self) -> Result<usize> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM music_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_items(&self) -> Result<Vec<MusicItem>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT item_json FROM music_items ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|json| -> Result<MusicItem> { Ok(serde_json::from_str(&json?)?) })
            .collect()
    }
}
