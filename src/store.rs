//! Persistence for named mappings and the processing history.
//!
//! The pipeline talks to storage only through [`MappingStore`] and
//! [`HistoryStore`]. [`SqliteStore`] keeps both in one SQLite file;
//! [`MemoryStore`] keeps them in memory.

use crate::canonical::slugify;
use crate::mapping::{is_protected, Mapping, PROTECTED_SLUGS};
use crate::models::HistoryRecord;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("mapping '{0}' already exists")]
    Conflict(String),
    #[error("mapping '{0}' is built in and cannot be deleted")]
    Protected(String),
    #[error("mapping '{0}' not found")]
    NotFound(String),
}

/// Named mapping storage. Every slug argument is passed through [`slugify`].
pub trait MappingStore {
    /// Slugs that have a stored mapping.
    fn stored_slugs(&self) -> Result<Vec<String>, StoreError>;
    /// Whether a mapping is stored under `slug`.
    fn contains(&self, slug: &str) -> Result<bool, StoreError>;
    /// Stored mapping, or an empty one.
    fn load_slug(&self, slug: &str) -> Result<Mapping, StoreError>;
    /// Replace the mapping stored under `slug`.
    fn save_slug(&mut self, slug: &str, mapping: &Mapping) -> Result<(), StoreError>;
    /// Remove a stored mapping; `false` if there was none.
    fn remove_slug(&mut self, slug: &str) -> Result<bool, StoreError>;

    /// All known slugs, built-in ones included, sorted.
    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut slugs = self.stored_slugs()?;
        slugs.extend(PROTECTED_SLUGS.iter().map(|s| s.to_string()));
        slugs.sort();
        slugs.dedup();
        Ok(slugs)
    }

    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let slug = slugify(name);
        Ok(is_protected(&slug) || self.contains(&slug)?)
    }

    fn load(&self, name: &str) -> Result<Mapping, StoreError> {
        self.load_slug(&slugify(name))
    }

    fn save(&mut self, name: &str, mapping: &Mapping) -> Result<(), StoreError> {
        let slug = slugify(name);
        debug!(slug = %slug, entries = mapping.len(), "saving mapping");
        self.save_slug(&slug, mapping)
    }

    /// Create an empty mapping; fails if the slug is taken.
    fn create(&mut self, name: &str) -> Result<String, StoreError> {
        let slug = slugify(name);
        if self.exists(&slug)? {
            return Err(StoreError::Conflict(slug));
        }
        self.save_slug(&slug, &Mapping::new())?;
        Ok(slug)
    }

    fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        let slug = slugify(name);
        if is_protected(&slug) {
            return Err(StoreError::Protected(slug));
        }
        if !self.remove_slug(&slug)? {
            return Err(StoreError::NotFound(slug));
        }
        Ok(())
    }

    /// Copy `source` to a new slug; fails without changes if the destination exists.
    fn clone_mapping(&mut self, source: &str, destination: &str) -> Result<String, StoreError> {
        let src = slugify(source);
        let dst = slugify(destination);
        if self.exists(&dst)? {
            return Err(StoreError::Conflict(dst));
        }
        if !self.exists(&src)? {
            return Err(StoreError::NotFound(src));
        }
        let mapping = self.load_slug(&src)?;
        self.save_slug(&dst, &mapping)?;
        Ok(dst)
    }
}

/// Append-only log of completed unifications.
pub trait HistoryStore {
    fn append(&mut self, record: &HistoryRecord) -> Result<(), StoreError>;
    /// All records, newest first.
    fn read_all(&self) -> Result<Vec<HistoryRecord>, StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    mappings: BTreeMap<String, Mapping>,
    history: Vec<HistoryRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for MemoryStore {
    fn stored_slugs(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.mappings.keys().cloned().collect())
    }

    fn contains(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.mappings.contains_key(slug))
    }

    fn load_slug(&self, slug: &str) -> Result<Mapping, StoreError> {
        Ok(self.mappings.get(slug).cloned().unwrap_or_default())
    }

    fn save_slug(&mut self, slug: &str, mapping: &Mapping) -> Result<(), StoreError> {
        self.mappings.insert(slug.to_string(), mapping.clone());
        Ok(())
    }

    fn remove_slug(&mut self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.mappings.remove(slug).is_some())
    }
}

impl HistoryStore for MemoryStore {
    fn append(&mut self, record: &HistoryRecord) -> Result<(), StoreError> {
        self.history.push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        Ok(self.history.iter().rev().cloned().collect())
    }
}

// ============================================================================
// SQLite store
// ============================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS mappings (
    slug TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS mapping_entries (
    slug TEXT NOT NULL REFERENCES mappings(slug) ON DELETE CASCADE,
    source TEXT NOT NULL,
    destination TEXT NOT NULL,
    PRIMARY KEY (slug, source)
);
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mapping_slug TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    output_name TEXT NOT NULL
);
";

/// Mappings and history in a single SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl MappingStore for SqliteStore {
    fn stored_slugs(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT slug FROM mappings ORDER BY slug")?;
        let slugs = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(slugs)
    }

    fn contains(&self, slug: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM mappings WHERE slug = ?", [slug], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn load_slug(&self, slug: &str) -> Result<Mapping, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT source, destination FROM mapping_entries WHERE slug = ?")?;
        let mut rows = stmt.query([slug])?;

        let mut mapping = Mapping::new();
        while let Some(row) = rows.next()? {
            let source: String = row.get(0)?;
            let destination: String = row.get(1)?;
            mapping.insert(source, destination);
        }
        Ok(mapping)
    }

    fn save_slug(&mut self, slug: &str, mapping: &Mapping) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("INSERT OR IGNORE INTO mappings (slug) VALUES (?)", [slug])?;
        tx.execute("DELETE FROM mapping_entries WHERE slug = ?", [slug])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO mapping_entries (slug, source, destination) VALUES (?, ?, ?)",
            )?;
            for (source, destination) in mapping {
                stmt.execute(params![slug, source, destination])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn remove_slug(&mut self, slug: &str) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM mapping_entries WHERE slug = ?", [slug])?;
        let removed = tx.execute("DELETE FROM mappings WHERE slug = ?", [slug])?;
        tx.commit()?;
        Ok(removed > 0)
    }
}

impl HistoryStore for SqliteStore {
    fn append(&mut self, record: &HistoryRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO history (mapping_slug, timestamp, output_name) VALUES (?, ?, ?)",
            params![record.mapping_slug, record.timestamp, record.output_name],
        )?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT mapping_slug, timestamp, output_name FROM history ORDER BY id DESC",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(HistoryRecord {
                    mapping_slug: row.get(0)?,
                    timestamp: row.get(1)?,
                    output_name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Mapping {
        let mut m = Mapping::new();
        m.insert("Fecha Publicación".to_string(), "fecha".to_string());
        m.insert("url_noticia".to_string(), "Url_Noticia".to_string());
        m
    }

    fn exercise_mappings<S: MappingStore>(store: &mut S) {
        assert_eq!(store.list().unwrap(), vec!["lp", "simbiu"]);
        assert!(store.load("lp").unwrap().is_empty());
        assert!(store.load("no existe").unwrap().is_empty());

        store.save("LP", &sample()).unwrap();
        assert_eq!(store.load("lp").unwrap(), sample());

        // Saving replaces wholesale.
        let mut smaller = Mapping::new();
        smaller.insert("a".to_string(), "b".to_string());
        store.save("lp", &smaller).unwrap();
        assert_eq!(store.load("lp").unwrap(), smaller);

        assert_eq!(store.create("Prensa Local").unwrap(), "prensa_local");
        assert!(matches!(store.create("prensa_local"), Err(StoreError::Conflict(_))));
        assert!(matches!(store.create("simbiu"), Err(StoreError::Conflict(_))));
        assert_eq!(store.list().unwrap(), vec!["lp", "prensa_local", "simbiu"]);

        assert!(matches!(store.delete("lp"), Err(StoreError::Protected(_))));
        assert!(matches!(store.delete("simbiu"), Err(StoreError::Protected(_))));
        store.delete("prensa_local").unwrap();
        assert!(matches!(store.delete("prensa_local"), Err(StoreError::NotFound(_))));
        assert_eq!(store.list().unwrap(), vec!["lp", "simbiu"]);
    }

    fn exercise_clone<S: MappingStore>(store: &mut S) {
        store.save("lp", &sample()).unwrap();
        let mut simbiu = Mapping::new();
        simbiu.insert("x".to_string(), "y".to_string());
        store.save("simbiu", &simbiu).unwrap();

        assert!(matches!(
            store.clone_mapping("lp", "simbiu"),
            Err(StoreError::Conflict(ref s)) if s == "simbiu"
        ));
        assert_eq!(store.load("lp").unwrap(), sample());
        assert_eq!(store.load("simbiu").unwrap(), simbiu);

        assert_eq!(store.clone_mapping("lp", "Radio").unwrap(), "radio");
        assert_eq!(store.load("radio").unwrap(), sample());

        assert!(matches!(
            store.clone_mapping("fantasma", "otra"),
            Err(StoreError::NotFound(_))
        ));
    }

    fn exercise_history<S: HistoryStore>(store: &mut S) {
        assert!(store.read_all().unwrap().is_empty());
        for (i, slug) in ["lp", "simbiu", "lp"].iter().enumerate() {
            store
                .append(&HistoryRecord {
                    mapping_slug: slug.to_string(),
                    timestamp: format!("2025-06-0{}T10:00:00Z", i + 1),
                    output_name: format!("unificado_{slug}.xlsx"),
                })
                .unwrap();
        }
        let records = store.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].timestamp, "2025-06-03T10:00:00Z");
        assert_eq!(records[2].mapping_slug, "lp");
        assert_eq!(records[1].output_name, "unificado_simbiu.xlsx");
    }

    #[test]
    fn test_memory_store() {
        exercise_mappings(&mut MemoryStore::new());
        exercise_clone(&mut MemoryStore::new());
        exercise_history(&mut MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        exercise_mappings(&mut SqliteStore::open_in_memory().unwrap());
        exercise_clone(&mut SqliteStore::open_in_memory().unwrap());
        exercise_history(&mut SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.save("lp", &sample()).unwrap();
            store
                .append(&HistoryRecord {
                    mapping_slug: "lp".to_string(),
                    timestamp: "2025-06-01T00:00:00Z".to_string(),
                    output_name: "unificado_lp.xlsx".to_string(),
                })
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load("lp").unwrap(), sample());
        assert_eq!(store.read_all().unwrap().len(), 1);
    }
}
