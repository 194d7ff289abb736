use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::dataurl;
use crate::error::StoreError;
use crate::models::{Draft, NewDraft};

const SCHEMA_VERSION: i32 = 1;

const DRAFT_COLUMNS: &str = "id, title, description, category_id, municipality_id, address, latitude, longitude, image_name, image_data_url, created_at";

/// Local, durable table of report drafts.
///
/// Every public operation is a single statement, so each one is atomic on its
/// own. Callers on different tasks serialize on the connection mutex.
pub struct DraftStore {
    conn: Mutex<Connection>,
    /// Lock file shared by every handle on the same table. `None` in memory.
    sync_lock_path: Option<PathBuf>,
}

/// Held for the length of a sync pass. Other handles on the same draft
/// table, in this process or another, cannot take it until it is dropped.
/// A crashed holder releases it with its file locks.
pub struct SyncLock {
    _conn: Option<Connection>,
}

impl DraftStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let mut store = Self::from_connection(conn)?;
        store.sync_lock_path = Some(sync_lock_path(path));
        info!("Draft store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(DraftStore {
            conn: Mutex::new(conn),
            sync_lock_path: None,
        })
    }

    /// Try to become the only sync pass for this draft table. Returns
    /// `Ok(None)` when another pass holds the lock.
    pub fn try_lock_sync(&self) -> Result<Option<SyncLock>, StoreError> {
        let path = match &self.sync_lock_path {
            Some(p) => p,
            None => return Ok(Some(SyncLock { _conn: None })),
        };

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::ZERO)?;
        match conn.execute_batch("BEGIN EXCLUSIVE") {
            Ok(()) => Ok(Some(SyncLock { _conn: Some(conn) })),
            Err(e)
                if matches!(
                    e.sqlite_error_code(),
                    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
                ) =>
            {
                debug!("Sync lock held elsewhere");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Flush and release the underlying connection.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| StoreError::Unavailable(format!("draft store lock poisoned: {}", e)))?;
        conn.close().map_err(|(_, e)| StoreError::Storage(e))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("draft store lock poisoned: {}", e)))
    }

    pub fn save(&self, draft: &NewDraft) -> Result<i64, StoreError> {
        validate(draft)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO drafts (title, description, category_id, municipality_id, address, latitude, longitude, image_name, image_data_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                draft.title,
                draft.description,
                draft.category_id,
                draft.municipality_id,
                draft.address,
                draft.latitude,
                draft.longitude,
                draft.image_name,
                draft.image_data_url,
                draft.created_at,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(draft_id = id, "Saved draft");
        Ok(id)
    }

    /// Replace the whole record. An unknown id is inserted under that id.
    pub fn update(&self, draft: &Draft) -> Result<(), StoreError> {
        validate(&draft.fields)?;
        let d = &draft.fields;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO drafts (id, title, description, category_id, municipality_id, address, latitude, longitude, image_name, image_data_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                draft.id,
                d.title,
                d.description,
                d.category_id,
                d.municipality_id,
                d.address,
                d.latitude,
                d.longitude,
                d.image_name,
                d.image_data_url,
                d.created_at,
            ],
        )?;
        debug!(draft_id = draft.id, "Replaced draft");
        Ok(())
    }

    /// Overwrite a draft that is still stored. Returns `false` without
    /// writing anything when the id is gone, e.g. synced in the meantime.
    pub fn replace(&self, draft: &Draft) -> Result<bool, StoreError> {
        validate(&draft.fields)?;
        let d = &draft.fields;
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE drafts SET title = ?2, description = ?3, category_id = ?4, municipality_id = ?5, address = ?6, latitude = ?7, longitude = ?8, image_name = ?9, image_data_url = ?10, created_at = ?11 WHERE id = ?1",
            params![
                draft.id,
                d.title,
                d.description,
                d.category_id,
                d.municipality_id,
                d.address,
                d.latitude,
                d.longitude,
                d.image_name,
                d.image_data_url,
                d.created_at,
            ],
        )?;
        debug!(draft_id = draft.id, replaced = rows > 0, "Replaced draft in place");
        Ok(rows > 0)
    }

    pub fn get(&self, id: i64) -> Result<Option<Draft>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM drafts WHERE id = ?1", DRAFT_COLUMNS))?;
        let draft = stmt.query_row([id], draft_from_row).optional()?;
        Ok(draft)
    }

    /// All drafts, in storage order. Sorting for display is up to the caller.
    pub fn list(&self) -> Result<Vec<Draft>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM drafts", DRAFT_COLUMNS))?;
        let drafts = stmt
            .query_map([], draft_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(drafts)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM drafts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove a draft. Unknown ids are not an error.
    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM drafts WHERE id = ?1", [id])?;
        debug!(draft_id = id, removed = rows > 0, "Deleted draft");
        Ok(())
    }
}

fn sync_lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".sync-lock");
    PathBuf::from(name)
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < SCHEMA_VERSION {
        // AUTOINCREMENT keeps ids from being reused after a delete
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS drafts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category_id TEXT NOT NULL,
                municipality_id TEXT NOT NULL,
                address TEXT,
                latitude TEXT,
                longitude TEXT,
                image_name TEXT,
                image_data_url TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_drafts_created_at ON drafts(created_at);
            "#,
        )?;

        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
    }

    Ok(())
}

fn draft_from_row(row: &Row<'_>) -> rusqlite::Result<Draft> {
    Ok(Draft {
        id: row.get(0)?,
        fields: NewDraft {
            title: row.get(1)?,
            description: row.get(2)?,
            category_id: row.get(3)?,
            municipality_id: row.get(4)?,
            address: row.get(5)?,
            latitude: row.get(6)?,
            longitude: row.get(7)?,
            image_name: row.get(8)?,
            image_data_url: row.get(9)?,
            created_at: row.get(10)?,
        },
    })
}

/// Checks applied before anything is written. Title and description may still
/// be empty here; they are only required at submission time.
fn validate(draft: &NewDraft) -> Result<(), StoreError> {
    if draft.created_at <= 0 {
        return Err(StoreError::InvalidDraft(format!(
            "createdAt must be a positive timestamp, got {}",
            draft.created_at
        )));
    }

    for (name, value) in [("latitude", &draft.latitude), ("longitude", &draft.longitude)] {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            if !v.parse::<f64>().is_ok_and(f64::is_finite) {
                return Err(StoreError::InvalidDraft(format!("{} '{}' is not a number", name, v)));
            }
        }
    }

    if let Some(url) = &draft.image_data_url {
        dataurl::decode(url)
            .map_err(|e| StoreError::InvalidDraft(format!("imageDataUrl: {}", e)))?;
    }

    Ok(())
}
