//! SQLite-backed store of servable materials.

use std::fmt;
use std::path::Path;
use std::sync::{LazyLock, Mutex, MutexGuard};

use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

/// Max rows returned by `list`.
pub const LIST_LIMIT: usize = 20;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,60}$").expect("static regex"));

/// Check a material id: 1-60 chars of letters, digits, `_`, `.` or `-`.
/// The cap keeps `get:<id>` within Telegram's 64-byte callback data limit.
pub fn is_valid_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

/// How a material is delivered back to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Document,
    Photo,
}

impl MaterialKind {
    fn as_str(self) -> &'static str {
        match self {
            MaterialKind::Document => "document",
            MaterialKind::Photo => "photo",
        }
    }

    fn from_column(s: &str) -> Self {
        match s {
            "photo" => MaterialKind::Photo,
            _ => MaterialKind::Document,
        }
    }
}

/// A stored exam or tutorial file.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: String,
    pub title: String,
    /// Course code or category, may be empty.
    pub category: String,
    pub department: String,
    pub kind: MaterialKind,
    /// Telegram file id of the stored file.
    pub file_ref: String,
    pub uploaded_by: i64,
    pub uploaded_at: String,
}

impl Material {
    /// One-line summary used in listings.
    pub fn summary(&self) -> String {
        let code = if self.category.is_empty() { "no code" } else { &self.category };
        format!("{}. {} ({})", self.id, self.title, code)
    }

    /// Caption attached when the file is sent.
    pub fn caption(&self) -> String {
        match (self.category.is_empty(), self.department.is_empty()) {
            (true, true) => self.title.clone(),
            (false, true) => format!("{} | {}", self.title, self.category),
            (true, false) => format!("{} | {}", self.title, self.department),
            (false, false) => format!("{} | {} / {}", self.title, self.category, self.department),
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Duplicate(String),
    Sqlite(rusqlite::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "material '{}' not found", id),
            Self::Duplicate(id) => write!(f, "material '{}' already exists", id),
            Self::Sqlite(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

const COLUMNS: &str =
    "id, title, category, department, kind, file_ref, uploaded_by, uploaded_at";

/// Persistent material table.
pub struct MaterialStore {
    conn: Mutex<Connection>,
}

impl MaterialStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        info!("Opened material store at {:?} ({} materials)", path, store.count()?);
        Ok(store)
    }

    /// Create a new in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves no partial state behind in SQLite.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS materials (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                department TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL DEFAULT 'document',
                file_ref TEXT NOT NULL,
                uploaded_by INTEGER NOT NULL,
                uploaded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_materials_category ON materials(category);
            CREATE INDEX IF NOT EXISTS idx_materials_uploaded_at ON materials(uploaded_at);
        "#,
        )?;
        Ok(())
    }

    fn row_to_material(row: &Row<'_>) -> rusqlite::Result<Material> {
        Ok(Material {
            id: row.get(0)?,
            title: row.get(1)?,
            category: row.get(2)?,
            department: row.get(3)?,
            kind: MaterialKind::from_column(&row.get::<_, String>(4)?),
            file_ref: row.get(5)?,
            uploaded_by: row.get(6)?,
            uploaded_at: row.get(7)?,
        })
    }

    pub fn add(&self, material: &Material) -> Result<(), StoreError> {
        let conn = self.lock();
        let result = conn.execute(
            "INSERT INTO materials (id, title, category, department, kind, file_ref, uploaded_by, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                material.id,
                material.title,
                material.category,
                material.department,
                material.kind.as_str(),
                material.file_ref,
                material.uploaded_by,
                material.uploaded_at,
            ],
        );

        match result {
            Ok(_) => {
                debug!("Stored material {}", material.id);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate(material.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, id: &str) -> Result<Material, StoreError> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM materials WHERE id = ?1"),
            params![id],
            Self::row_to_material,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Newest first, optionally restricted to one category (case-insensitive).
    pub fn list(&self, category: Option<&str>) -> Result<Vec<Material>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM materials
             WHERE ?1 IS NULL OR category = ?1 COLLATE NOCASE
             ORDER BY uploaded_at DESC, id ASC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![category, LIST_LIMIT as i64], Self::row_to_material)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Substring match over title, category and department.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Material>, StoreError> {
        let like = format!("%{}%", escape_like(query.trim()));
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM materials
             WHERE title LIKE ?1 ESCAPE '\\'
                OR category LIKE ?1 ESCAPE '\\'
                OR department LIKE ?1 ESCAPE '\\'
             ORDER BY uploaded_at DESC, id ASC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![like, limit as i64], Self::row_to_material)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = self.lock().execute("DELETE FROM materials WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM materials", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Make `%` and `_` in user input match literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
