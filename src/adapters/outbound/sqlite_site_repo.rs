//! SQLite Site Repository
//!
//! Implements SiteRepository using SQLite for storage.

use crate::domain::entities::{CountrySite, SiteDraft};
use crate::domain::errors::RepositoryError;
use crate::domain::ports::SiteRepository;
use crate::domain::value_objects::CountryCode;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS country_sites (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    domain           TEXT    NOT NULL,
    name             TEXT    NOT NULL,
    country_code     TEXT    NOT NULL UNIQUE,
    active           INTEGER NOT NULL DEFAULT 1,
    default_language TEXT    NOT NULL
);
";

const COLUMNS: &str = "id, domain, name, country_code, active, default_language";

/// SQLite-backed country site repository.
///
/// A single connection guarded by a mutex; each call is one statement, so
/// writes are serialised by the lock and by SQLite itself.
pub struct SqliteSiteRepository {
    conn: Mutex<Connection>,
}

impl SqliteSiteRepository {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests and ephemeral setups.
    pub fn in_memory() -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Convert a SQLite row to a CountrySite entity.
    fn row_to_site(row: &Row) -> rusqlite::Result<CountrySite> {
        let raw_code: String = row.get(3)?;
        let country_code = CountryCode::new(&raw_code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                "empty country code".into(),
            )
        })?;
        Ok(CountrySite {
            id: row.get(0)?,
            domain: row.get(1)?,
            name: row.get(2)?,
            country_code,
            active: row.get::<_, i64>(4)? != 0,
            default_language: row.get(5)?,
        })
    }

    fn query_sites(&self, filter: &str) -> Result<Vec<CountrySite>, RepositoryError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {COLUMNS} FROM country_sites {filter} ORDER BY domain, id");
        let mut stmt = conn.prepare(&sql)?;
        let sites = stmt
            .query_map([], Self::row_to_site)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    fn map_write_error(err: rusqlite::Error, code: &CountryCode) -> RepositoryError {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                RepositoryError::DuplicateCode(code.to_string())
            }
            _ => RepositoryError::Sqlite(err),
        }
    }
}

impl SiteRepository for SqliteSiteRepository {
    fn get_by_code(&self, code: &CountryCode) -> Result<Option<CountrySite>, RepositoryError> {
        let conn = self.conn.lock();
        let site = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM country_sites WHERE country_code = ?1"),
                params![code.as_str()],
                Self::row_to_site,
            )
            .optional()?;
        Ok(site)
    }

    fn get_by_id(&self, id: i64) -> Result<Option<CountrySite>, RepositoryError> {
        let conn = self.conn.lock();
        let site = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM country_sites WHERE id = ?1"),
                params![id],
                Self::row_to_site,
            )
            .optional()?;
        Ok(site)
    }

    fn all(&self) -> Result<Vec<CountrySite>, RepositoryError> {
        self.query_sites("")
    }

    fn active(&self) -> Result<Vec<CountrySite>, RepositoryError> {
        self.query_sites("WHERE active = 1")
    }

    fn insert(&self, draft: &SiteDraft) -> Result<CountrySite, RepositoryError> {
        let code = draft.normalized_code().ok_or(RepositoryError::InvalidCode)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO country_sites (domain, name, country_code, active, default_language)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                draft.domain,
                draft.name,
                code.as_str(),
                draft.active as i64,
                draft.default_language
            ],
        )
        .map_err(|e| Self::map_write_error(e, &code))?;

        Ok(CountrySite {
            id: conn.last_insert_rowid(),
            domain: draft.domain.clone(),
            name: draft.name.clone(),
            country_code: code,
            active: draft.active,
            default_language: draft.default_language.clone(),
        })
    }

    fn update(&self, id: i64, draft: &SiteDraft) -> Result<CountrySite, RepositoryError> {
        let code = draft.normalized_code().ok_or(RepositoryError::InvalidCode)?;
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE country_sites
                 SET domain = ?1, name = ?2, country_code = ?3, active = ?4, default_language = ?5
                 WHERE id = ?6",
                params![
                    draft.domain,
                    draft.name,
                    code.as_str(),
                    draft.active as i64,
                    draft.default_language,
                    id
                ],
            )
            .map_err(|e| Self::map_write_error(e, &code))?;

        if changed == 0 {
            return Err(RepositoryError::NotFound(id));
        }

        Ok(CountrySite {
            id,
            domain: draft.domain.clone(),
            name: draft.name.clone(),
            country_code: code,
            active: draft.active,
            default_language: draft.default_language.clone(),
        })
    }

    fn delete(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM country_sites WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}
