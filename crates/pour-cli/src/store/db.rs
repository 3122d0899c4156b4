//! SQLite state database
//!
//! The registry of installed versions. It is opened per operation and every
//! multi-row change runs in one transaction, so a crash leaves either the old
//! or the new record, never a mix.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use pour_schema::{InstalledPackage, PackageName, Sha256Digest, Version, WrapperLink};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt registry entry for {name}: {reason}")]
    Corrupt { name: String, reason: String },
}

/// One row of the `packages` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRow {
    pub name: PackageName,
    pub version: Version,
    pub sha256: String,
    pub prefix: PathBuf,
    pub size_bytes: u64,
    pub installed_at: i64,
    pub active: bool,
}

/// One row of the `history` table.
#[derive(Debug, Clone)]
pub struct HistoryEvent {
    pub action: String,
    pub version_from: Option<String>,
    pub version_to: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub success: bool,
}

/// State database for tracking installations
#[derive(Debug)]
pub struct StateDb {
    conn: Connection,
}

impl StateDb {
    /// Open or create the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DbError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS packages (
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                prefix TEXT NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                installed_at INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (name, version)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_one_active
                ON packages(name) WHERE active = 1;

            CREATE TABLE IF NOT EXISTS files (
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                path TEXT NOT NULL,
                PRIMARY KEY (name, version, path)
            );

            CREATE TABLE IF NOT EXISTS wrappers (
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                link TEXT NOT NULL,
                target TEXT NOT NULL,
                PRIMARY KEY (name, version, link)
            );

            CREATE INDEX IF NOT EXISTS idx_wrappers_link ON wrappers(link);

            CREATE TABLE IF NOT EXISTS pins (
                name TEXT PRIMARY KEY,
                version TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                action TEXT NOT NULL,
                version_from TEXT,
                version_to TEXT,
                timestamp INTEGER NOT NULL,
                success INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_name ON history(name);
            ",
        )?;
        Ok(())
    }

    /// Record a placed version with its files and launchers.
    ///
    /// Replaces any previous record of the same version. When `pkg.active` is
    /// set, every other version of the name is deactivated in the same
    /// transaction.
    pub fn record_install(&self, pkg: &InstalledPackage) -> Result<(), DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let name = pkg.name.as_str();
        let version = pkg.version.as_str();

        tx.execute(
            "DELETE FROM files WHERE name = ?1 AND version = ?2",
            params![name, version],
        )?;
        tx.execute(
            "DELETE FROM wrappers WHERE name = ?1 AND version = ?2",
            params![name, version],
        )?;
        if pkg.active {
            tx.execute(
                "UPDATE packages SET active = 0 WHERE name = ?1",
                params![name],
            )?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO packages
                (name, version, sha256, prefix, size_bytes, installed_at, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                name,
                version,
                pkg.content_hash.as_str(),
                pkg.prefix.to_string_lossy(),
                i64::try_from(pkg.size_bytes).unwrap_or(i64::MAX),
                chrono::Utc::now().timestamp(),
                pkg.active,
            ],
        )?;

        {
            let mut stmt =
                tx.prepare("INSERT INTO files (name, version, path) VALUES (?1, ?2, ?3)")?;
            for path in &pkg.installed_files {
                stmt.execute(params![name, version, path.to_string_lossy()])?;
            }
            let mut stmt = tx.prepare(
                "INSERT INTO wrappers (name, version, link, target) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for link in &pkg.wrappers {
                stmt.execute(params![
                    name,
                    version,
                    link.name,
                    link.target.to_string_lossy()
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Make `version` the only active version of `name`, or deactivate all
    /// versions when `version` is `None`.
    pub fn set_active(&self, name: &PackageName, version: Option<&Version>) -> Result<(), DbError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE packages SET active = 0 WHERE name = ?1",
            params![name.as_str()],
        )?;
        if let Some(version) = version {
            tx.execute(
                "UPDATE packages SET active = 1 WHERE name = ?1 AND version = ?2",
                params![name.as_str(), version.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete one version and everything recorded about it.
    ///
    /// Returns `false` if the version was not recorded.
    pub fn remove_package(&self, name: &PackageName, version: &Version) -> Result<bool, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let (n, v) = (name.as_str(), version.as_str());
        tx.execute(
            "DELETE FROM files WHERE name = ?1 AND version = ?2",
            params![n, v],
        )?;
        tx.execute(
            "DELETE FROM wrappers WHERE name = ?1 AND version = ?2",
            params![n, v],
        )?;
        tx.execute(
            "DELETE FROM pins WHERE name = ?1 AND version = ?2",
            params![n, v],
        )?;
        let deleted = tx.execute(
            "DELETE FROM packages WHERE name = ?1 AND version = ?2",
            params![n, v],
        )?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Full record of one version, including files and launchers.
    pub fn get_package(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Option<InstalledPackage>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT name, version, sha256, prefix, size_bytes, installed_at, active
                 FROM packages WHERE name = ?1 AND version = ?2",
                params![name.as_str(), version.as_str()],
                map_package_row,
            )
            .optional()?;

        row.map(|row| self.hydrate(row)).transpose()
    }

    /// Full record of the active version of `name`, if any.
    pub fn active_package(&self, name: &PackageName) -> Result<Option<InstalledPackage>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT name, version, sha256, prefix, size_bytes, installed_at, active
                 FROM packages WHERE name = ?1 AND active = 1",
                params![name.as_str()],
                map_package_row,
            )
            .optional()?;

        row.map(|row| self.hydrate(row)).transpose()
    }

    /// Every recorded version, ordered by name then version.
    pub fn list_packages(&self) -> Result<Vec<PackageRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, version, sha256, prefix, size_bytes, installed_at, active
             FROM packages",
        )?;
        let mut rows = stmt
            .query_map([], map_package_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        Ok(rows)
    }

    /// Versions of `name`, most recently installed first.
    pub fn list_versions(&self, name: &PackageName) -> Result<Vec<PackageRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, version, sha256, prefix, size_bytes, installed_at, active
             FROM packages WHERE name = ?1
             ORDER BY installed_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map(params![name.as_str()], map_package_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The package other than `name` that declares a launcher called `link`.
    pub fn wrapper_owner(
        &self,
        link: &str,
        name: &PackageName,
    ) -> Result<Option<PackageName>, DbError> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM wrappers WHERE link = ?1 AND name != ?2 LIMIT 1",
                params![link, name.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner.map(PackageName::from))
    }

    pub fn pinned_version(&self, name: &PackageName) -> Result<Option<Version>, DbError> {
        let version: Option<String> = self
            .conn
            .query_row(
                "SELECT version FROM pins WHERE name = ?1",
                params![name.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.as_deref().map(Version::new))
    }

    pub fn set_pin(&self, name: &PackageName, version: &Version) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO pins (name, version) VALUES (?1, ?2)",
            params![name.as_str(), version.as_str()],
        )?;
        Ok(())
    }

    /// Returns `false` if `name` was not pinned.
    pub fn clear_pin(&self, name: &PackageName) -> Result<bool, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM pins WHERE name = ?1", params![name.as_str()])?;
        Ok(deleted > 0)
    }

    pub fn add_history(
        &self,
        name: &PackageName,
        action: &str,
        version_from: Option<&Version>,
        version_to: Option<&Version>,
        success: bool,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO history (name, action, version_from, version_to, timestamp, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                name.as_str(),
                action,
                version_from.map(Version::as_str),
                version_to.map(Version::as_str),
                chrono::Utc::now().timestamp_millis(),
                success,
            ],
        )?;
        Ok(())
    }

    /// History of `name`, oldest first.
    pub fn get_history(&self, name: &PackageName) -> Result<Vec<HistoryEvent>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT action, version_from, version_to, timestamp, success
             FROM history WHERE name = ?1 ORDER BY id",
        )?;
        let events = stmt.query_map(params![name.as_str()], |row| {
            Ok(HistoryEvent {
                action: row.get(0)?,
                version_from: row.get(1)?,
                version_to: row.get(2)?,
                timestamp: row.get(3)?,
                success: row.get(4)?,
            })
        })?;
        events.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn hydrate(&self, row: PackageRow) -> Result<InstalledPackage, DbError> {
        let (n, v) = (row.name.as_str(), row.version.as_str());

        let mut stmt = self
            .conn
            .prepare("SELECT path FROM files WHERE name = ?1 AND version = ?2")?;
        let installed_files = stmt
            .query_map(params![n, v], |r| r.get::<_, String>(0))?
            .map(|p| p.map(PathBuf::from))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT link, target FROM wrappers WHERE name = ?1 AND version = ?2 ORDER BY link",
        )?;
        let wrappers = stmt
            .query_map(params![n, v], |r| {
                Ok(WrapperLink {
                    name: r.get(0)?,
                    target: PathBuf::from(r.get::<_, String>(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let content_hash = Sha256Digest::new(&row.sha256).map_err(|e| DbError::Corrupt {
            name: format!("{}@{}", row.name, row.version),
            reason: e.to_string(),
        })?;

        Ok(InstalledPackage {
            name: row.name,
            version: row.version,
            prefix: row.prefix,
            content_hash,
            installed_files,
            wrappers,
            active: row.active,
            size_bytes: row.size_bytes,
        })
    }
}

fn map_package_row(row: &Row<'_>) -> rusqlite::Result<PackageRow> {
    Ok(PackageRow {
        name: PackageName::from(row.get::<_, String>(0)?),
        version: Version::new(&row.get::<_, String>(1)?),
        sha256: row.get(2)?,
        prefix: PathBuf::from(row.get::<_, String>(3)?),
        size_bytes: u64::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
        installed_at: row.get(5)?,
        active: row.get(6)?,
    })
}
