// crates/admission-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Policy Store
// Description: Durable PolicyStore backed by SQLite.
// Purpose: Persist assignments, rules, and feature flags across restarts.
// Dependencies: admission-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`PolicyStore`] using `SQLite`. Each
//! record kind lives in its own table keyed by its full contents, so grants
//! and rules behave as sets. A `store_meta` table records the schema version
//! and whether seed records were applied; the store refuses to open databases
//! written by an unknown version.
//! Security posture: database contents are untrusted and decoded fail-closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use admission_gate_core::Action;
use admission_gate_core::FeatureFlag;
use admission_gate_core::PolicyRule;
use admission_gate_core::PolicySnapshot;
use admission_gate_core::PolicyStore;
use admission_gate_core::PolicyStoreError;
use admission_gate_core::RoleAssignment;
use admission_gate_core::RoleName;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` policy store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
#[derive(Debug, Clone, Deserialize)]
pub struct SqlitePolicyStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqlitePolicyStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Default busy timeout for serde.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` policy store errors.
#[derive(Debug, Error, Clone)]
pub enum SqlitePolicyStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqlitePolicyStoreError> for PolicyStoreError {
    fn from(error: SqlitePolicyStoreError) -> Self {
        match error {
            SqlitePolicyStoreError::Io(message) => Self::Io(message),
            SqlitePolicyStoreError::Db(message) => Self::Store(message),
            SqlitePolicyStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqlitePolicyStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps a `rusqlite` error into a store error.
fn db_error(err: &rusqlite::Error) -> SqlitePolicyStoreError {
    SqlitePolicyStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed policy store.
///
/// # Invariants
/// - All access goes through a single connection guarded by a mutex.
pub struct SqlitePolicyStore {
    /// Database connection.
    connection: Mutex<Connection>,
    /// Database file path, kept for diagnostics.
    path: PathBuf,
}

impl std::fmt::Debug for SqlitePolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePolicyStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl SqlitePolicyStore {
    /// Opens (or creates) the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlitePolicyStoreError`] when the path is unsafe, the
    /// database cannot be opened, or it was written by another schema version.
    pub fn open(config: &SqlitePolicyStoreConfig) -> Result<Self, SqlitePolicyStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "opened sqlite policy store");
        Ok(Self {
            connection: Mutex::new(connection),
            path: config.path.clone(),
        })
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every record in `snapshot` and `flags` that is not yet present,
    /// once per database. Returns `false` when the store was already seeded.
    ///
    /// Existing records are left untouched and later revocations stick, so
    /// operator edits win over seeds.
    ///
    /// # Errors
    ///
    /// Returns [`SqlitePolicyStoreError`] when the transaction fails.
    pub fn seed(
        &self,
        snapshot: &PolicySnapshot,
        flags: &[FeatureFlag],
    ) -> Result<bool, SqlitePolicyStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| db_error(&err))?;
        let seeded: i64 = tx
            .query_row("SELECT seeded FROM store_meta LIMIT 1", params![], |row| row.get(0))
            .map_err(|err| db_error(&err))?;
        if seeded != 0 {
            return Ok(false);
        }
        for assignment in &snapshot.assignments {
            tx.execute(
                "INSERT OR IGNORE INTO role_assignments (member, role) VALUES (?1, ?2)",
                params![assignment.member, assignment.role.as_str()],
            )
            .map_err(|err| db_error(&err))?;
        }
        for rule in &snapshot.rules {
            tx.execute(
                "INSERT OR IGNORE INTO policy_rules (role, resource, action) VALUES (?1, ?2, ?3)",
                params![rule.role.as_str(), rule.resource.as_str(), rule.action.as_str()],
            )
            .map_err(|err| db_error(&err))?;
        }
        for flag in flags {
            let roles = encode_roles(&flag.allowed_roles)?;
            tx.execute(
                "INSERT OR IGNORE INTO feature_flags
                    (name, enabled, public_access, allowed_roles, description)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![flag.name, flag.enabled, flag.public_access, roles, flag.description],
            )
            .map_err(|err| db_error(&err))?;
        }
        tx.execute("UPDATE store_meta SET seeded = 1", params![]).map_err(|err| db_error(&err))?;
        tx.commit().map_err(|err| db_error(&err))?;
        Ok(true)
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqlitePolicyStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqlitePolicyStoreError::Db("sqlite connection mutex poisoned".to_string()))
    }

    /// Executes a single mutating statement and reports whether a row changed.
    fn execute_change(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<bool, SqlitePolicyStoreError> {
        let connection = self.lock()?;
        let changed = connection.execute(sql, params).map_err(|err| db_error(&err))?;
        Ok(changed > 0)
    }
}

impl PolicyStore for SqlitePolicyStore {
    fn load_snapshot(&self) -> Result<PolicySnapshot, PolicyStoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT member, role FROM role_assignments ORDER BY member, role")
            .map_err(|err| db_error(&err))?;
        let assignments = statement
            .query_map(params![], |row| {
                let member: String = row.get(0)?;
                let role: String = row.get(1)?;
                Ok(RoleAssignment::new(member, role))
            })
            .map_err(|err| db_error(&err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| db_error(&err))?;
        let mut statement = connection
            .prepare(
                "SELECT role, resource, action FROM policy_rules ORDER BY role, resource, action",
            )
            .map_err(|err| db_error(&err))?;
        let rules = statement
            .query_map(params![], |row| {
                let role: String = row.get(0)?;
                let resource: String = row.get(1)?;
                let action: String = row.get(2)?;
                Ok(PolicyRule::new(role, resource, Action::parse(&action)))
            })
            .map_err(|err| db_error(&err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| db_error(&err))?;
        Ok(PolicySnapshot {
            assignments,
            rules,
        })
    }

    fn feature_flag(&self, name: &str) -> Result<Option<FeatureFlag>, PolicyStoreError> {
        let connection = self.lock()?;
        let row = connection
            .query_row(
                "SELECT name, enabled, public_access, allowed_roles, description
                 FROM feature_flags WHERE name = ?1",
                params![name],
                read_flag_row,
            )
            .optional()
            .map_err(|err| db_error(&err))?;
        match row {
            Some(raw) => Ok(Some(raw.decode()?)),
            None => Ok(None),
        }
    }

    fn list_flags(&self) -> Result<Vec<FeatureFlag>, PolicyStoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT name, enabled, public_access, allowed_roles, description
                 FROM feature_flags ORDER BY name",
            )
            .map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params![], read_flag_row)
            .map_err(|err| db_error(&err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| db_error(&err))?;
        let mut flags = Vec::with_capacity(rows.len());
        for raw in rows {
            flags.push(raw.decode()?);
        }
        Ok(flags)
    }

    fn grant_role(&self, assignment: &RoleAssignment) -> Result<bool, PolicyStoreError> {
        Ok(self.execute_change(
            "INSERT OR IGNORE INTO role_assignments (member, role) VALUES (?1, ?2)",
            params![assignment.member, assignment.role.as_str()],
        )?)
    }

    fn revoke_role(&self, assignment: &RoleAssignment) -> Result<bool, PolicyStoreError> {
        Ok(self.execute_change(
            "DELETE FROM role_assignments WHERE member = ?1 AND role = ?2",
            params![assignment.member, assignment.role.as_str()],
        )?)
    }

    fn add_rule(&self, rule: &PolicyRule) -> Result<bool, PolicyStoreError> {
        Ok(self.execute_change(
            "INSERT OR IGNORE INTO policy_rules (role, resource, action) VALUES (?1, ?2, ?3)",
            params![rule.role.as_str(), rule.resource.as_str(), rule.action.as_str()],
        )?)
    }

    fn remove_rule(&self, rule: &PolicyRule) -> Result<bool, PolicyStoreError> {
        Ok(self.execute_change(
            "DELETE FROM policy_rules WHERE role = ?1 AND resource = ?2 AND action = ?3",
            params![rule.role.as_str(), rule.resource.as_str(), rule.action.as_str()],
        )?)
    }

    fn upsert_flag(&self, flag: &FeatureFlag) -> Result<(), PolicyStoreError> {
        let roles = encode_roles(&flag.allowed_roles)?;
        self.execute_change(
            "INSERT INTO feature_flags (name, enabled, public_access, allowed_roles, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                enabled = excluded.enabled,
                public_access = excluded.public_access,
                allowed_roles = excluded.allowed_roles,
                description = excluded.description",
            params![flag.name, flag.enabled, flag.public_access, roles, flag.description],
        )?;
        Ok(())
    }

    fn remove_flag(&self, name: &str) -> Result<bool, PolicyStoreError> {
        Ok(self.execute_change("DELETE FROM feature_flags WHERE name = ?1", params![name])?)
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Feature flag row prior to decoding the role list.
struct RawFlagRow {
    /// Flag name.
    name: String,
    /// Enabled bit.
    enabled: bool,
    /// Public access bit.
    public_access: bool,
    /// JSON-encoded role list.
    allowed_roles: String,
    /// Optional description.
    description: Option<String>,
}

impl RawFlagRow {
    /// Decodes the stored role list.
    fn decode(self) -> Result<FeatureFlag, SqlitePolicyStoreError> {
        let allowed_roles: Vec<RoleName> =
            serde_json::from_str(&self.allowed_roles).map_err(|err| {
                SqlitePolicyStoreError::Invalid(format!(
                    "feature flag {} has malformed allowed_roles: {err}",
                    self.name
                ))
            })?;
        Ok(FeatureFlag {
            name: self.name,
            enabled: self.enabled,
            public_access: self.public_access,
            allowed_roles,
            description: self.description,
        })
    }
}

/// Reads a raw feature flag row.
fn read_flag_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFlagRow> {
    Ok(RawFlagRow {
        name: row.get(0)?,
        enabled: row.get(1)?,
        public_access: row.get(2)?,
        allowed_roles: row.get(3)?,
        description: row.get(4)?,
    })
}

/// Encodes a role list for storage.
fn encode_roles(roles: &[RoleName]) -> Result<String, SqlitePolicyStoreError> {
    serde_json::to_string(roles).map_err(|err| SqlitePolicyStoreError::Invalid(err.to_string()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqlitePolicyStoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|err| SqlitePolicyStoreError::Io(err.to_string())),
        _ => Ok(()),
    }
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqlitePolicyStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqlitePolicyStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqlitePolicyStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqlitePolicyStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqlitePolicyStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqlitePolicyStoreConfig) -> Result<Connection, SqlitePolicyStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqlitePolicyStoreConfig,
) -> Result<(), SqlitePolicyStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqlitePolicyStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS store_meta (
            version INTEGER NOT NULL,
            seeded INTEGER NOT NULL DEFAULT 0
        );",
    )
    .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS role_assignments (
                    member TEXT NOT NULL,
                    role TEXT NOT NULL,
                    PRIMARY KEY (member, role)
                );
                CREATE TABLE IF NOT EXISTS policy_rules (
                    role TEXT NOT NULL,
                    resource TEXT NOT NULL,
                    action TEXT NOT NULL,
                    PRIMARY KEY (role, resource, action)
                );
                CREATE TABLE IF NOT EXISTS feature_flags (
                    name TEXT PRIMARY KEY,
                    enabled INTEGER NOT NULL,
                    public_access INTEGER NOT NULL,
                    allowed_roles TEXT NOT NULL,
                    description TEXT
                );",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqlitePolicyStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}
