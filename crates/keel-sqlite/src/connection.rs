//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API, implementing the [`Connection`]
//! trait from keel-core. All statements are prepared and every parameter is
//! bound; nothing is spliced into SQL text.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)] // Error type is defined in keel-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::ffi;
use crate::types;
use keel_core::{
    Connection, Cx, Dialect, Error, Outcome, Row, Value,
    error::{ConnectionErrorKind, QueryErrorKind},
    row::ColumnInfo,
};
use std::ffi::{CStr, CString, c_int};
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds; 0 disables waiting on locks.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read_only: bool,
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Serialized threading mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Read-write access; the database must already exist.
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;
        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write-create if no access mode was chosen
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::file(":memory:")
    }
}

impl SqliteConfig {
    /// Config for a file-based database, created if missing.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is only touched while holding the connection's Mutex.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::connection(
                ConnectionErrorKind::Connect,
                "Invalid path: contains null byte",
            )
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is a valid (failed) handle that must still be closed
                unsafe {
                    let msg = last_error_message(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(Error::connection(
                ConnectionErrorKind::Connect,
                format!("Failed to open database {}: {}", config.path, msg),
            ));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, ms);
            }
        }

        tracing::debug!(path = %config.path, "Opened SQLite database");
        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path: config.path.clone(),
        })
    }

    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute one or more SQL statements without parameters (DDL, seeding).
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let inner = self.lock();
        let c_sql = CString::new(sql)
            .map_err(|_| Error::query(QueryErrorKind::Syntax, sql, "SQL contains null byte"))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg was allocated by SQLite and is freed exactly once
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(Error::query(error_code_to_kind(rc), sql, msg));
        }

        Ok(())
    }

    /// Number of rows changed by the last statement.
    pub fn changes(&self) -> u64 {
        let inner = self.lock();
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(inner.db) };
        u64::try_from(changes).unwrap_or(0)
    }

    /// Prepare and run a query, returning all rows.
    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let inner = self.lock();
        let stmt = prepare_stmt(inner.db, sql)?;
        let stmt = Statement(stmt);
        bind_params(inner.db, stmt.0, sql, params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.0) };
        let names: Vec<String> = (0..col_count)
            // SAFETY: stmt is valid, i < col_count
            .map(|i| unsafe { types::column_name(stmt.0, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            match unsafe { ffi::sqlite3_step(stmt.0) } {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: stmt just returned SQLITE_ROW, i < col_count
                        .map(|i| unsafe { types::read_column(stmt.0, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }

        Ok(rows)
    }

    /// Prepare and run a statement, returning rows affected.
    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let inner = self.lock();
        let stmt = Statement(prepare_stmt(inner.db, sql)?);
        bind_params(inner.db, stmt.0, sql, params)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt.0) };
        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changes = unsafe { ffi::sqlite3_changes(inner.db) };
                Ok(u64::try_from(changes).unwrap_or(0))
            }
            _ => Err(step_error(inner.db, sql)),
        }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid; every statement is finalized by its
            // `Statement` guard before the call that prepared it returns.
            let rc = unsafe { ffi::sqlite3_close(inner.db) };
            if rc != ffi::SQLITE_OK {
                tracing::warn!(path = %self.path, error = ffi::error_string(rc), "Failed to close SQLite database");
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let result = match cx.cancel_reason() {
            Some(reason) => Outcome::Cancelled(reason),
            None => self
                .query_sync(sql, params)
                .map(|rows| rows.into_iter().next())
                .map_or_else(Outcome::Err, Outcome::Ok),
        };
        async move { result }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = match cx.cancel_reason() {
            Some(reason) => Outcome::Cancelled(reason),
            None => self
                .execute_sync(sql, params)
                .map_or_else(Outcome::Err, Outcome::Ok),
        };
        async move { result }
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.query_sync("SELECT 1", &[]).map(|_| ());
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }
}

/// Finalizes a prepared statement when dropped.
struct Statement(*mut ffi::sqlite3_stmt);

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: the pointer came from a successful prepare and is finalized once
        unsafe {
            ffi::sqlite3_finalize(self.0);
        }
    }
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt, Error> {
    let c_sql = CString::new(sql)
        .map_err(|_| Error::query(QueryErrorKind::Syntax, sql, "SQL contains null byte"))?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(step_error(db, sql));
    }
    if stmt.is_null() {
        return Err(Error::query(
            QueryErrorKind::Syntax,
            sql,
            "SQL contains no statement",
        ));
    }
    Ok(stmt)
}

fn bind_params(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &str,
    params: &[Value],
) -> Result<(), Error> {
    for (i, param) in params.iter().enumerate() {
        let index = i + 1;
        // SAFETY: stmt is valid, index is 1-based
        let rc = unsafe { types::bind_value(stmt, index as c_int, param) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid
            let msg = unsafe { last_error_message(db) };
            return Err(Error::query(
                QueryErrorKind::Database,
                sql,
                format!("Failed to bind parameter {index}: {msg}"),
            ));
        }
    }
    Ok(())
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (last_error_message(db), ffi::sqlite3_errcode(db)) };
    Error::query(error_code_to_kind(code), sql, msg)
}

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn last_error_message(db: *mut ffi::sqlite3) -> String {
    // SAFETY: caller guarantees db; errmsg never returns null for a valid handle
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    // Extended codes carry the primary code in the low byte.
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
