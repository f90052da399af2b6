//! Connection ownership and nested transactional scopes
//!
//! The manager owns the single SQLite connection. Readers share a coarse
//! gate, writers hold it exclusively and run inside a SQL savepoint. Nested
//! scopes push further savepoints, so an inner failure only undoes the inner
//! work while the outermost release commits.
//!
//! A thread that already holds the gate must pass its `Tx` down instead of
//! re-entering the manager. Re-entry is reported as `Error::Transaction`
//! rather than left to deadlock.

use crate::config::DbfsConfig;
use crate::error::{Error, Result};
use crate::locker::FileLocker;
use crate::schema;
use crate::stat::now;
use rusqlite::{Connection, OpenFlags};
use std::cell::RefCell;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

thread_local! {
    /// Managers whose gate the current thread holds
    static GATES_HELD: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as holding one manager's gate for its lifetime
struct GateMarker {
    key: usize,
}

impl GateMarker {
    fn enter(manager: &TransactionManager) -> Result<Self> {
        let key = std::ptr::from_ref(manager) as usize;
        GATES_HELD.with(|held| {
            let mut held = held.borrow_mut();
            if held.contains(&key) {
                return Err(Error::transaction(
                    "store re-entered from inside a transaction on the same thread",
                ));
            }
            held.push(key);
            Ok(GateMarker { key })
        })
    }
}

impl Drop for GateMarker {
    fn drop(&mut self) {
        GATES_HELD.with(|held| held.borrow_mut().retain(|key| *key != self.key));
    }
}

/// A savepoint on the stack, rolled back unless explicitly released
struct Savepoint<'a> {
    conn: &'a Connection,
    depth: &'a AtomicUsize,
    name: String,
    done: bool,
}

impl<'a> Savepoint<'a> {
    fn begin(conn: &'a Connection, depth: &'a AtomicUsize) -> Result<Self> {
        let level = depth.load(Ordering::SeqCst) + 1;
        let name = format!("sp{level}");
        conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        depth.store(level, Ordering::SeqCst);
        Ok(Savepoint {
            conn,
            depth,
            name,
            done: false,
        })
    }

    fn release(mut self) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE {}", self.name))?;
        self.done = true;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.done = true;
        self.conn.execute_batch(&format!(
            "ROLLBACK TO {name}; RELEASE {name}",
            name = self.name
        ))?;
        Ok(())
    }

    /// Runs `f` inside this savepoint
    fn run<T, F>(conn: &'a Connection, depth: &'a AtomicUsize, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        let mut savepoint = Savepoint::begin(conn, depth)?;
        let tx = Tx { conn, depth };
        match f(&tx) {
            Ok(value) => {
                savepoint.release()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = savepoint.rollback() {
                    diagnostics::error!("Rollback failed: {rollback}", rollback: rollback.to_string());
                }
                Err(err)
            }
        }
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.done {
            let name = self.name.clone();
            if let Err(err) = self.rollback() {
                diagnostics::error!("Rollback of {name} failed: {error}", name: name, error: err.to_string());
            }
        }
        _ = self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection handle inside a savepoint
pub struct Tx<'a> {
    conn: &'a Connection,
    depth: &'a AtomicUsize,
}

impl Tx<'_> {
    /// Runs `f` in a nested savepoint. On error only the nested work is
    /// rolled back and the error is returned.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        Savepoint::run(self.conn, self.depth, f)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn conn(&self) -> &Connection {
        self.conn
    }
}

impl Deref for Tx<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

pub struct TransactionManager {
    path: PathBuf,
    roots: Vec<String>,
    close_iterations: u32,
    close_tick: Duration,
    gate: RwLock<()>,
    conn: Mutex<Option<Connection>>,
    depth: AtomicUsize,
    closing: AtomicBool,
    closed: AtomicBool,
    locker: Arc<FileLocker>,
}

impl TransactionManager {
    /// Opens the store, creating the schema when missing or when `init`
    pub fn open(config: &DbfsConfig, locker: Arc<FileLocker>, init: bool) -> Result<Self> {
        let manager = TransactionManager {
            path: config.path.clone(),
            roots: config.roots.clone(),
            close_iterations: config.close_iterations,
            close_tick: config.close_tick(),
            gate: RwLock::new(()),
            conn: Mutex::new(None),
            depth: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            locker,
        };
        let conn = manager.open_connection(init)?;
        *manager.connection_slot() = Some(conn);
        diagnostics::info!("Opened store {path}", path: manager.path.display().to_string());
        Ok(manager)
    }

    fn open_connection(&self, init: bool) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        schema::configure(&conn)?;
        if init || !schema::exists(&conn)? {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            if let Err(err) = schema::create(&conn, &self.roots, now()) {
                _ = conn.execute_batch("ROLLBACK");
                return Err(err);
            }
            conn.execute_batch("COMMIT")?;
            diagnostics::info!("Initialized store {path}", path: self.path.display().to_string());
        }
        Ok(conn)
    }

    fn connection_slot(&self) -> MutexGuard<'_, Option<Connection>> {
        // Savepoints have already undone a panicked scope
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The live connection, reopened lazily after a resume
    fn connection(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        let mut slot = self.connection_slot();
        if slot.is_none() {
            *slot = Some(self.open_connection(false)?);
            diagnostics::debug!("Reopened store {path}", path: self.path.display().to_string());
        }
        Ok(slot)
    }

    /// Runs `f` under the shared gate without a savepoint
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let _marker = GateMarker::enter(self)?;
        let _gate = self.gate.read().unwrap_or_else(|e| e.into_inner());
        let slot = self.connection()?;
        let conn = slot.as_ref().ok_or(Error::Closed)?;
        f(conn)
    }

    /// Runs `f` under the exclusive gate in a new savepoint. Fails with
    /// `Error::Closed` once a close has started.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        if self.closing.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        self.write_stream(f)
    }

    /// Like `write`, but still allowed while a close is draining open streams
    pub(crate) fn write_stream<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        let _marker = GateMarker::enter(self)?;
        let _gate = self.gate.write().unwrap_or_else(|e| e.into_inner());
        let slot = self.connection()?;
        let conn = slot.as_ref().ok_or(Error::Closed)?;
        Savepoint::run(conn, &self.depth, f)
    }

    /// Current savepoint stack depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn is_drained(&self) -> bool {
        self.depth() == 0 && self.locker.is_idle()
    }

    /// Waits for open scopes and streams to finish, then closes the
    /// connection. Returns false if the wait timed out and the close was
    /// forced.
    pub async fn close(&self) -> bool {
        self.closing.store(true, Ordering::SeqCst);
        let mut drained = self.is_drained();
        for _ in 0..self.close_iterations {
            if drained {
                break;
            }
            tokio::time::sleep(self.close_tick).await;
            drained = self.is_drained();
        }
        if !drained {
            diagnostics::warn!(
                "Forcing close of {path} with {locks} open streams",
                path: self.path.display().to_string(),
                locks: self.locker.len()
            );
        }
        self.force_close();
        drained
    }

    /// Like close, but first stops new streams from starting
    pub async fn pause(&self) -> bool {
        _ = self.locker.pause();
        self.close().await
    }

    fn force_close(&self) {
        let _gate = self.gate.write().unwrap_or_else(|e| e.into_inner());
        self.locker.clear();
        self.closed.store(true, Ordering::SeqCst);
        if let Some(conn) = self.connection_slot().take() {
            if let Err((_, err)) = conn.close() {
                diagnostics::error!("Close of {path} failed: {error}", path: self.path.display().to_string(), error: err.to_string());
            }
        }
        diagnostics::info!("Closed store {path}", path: self.path.display().to_string());
    }

    /// Allows access again after close or pause. The connection reopens on
    /// the next access.
    pub fn resume(&self) {
        self.locker.resume();
        self.closing.store(false, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        diagnostics::info!("Resumed store {path}", path: self.path.display().to_string());
    }
}
