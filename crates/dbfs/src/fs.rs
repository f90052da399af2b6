//! The filesystem engine
//!
//! `Dbfs` is a cheap handle on one open store. Every mutating call runs in
//! its own transaction. `Dbfs::transaction` hands out a `DbfsTxn` to group
//! several calls atomically, and `DbfsTxn::transaction` nests.

use crate::config::DbfsConfig;
use crate::error::{Error, Result};
use crate::locker::{FileLock, FileLocker};
use crate::path::Basepath;
use crate::reader::DbfsReader;
use crate::schema::{Contents, Dirs, Files, ROOT_ID, Xrefs};
use crate::stat::{Checksum, DeletedFileStat, FileStat, now};
use crate::transaction::{TransactionManager, Tx};
use crate::writer::{AppendPoint, DbfsWriter, store_content};
use diagnostics::*;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::sync::Arc;
use tokio::runtime::Handle;

pub(crate) struct DbfsInner {
    pub(crate) config: DbfsConfig,
    pub(crate) store: TransactionManager,
    pub(crate) locker: Arc<FileLocker>,
    /// Runtime for stream watchdogs, captured when the store was opened
    pub(crate) runtime: Option<Handle>,
}

/// Live entry at `path`
pub(crate) fn stat_at(conn: &Connection, path: &Basepath) -> Result<Option<FileStat>> {
    Files::stat(conn, path.dir(), path.name())
}

fn require(conn: &Connection, path: &Basepath) -> Result<FileStat> {
    stat_at(conn, path)?.ok_or_else(|| Error::not_found(path))
}

fn require_file(conn: &Connection, path: &Basepath) -> Result<FileStat> {
    let stat = require(conn, path)?;
    if stat.is_dir {
        return Err(Error::not_a_file(path));
    }
    Ok(stat)
}

fn read_dir_at(conn: &Connection, path: &Basepath) -> Result<Vec<FileStat>> {
    let stat = require(conn, path)?;
    if !stat.is_dir {
        return Err(Error::not_a_directory(path));
    }
    Files::read_dir(conn, stat.id)
}

/// A handle on an open store
#[derive(Clone)]
pub struct Dbfs {
    pub(crate) inner: Arc<DbfsInner>,
}

impl std::fmt::Debug for Dbfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dbfs")
            .field("path", &self.inner.config.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Dbfs {
    /// Opens the store, creating it if the database holds no schema yet
    pub fn open(config: DbfsConfig) -> Result<Self> {
        Self::open_with(config, false)
    }

    /// Opens the store, discarding any existing content
    pub fn init(config: DbfsConfig) -> Result<Self> {
        Self::open_with(config, true)
    }

    fn open_with(config: DbfsConfig, init: bool) -> Result<Self> {
        let locker = FileLocker::new();
        let store = TransactionManager::open(&config, Arc::clone(&locker), init)?;
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            debug!("No tokio runtime, streams will not auto-close");
        }
        Ok(Dbfs {
            inner: Arc::new(DbfsInner {
                config,
                store,
                locker,
                runtime,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &DbfsConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.store.is_closed()
    }

    /// True if both handles refer to the same open store
    #[must_use]
    pub fn same_store(&self, other: &Dbfs) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of files with an open stream
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.inner.locker.len()
    }

    /// Stops accepting mutations, waits a bounded time for open streams
    /// and transactions to drain, then closes the connection
    pub async fn close(&self) -> bool {
        self.inner.store.close().await
    }

    /// Like close, but also refuses new streams while draining
    pub async fn pause(&self) -> bool {
        self.inner.store.pause().await
    }

    /// Reopens the store on next access
    pub fn resume(&self) {
        self.inner.store.resume();
    }

    /// Runs `f` in one transaction. On error everything `f` did is undone.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DbfsTxn<'_>) -> Result<T>,
    {
        self.inner.store.write(|tx| {
            f(&DbfsTxn {
                inner: &self.inner,
                tx,
            })
        })
    }

    pub(crate) fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.inner.store.read(f)
    }

    pub fn dir_path_of(&self, dir_id: i64) -> Result<Option<String>> {
        self.read(|conn| Dirs::path_of(conn, dir_id))
    }

    pub fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        let path = Basepath::from(path)?;
        self.read(|conn| stat_at(conn, &path))
    }

    /// Live children of the directory at `path`
    pub fn read_dir(&self, path: &str) -> Result<Vec<FileStat>> {
        let path = Basepath::from(path)?;
        self.read(|conn| read_dir_at(conn, &path))
    }

    pub fn read_dir_of(&self, dir_id: i64) -> Result<Vec<FileStat>> {
        self.read(|conn| Files::read_dir(conn, dir_id))
    }

    /// Link targets recorded for the file at `path`
    pub fn refs_from(&self, path: &str) -> Result<Vec<String>> {
        let path = Basepath::from(path)?;
        self.read(|conn| match stat_at(conn, &path)? {
            Some(stat) => Xrefs::targets(conn, stat.id),
            None => Ok(Vec::new()),
        })
    }

    /// Live files linking to `path`
    pub fn refs_to(&self, path: &str) -> Result<Vec<DeletedFileStat>> {
        let path = Basepath::from(path)?;
        self.read(|conn| Xrefs::sources(conn, path.as_str()))
    }

    /// Recomputes the checksum of the stored content and compares it with
    /// the recorded one
    pub fn verify(&self, path: &str) -> Result<bool> {
        let path = Basepath::from(path)?;
        self.read(|conn| {
            let stat = require_file(conn, &path)?;
            let mut hasher = Sha256::new();
            let mut length = 0i64;
            Contents::for_each(conn, stat.id, |content| {
                hasher.update(&content.data);
                length += content.len() as i64;
                Ok(())
            })?;
            let ok = length == stat.length && Some(Checksum::finish(hasher)) == stat.checksum;
            if !ok {
                warn!("Checksum mismatch for {path}", path: path.to_string());
            }
            Ok(ok)
        })
    }

    /// Opens a reader on the file at `path`, taking a read lock on it
    pub fn input_stream(&self, path: &str) -> Result<(DbfsReader, FileStat)> {
        let path = Basepath::from(path)?;
        let (stat, infos, lock) = self.read(|conn| {
            let stat = require_file(conn, &path)?;
            let lock = lock_stat(&self.inner, &stat, false)?;
            let infos = Contents::infos(conn, stat.id)?;
            Ok((stat, infos, lock))
        })?;
        let reader = DbfsReader::new(Arc::clone(&self.inner), stat.clone(), infos, lock);
        Ok((reader, stat))
    }

    /// Opens a reader on any file row, deleted or not
    pub fn input_stream_of(&self, stat: &FileStat) -> Result<DbfsReader> {
        if stat.is_dir {
            return Err(Error::not_a_file(&stat.name));
        }
        let (stat, infos, lock) = self.read(|conn| {
            let stat = Files::get(conn, stat.id)?.ok_or_else(|| Error::not_found(&stat.name))?;
            let lock = lock_stat(&self.inner, &stat, false)?;
            let infos = Contents::infos(conn, stat.id)?;
            Ok((stat, infos, lock))
        })?;
        Ok(DbfsReader::new(Arc::clone(&self.inner), stat, infos, lock))
    }

    /// Opens a writer on `path`. The parent directory must exist. Without
    /// `append` an existing file is deleted first and a new one started.
    pub fn output_stream(&self, path: &str, append: bool) -> Result<DbfsWriter> {
        let path = Basepath::from(path)?;
        let (file_id, lock, point) = self.transaction(|txn| {
            if let Some(stat) = stat_at(txn.tx, &path)? {
                if stat.is_dir {
                    return Err(Error::invalid_destination(&path));
                }
                if append {
                    let lock = txn.lock(&stat, true)?;
                    let point = AppendPoint::load(txn.tx, stat.id)?;
                    return Ok((stat.id, lock, Some(point)));
                }
                if !stat.writable || !txn.delete_existing(&stat)? {
                    return Err(Error::invalid_destination(&path));
                }
            }
            let parent = path.parent().ok_or_else(|| Error::invalid_destination(&path))?;
            let dir = stat_at(txn.tx, &parent)?
                .filter(|stat| stat.is_dir)
                .ok_or_else(|| Error::invalid_destination(&path))?;
            let id = Files::create(txn.tx, dir.id, path.name(), false, now())?;
            let lock = txn.lock_id(id, &path, true)?;
            Ok((id, lock, None))
        })?;
        debug!("Opened writer {path} append={append}", path: path.to_string(), append: append);
        Ok(DbfsWriter::new(
            Arc::clone(&self.inner),
            path.to_string(),
            file_id,
            lock,
            point,
        ))
    }

    /// Streams the stored bytes of the file at `src` into `writer`
    pub fn copy_to<W: Write + ?Sized>(&self, writer: &mut W, src: &str) -> Result<u64> {
        let src = Basepath::from(src)?;
        self.read(|conn| {
            let stat = require_file(conn, &src)?;
            let _lock = lock_stat(&self.inner, &stat, false)?;
            let mut written = 0u64;
            Contents::for_each(conn, stat.id, |content| {
                writer.write_all(&content.data)?;
                written += content.len() as u64;
                Ok(())
            })?;
            Ok(written)
        })
    }

    pub fn mkdirs(&self, path: &str) -> Result<i64> {
        self.transaction(|txn| txn.mkdirs(path))
    }

    pub fn write(
        &self,
        path: &str,
        data: &[u8],
        xrefs: Option<&[String]>,
        timestamp: Option<i64>,
    ) -> Result<FileStat> {
        self.transaction(|txn| txn.write(path, data, xrefs, timestamp))
    }

    pub fn write_from<R: Read + ?Sized>(
        &self,
        path: &str,
        reader: &mut R,
        xrefs: Option<&[String]>,
        timestamp: Option<i64>,
    ) -> Result<FileStat> {
        self.transaction(|txn| txn.write_from(path, reader, xrefs, timestamp))
    }

    /// Stores a crash recovery snapshot for `path` in the trash. Without
    /// `data` the current content of the live file is snapshotted. Returns
    /// false if the snapshot could not be stored.
    pub fn write_recovery(
        &self,
        path: &str,
        data: Option<&mut dyn Read>,
        timestamp: Option<i64>,
    ) -> bool {
        match self.transaction(|txn| txn.write_recovery(path, data, timestamp)) {
            Ok(()) => true,
            Err(err) => {
                warn!("Recovery snapshot of {path} failed: {error}", path: path, error: err.to_string());
                false
            }
        }
    }

    pub fn delete(&self, path: &str) -> Result<bool> {
        self.transaction(|txn| txn.delete(path))
    }

    pub fn delete_stat(&self, stat: &FileStat) -> Result<bool> {
        self.transaction(|txn| txn.delete_stat(stat))
    }

    pub fn copy(&self, dst: &str, src: &str, timestamp: Option<i64>) -> Result<FileStat> {
        self.transaction(|txn| txn.copy(dst, src, timestamp))
    }

    pub fn rename_to(&self, dst: &str, src: &str, timestamp: Option<i64>) -> Result<FileStat> {
        self.transaction(|txn| txn.rename_to(dst, src, timestamp))
    }

    pub fn set_last_modified(&self, path: &str, timestamp: i64) -> Result<bool> {
        self.transaction(|txn| txn.set_last_modified(path, timestamp))
    }

    pub fn set_writable(&self, path: &str, writable: bool) -> Result<bool> {
        self.transaction(|txn| txn.set_writable(path, writable))
    }

    pub fn update_xrefs<S: AsRef<str>>(&self, path: &str, xrefs: &[S]) -> Result<bool> {
        self.transaction(|txn| txn.update_xrefs(path, xrefs))
    }

    pub fn prune(&self, stat: &FileStat) -> Result<bool> {
        self.transaction(|txn| txn.prune(stat))
    }
}

fn lock_stat(inner: &DbfsInner, stat: &FileStat, write: bool) -> Result<FileLock> {
    inner
        .locker
        .lock(stat.id, write)
        .ok_or_else(|| Error::in_use(&stat.name))
}

/// Engine operations inside an open transaction
pub struct DbfsTxn<'a> {
    pub(crate) inner: &'a DbfsInner,
    pub(crate) tx: &'a Tx<'a>,
}

impl DbfsTxn<'_> {
    /// Runs `f` in a nested savepoint. An error undoes only the nested work.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DbfsTxn<'_>) -> Result<T>,
    {
        let inner = self.inner;
        self.tx.transaction(|tx| f(&DbfsTxn { inner, tx }))
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.tx.depth()
    }

    pub(crate) fn lock(&self, stat: &FileStat, write: bool) -> Result<FileLock> {
        lock_stat(self.inner, stat, write)
    }

    fn lock_id(&self, id: i64, path: &Basepath, write: bool) -> Result<FileLock> {
        self.inner
            .locker
            .lock(id, write)
            .ok_or_else(|| Error::in_use(path))
    }

    pub fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        stat_at(self.tx, &Basepath::from(path)?)
    }

    pub fn read_dir(&self, path: &str) -> Result<Vec<FileStat>> {
        read_dir_at(self.tx, &Basepath::from(path)?)
    }

    /// Creates every missing directory along `path` and returns the id of
    /// the last one
    pub fn mkdirs(&self, path: &str) -> Result<i64> {
        self.mkdirs_at(&Basepath::from(path)?)
    }

    pub(crate) fn mkdirs_at(&self, path: &Basepath) -> Result<i64> {
        if path.is_root() {
            return Ok(ROOT_ID);
        }
        let mut dir_id = ROOT_ID;
        let mut current = String::new();
        for name in path.as_str().split(crate::path::SEP) {
            current = crate::path::join_rpath(&current, name);
            dir_id = match Files::stat_in(self.tx, dir_id, name)? {
                Some(stat) if stat.is_dir => stat.id,
                Some(_) => return Err(Error::invalid_destination(&current)),
                None => {
                    let id = Files::create(self.tx, dir_id, name, true, now())?;
                    Dirs::create(self.tx, id, &current)?;
                    debug!("Created directory {current} as {id}", current: current.clone(), id: id);
                    id
                }
            };
        }
        Ok(dir_id)
    }

    /// Deletes an existing destination file so that it can be rewritten,
    /// then makes sure its parent chain exists
    fn prepare_to_write(&self, dst: &Basepath) -> Result<i64> {
        if dst.is_root() {
            return Err(Error::invalid_destination(dst));
        }
        if let Some(stat) = stat_at(self.tx, dst)? {
            if stat.is_dir || !stat.writable || !self.delete_existing(&stat)? {
                return Err(Error::invalid_destination(dst));
            }
        }
        match dst.parent() {
            Some(parent) => self.mkdirs_at(&parent),
            None => Err(Error::invalid_destination(dst)),
        }
    }

    fn finish_write(
        &self,
        dst: &Basepath,
        id: i64,
        stored: (i64, Checksum),
        xrefs: Option<&[String]>,
        modified: i64,
    ) -> Result<FileStat> {
        let (length, checksum) = stored;
        _ = Files::update_content(self.tx, id, length, modified, Some(&checksum))?;
        if let Some(xrefs) = xrefs {
            Xrefs::set(self.tx, id, xrefs)?;
        }
        debug!("Wrote {path} length {length}", path: dst.to_string(), length: length);
        Files::get(self.tx, id)?.ok_or_else(|| Error::not_found(dst))
    }

    /// Replaces the file at `path` with `data`
    pub fn write(
        &self,
        path: &str,
        data: &[u8],
        xrefs: Option<&[String]>,
        timestamp: Option<i64>,
    ) -> Result<FileStat> {
        let mut reader = data;
        self.write_from(path, &mut reader, xrefs, timestamp)
    }

    /// Replaces the file at `path` with everything `reader` yields
    pub fn write_from<R: Read + ?Sized>(
        &self,
        path: &str,
        reader: &mut R,
        xrefs: Option<&[String]>,
        timestamp: Option<i64>,
    ) -> Result<FileStat> {
        let dst = Basepath::from(path)?;
        let dir_id = self.prepare_to_write(&dst)?;
        let modified = timestamp.unwrap_or_else(now);
        let id = Files::create(self.tx, dir_id, dst.name(), false, modified)?;
        let stored = store_content(self.tx, id, reader)?;
        self.finish_write(&dst, id, stored, xrefs, modified)
    }

    /// Stores a snapshot of `path` as a soft-deleted entry. Missing parent
    /// directories are created soft-deleted too, the live tree is not
    /// touched.
    pub fn write_recovery(
        &self,
        path: &str,
        data: Option<&mut dyn Read>,
        timestamp: Option<i64>,
    ) -> Result<()> {
        let dst = Basepath::from(path)?;
        if dst.is_root() {
            return Err(Error::invalid_destination(&dst));
        }
        let deleted_at = now();
        let modified = timestamp.unwrap_or(deleted_at);
        match data {
            None => {
                let src = require_file(self.tx, &dst)?;
                let _lock = self.lock(&src, false)?;
                let dir_id = self.recovery_dir(dst.dir(), deleted_at)?;
                let id = Files::create_deleted(
                    self.tx,
                    dir_id,
                    dst.name(),
                    false,
                    modified,
                    src.length,
                    deleted_at,
                    src.checksum.as_ref(),
                )?;
                _ = Contents::copy(self.tx, id, src.id)?;
            }
            Some(reader) => {
                let dir_id = self.recovery_dir(dst.dir(), deleted_at)?;
                let id = Files::create_deleted(
                    self.tx,
                    dir_id,
                    dst.name(),
                    false,
                    modified,
                    0,
                    deleted_at,
                    None,
                )?;
                let (length, checksum) = store_content(self.tx, id, reader)?;
                _ = Files::update_content(self.tx, id, length, modified, Some(&checksum))?;
            }
        }
        debug!("Stored recovery snapshot of {path}", path: dst.to_string());
        Ok(())
    }

    /// Id of the directory at `dir`, creating soft-deleted entries for any
    /// missing part of it
    fn recovery_dir(&self, dir: &str, deleted_at: i64) -> Result<i64> {
        if let Some(id) = Dirs::id_of(self.tx, dir)? {
            return Ok(id);
        }
        let (parent, name) = crate::path::split(dir);
        let parent_id = self.recovery_dir(parent, deleted_at)?;
        let id = Files::create_deleted(
            self.tx, parent_id, name, true, deleted_at, 0, deleted_at, None,
        )?;
        Dirs::create(self.tx, id, dir)?;
        Ok(id)
    }

    /// Deletes the entry at `path`. Directories must be empty. Returns false
    /// if there is nothing to delete.
    pub fn delete(&self, path: &str) -> Result<bool> {
        match stat_at(self.tx, &Basepath::from(path)?)? {
            Some(stat) => self.delete_stat(&stat),
            None => Ok(false),
        }
    }

    pub fn delete_stat(&self, stat: &FileStat) -> Result<bool> {
        if stat.id == ROOT_ID {
            return Ok(false);
        }
        if stat.is_dir && !Files::is_empty_dir(self.tx, stat.id)? {
            return Ok(false);
        }
        self.delete_existing(stat)
    }

    /// Soft deletes or prunes, depending on whether history is kept
    fn delete_existing(&self, stat: &FileStat) -> Result<bool> {
        let _lock = self.lock(stat, true)?;
        let count = if self.inner.config.keep_history {
            Files::delete(self.tx, stat.id, now())?
        } else {
            self.prune_row(stat)?
        };
        Ok(count > 0)
    }

    /// Removes a row with everything hanging off it
    pub(crate) fn prune_row(&self, stat: &FileStat) -> Result<usize> {
        let count = Files::prune(self.tx, stat.id)?;
        if stat.is_dir {
            _ = Dirs::prune(self.tx, stat.id)?;
        } else {
            _ = Contents::prune(self.tx, stat.id)?;
            _ = Xrefs::prune_from(self.tx, stat.id)?;
        }
        Ok(count)
    }

    /// Copies the live file at `src` to `dst`
    pub fn copy(&self, dst: &str, src: &str, timestamp: Option<i64>) -> Result<FileStat> {
        let src = require_file(self.tx, &Basepath::from(src)?)?;
        self.copy_stat(&Basepath::from(dst)?, &src, timestamp)
    }

    /// Copies the content of any file row, deleted or not, to `dst`
    pub(crate) fn copy_stat(
        &self,
        dst: &Basepath,
        src: &FileStat,
        timestamp: Option<i64>,
    ) -> Result<FileStat> {
        let _lock = self.lock(src, false)?;
        if let Some(existing) = stat_at(self.tx, dst)? {
            if existing.id == src.id {
                return Err(Error::invalid_destination(dst));
            }
        }
        let dir_id = self.prepare_to_write(dst)?;
        let modified = timestamp.unwrap_or_else(now);
        let id = Files::create(self.tx, dir_id, dst.name(), false, modified)?;
        _ = Contents::copy(self.tx, id, src.id)?;
        _ = Files::update_content(self.tx, id, src.length, modified, src.checksum.as_ref())?;
        Files::get(self.tx, id)?.ok_or_else(|| Error::not_found(dst))
    }

    /// Moves `src` to `dst`, which must not exist. Renaming a directory
    /// rewrites the path of every directory below it.
    pub fn rename_to(&self, dst: &str, src: &str, timestamp: Option<i64>) -> Result<FileStat> {
        let dst = Basepath::from(dst)?;
        let src = Basepath::from(src)?;
        let stat = require(self.tx, &src)?;
        if src.is_root() || dst.is_root() || stat_at(self.tx, &dst)?.is_some() {
            return Err(Error::invalid_destination(&dst));
        }
        if stat.is_dir && dst.as_str().starts_with(&format!("{}/", src)) {
            return Err(Error::invalid_destination(&dst));
        }
        let _lock = self.lock(&stat, true)?;
        let parent = dst.parent().ok_or_else(|| Error::invalid_destination(&dst))?;
        let dir_id = self.mkdirs_at(&parent)?;
        let modified = timestamp.unwrap_or_else(now);
        _ = Files::rename(self.tx, stat.id, dir_id, dst.name(), modified)?;
        if stat.is_dir {
            self.rename_dirs(stat.id, dst.as_str())?;
        }
        info!("Renamed {src} to {dst}", src: src.to_string(), dst: dst.to_string());
        Files::get(self.tx, stat.id)?.ok_or_else(|| Error::not_found(&dst))
    }

    /// Rewrites the stored path of directory `id` and of all directories
    /// below it
    fn rename_dirs(&self, id: i64, path: &str) -> Result<()> {
        let mut work = vec![(id, path.to_string())];
        while let Some((id, path)) = work.pop() {
            _ = Dirs::rename(self.tx, id, &path)?;
            for child in Dirs::children(self.tx, id)? {
                let (_, name) = crate::path::split(&child.path);
                work.push((child.id, crate::path::join_rpath(&path, name)));
            }
        }
        Ok(())
    }

    pub fn set_last_modified(&self, path: &str, timestamp: i64) -> Result<bool> {
        match stat_at(self.tx, &Basepath::from(path)?)? {
            Some(stat) => Ok(Files::set_last_modified(self.tx, stat.id, timestamp)? > 0),
            None => Ok(false),
        }
    }

    pub fn set_writable(&self, path: &str, writable: bool) -> Result<bool> {
        match stat_at(self.tx, &Basepath::from(path)?)? {
            Some(stat) => Ok(Files::set_writable(self.tx, stat.id, writable)? > 0),
            None => Ok(false),
        }
    }

    /// Replaces the link targets of the file at `path`
    pub fn update_xrefs<S: AsRef<str>>(&self, path: &str, xrefs: &[S]) -> Result<bool> {
        match stat_at(self.tx, &Basepath::from(path)?)? {
            Some(stat) => {
                Xrefs::set(self.tx, stat.id, xrefs)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes a file row and its content whether deleted or not. An empty
    /// directory is only soft deleted.
    pub fn prune(&self, stat: &FileStat) -> Result<bool> {
        if stat.is_dir {
            if stat.id != ROOT_ID && Files::is_empty_dir(self.tx, stat.id)? {
                return Ok(Files::delete(self.tx, stat.id, now())? > 0);
            }
            return Ok(false);
        }
        Ok(self.prune_row(stat)? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &tempfile::TempDir) -> Dbfs {
        Dbfs::open(DbfsConfig::new(dir.path().join("fs.db"))).unwrap()
    }

    #[test]
    fn test_mkdirs_is_idempotent() {
        let dir = tempdir().unwrap();
        let fs = open(&dir);
        let id = fs.mkdirs("home/a/b").unwrap();
        assert_eq!(fs.mkdirs("/home/a/b/").unwrap(), id);
        assert_eq!(fs.mkdirs("").unwrap(), ROOT_ID);
        assert_eq!(fs.read_dir("home/a").unwrap().len(), 1);
        assert_eq!(fs.dir_path_of(id).unwrap().as_deref(), Some("home/a/b"));
    }

    #[test]
    fn test_mkdirs_through_file_fails() {
        let dir = tempdir().unwrap();
        let fs = open(&dir);
        _ = fs.write("home/f", b"x", None, None).unwrap();
        let err = fs.mkdirs("home/f/sub").unwrap_err();
        assert!(matches!(err, Error::InvalidDestination(_)));
    }

    #[test]
    fn test_write_replaces_and_keeps_history() {
        let dir = tempdir().unwrap();
        let fs = open(&dir);
        let first = fs.write("home/a.txt", b"one", None, Some(1000)).unwrap();
        let second = fs.write("home/a.txt", b"two", None, Some(2000)).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.last_modified, 2000);
        assert_eq!(second.checksum, Some(Checksum::of(b"two")));

        let history = fs.history("home", "home", "a.txt", false, -1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id(), first.id);
    }

    #[test]
    fn test_read_only_destination_is_invalid() {
        let dir = tempdir().unwrap();
        let fs = open(&dir);
        _ = fs.write("home/ro", b"1", None, None).unwrap();
        assert!(fs.set_writable("home/ro", false).unwrap());
        let err = fs.write("home/ro", b"2", None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidDestination(_)));
        assert!(!fs.stat("home/ro").unwrap().unwrap().writable);
    }

    #[test]
    fn test_delete_only_empty_dirs() {
        let dir = tempdir().unwrap();
        let fs = open(&dir);
        _ = fs.write("home/d/f", b"x", None, None).unwrap();
        assert!(!fs.delete("home/d").unwrap());
        assert!(fs.delete("home/d/f").unwrap());
        assert!(fs.delete("home/d").unwrap());
        assert!(fs.stat("home/d").unwrap().is_none());
        assert!(!fs.delete("home/d").unwrap());
    }

    #[test]
    fn test_hard_delete_without_history() {
        let dir = tempdir().unwrap();
        let fs = Dbfs::open(DbfsConfig::new(dir.path().join("fs.db")).with_keep_history(false))
            .unwrap();
        let stat = fs.write("home/f", b"gone", None, None).unwrap();
        assert!(fs.delete("home/f").unwrap());
        fs.read(|conn| {
            assert!(Files::get(conn, stat.id)?.is_none());
            assert!(Contents::infos(conn, stat.id)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_xrefs_follow_file() {
        let dir = tempdir().unwrap();
        let fs = open(&dir);
        let refs = vec!["home/img.png".to_string()];
        _ = fs.write("home/page.html", b"<img>", Some(&refs), None).unwrap();
        assert_eq!(fs.refs_from("home/page.html").unwrap(), refs);
        let sources = fs.refs_to("home/img.png").unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].path(), "home/page.html");

        assert!(fs.update_xrefs::<&str>("home/page.html", &[]).unwrap());
        assert!(fs.refs_to("home/img.png").unwrap().is_empty());
    }

    #[test]
    fn test_copy_keeps_checksum() {
        let dir = tempdir().unwrap();
        let fs = open(&dir);
        let src = fs.write("home/src", b"payload", None, Some(5)).unwrap();
        let dst = fs.copy("home/x/dst", "home/src", Some(9)).unwrap();
        assert_ne!(src.id, dst.id);
        assert_eq!(dst.length, src.length);
        assert_eq!(dst.checksum, src.checksum);
        assert_eq!(dst.last_modified, 9);
        let mut out = Vec::new();
        assert_eq!(fs.copy_to(&mut out, "home/x/dst").unwrap(), 7);
        assert_eq!(out, b"payload");
        assert!(fs.verify("home/x/dst").unwrap());
    }
}
