//! Seekable content reader with a small part cache

use crate::error::{Error, Result};
use crate::fs::DbfsInner;
use crate::locker::FileLock;
use crate::schema::Contents;
use crate::stat::{Content, ContentInfo, FileStat};
use crate::watchdog::Watchdog;
use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

/// Most recently used content parts, keyed by content id
#[derive(Debug)]
pub(crate) struct ContentCache {
    entries: VecDeque<Content>,
    capacity: usize,
}

impl ContentCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Returns the part with `id`, loading it on a miss and evicting the
    /// least recently used entry when full.
    pub(crate) fn get<F>(&mut self, id: i64, load: F) -> Result<&Content>
    where
        F: FnOnce() -> Result<Content>,
    {
        if let Some(index) = self.entries.iter().position(|c| c.id == id) {
            if let Some(content) = self.entries.remove(index) {
                self.entries.push_front(content);
            }
        } else {
            let content = load()?;
            if self.entries.len() >= self.capacity {
                _ = self.entries.pop_back();
            }
            self.entries.push_front(content);
        }
        self.entries.front().ok_or(Error::Eof)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, id: i64) -> bool {
        self.entries.iter().any(|c| c.id == id)
    }
}

struct ReaderState {
    inner: Arc<DbfsInner>,
    stat: FileStat,
    infos: Vec<ContentInfo>,
    length: i64,
    position: i64,
    cache: ContentCache,
    lock: Option<FileLock>,
}

impl ReaderState {
    fn is_closed(&self) -> bool {
        self.lock.is_none()
    }

    fn close(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }

    /// Index of the part holding `position`
    fn part_at(&self, position: i64) -> Option<usize> {
        let index = self.infos.partition_point(|info| info.end() <= position);
        (index < self.infos.len() && self.infos[index].contains(position)).then_some(index)
    }

    fn read_at(&mut self, mut position: i64, buf: &mut [u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut filled = 0;
        while filled < buf.len() && position < self.length {
            let Some(index) = self.part_at(position) else {
                break;
            };
            let info = self.infos[index];
            let inner = Arc::clone(&self.inner);
            let path = &self.stat.name;
            let content = self.cache.get(info.id, || {
                inner
                    .store
                    .read(|conn| Contents::get(conn, info.id))?
                    .ok_or_else(|| Error::not_found(path))
            })?;
            let start = (position - content.offset) as usize;
            let n = (content.len() - start).min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&content.data[start..start + n]);
            filled += n;
            position += n as i64;
        }
        Ok(filled)
    }
}

/// Input stream over the stored content of one file. Holds a read lock on
/// the file until closed or dropped.
///
/// The part index is loaded when the reader is opened. A reader that sees no
/// I/O for the configured idle time releases its lock and fails further reads
/// with `Error::Closed`.
pub struct DbfsReader {
    state: Arc<Mutex<ReaderState>>,
    watchdog: Option<Watchdog>,
}

impl DbfsReader {
    pub(crate) fn new(
        inner: Arc<DbfsInner>,
        stat: FileStat,
        infos: Vec<ContentInfo>,
        lock: FileLock,
    ) -> Self {
        let length = infos.last().map(ContentInfo::end).unwrap_or(0);
        let runtime = inner.runtime.clone();
        let timeout = inner.config.auto_close();
        let cache = ContentCache::new(inner.config.cache_entries);
        let state = Arc::new(Mutex::new(ReaderState {
            inner,
            stat,
            infos,
            length,
            position: 0,
            cache,
            lock: Some(lock),
        }));
        let watchdog = runtime.map(|runtime| {
            let idle = Arc::clone(&state);
            Watchdog::start(&runtime, timeout, move |activity| {
                let mut state = idle.lock().unwrap_or_else(|e| e.into_inner());
                if state.is_closed() {
                    return true;
                }
                if activity.idle() < timeout {
                    return false;
                }
                diagnostics::warn!("Closing idle reader {name}", name: state.stat.name.clone());
                state.close();
                true
            })
        });
        DbfsReader { state, watchdog }
    }

    fn state(&self) -> MutexGuard<'_, ReaderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn touch(&self) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.watch();
        }
    }

    /// Stored length in bytes
    #[must_use]
    pub fn len(&self) -> u64 {
        self.state().length as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.state().position as u64
    }

    #[must_use]
    pub fn stat(&self) -> FileStat {
        self.state().stat.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Reads at an absolute position without moving the cursor
    pub fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<usize> {
        self.touch();
        let mut state = self.state();
        if position as i64 > state.length {
            return Err(Error::Eof);
        }
        state.read_at(position as i64, buf)
    }

    /// Reads the rest of the stream
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len().saturating_sub(self.position()) as usize);
        _ = self.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Releases the read lock
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.cancel();
        }
        self.state().close();
    }

    #[cfg(test)]
    pub(crate) fn cached(&self) -> usize {
        self.state().cache.len()
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self, content_id: i64) -> bool {
        self.state().cache.contains(content_id)
    }
}

impl Read for DbfsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.touch();
        let mut state = self.state();
        let position = state.position;
        let n = state.read_at(position, buf)?;
        state.position += n as i64;
        Ok(n)
    }
}

impl Seek for DbfsReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.touch();
        let mut state = self.state();
        if state.is_closed() {
            return Err(Error::Closed.into());
        }
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => state.length + delta,
            SeekFrom::Current(delta) => state.position + delta,
        };
        if target < 0 || target > state.length {
            return Err(Error::Eof.into());
        }
        state.position = target;
        Ok(target as u64)
    }
}

impl Drop for DbfsReader {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for DbfsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("DbfsReader")
            .field("file_id", &state.stat.id)
            .field("length", &state.length)
            .field("position", &state.position)
            .finish()
    }
}
