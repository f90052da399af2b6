//! Chunked content writer

use crate::config::PART_SIZE;
use crate::error::{Error, Result};
use crate::fs::DbfsInner;
use crate::locker::FileLock;
use crate::schema::{Contents, Files};
use crate::stat::{Checksum, Content, FileStat, now};
use crate::watchdog::Watchdog;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Fills `buf` from `reader` until it is full or the reader is exhausted
fn read_part<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Stores everything `reader` yields as the content of `file_id`, one row
/// per part. Returns the length and checksum of the stored bytes.
pub(crate) fn store_content<R: Read + ?Sized>(
    conn: &Connection,
    file_id: i64,
    reader: &mut R,
) -> Result<(i64, Checksum)> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; PART_SIZE];
    let mut offset = 0i64;
    loop {
        let n = read_part(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        _ = Contents::insert(conn, file_id, offset, &buf[..n])?;
        offset += n as i64;
        if n < PART_SIZE {
            break;
        }
    }
    Ok((offset, Checksum::finish(hasher)))
}

/// Where an appending writer picks up an existing file
pub(crate) struct AppendPoint {
    /// File offset of the first byte held in `tail`, or of the next part
    pub offset: i64,
    /// An under-sized final part to be extended in place
    pub tail: Option<Content>,
    /// Digest over every stored byte
    pub hasher: Sha256,
}

impl AppendPoint {
    /// Replays the digest over the stored content of `file_id`
    pub(crate) fn load(conn: &Connection, file_id: i64) -> Result<Self> {
        let mut hasher = Sha256::new();
        let mut last: Option<Content> = None;
        Contents::for_each(conn, file_id, |content| {
            hasher.update(&content.data);
            last = Some(content);
            Ok(())
        })?;
        Ok(match last {
            Some(content) if content.len() < PART_SIZE => AppendPoint {
                offset: content.offset,
                tail: Some(content),
                hasher,
            },
            Some(content) => AppendPoint {
                offset: content.end(),
                tail: None,
                hasher,
            },
            None => AppendPoint {
                offset: 0,
                tail: None,
                hasher,
            },
        })
    }
}

struct WriterState {
    inner: Arc<DbfsInner>,
    path: String,
    file_id: i64,
    lock: Option<FileLock>,
    buffer: Vec<u8>,
    /// File offset of buffer[0]
    offset: i64,
    /// Content row holding the start of `buffer`, when resuming an append
    tail_id: Option<i64>,
    hasher: Sha256,
    closed: Option<FileStat>,
}

impl WriterState {
    fn is_closed(&self) -> bool {
        self.closed.is_some() || self.lock.is_none()
    }

    fn store_part(&mut self, conn: &Connection) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        match self.tail_id.take() {
            Some(id) => {
                _ = Contents::update(conn, id, &self.buffer)?;
            }
            None => {
                _ = Contents::insert(conn, self.file_id, self.offset, &self.buffer)?;
            }
        }
        diagnostics::debug!(
            "Stored part of {path} at {offset} length {length}",
            path: self.path.clone(),
            offset: self.offset,
            length: self.buffer.len()
        );
        self.offset += self.buffer.len() as i64;
        self.buffer.clear();
        Ok(())
    }

    fn flush_full(&mut self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        inner.store.write_stream(|tx| self.store_part(tx))
    }

    fn write(&mut self, mut data: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let total = data.len();
        while !data.is_empty() {
            let room = PART_SIZE - self.buffer.len();
            let n = room.min(data.len());
            self.buffer.extend_from_slice(&data[..n]);
            self.hasher.update(&data[..n]);
            data = &data[n..];
            if self.buffer.len() == PART_SIZE {
                self.flush_full()?;
            }
        }
        Ok(total)
    }

    /// Stores the tail and records length, timestamp and checksum
    fn close(&mut self) -> Result<FileStat> {
        if let Some(stat) = &self.closed {
            return Ok(stat.clone());
        }
        if self.lock.is_none() {
            return Err(Error::Closed);
        }
        let inner = Arc::clone(&self.inner);
        let checksum = Checksum::finish(std::mem::take(&mut self.hasher));
        let file_id = self.file_id;
        let result = inner.store.write_stream(|tx| {
            self.store_part(tx)?;
            _ = Files::update_content(tx, file_id, self.offset, now(), Some(&checksum))?;
            Files::get(tx, file_id)?.ok_or_else(|| Error::not_found(&self.path))
        });
        // The lock goes whatever the outcome, a failed close is not retried
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
        let stat = result?;
        diagnostics::debug!("Closed writer {path} length {length}", path: self.path.clone(), length: stat.length);
        self.closed = Some(stat.clone());
        Ok(stat)
    }
}

/// Output stream over the content of one file. Holds the write lock of the
/// file until closed.
///
/// Parts are stored as soon as they are full, the tail when the writer is
/// closed. A writer that sees no I/O for the configured idle time is closed
/// by its watchdog. Writers must not be used from inside a `Dbfs::transaction`
/// closure on the same thread.
pub struct DbfsWriter {
    state: Arc<Mutex<WriterState>>,
    watchdog: Option<Watchdog>,
}

impl DbfsWriter {
    pub(crate) fn new(
        inner: Arc<DbfsInner>,
        path: String,
        file_id: i64,
        lock: FileLock,
        append: Option<AppendPoint>,
    ) -> Self {
        let mut buffer = Vec::with_capacity(PART_SIZE);
        let (offset, tail_id, hasher) = match append {
            Some(point) => {
                let tail_id = point.tail.map(|tail| {
                    buffer.extend_from_slice(&tail.data);
                    tail.id
                });
                (point.offset, tail_id, point.hasher)
            }
            None => (0, None, Sha256::new()),
        };
        let runtime = inner.runtime.clone();
        let timeout = inner.config.auto_close();
        let state = Arc::new(Mutex::new(WriterState {
            inner,
            path,
            file_id,
            lock: Some(lock),
            buffer,
            offset,
            tail_id,
            hasher,
            closed: None,
        }));

        let watchdog = runtime.map(|runtime| {
            let idle = Arc::clone(&state);
            Watchdog::start(&runtime, timeout, move |activity| {
                let mut state = idle.lock().unwrap_or_else(|e| e.into_inner());
                if state.is_closed() {
                    return true;
                }
                // A write may have landed while the timer fired
                if activity.idle() < timeout {
                    return false;
                }
                diagnostics::warn!("Closing idle writer {path}", path: state.path.clone());
                if let Err(err) = state.close() {
                    diagnostics::warn!("Closing idle writer failed: {error}", error: err.to_string());
                }
                true
            })
        });
        DbfsWriter { state, watchdog }
    }

    fn state(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn touch(&self) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.watch();
        }
    }

    #[must_use]
    pub fn file_id(&self) -> i64 {
        self.state().file_id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Bytes written so far, including resumed content
    #[must_use]
    pub fn position(&self) -> u64 {
        let state = self.state();
        (state.offset + state.buffer.len() as i64) as u64
    }

    /// Stores the remaining bytes and releases the file. Returns the final
    /// stat of the file.
    pub fn close(mut self) -> Result<FileStat> {
        self.finish()
    }

    fn finish(&mut self) -> Result<FileStat> {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.cancel();
        }
        self.state().close()
    }
}

impl Write for DbfsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.touch();
        let written = self.state().write(buf)?;
        self.touch();
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Parts are only stored full or on close
        Ok(())
    }
}

impl Drop for DbfsWriter {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(err) = self.finish() {
            diagnostics::warn!("Closing dropped writer failed: {error}", error: err.to_string());
        }
    }
}

impl std::fmt::Debug for DbfsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("DbfsWriter")
            .field("path", &state.path)
            .field("file_id", &state.file_id)
            .field("closed", &state.is_closed())
            .finish()
    }
}
