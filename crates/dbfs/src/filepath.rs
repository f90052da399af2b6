//! Root relative file handles and tree traversal

use crate::error::{Error, Result};
use crate::path::{Basepath, SEP, join_rpath};
use crate::reader::DbfsReader;
use crate::root::RootInfo;
use crate::stat::FileStat;
use crate::writer::DbfsWriter;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};

/// A file or directory addressed by root and root relative path.
///
/// Two handles are equal when they name the same cleaned path in the same
/// open store. A handle says nothing about existence, every call goes to the
/// store.
#[derive(Clone)]
pub struct Filepath {
    root: RootInfo,
    rpath: String,
    path: Basepath,
}

/// One traversal step: the entry, its path relative to the start of the
/// traversal, and its stat
pub type WalkEntry = (Filepath, String, FileStat);

impl Filepath {
    /// `rpath` may not climb out of the root
    pub(crate) fn new(root: RootInfo, rpath: &str) -> Result<Self> {
        let path = Basepath::from(join_rpath(root.cpath(), rpath))?;
        let rpath = if path.as_str() == root.cpath() {
            String::new()
        } else {
            path.as_str()
                .strip_prefix(root.cpath())
                .and_then(|rest| rest.strip_prefix(SEP))
                .ok_or_else(|| Error::invalid_destination(rpath))?
                .to_string()
        };
        Ok(Filepath { root, rpath, path })
    }

    #[must_use]
    pub fn root(&self) -> &RootInfo {
        &self.root
    }

    #[must_use]
    pub fn rpath(&self) -> &str {
        &self.rpath
    }

    /// Path relative to the store root
    #[must_use]
    pub fn cpath(&self) -> &str {
        self.path.as_str()
    }

    #[must_use]
    pub fn apath(&self) -> String {
        format!("{SEP}{}", self.path)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// None for the root itself
    #[must_use]
    pub fn parent(&self) -> Option<Filepath> {
        if self.rpath.is_empty() {
            return None;
        }
        let (dir, _) = crate::path::split(&self.rpath);
        Some(Filepath {
            root: self.root.clone(),
            rpath: dir.to_string(),
            path: self.path.parent()?,
        })
    }

    /// The entry at `rpath` below this one
    pub fn file_info(&self, rpath: &str) -> Result<Filepath> {
        Filepath::new(self.root.clone(), &join_rpath(&self.rpath, rpath))
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.stat()?.is_some())
    }

    pub fn stat(&self) -> Result<Option<FileStat>> {
        self.root.fs().stat(self.cpath())
    }

    fn require(&self) -> Result<FileStat> {
        self.stat()?.ok_or_else(|| Error::not_found(self.cpath()))
    }

    pub fn read_dir(&self) -> Result<Vec<FileStat>> {
        self.root.fs().read_dir(self.cpath())
    }

    /// Handles on the live children of this directory
    pub fn children(&self) -> Result<Vec<Filepath>> {
        self.read_dir()?
            .iter()
            .map(|stat| self.file_info(&stat.name))
            .collect()
    }

    /// None if nothing exists here, otherwise whether the directory has no
    /// children or the file no content
    pub fn is_empty(&self) -> Result<Option<bool>> {
        match self.stat()? {
            None => Ok(None),
            Some(stat) if stat.is_dir => Ok(Some(self.read_dir()?.is_empty())),
            Some(stat) => Ok(Some(stat.length == 0)),
        }
    }

    pub fn mkdirs(&self) -> Result<()> {
        _ = self.root.fs().mkdirs(self.cpath())?;
        Ok(())
    }

    /// Creates the parent chain. False for the root, which has none.
    pub fn mkparent(&self) -> Result<bool> {
        match self.parent() {
            Some(parent) => {
                parent.mkdirs()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn delete(&self) -> Result<bool> {
        self.root.fs().delete(self.cpath())
    }

    pub fn input_stream(&self) -> Result<DbfsReader> {
        Ok(self.root.fs().input_stream(self.cpath())?.0)
    }

    /// A reader together with the stat it was opened on
    pub fn input_stream_with_stat(&self) -> Result<(DbfsReader, FileStat)> {
        self.root.fs().input_stream(self.cpath())
    }

    pub fn output_stream(&self, append: bool) -> Result<DbfsWriter> {
        self.root.fs().output_stream(self.cpath(), append)
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        self.input_stream()?.read_all()
    }

    pub fn read_text(&self) -> Result<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err).into())
    }

    pub fn write(
        &self,
        data: &[u8],
        xrefs: Option<&[String]>,
        timestamp: Option<i64>,
    ) -> Result<FileStat> {
        self.root.fs().write(self.cpath(), data, xrefs, timestamp)
    }

    pub fn write_from<R: Read + ?Sized>(
        &self,
        reader: &mut R,
        xrefs: Option<&[String]>,
        timestamp: Option<i64>,
    ) -> Result<FileStat> {
        self.root.fs().write_from(self.cpath(), reader, xrefs, timestamp)
    }

    pub fn write_recovery(&self, data: Option<&mut dyn Read>, timestamp: Option<i64>) -> bool {
        self.root.fs().write_recovery(self.cpath(), data, timestamp)
    }

    /// Streams the content into `writer`, returning the byte count
    pub fn copy_to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<u64> {
        self.root.fs().copy_to(writer, self.cpath())
    }

    fn same_store(&self, other: &Filepath) -> bool {
        self.root.fs().same_store(other.root.fs())
    }

    /// Checks that this is a file and clears a file in the way at `dst`
    fn prepare_transfer(&self, dst: &Filepath) -> Result<()> {
        if self.require()?.is_dir {
            return Err(Error::not_a_file(self.cpath()));
        }
        if let Some(existing) = dst.stat()? {
            if existing.is_dir || !dst.delete()? {
                return Err(Error::invalid_destination(dst.cpath()));
            }
        }
        Ok(())
    }

    fn transfer(&self, dst: &Filepath, timestamp: Option<i64>) -> Result<FileStat> {
        if self.same_store(dst) {
            return self.root.fs().copy(dst.cpath(), self.cpath(), timestamp);
        }
        let mut reader = self.input_stream()?;
        dst.write_from(&mut reader, None, timestamp)
    }

    /// Copies this file to `dst`, replacing a file there. `dst` may be in
    /// another store.
    pub fn copy_to(&self, dst: &Filepath, timestamp: Option<i64>) -> Result<FileStat> {
        self.prepare_transfer(dst)?;
        self.transfer(dst, timestamp)
    }

    /// Moves this file to `dst`, replacing a file there. Within one store
    /// this is a rename, across stores a copy followed by a delete.
    pub fn move_to(&self, dst: &Filepath, timestamp: Option<i64>) -> Result<FileStat> {
        self.prepare_transfer(dst)?;
        if let Some(stat) = self.rename_to(dst, timestamp)? {
            return Ok(stat);
        }
        let stat = self.transfer(dst, timestamp)?;
        if !self.delete()? {
            return Err(Error::in_use(self.cpath()));
        }
        Ok(stat)
    }

    /// Renames within the same store. None if `dst` lives in another store.
    pub fn rename_to(&self, dst: &Filepath, timestamp: Option<i64>) -> Result<Option<FileStat>> {
        if !self.same_store(dst) {
            return Ok(None);
        }
        self.root
            .fs()
            .rename_to(dst.cpath(), self.cpath(), timestamp)
            .map(Some)
    }

    pub fn set_last_modified(&self, timestamp: i64) -> Result<bool> {
        self.root.fs().set_last_modified(self.cpath(), timestamp)
    }

    pub fn set_writable(&self, writable: bool) -> Result<bool> {
        self.root.fs().set_writable(self.cpath(), writable)
    }

    /// Visits the tree below this directory in pre-order. `callback` gets
    /// each entry with its path relative to `rpath` and decides whether to
    /// descend into it.
    pub fn scan<F>(&self, rpath: &str, mut callback: F) -> Result<()>
    where
        F: FnMut(&Filepath, &str, &FileStat) -> bool,
    {
        if !self.require()?.is_dir {
            return Err(Error::not_a_directory(self.cpath()));
        }
        let mut stack = vec![(self.clone(), rpath.to_string(), self.read_dir()?.into_iter())];
        while let Some((dir, prefix, entries)) = stack.last_mut() {
            let Some(stat) = entries.next() else {
                _ = stack.pop();
                continue;
            };
            let file = dir.file_info(&stat.name)?;
            let rpath = join_rpath(prefix, &stat.name);
            if callback(&file, &rpath, &stat) && stat.is_dir {
                let entries = file.read_dir()?.into_iter();
                stack.push((file, rpath, entries));
            }
        }
        Ok(())
    }

    /// Lazily walks the tree below this directory. With `bottom_up` a
    /// directory comes after its children. The iterator cannot be restarted.
    pub fn walk(&self, bottom_up: bool) -> Result<Walk> {
        if !self.require()?.is_dir {
            return Err(Error::not_a_directory(self.cpath()));
        }
        Ok(Walk {
            bottom_up,
            stack: vec![Frame {
                entries: self.read_dir()?.into_iter(),
                dir: self.clone(),
                rpath: String::new(),
                pending: None,
            }],
        })
    }
}

struct Frame {
    dir: Filepath,
    rpath: String,
    entries: std::vec::IntoIter<FileStat>,
    /// The directory itself, emitted once its children are done
    pending: Option<WalkEntry>,
}

/// Iterator returned by `Filepath::walk`
pub struct Walk {
    bottom_up: bool,
    stack: Vec<Frame>,
}

impl Walk {
    fn step(&mut self) -> Result<Option<WalkEntry>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            let Some(stat) = frame.entries.next() else {
                if let Some(entry) = self.stack.pop().and_then(|frame| frame.pending) {
                    return Ok(Some(entry));
                }
                continue;
            };
            let file = frame.dir.file_info(&stat.name)?;
            let rpath = join_rpath(&frame.rpath, &stat.name);
            if !stat.is_dir {
                return Ok(Some((file, rpath, stat)));
            }
            let entries = file.read_dir()?.into_iter();
            let entry = (file.clone(), rpath.clone(), stat);
            let (pending, emit) = if self.bottom_up {
                (Some(entry), None)
            } else {
                (None, Some(entry))
            };
            self.stack.push(Frame {
                dir: file,
                rpath,
                entries,
                pending,
            });
            if emit.is_some() {
                return Ok(emit);
            }
        }
    }
}

impl Iterator for Walk {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(entry) => entry.map(Ok),
            Err(err) => {
                self.stack.clear();
                Some(Err(err))
            }
        }
    }
}

impl PartialEq for Filepath {
    fn eq(&self, other: &Self) -> bool {
        self.same_store(other) && self.path == other.path
    }
}

impl Eq for Filepath {}

impl Hash for Filepath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl std::fmt::Debug for Filepath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Filepath({})", self.apath())
    }
}

impl std::fmt::Display for Filepath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.apath())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbfsConfig;
    use crate::fs::Dbfs;
    use tempfile::tempdir;

    fn home(dir: &tempfile::TempDir) -> RootInfo {
        let fs = Dbfs::open(DbfsConfig::new(dir.path().join("fs.db"))).unwrap();
        RootInfo::new(&fs, "home").unwrap()
    }

    #[test]
    fn test_paths() {
        let dir = tempdir().unwrap();
        let home = home(&dir);
        let file = home.file_info("/a/./b/../c.txt").unwrap();
        assert_eq!(file.rpath(), "a/c.txt");
        assert_eq!(file.cpath(), "home/a/c.txt");
        assert_eq!(file.apath(), "/home/a/c.txt");
        assert_eq!(file.name(), "c.txt");
        let parent = file.parent().unwrap();
        assert_eq!(parent.rpath(), "a");
        assert_eq!(parent.parent().unwrap().rpath(), "");
        assert!(parent.parent().unwrap().parent().is_none());
        assert!(home.file_info("../internal-backup/x").is_err());
    }

    #[test]
    fn test_structural_equality() {
        let dir = tempdir().unwrap();
        let home = home(&dir);
        let other_dir = tempdir().unwrap();
        let other = self::home(&other_dir);
        assert_eq!(home.file_info("a/b").unwrap(), home.file_info("a/x/../b/").unwrap());
        assert_ne!(home.file_info("a/b").unwrap(), other.file_info("a/b").unwrap());
    }

    #[test]
    fn test_is_empty_and_mkparent() {
        let dir = tempdir().unwrap();
        let home = home(&dir);
        let file = home.file_info("x/y/z.txt").unwrap();
        assert_eq!(file.is_empty().unwrap(), None);
        assert!(file.mkparent().unwrap());
        assert_eq!(file.parent().unwrap().is_empty().unwrap(), Some(true));
        _ = file.write(b"", None, None).unwrap();
        assert_eq!(file.is_empty().unwrap(), Some(true));
        assert_eq!(file.parent().unwrap().is_empty().unwrap(), Some(false));
        assert!(!home.file_info("").unwrap().mkparent().unwrap());
    }

    #[test]
    fn test_read_text_rejects_invalid_utf8() {
        let dir = tempdir().unwrap();
        let home = home(&dir);
        let file = home.file_info("bin").unwrap();
        _ = file.write(&[0xff, 0xfe], None, None).unwrap();
        assert!(file.read_text().is_err());
        _ = file.write("héllo".as_bytes(), None, None).unwrap();
        assert_eq!(file.read_text().unwrap(), "héllo");
    }
}
