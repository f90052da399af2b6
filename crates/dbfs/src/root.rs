//! Per-root view of a store

use crate::error::{Error, Result};
use crate::filepath::Filepath;
use crate::fs::{Dbfs, DbfsTxn};
use crate::path::{Basepath, SEP, join_rpath, split};
use crate::stat::{DeletedFileStat, FileStat};
use diagnostics::*;
use std::hash::{Hash, Hasher};

/// One of the top level directories of a store, the entry point through
/// which applications address files by root relative path
#[derive(Clone)]
pub struct RootInfo {
    fs: Dbfs,
    name: String,
    stat: FileStat,
}

impl RootInfo {
    /// Fails with `NotFound` unless `name` is a top level directory
    pub fn new(fs: &Dbfs, name: &str) -> Result<Self> {
        let path = Basepath::from(name)?;
        if path.is_root() || !path.dir().is_empty() {
            return Err(Error::not_found(name));
        }
        let stat = fs
            .stat(path.as_str())?
            .filter(|stat| stat.is_dir)
            .ok_or_else(|| Error::not_found(name))?;
        Ok(RootInfo {
            fs: fs.clone(),
            name: path.as_str().to_string(),
            stat,
        })
    }

    #[must_use]
    pub fn fs(&self) -> &Dbfs {
        &self.fs
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store relative path, the root name itself
    #[must_use]
    pub fn cpath(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn apath(&self) -> String {
        format!("{SEP}{}", self.name)
    }

    /// Stat of the root directory taken when the view was created
    #[must_use]
    pub fn stat(&self) -> &FileStat {
        &self.stat
    }

    /// The entry at `rpath` below this root
    pub fn file_info(&self, rpath: &str) -> Result<Filepath> {
        Filepath::new(self.clone(), rpath)
    }

    /// Top level entries, none once the store is closed
    pub fn read_dir(&self) -> Result<Vec<Filepath>> {
        if self.fs.is_closed() {
            return Ok(Vec::new());
        }
        self.fs
            .read_dir(&self.name)?
            .iter()
            .map(|stat| self.file_info(&stat.name))
            .collect()
    }

    /// Absolute paths of entries below `rpath` whose name contains
    /// `pattern`, ignoring case
    pub fn find(&self, rpath: &str, pattern: &str) -> Result<Vec<String>> {
        let pattern = pattern.to_lowercase();
        let start = self.file_info(rpath)?;
        if !start.stat()?.is_some_and(|stat| stat.is_dir) {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in start.walk(false)? {
            let (file, _, _) = entry?;
            if file.name().to_lowercase().contains(&pattern) {
                found.push(file.apath());
            }
        }
        debug!("Found {count} entries matching {pattern}", count: found.len(), pattern: pattern);
        Ok(found)
    }

    pub fn cleanup_trash(
        &self,
        predicate: Option<&mut dyn FnMut(&DeletedFileStat) -> bool>,
    ) -> Result<(usize, usize)> {
        self.fs.cleanup_trash(predicate)
    }

    /// Deleted files at `rpath`. A trailing separator or an empty `rpath`
    /// lists a directory, otherwise every version of one file is listed.
    pub fn history(&self, rpath: &str, list_dir: bool) -> Result<Vec<DeletedFileStat>> {
        let (dir, name) = self.history_path(rpath)?;
        self.fs.history(&self.name, &dir, &name, list_dir, -1)
    }

    pub fn search_history<F>(&self, rpath: &str, predicate: F) -> Result<Vec<DeletedFileStat>>
    where
        F: FnMut(&DeletedFileStat) -> bool,
    {
        let (dir, name) = self.history_path(rpath)?;
        self.fs.search_history(&self.name, &dir, &name, -1, predicate)
    }

    /// Splits `rpath` into the directory and name a history query works on.
    /// The name is empty when `rpath` denotes a directory.
    fn history_path(&self, rpath: &str) -> Result<(String, String)> {
        let joined = Basepath::from(join_rpath(&self.name, rpath))?;
        if rpath.is_empty() || rpath.ends_with(SEP) {
            return Ok((joined.as_str().to_string(), String::new()));
        }
        let (dir, name) = split(joined.as_str());
        Ok((dir.to_string(), name.to_string()))
    }

    pub fn prune_history(&self, infos: &[DeletedFileStat], all: bool) -> Result<(usize, usize)> {
        self.fs.prune_history(infos, all)
    }

    /// Restores deleted versions to `dst`, which may live in another store
    pub fn recover(&self, dst: &Filepath, infos: &[DeletedFileStat]) -> Result<(usize, usize)> {
        if dst.root().fs().same_store(&self.fs) {
            return self.fs.recover(dst.cpath(), infos);
        }
        let mut oks = 0;
        let mut fails = 0;
        for info in infos {
            let target = if infos.len() == 1 {
                dst.clone()
            } else {
                dst.file_info(info.name())?
            };
            let restored = self.fs.input_stream_of(&info.stat).and_then(|mut reader| {
                target.write_from(&mut reader, None, Some(info.stat.last_modified))
            });
            match restored {
                Ok(_) => oks += 1,
                Err(err) => {
                    warn!(
                        "Recovery of {src} to {dst} failed: {error}",
                        src: info.path(),
                        dst: target.apath(),
                        error: err.to_string()
                    );
                    fails += 1;
                }
            }
        }
        Ok((oks, fails))
    }

    pub fn update_xrefs<S: AsRef<str>>(&self, from: &Filepath, xrefs: &[S]) -> Result<bool> {
        self.fs.update_xrefs(from.cpath(), xrefs)
    }

    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DbfsTxn<'_>) -> Result<T>,
    {
        self.fs.transaction(f)
    }

    pub async fn pause(&self) -> bool {
        self.fs.pause().await
    }

    pub fn resume(&self) {
        self.fs.resume();
    }
}

impl PartialEq for RootInfo {
    fn eq(&self, other: &Self) -> bool {
        self.fs.same_store(&other.fs) && self.name == other.name
    }
}

impl Eq for RootInfo {}

impl Hash for RootInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Debug for RootInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootInfo").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbfsConfig;
    use tempfile::tempdir;

    #[test]
    fn test_only_top_level_dirs_are_roots() {
        let dir = tempdir().unwrap();
        let fs = Dbfs::open(DbfsConfig::new(dir.path().join("fs.db"))).unwrap();
        assert!(RootInfo::new(&fs, "home").is_ok());
        _ = fs.write("home/a/f", b"x", None, None).unwrap();
        assert!(matches!(RootInfo::new(&fs, "home/a"), Err(Error::NotFound(_))));
        assert!(matches!(RootInfo::new(&fs, "missing"), Err(Error::NotFound(_))));
        assert!(matches!(RootInfo::new(&fs, ""), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_history_path_split() {
        let dir = tempdir().unwrap();
        let fs = Dbfs::open(DbfsConfig::new(dir.path().join("fs.db"))).unwrap();
        let home = RootInfo::new(&fs, "home").unwrap();
        assert_eq!(home.history_path("").unwrap(), ("home".into(), String::new()));
        assert_eq!(home.history_path("a/").unwrap(), ("home/a".into(), String::new()));
        assert_eq!(
            home.history_path("/a/f.txt").unwrap(),
            ("home/a".into(), "f.txt".into())
        );
    }

    #[test]
    fn test_find_ignores_case() {
        let dir = tempdir().unwrap();
        let fs = Dbfs::open(DbfsConfig::new(dir.path().join("fs.db"))).unwrap();
        _ = fs.write("home/Notes/Report.TXT", b"1", None, None).unwrap();
        _ = fs.write("home/other/report-2.txt", b"2", None, None).unwrap();
        _ = fs.write("home/other/image.png", b"3", None, None).unwrap();
        let home = RootInfo::new(&fs, "home").unwrap();
        let mut found = home.find("", "REPORT").unwrap();
        found.sort();
        assert_eq!(
            found,
            vec!["/home/Notes/Report.TXT", "/home/other/report-2.txt"]
        );
        assert!(home.find("missing", "x").unwrap().is_empty());
    }
}
