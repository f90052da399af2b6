//! Trash: history listing, recovery and garbage collection

use crate::error::{Error, Result};
use crate::fs::{Dbfs, DbfsTxn};
use crate::path::Basepath;
use crate::schema::{self, Dirs, Files};
use crate::stat::DeletedFileStat;
use diagnostics::*;
use std::collections::BTreeSet;

/// Keeps the first entry of each (dir, name) pair that passes `keep`.
/// Entries arrive most recently deleted first within a pair.
fn dedupe<F>(entries: Vec<DeletedFileStat>, mut keep: F) -> Vec<DeletedFileStat>
where
    F: FnMut(&DeletedFileStat) -> bool,
{
    let mut seen = BTreeSet::new();
    entries
        .into_iter()
        .filter(|entry| keep(entry) && seen.insert(entry.path()))
        .collect()
}

/// The first `count` entries, all of them when `count` is negative
fn limit(mut entries: Vec<DeletedFileStat>, count: i64) -> Vec<DeletedFileStat> {
    if let Ok(count) = usize::try_from(count) {
        entries.truncate(count);
    }
    entries
}

impl Dbfs {
    /// Soft-deleted files.
    ///
    /// With a `name` every version of that file in `dir` is listed, most
    /// recently deleted first. Otherwise the newest version of each deleted
    /// file in `dir` is listed, or, when `dir` is the root itself and
    /// `list_dir` is set, the directories below `root` holding deleted
    /// files. A negative `count` means no limit.
    pub fn history(
        &self,
        root: &str,
        dir: &str,
        name: &str,
        list_dir: bool,
        count: i64,
    ) -> Result<Vec<DeletedFileStat>> {
        self.read(|conn| {
            if !name.is_empty() {
                return Files::history_of_file(conn, dir, name, count);
            }
            let entries = if dir == root && list_dir {
                dedupe(Files::history_dirs_only(conn, root, -1)?, |_| true)
            } else {
                dedupe(Files::history_of_dir(conn, dir, -1)?, |_| true)
            };
            Ok(limit(entries, count))
        })
    }

    /// Like `history` without a directory listing mode, keeping only the
    /// entries accepted by `predicate`. At the root every deleted file below
    /// it is searched.
    pub fn search_history<F>(
        &self,
        root: &str,
        dir: &str,
        name: &str,
        count: i64,
        mut predicate: F,
    ) -> Result<Vec<DeletedFileStat>>
    where
        F: FnMut(&DeletedFileStat) -> bool,
    {
        self.read(|conn| {
            let entries = if !name.is_empty() {
                Files::history_of_file(conn, dir, name, -1)?
                    .into_iter()
                    .filter(|e| predicate(e))
                    .collect()
            } else if dir == root {
                dedupe(Files::history_files_only(conn, root, -1)?, predicate)
            } else {
                dedupe(Files::history_of_dir(conn, dir, -1)?, predicate)
            };
            Ok(limit(entries, count))
        })
    }

    /// Permanently removes the given deleted versions, or with `all` every
    /// deleted version of the same files. Returns the number of files and
    /// directories removed.
    pub fn prune_history(&self, infos: &[DeletedFileStat], all: bool) -> Result<(usize, usize)> {
        self.transaction(|txn| txn.prune_history(infos, all))
    }

    /// Copies deleted versions back into the live tree. A single entry is
    /// restored to `dst`, several entries to `dst/<name>`. Returns the number
    /// of entries restored and failed.
    pub fn recover(&self, dst: &str, infos: &[DeletedFileStat]) -> Result<(usize, usize)> {
        self.transaction(|txn| txn.recover(dst, infos))
    }

    /// Garbage collects the trash. Deleted files accepted by `predicate` are
    /// removed for good, then directories nothing refers to anymore. With a
    /// predicate the database is vacuumed afterwards. Returns the number of
    /// files and directories removed.
    pub fn cleanup_trash(
        &self,
        predicate: Option<&mut dyn FnMut(&DeletedFileStat) -> bool>,
    ) -> Result<(usize, usize)> {
        let vacuum = predicate.is_some();
        let counts = self.transaction(|txn| {
            let counts = txn.cleanup_trash(predicate)?;
            if vacuum {
                schema::vacuum(txn.tx)?;
            }
            Ok(counts)
        })?;
        info!(
            "Cleaned trash: {files} files, {dirs} directories",
            files: counts.0,
            dirs: counts.1
        );
        Ok(counts)
    }
}

impl DbfsTxn<'_> {
    pub fn prune_history(&self, infos: &[DeletedFileStat], all: bool) -> Result<(usize, usize)> {
        let mut files = 0;
        for info in infos {
            if info.stat.is_dir {
                continue;
            }
            let versions = if all {
                Files::history_of_file(self.tx, &info.dir, info.name(), -1)?
            } else {
                Files::history_of(self.tx, info.id())?
                    .map(|stat| DeletedFileStat {
                        dir: info.dir.clone(),
                        stat,
                    })
                    .into_iter()
                    .collect()
            };
            for version in versions.iter().filter(|v| v.stat.is_file()) {
                files += self.prune_row(&version.stat)?;
            }
        }
        let (_, dirs) = self.cleanup_trash(None)?;
        Ok((files, dirs))
    }

    pub fn recover(&self, dst: &str, infos: &[DeletedFileStat]) -> Result<(usize, usize)> {
        let dst = Basepath::from(dst)?;
        let mut oks = 0;
        let mut fails = 0;
        for info in infos {
            let target = if infos.len() == 1 {
                dst.clone()
            } else {
                dst.join(info.name())?
            };
            let restored = self.transaction(|txn| {
                let stat = Files::history_of(txn.tx, info.id())?
                    .ok_or_else(|| Error::not_found(info.path()))?;
                txn.copy_stat(&target, &stat, Some(stat.last_modified))
            });
            match restored {
                Ok(_) => oks += 1,
                Err(err) => {
                    warn!(
                        "Recovery of {src} to {dst} failed: {error}",
                        src: info.path(),
                        dst: target.to_string(),
                        error: err.to_string()
                    );
                    fails += 1;
                }
            }
        }
        Ok((oks, fails))
    }

    /// The trash sweep inside the current transaction, without vacuum
    pub fn cleanup_trash(
        &self,
        mut predicate: Option<&mut dyn FnMut(&DeletedFileStat) -> bool>,
    ) -> Result<(usize, usize)> {
        let mut files_deleted = 0;
        let mut dirs_deleted = 0;

        // Matched files go for good, deleted directories wait for phase three
        let mut deleted_dirs = Vec::new();
        for entry in Files::deleted(self.tx)? {
            if entry.stat.is_dir {
                deleted_dirs.push(entry.stat);
                continue;
            }
            let Some(predicate) = predicate.as_mut() else {
                continue;
            };
            if !predicate(&entry) {
                continue;
            }
            match self.transaction(|txn| txn.prune_row(&entry.stat)) {
                Ok(_) => files_deleted += 1,
                Err(err) => warn!("Pruning {path} failed: {error}", path: entry.path(), error: err.to_string()),
            }
        }

        // Directory rows nothing refers to anymore
        for id in Dirs::ids(self.tx)? {
            let pruned = self.transaction(|txn| {
                if Files::usage(txn.tx, id)? == 0 {
                    _ = Dirs::prune(txn.tx, id)?;
                }
                Ok(())
            });
            if let Err(err) = pruned {
                warn!("Pruning directory {id} failed: {error}", id: id, error: err.to_string());
            }
        }

        // Deleted directories, until removing one frees no other
        let mut modified = true;
        while modified {
            modified = false;
            let mut remaining = Vec::with_capacity(deleted_dirs.len());
            for stat in deleted_dirs {
                let pruned = self.transaction(|txn| {
                    if Files::usage(txn.tx, stat.id)? > 0 {
                        return Ok(false);
                    }
                    _ = Files::prune(txn.tx, stat.id)?;
                    _ = Dirs::prune(txn.tx, stat.id)?;
                    if Files::usage(txn.tx, stat.dir_id)? == 0 {
                        _ = Dirs::prune(txn.tx, stat.dir_id)?;
                    }
                    Ok(true)
                });
                match pruned {
                    Ok(true) => {
                        dirs_deleted += 1;
                        modified = true;
                    }
                    Ok(false) => remaining.push(stat),
                    Err(err) => {
                        warn!("Pruning directory {name} failed: {error}", name: stat.name.clone(), error: err.to_string());
                    }
                }
            }
            deleted_dirs = remaining;
        }
        debug!(
            "Trash sweep removed {files} files and {dirs} directories",
            files: files_deleted,
            dirs: dirs_deleted
        );
        Ok((files_deleted, dirs_deleted))
    }
}
