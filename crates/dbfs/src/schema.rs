//! Table layout and the typed query helpers for each table
//!
//! Every helper takes a `&Connection` so it can run either under the shared
//! read gate or inside a savepoint. Statements go through the connection's
//! prepared statement cache.

use crate::error::Result;
use crate::stat::{Checksum, Content, ContentInfo, DeletedFileStat, Dir, FileStat};
use rusqlite::{Connection, OptionalExtension, params};

/// Id of the store root, shared by its dirs row and its files row
pub const ROOT_ID: i64 = 1;

const DROP_SQL: &str = "
DROP TABLE IF EXISTS xrefs;
DROP TABLE IF EXISTS xinfos;
DROP TABLE IF EXISTS contents;
DROP TABLE IF EXISTS files;
DROP TABLE IF EXISTS dirs;
";

const CREATE_SQL: &str = "
CREATE TABLE dirs (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL
);
CREATE INDEX dirs_path ON dirs(path);

CREATE TABLE files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dir_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    last_modified INTEGER NOT NULL,
    length INTEGER NOT NULL DEFAULT 0,
    is_dir INTEGER NOT NULL,
    writable INTEGER NOT NULL DEFAULT 1,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    last_deleted INTEGER NOT NULL DEFAULT 0,
    checksum BLOB
);
CREATE INDEX files_dir_id ON files(dir_id);
CREATE INDEX files_name ON files(name);

CREATE TABLE contents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL,
    start_offset INTEGER NOT NULL,
    length INTEGER NOT NULL,
    data BLOB NOT NULL
);
CREATE INDEX contents_file_id ON contents(file_id);

CREATE TABLE xinfos (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE
);

CREATE TABLE xrefs (
    id INTEGER PRIMARY KEY,
    from_id INTEGER NOT NULL,
    to_id INTEGER NOT NULL
);
CREATE INDEX xrefs_from ON xrefs(from_id);
CREATE INDEX xrefs_to ON xrefs(to_id);
";

const FILES_WITH_DIR: &str = "SELECT files.*, dirs.path FROM files LEFT JOIN dirs ON files.dir_id = dirs.id";

const HISTORY_ORDER: &str = "ORDER BY dirs.path ASC, files.name ASC, files.last_deleted DESC LIMIT ?";

/// `dirs.path` is `?1` or lies below it
const UNDER_ROOT: &str =
    "(?1 = '' OR dirs.path = ?1 OR substr(dirs.path, 1, length(?1) + 1) = ?1 || '/')";

/// The directory's own path is `?1` or lies below it
const UNDER_ROOT_OWN: &str =
    "(?1 = '' OR own.path = ?1 OR substr(own.path, 1, length(?1) + 1) = ?1 || '/')";

/// Connection settings applied every time the store is opened
pub fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "secure_delete", 1)?;
    conn.pragma_update(None, "temp_store", 2)?;
    conn.pragma_update(None, "synchronous", 2)?;
    Ok(())
}

pub fn exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'files'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Creates all tables, dropping existing ones first, and seeds the root and
/// the top level root directories.
pub fn create(conn: &Connection, roots: &[String], now: i64) -> Result<()> {
    // auto_vacuum only takes effect before the first table is created
    conn.pragma_update(None, "auto_vacuum", 2)?;
    conn.execute_batch(DROP_SQL)?;
    conn.execute_batch(CREATE_SQL)?;

    Dirs::create(conn, ROOT_ID, "")?;
    Files::create_with_id(conn, ROOT_ID, ROOT_ID, "", now)?;
    for (index, root) in roots.iter().enumerate() {
        let id = ROOT_ID + 1 + index as i64;
        Dirs::create(conn, id, root)?;
        Files::create_with_id(conn, id, ROOT_ID, root, now)?;
    }
    diagnostics::debug!("Created schema with {count} roots", count: roots.len());
    Ok(())
}

/// Reclaims free pages and refreshes the query planner statistics
pub fn vacuum(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA incremental_vacuum; PRAGMA optimize;")?;
    Ok(())
}

/// The dirs table: one row per directory, keyed by the id of its files row
pub struct Dirs;

impl Dirs {
    pub fn create(conn: &Connection, id: i64, path: &str) -> Result<()> {
        conn.prepare_cached("INSERT INTO dirs (id, path) VALUES (?1, ?2)")?
            .execute(params![id, path])?;
        Ok(())
    }

    /// Id of the directory at `path`. A soft-deleted directory may share its
    /// path with a live one, the live one wins.
    pub fn id_of(conn: &Connection, path: &str) -> Result<Option<i64>> {
        Ok(conn
            .prepare_cached(
                "SELECT dirs.id FROM dirs LEFT JOIN files ON files.id = dirs.id
                 WHERE dirs.path = ?1 ORDER BY COALESCE(files.is_deleted, 1) ASC, dirs.id DESC LIMIT 1",
            )?
            .query_row([path], |row| row.get(0))
            .optional()?)
    }

    pub fn path_of(conn: &Connection, id: i64) -> Result<Option<String>> {
        Ok(conn
            .prepare_cached("SELECT path FROM dirs WHERE id = ?1")?
            .query_row([id], |row| row.get(0))
            .optional()?)
    }

    pub fn rename(conn: &Connection, id: i64, path: &str) -> Result<usize> {
        Ok(conn
            .prepare_cached("UPDATE dirs SET path = ?1 WHERE id = ?2")?
            .execute(params![path, id])?)
    }

    pub fn prune(conn: &Connection, id: i64) -> Result<usize> {
        Ok(conn
            .prepare_cached("DELETE FROM dirs WHERE id = ?1")?
            .execute([id])?)
    }

    pub fn ids(conn: &Connection) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare_cached("SELECT id FROM dirs ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Directories directly below `id`, deleted or not
    pub fn children(conn: &Connection, id: i64) -> Result<Vec<Dir>> {
        let mut stmt = conn.prepare_cached(
            "SELECT dirs.id, dirs.path FROM dirs JOIN files ON files.id = dirs.id
             WHERE files.dir_id = ?1 AND files.is_dir = 1 AND dirs.id != ?1",
        )?;
        let dirs = stmt
            .query_map([id], |row| {
                Ok(Dir {
                    id: row.get(0)?,
                    path: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<Dir>>>()?;
        Ok(dirs)
    }
}

/// The files table: one row per file or directory version
pub struct Files;

impl Files {
    fn collect(
        stmt: &mut rusqlite::CachedStatement<'_>,
        params: impl rusqlite::Params,
    ) -> Result<Vec<FileStat>> {
        let mut out = Vec::new();
        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            if let Some(stat) = FileStat::from_row(row)? {
                out.push(stat);
            }
        }
        Ok(out)
    }

    fn collect_deleted(
        stmt: &mut rusqlite::CachedStatement<'_>,
        params: impl rusqlite::Params,
    ) -> Result<Vec<DeletedFileStat>> {
        let mut out = Vec::new();
        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            if let Some(stat) = DeletedFileStat::from_row(row)? {
                out.push(stat);
            }
        }
        Ok(out)
    }

    /// Live entry named `name` in the directory at `dir`
    pub fn stat(conn: &Connection, dir: &str, name: &str) -> Result<Option<FileStat>> {
        let mut stmt = conn.prepare_cached(
            "SELECT files.* FROM files JOIN dirs ON files.dir_id = dirs.id
             WHERE dirs.path = ?1 AND files.name = ?2 AND files.is_deleted = 0",
        )?;
        Ok(Self::collect(&mut stmt, params![dir, name])?.into_iter().next())
    }

    /// Live entry named `name` in the directory with id `dir_id`
    pub fn stat_in(conn: &Connection, dir_id: i64, name: &str) -> Result<Option<FileStat>> {
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM files WHERE dir_id = ?1 AND name = ?2 AND is_deleted = 0 AND id != ?3",
        )?;
        Ok(Self::collect(&mut stmt, params![dir_id, name, ROOT_ID])?
            .into_iter()
            .next())
    }

    /// Any row by id, deleted or not
    pub fn get(conn: &Connection, id: i64) -> Result<Option<FileStat>> {
        let mut stmt = conn.prepare_cached("SELECT * FROM files WHERE id = ?1")?;
        Ok(Self::collect(&mut stmt, [id])?.into_iter().next())
    }

    /// A soft-deleted row by id
    pub fn history_of(conn: &Connection, id: i64) -> Result<Option<FileStat>> {
        let mut stmt =
            conn.prepare_cached("SELECT * FROM files WHERE id = ?1 AND is_deleted = 1")?;
        Ok(Self::collect(&mut stmt, [id])?.into_iter().next())
    }

    pub fn read_dir(conn: &Connection, dir_id: i64) -> Result<Vec<FileStat>> {
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM files WHERE dir_id = ?1 AND is_deleted = 0 AND id != ?2 ORDER BY name",
        )?;
        Self::collect(&mut stmt, params![dir_id, ROOT_ID])
    }

    pub fn is_empty_dir(conn: &Connection, dir_id: i64) -> Result<bool> {
        let count: i64 = conn
            .prepare_cached(
                "SELECT COUNT(id) FROM files WHERE dir_id = ?1 AND is_deleted = 0 AND id != ?2",
            )?
            .query_row(params![dir_id, ROOT_ID], |row| row.get(0))?;
        Ok(count == 0)
    }

    /// Rows that keep the directory `dir_id` alive: its children of any state
    /// and its own row while live.
    pub fn usage(conn: &Connection, dir_id: i64) -> Result<i64> {
        Ok(conn
            .prepare_cached(
                "SELECT COUNT(id) FROM files WHERE dir_id = ?1 OR (id = ?1 AND is_deleted = 0)",
            )?
            .query_row([dir_id], |row| row.get(0))?)
    }

    pub fn create(
        conn: &Connection,
        dir_id: i64,
        name: &str,
        is_dir: bool,
        last_modified: i64,
    ) -> Result<i64> {
        conn.prepare_cached(
            "INSERT INTO files (dir_id, name, last_modified, is_dir) VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![dir_id, name, last_modified, is_dir])?;
        Ok(conn.last_insert_rowid())
    }

    fn create_with_id(
        conn: &Connection,
        id: i64,
        dir_id: i64,
        name: &str,
        last_modified: i64,
    ) -> Result<()> {
        conn.prepare_cached(
            "INSERT INTO files (id, dir_id, name, last_modified, is_dir) VALUES (?1, ?2, ?3, ?4, 1)",
        )?
        .execute(params![id, dir_id, name, last_modified])?;
        Ok(())
    }

    /// Inserts a row that is born soft-deleted, used for recovery snapshots
    #[allow(clippy::too_many_arguments)]
    pub fn create_deleted(
        conn: &Connection,
        dir_id: i64,
        name: &str,
        is_dir: bool,
        last_modified: i64,
        length: i64,
        last_deleted: i64,
        checksum: Option<&Checksum>,
    ) -> Result<i64> {
        conn.prepare_cached(
            "INSERT INTO files (dir_id, name, last_modified, length, is_dir, is_deleted, last_deleted, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
        )?
        .execute(params![
            dir_id,
            name,
            last_modified,
            length,
            is_dir,
            last_deleted,
            checksum.map(Checksum::as_bytes)
        ])?;
        Ok(conn.last_insert_rowid())
    }

    /// Records the outcome of a content write
    pub fn update_content(
        conn: &Connection,
        id: i64,
        length: i64,
        last_modified: i64,
        checksum: Option<&Checksum>,
    ) -> Result<usize> {
        Ok(conn
            .prepare_cached(
                "UPDATE files SET length = ?1, last_modified = ?2, checksum = ?3 WHERE id = ?4",
            )?
            .execute(params![
                length,
                last_modified,
                checksum.map(Checksum::as_bytes),
                id
            ])?)
    }

    pub fn set_last_modified(conn: &Connection, id: i64, last_modified: i64) -> Result<usize> {
        Ok(conn
            .prepare_cached("UPDATE files SET last_modified = ?1 WHERE id = ?2")?
            .execute(params![last_modified, id])?)
    }

    pub fn set_writable(conn: &Connection, id: i64, writable: bool) -> Result<usize> {
        Ok(conn
            .prepare_cached("UPDATE files SET writable = ?1 WHERE id = ?2")?
            .execute(params![writable, id])?)
    }

    pub fn rename(
        conn: &Connection,
        id: i64,
        dir_id: i64,
        name: &str,
        last_modified: i64,
    ) -> Result<usize> {
        Ok(conn
            .prepare_cached(
                "UPDATE files SET dir_id = ?1, name = ?2, last_modified = ?3 WHERE id = ?4",
            )?
            .execute(params![dir_id, name, last_modified, id])?)
    }

    /// Soft delete
    pub fn delete(conn: &Connection, id: i64, last_deleted: i64) -> Result<usize> {
        Ok(conn
            .prepare_cached("UPDATE files SET is_deleted = 1, last_deleted = ?1 WHERE id = ?2")?
            .execute(params![last_deleted, id])?)
    }

    /// Hard delete of the row only
    pub fn prune(conn: &Connection, id: i64) -> Result<usize> {
        Ok(conn
            .prepare_cached("DELETE FROM files WHERE id = ?1")?
            .execute([id])?)
    }

    /// All soft-deleted rows with the path of their directory
    pub fn deleted(conn: &Connection) -> Result<Vec<DeletedFileStat>> {
        let sql = format!("{FILES_WITH_DIR} WHERE files.is_deleted = 1 ORDER BY files.id");
        let mut stmt = conn.prepare_cached(&sql)?;
        Self::collect_deleted(&mut stmt, [])
    }

    /// Directories at or below `root` holding deleted files, as their own
    /// files rows. An empty `root` matches every directory.
    pub fn history_dirs_only(
        conn: &Connection,
        root: &str,
        count: i64,
    ) -> Result<Vec<DeletedFileStat>> {
        let sql = format!(
            "SELECT files.*, dirs.path FROM
             (SELECT DISTINCT dir_id AS t FROM files WHERE is_deleted = 1 AND is_dir = 0) AS t
             LEFT JOIN files ON t.t = files.id
             LEFT JOIN dirs ON files.dir_id = dirs.id
             LEFT JOIN dirs AS own ON own.id = files.id
             WHERE files.is_dir = 1 AND {UNDER_ROOT_OWN}
             {HISTORY_ORDER}"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        Self::collect_deleted(&mut stmt, params![root, count])
    }

    /// Deleted files anywhere at or below `root`
    pub fn history_files_only(
        conn: &Connection,
        root: &str,
        count: i64,
    ) -> Result<Vec<DeletedFileStat>> {
        let sql = format!(
            "{FILES_WITH_DIR} WHERE files.is_deleted = 1 AND files.is_dir = 0 AND {UNDER_ROOT}
             {HISTORY_ORDER}"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        Self::collect_deleted(&mut stmt, params![root, count])
    }

    pub fn history_of_dir(conn: &Connection, dir: &str, count: i64) -> Result<Vec<DeletedFileStat>> {
        let sql = format!(
            "{FILES_WITH_DIR} WHERE files.is_deleted = 1 AND files.is_dir = 0 AND dirs.path = ? {HISTORY_ORDER}"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        Self::collect_deleted(&mut stmt, params![dir, count])
    }

    pub fn history_of_file(
        conn: &Connection,
        dir: &str,
        name: &str,
        count: i64,
    ) -> Result<Vec<DeletedFileStat>> {
        let sql = format!(
            "{FILES_WITH_DIR} WHERE files.is_deleted = 1 AND files.is_dir = 0
             AND files.name = ? AND dirs.path = ? {HISTORY_ORDER}"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        Self::collect_deleted(&mut stmt, params![name, dir, count])
    }
}

/// The contents table: the bytes of a file in parts of at most one chunk
pub struct Contents;

impl Contents {
    pub fn infos(conn: &Connection, file_id: i64) -> Result<Vec<ContentInfo>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, start_offset, length FROM contents WHERE file_id = ?1 ORDER BY start_offset",
        )?;
        let infos = stmt
            .query_map([file_id], |row| {
                Ok(ContentInfo {
                    id: row.get(0)?,
                    offset: row.get(1)?,
                    length: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<ContentInfo>>>()?;
        Ok(infos)
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<Content>> {
        Ok(conn
            .prepare_cached("SELECT id, start_offset AS offset, data FROM contents WHERE id = ?1")?
            .query_row([id], Content::from_row)
            .optional()?)
    }

    /// Visits the parts of a file in order, one row in memory at a time
    pub fn for_each<F>(conn: &Connection, file_id: i64, mut f: F) -> Result<()>
    where
        F: FnMut(Content) -> Result<()>,
    {
        for info in Self::infos(conn, file_id)? {
            if let Some(content) = Self::get(conn, info.id)? {
                f(content)?;
            }
        }
        Ok(())
    }

    pub fn insert(conn: &Connection, file_id: i64, offset: i64, data: &[u8]) -> Result<i64> {
        conn.prepare_cached(
            "INSERT INTO contents (file_id, start_offset, length, data) VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![file_id, offset, data.len() as i64, data])?;
        Ok(conn.last_insert_rowid())
    }

    /// Rewrites one part in place
    pub fn update(conn: &Connection, id: i64, data: &[u8]) -> Result<usize> {
        Ok(conn
            .prepare_cached("UPDATE contents SET length = ?1, data = ?2 WHERE id = ?3")?
            .execute(params![data.len() as i64, data, id])?)
    }

    /// Duplicates the parts of `src_id` under `dst_id`
    pub fn copy(conn: &Connection, dst_id: i64, src_id: i64) -> Result<usize> {
        Ok(conn
            .prepare_cached(
                "INSERT INTO contents (file_id, start_offset, length, data)
                 SELECT ?1, start_offset, length, data FROM contents WHERE file_id = ?2
                 ORDER BY start_offset",
            )?
            .execute(params![dst_id, src_id])?)
    }

    pub fn prune(conn: &Connection, file_id: i64) -> Result<usize> {
        Ok(conn
            .prepare_cached("DELETE FROM contents WHERE file_id = ?1")?
            .execute([file_id])?)
    }
}

/// The xinfos table: link targets by path
pub struct Xinfos;

impl Xinfos {
    pub fn id_of(conn: &Connection, path: &str) -> Result<Option<i64>> {
        Ok(conn
            .prepare_cached("SELECT id FROM xinfos WHERE path = ?1")?
            .query_row([path], |row| row.get(0))
            .optional()?)
    }

    /// Id of `path`, inserting it when new
    pub fn intern(conn: &Connection, path: &str) -> Result<i64> {
        conn.prepare_cached("INSERT OR IGNORE INTO xinfos (path) VALUES (?1)")?
            .execute([path])?;
        Ok(conn
            .prepare_cached("SELECT id FROM xinfos WHERE path = ?1")?
            .query_row([path], |row| row.get(0))?)
    }
}

/// The xrefs table: links from a file row to target paths
pub struct Xrefs;

impl Xrefs {
    /// Replaces the outgoing links of `from_id`
    pub fn set<S: AsRef<str>>(conn: &Connection, from_id: i64, targets: &[S]) -> Result<()> {
        Self::prune_from(conn, from_id)?;
        for target in targets {
            let to_id = Xinfos::intern(conn, target.as_ref())?;
            conn.prepare_cached("INSERT INTO xrefs (from_id, to_id) VALUES (?1, ?2)")?
                .execute(params![from_id, to_id])?;
        }
        Ok(())
    }

    pub fn prune_from(conn: &Connection, from_id: i64) -> Result<usize> {
        Ok(conn
            .prepare_cached("DELETE FROM xrefs WHERE from_id = ?1")?
            .execute([from_id])?)
    }

    pub fn targets(conn: &Connection, from_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare_cached(
            "SELECT xinfos.path FROM xrefs JOIN xinfos ON xrefs.to_id = xinfos.id
             WHERE xrefs.from_id = ?1 ORDER BY xinfos.path",
        )?;
        let paths = stmt
            .query_map([from_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    /// Live files linking to `path`
    pub fn sources(conn: &Connection, path: &str) -> Result<Vec<DeletedFileStat>> {
        let mut stmt = conn.prepare_cached(
            "SELECT files.*, dirs.path FROM xrefs
             JOIN xinfos ON xrefs.to_id = xinfos.id
             JOIN files ON files.id = xrefs.from_id
             LEFT JOIN dirs ON files.dir_id = dirs.id
             WHERE xinfos.path = ?1 AND files.is_deleted = 0
             ORDER BY dirs.path ASC, files.name ASC",
        )?;
        Files::collect_deleted(&mut stmt, [path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        configure(&conn).unwrap();
        create(&conn, &["home".to_string(), "other".to_string()], 1000).unwrap();
        conn
    }

    #[test]
    fn test_seeded_roots() {
        let conn = memory();
        assert!(exists(&conn).unwrap());
        assert_eq!(Dirs::id_of(&conn, "").unwrap(), Some(ROOT_ID));
        assert_eq!(Dirs::id_of(&conn, "home").unwrap(), Some(2));
        assert_eq!(Dirs::id_of(&conn, "other").unwrap(), Some(3));

        let root = Files::stat(&conn, "", "").unwrap().unwrap();
        assert_eq!(root.id, ROOT_ID);
        assert!(root.is_dir);

        let names: Vec<String> = Files::read_dir(&conn, ROOT_ID)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["home", "other"]);
    }

    #[test]
    fn test_usage_counts_children_and_self() {
        let conn = memory();
        let home = Dirs::id_of(&conn, "home").unwrap().unwrap();
        assert_eq!(Files::usage(&conn, home).unwrap(), 1);

        let id = Files::create(&conn, home, "a.txt", false, 1).unwrap();
        assert_eq!(Files::usage(&conn, home).unwrap(), 2);
        Files::delete(&conn, id, 2).unwrap();
        assert_eq!(Files::usage(&conn, home).unwrap(), 2);
        assert!(Files::is_empty_dir(&conn, home).unwrap());
    }

    #[test]
    fn test_xrefs() {
        let conn = memory();
        let home = Dirs::id_of(&conn, "home").unwrap().unwrap();
        let id = Files::create(&conn, home, "index.html", false, 1).unwrap();
        Xrefs::set(&conn, id, &["home/b.png", "home/a.css"]).unwrap();
        assert_eq!(
            Xrefs::targets(&conn, id).unwrap(),
            vec!["home/a.css", "home/b.png"]
        );
        let sources = Xrefs::sources(&conn, "home/b.png").unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].path(), "home/index.html");

        Xrefs::set(&conn, id, &["home/a.css"]).unwrap();
        assert!(Xrefs::sources(&conn, "home/b.png").unwrap().is_empty());
        assert!(Xinfos::id_of(&conn, "home/b.png").unwrap().is_some());
    }
}
