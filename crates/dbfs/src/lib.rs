//! A transactional, versioned filesystem stored in one SQLite database.
//!
//! Directories, files, chunked content and cross references live as rows of
//! a small schema. Deleted files go to a trash from which they can be listed,
//! recovered or pruned. All mutations run in nested, rollback-safe
//! transactions, and content is streamed in parts with a running SHA-256.

pub mod config;
pub mod error;
pub mod filepath;
pub mod fs;
mod history;
pub mod locker;
pub mod path;
pub mod reader;
pub mod root;
pub mod schema;
pub mod stat;
pub mod transaction;
mod watchdog;
pub mod writer;

#[cfg(test)]
mod tests;

pub use config::DbfsConfig;
pub use error::{Error, Result};
pub use filepath::{Filepath, Walk, WalkEntry};
pub use fs::{Dbfs, DbfsTxn};
pub use locker::{FileLock, FileLocker};
pub use path::Basepath;
pub use reader::DbfsReader;
pub use root::RootInfo;
pub use stat::{Checksum, DeletedFileStat, Dir, FileStat};
pub use writer::DbfsWriter;
