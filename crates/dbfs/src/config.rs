use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Size of one content row. Files are stored as a run of parts of exactly
/// this size followed by one shorter tail part.
pub const PART_SIZE: usize = 1024 * 1024;

/// Default idle time after which a forgotten stream is closed
pub const AUTO_CLOSE_MS: u64 = 5 * 1000;

/// Polls made while waiting for streams and transactions to drain on close
pub const CLOSE_DB_ITERS: u32 = 40;

pub const CLOSE_DB_TICK_MS: u64 = 200;

/// Content rows held by a reader for random access
pub const CONTENT_CACHE_ENTRIES: usize = 3;

/// Root directories seeded into a freshly initialized store
pub const DEFAULT_ROOTS: [&str; 3] = ["home", "internal-backup", "external-backup"];

/// Store configuration, read once when the store is opened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DbfsConfig {
    /// Database file
    pub path: PathBuf,

    /// Soft-delete into the trash instead of pruning immediately
    pub keep_history: bool,

    pub roots: Vec<String>,

    pub auto_close_ms: u64,

    pub close_iterations: u32,

    pub close_tick_ms: u64,

    pub cache_entries: usize,
}

impl Default for DbfsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dbfs.db"),
            keep_history: true,
            roots: DEFAULT_ROOTS.iter().map(|s| s.to_string()).collect(),
            auto_close_ms: AUTO_CLOSE_MS,
            close_iterations: CLOSE_DB_ITERS,
            close_tick_ms: CLOSE_DB_TICK_MS,
            cache_entries: CONTENT_CACHE_ENTRIES,
        }
    }
}

impl DbfsConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_keep_history(mut self, keep_history: bool) -> Self {
        self.keep_history = keep_history;
        self
    }

    #[must_use]
    pub fn with_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_auto_close(mut self, idle: Duration) -> Self {
        self.auto_close_ms = idle.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn auto_close(&self) -> Duration {
        Duration::from_millis(self.auto_close_ms)
    }

    #[must_use]
    pub fn close_tick(&self) -> Duration {
        Duration::from_millis(self.close_tick_ms)
    }
}
