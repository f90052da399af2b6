use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};
use chrono::{DateTime, Local};
use dbfs::{Dbfs, DbfsConfig, FileStat};
use diagnostics::*;

/// Where the store lives and how to open it, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct StoreContext {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub no_history: bool,
}

/// Environment variable naming the database when `--db` is absent
pub const DB_ENV: &str = "DBFS_DB";

impl StoreContext {
    #[must_use]
    pub fn new(db: impl Into<PathBuf>) -> Self {
        Self {
            db: Some(db.into()),
            ..Self::default()
        }
    }

    /// Reads the YAML config if one was given, then applies the flags
    pub fn load_config(&self) -> Result<DbfsConfig> {
        let mut config = match &self.config {
            Some(file) => read_config(file)?,
            None => DbfsConfig::default(),
        };
        match &self.db {
            Some(db) => config.path = db.clone(),
            None => {
                if let Ok(db) = std::env::var(DB_ENV) {
                    config.path = PathBuf::from(db);
                } else if self.config.is_none() {
                    return Err(anyhow!("No database given, use --db or set {DB_ENV}"));
                }
            }
        }
        if self.no_history {
            config.keep_history = false;
        }
        Ok(config)
    }

    pub fn open(&self) -> Result<Dbfs> {
        let config = self.load_config()?;
        debug!("Opening store {path}", path: config.path.display().to_string());
        Dbfs::open(config.clone())
            .with_context(|| format!("Failed to open {}", config.path.display()))
    }
}

fn read_config(file: &Path) -> Result<DbfsConfig> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read config {}", file.display()))?;
    serde_yaml_ng::from_str(&text)
        .with_context(|| format!("Invalid config {}", file.display()))
}

/// Helper function to format file sizes
#[must_use]
pub fn format_file_size(size: i64) -> String {
    if size >= 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else if size >= 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{}B", size)
    }
}

/// Formats a millisecond timestamp in local time
#[must_use]
pub fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| millis.to_string())
}

/// One `ls` style line
#[must_use]
pub fn format_stat(stat: &FileStat) -> String {
    let kind = if stat.is_dir { 'd' } else { '-' };
    let name = if stat.is_dir {
        format!("{}/", stat.name)
    } else {
        stat.name.clone()
    };
    format!(
        "{kind}{} {:>9} {} {}",
        stat.perm(),
        if stat.is_dir {
            String::new()
        } else {
            format_file_size(stat.length)
        },
        format_timestamp(stat.last_modified),
        name
    )
}
