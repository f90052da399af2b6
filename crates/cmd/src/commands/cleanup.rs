use std::io::Write;

use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use dbfs::{Dbfs, DeletedFileStat};

/// Garbage collects the trash. Without `all` or `days` only directories
/// nothing refers to are removed and deleted files stay recoverable.
/// `days` limits removal to files deleted more than that many days ago.
pub fn cleanup_command(
    fs: &Dbfs,
    all: bool,
    days: Option<i64>,
    out: &mut impl Write,
) -> Result<()> {
    let cutoff = days.map(deleted_before).transpose()?;
    let mut select = |entry: &DeletedFileStat| match cutoff {
        Some(cutoff) => entry.last_deleted() < cutoff,
        None => true,
    };
    let predicate: Option<&mut dyn FnMut(&DeletedFileStat) -> bool> =
        if all || cutoff.is_some() {
            Some(&mut select)
        } else {
            None
        };
    let (files, dirs) = fs.cleanup_trash(predicate)?;
    writeln!(out, "removed {files} files, {dirs} directories")?;
    Ok(())
}

/// Millisecond timestamp `days` days ago
fn deleted_before(days: i64) -> Result<i64> {
    Duration::try_days(days)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .map(|cutoff| cutoff.timestamp_millis())
        .ok_or_else(|| anyhow!("--days {days} is out of range"))
}
