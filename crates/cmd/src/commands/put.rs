use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context as _, Result};
use dbfs::{Dbfs, FileStat};
use diagnostics::*;

use crate::common::format_file_size;

/// Stores `source` (a host file) at `path`. Missing parent directories are
/// created. With `append` the bytes are added to the end of the file.
pub fn put_command(
    fs: &Dbfs,
    path: &str,
    source: &mut dyn Read,
    append: bool,
    timestamp: Option<i64>,
    out: &mut impl Write,
) -> Result<FileStat> {
    let stat = if append {
        if let Some((dir, _)) = path.trim_end_matches('/').rsplit_once('/') {
            if !dir.trim_matches('/').is_empty() {
                _ = fs.mkdirs(dir)?;
            }
        }
        let mut writer = fs
            .output_stream(path, true)
            .with_context(|| format!("Failed to open {path} for append"))?;
        _ = io::copy(source, &mut writer)?;
        let stat = writer.close()?;
        if let Some(timestamp) = timestamp {
            _ = fs.set_last_modified(path, timestamp)?;
        }
        stat
    } else {
        fs.write_from(path, source, None, timestamp)
            .with_context(|| format!("Failed to write {path}"))?
    };
    info!("Stored {path} ({length} bytes)", path: path, length: stat.length);
    writeln!(out, "{path}: {}", format_file_size(stat.length))?;
    Ok(stat)
}

/// Modification time of a host file in milliseconds
#[must_use]
pub fn host_timestamp(file: &Path) -> Option<i64> {
    let modified = std::fs::metadata(file).ok()?.modified().ok()?;
    let since = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    i64::try_from(since.as_millis()).ok()
}
