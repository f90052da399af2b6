use std::io::Write;

use anyhow::{Result, anyhow};
use dbfs::Dbfs;

use crate::common::{format_stat, format_timestamp};

/// Lists a directory, or the single entry when `path` names a file
pub fn list_command(fs: &Dbfs, path: &str, out: &mut impl Write) -> Result<()> {
    let stat = fs
        .stat(path)?
        .ok_or_else(|| anyhow!("{path}: no such file or directory"))?;
    if !stat.is_dir {
        writeln!(out, "{}", format_stat(&stat))?;
        return Ok(());
    }
    for child in fs.read_dir(path)? {
        writeln!(out, "{}", format_stat(&child))?;
    }
    Ok(())
}

pub fn stat_command(fs: &Dbfs, path: &str, out: &mut impl Write) -> Result<()> {
    let stat = fs
        .stat(path)?
        .ok_or_else(|| anyhow!("{path}: no such file or directory"))?;
    writeln!(out, "path:     /{}", path.trim_matches('/'))?;
    writeln!(out, "id:       {}", stat.id)?;
    writeln!(out, "type:     {}", if stat.is_dir { "directory" } else { "file" })?;
    writeln!(out, "length:   {}", stat.length)?;
    writeln!(out, "modified: {}", format_timestamp(stat.last_modified))?;
    writeln!(out, "writable: {}", stat.writable)?;
    if let Some(checksum) = stat.checksum {
        writeln!(out, "sha256:   {}", checksum.to_hex())?;
    }
    let refs = fs.refs_from(path)?;
    if !refs.is_empty() {
        writeln!(out, "xrefs:    {}", refs.join(" "))?;
    }
    Ok(())
}
