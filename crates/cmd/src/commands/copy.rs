use std::io::Write;

use anyhow::{Context as _, Result, bail};
use dbfs::Dbfs;
use diagnostics::*;

/// Copies a file
pub fn copy_command(fs: &Dbfs, src: &str, dst: &str, out: &mut impl Write) -> Result<()> {
    let stat = fs
        .copy(dst, src, None)
        .with_context(|| format!("Failed to copy {src} to {dst}"))?;
    info!("Copied {src} to {dst}", src: src, dst: dst);
    writeln!(out, "{src} -> {dst} ({} bytes)", stat.length)?;
    Ok(())
}

/// Renames a file or a whole directory tree
pub fn move_command(fs: &Dbfs, src: &str, dst: &str, out: &mut impl Write) -> Result<()> {
    let stat = fs
        .rename_to(dst, src, None)
        .with_context(|| format!("Failed to move {src} to {dst}"))?;
    writeln!(out, "{src} -> {dst}")?;
    debug!("Moved {src}, id {id}", src: src, id: stat.id);
    Ok(())
}

/// Deletes a file or an empty directory. With history enabled the entry
/// goes to the trash.
pub fn remove_command(fs: &Dbfs, path: &str, out: &mut impl Write) -> Result<()> {
    if !fs.delete(path).with_context(|| format!("Failed to remove {path}"))? {
        bail!("{path}: no such file, or directory not empty");
    }
    writeln!(out, "removed {path}")?;
    Ok(())
}
