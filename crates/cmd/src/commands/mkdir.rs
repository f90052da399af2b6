use std::io::Write;

use anyhow::{Context as _, Result};
use dbfs::Dbfs;
use diagnostics::*;

pub fn mkdir_command(fs: &Dbfs, path: &str, out: &mut impl Write) -> Result<()> {
    debug!("Creating directory {path}", path: path);
    let id = fs
        .mkdirs(path)
        .with_context(|| format!("Failed to create directory {path}"))?;
    info!("Directory created: {path} ({id})", path: path, id: id);
    writeln!(out, "{path}")?;
    Ok(())
}
