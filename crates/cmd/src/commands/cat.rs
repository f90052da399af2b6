use std::io::Write;

use anyhow::{Context as _, Result};
use dbfs::Dbfs;
use diagnostics::*;

/// Streams the content of a file to `out`
pub fn cat_command(fs: &Dbfs, path: &str, out: &mut impl Write) -> Result<()> {
    let written = fs
        .copy_to(out, path)
        .with_context(|| format!("Failed to read {path}"))?;
    debug!("Copied {written} bytes from {path}", written: written, path: path);
    out.flush()?;
    Ok(())
}
