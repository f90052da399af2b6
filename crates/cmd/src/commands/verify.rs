use std::io::Write;

use anyhow::{Result, anyhow, bail};
use dbfs::Dbfs;
use diagnostics::*;

/// Recomputes the checksum of a file, or of every file below a directory
pub fn verify_command(fs: &Dbfs, path: &str, out: &mut impl Write) -> Result<()> {
    let stat = fs
        .stat(path)?
        .ok_or_else(|| anyhow!("{path}: no such file or directory"))?;
    let path = path.trim_matches('/').to_string();

    let mut work = vec![(path, stat)];
    let mut checked = 0usize;
    let mut bad = 0usize;
    while let Some((path, stat)) = work.pop() {
        if stat.is_dir {
            for child in fs.read_dir_of(stat.id)?.into_iter().rev() {
                let child_path = if path.is_empty() {
                    child.name.clone()
                } else {
                    format!("{path}/{}", child.name)
                };
                work.push((child_path, child));
            }
            continue;
        }
        checked += 1;
        if !fs.verify(&path)? {
            bad += 1;
            writeln!(out, "FAILED /{path}")?;
        }
    }

    debug!("Verified {checked} files", checked: checked);
    writeln!(out, "{checked} files checked, {bad} failed")?;
    if bad > 0 {
        bail!("{bad} files failed verification");
    }
    Ok(())
}
