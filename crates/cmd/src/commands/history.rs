use std::io::Write;

use anyhow::{Context as _, Result, bail};
use dbfs::{Dbfs, DeletedFileStat, RootInfo};
use diagnostics::*;

use crate::common::{format_file_size, format_timestamp};

fn trash_listing(fs: &Dbfs, root: &str, rpath: &str, dirs: bool) -> Result<Vec<DeletedFileStat>> {
    let root = RootInfo::new(fs, root).with_context(|| format!("{root} is not a root"))?;
    Ok(root.history(rpath, dirs)?)
}

/// Lists the trash below `root`. A trailing `/` on `rpath` (or no `rpath`)
/// lists a directory, otherwise every deleted version of one file.
pub fn history_command(
    fs: &Dbfs,
    root: &str,
    rpath: &str,
    dirs: bool,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let entries = trash_listing(fs, root, rpath, dirs)?;
    if json {
        let values = entries
            .iter()
            .map(DeletedFileStat::to_json)
            .collect::<serde_json::Result<Vec<_>>>()?;
        writeln!(out, "{}", serde_json::to_string_pretty(&values)?)?;
        return Ok(());
    }
    for entry in &entries {
        let size = if entry.stat.is_dir {
            String::from("dir")
        } else {
            format_file_size(entry.stat.length)
        };
        writeln!(
            out,
            "{:>6} {} {:>9} /{}",
            entry.id(),
            format_timestamp(entry.last_deleted()),
            size,
            entry.path()
        )?;
    }
    Ok(())
}

/// Restores from the trash. For a single file `version` picks one of its
/// deleted versions, newest first. A directory listing restores the newest
/// version of each file into `dst`.
pub fn recover_command(
    fs: &Dbfs,
    root: &str,
    rpath: &str,
    dst: &str,
    version: usize,
    out: &mut impl Write,
) -> Result<()> {
    let entries = trash_listing(fs, root, rpath, false)?;
    let is_dir = rpath.is_empty() || rpath.ends_with('/');
    let selected: Vec<DeletedFileStat> = if is_dir {
        entries
    } else {
        match entries.into_iter().nth(version) {
            Some(entry) => vec![entry],
            None => bail!("{root}/{rpath}: no deleted version {version}"),
        }
    };
    if selected.is_empty() {
        bail!("Nothing to recover in {root}/{rpath}");
    }

    let (oks, fails) = fs.recover(dst, &selected)?;
    info!("Recovered {oks} entries to {dst}, {fails} failed", oks: oks, dst: dst, fails: fails);
    writeln!(out, "recovered {oks}, failed {fails}")?;
    if oks == 0 {
        bail!("Recovery to {dst} failed");
    }
    Ok(())
}

/// Permanently removes deleted versions. `all` removes every version of
/// the selected files.
pub fn prune_command(
    fs: &Dbfs,
    root: &str,
    rpath: &str,
    all: bool,
    out: &mut impl Write,
) -> Result<()> {
    let entries = trash_listing(fs, root, rpath, false)?;
    let selected = if rpath.is_empty() || rpath.ends_with('/') || all {
        entries
    } else {
        entries.into_iter().take(1).collect()
    };
    let (files, dirs) = fs.prune_history(&selected, all)?;
    writeln!(out, "pruned {files} files, {dirs} directories")?;
    Ok(())
}
