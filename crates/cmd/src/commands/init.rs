use std::io::Write;

use anyhow::{Context as _, Result};
use dbfs::Dbfs;
use diagnostics::*;

use crate::common::StoreContext;

/// Creates a fresh store, discarding whatever the database held before
pub async fn init_command(ctx: &StoreContext, out: &mut impl Write) -> Result<()> {
    let config = ctx.load_config()?;
    let path = config.path.display().to_string();
    let fs = Dbfs::init(config).with_context(|| format!("Failed to initialize {path}"))?;

    let roots: Vec<String> = fs.read_dir("")?.into_iter().map(|s| s.name).collect();
    info!("Initialized store {path} with roots {roots}", path: path.as_str(), roots: roots.join(","));
    writeln!(out, "Initialized {path}")?;
    for root in &roots {
        writeln!(out, "  /{root}")?;
    }

    _ = fs.close().await;
    Ok(())
}
