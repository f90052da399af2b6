use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use diagnostics::*;

use cmd::commands::*;
use cmd::common::StoreContext;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "dbfs")]
struct Cli {
    /// Database file, defaults to $DBFS_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// YAML store configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Delete for good instead of moving entries to the trash
    #[arg(long, global = true)]
    no_history: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty store with its root directories
    Init,
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show the details of one entry
    Stat { path: String },
    /// Write a file to stdout
    Cat { path: String },
    /// Store a host file, or stdin when no file is given
    Put {
        path: String,
        file: Option<PathBuf>,
        /// Add to the end of an existing file
        #[arg(short, long)]
        append: bool,
    },
    /// Create a directory and its parents
    Mkdir { path: String },
    /// Delete a file or an empty directory
    Rm { path: String },
    /// Rename a file or directory
    Mv { src: String, dst: String },
    /// Copy a file
    Cp { src: String, dst: String },
    /// List deleted files below a root
    History {
        root: String,
        #[arg(default_value = "")]
        rpath: String,
        /// List directories holding deleted files
        #[arg(long)]
        dirs: bool,
        #[arg(long)]
        json: bool,
    },
    /// Restore a deleted file, or every file of a deleted directory listing
    Recover {
        root: String,
        rpath: String,
        dst: String,
        /// Which deleted version, 0 is the newest
        #[arg(long, default_value_t = 0)]
        version: usize,
    },
    /// Permanently remove deleted versions
    Prune {
        root: String,
        rpath: String,
        /// Every deleted version of the file
        #[arg(long)]
        all: bool,
    },
    /// Empty the trash
    Cleanup {
        /// Remove deleted files too, not only unreferenced directories
        #[arg(long)]
        all: bool,
        /// Only files deleted more than this many days ago
        #[arg(long)]
        days: Option<i64>,
    },
    /// Check stored content against the recorded checksums
    Verify {
        #[arg(default_value = "/")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_diagnostics();

    let cli = Cli::parse();
    let ctx = StoreContext {
        db: cli.db,
        config: cli.config,
        no_history: cli.no_history,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Commands::Init = cli.command {
        return init_command(&ctx, &mut out).await;
    }

    let fs = ctx.open()?;
    let result = match cli.command {
        Commands::Init => Ok(()),
        Commands::Ls { path } => list_command(&fs, &path, &mut out),
        Commands::Stat { path } => stat_command(&fs, &path, &mut out),
        Commands::Cat { path } => cat_command(&fs, &path, &mut out),
        Commands::Put { path, file, append } => put_file(&fs, &path, file, append, &mut out),
        Commands::Mkdir { path } => mkdir_command(&fs, &path, &mut out),
        Commands::Rm { path } => remove_command(&fs, &path, &mut out),
        Commands::Mv { src, dst } => move_command(&fs, &src, &dst, &mut out),
        Commands::Cp { src, dst } => copy_command(&fs, &src, &dst, &mut out),
        Commands::History { root, rpath, dirs, json } => {
            history_command(&fs, &root, &rpath, dirs, json, &mut out)
        }
        Commands::Recover { root, rpath, dst, version } => {
            recover_command(&fs, &root, &rpath, &dst, version, &mut out)
        }
        Commands::Prune { root, rpath, all } => prune_command(&fs, &root, &rpath, all, &mut out),
        Commands::Cleanup { all, days } => cleanup_command(&fs, all, days, &mut out),
        Commands::Verify { path } => verify_command(&fs, &path, &mut out),
    };
    out.flush()?;

    if !fs.close().await {
        warn!("Store closed with streams still open");
    }
    result
}

fn put_file(
    fs: &dbfs::Dbfs,
    path: &str,
    file: Option<PathBuf>,
    append: bool,
    out: &mut impl Write,
) -> Result<()> {
    let (mut source, timestamp): (Box<dyn Read>, Option<i64>) = match &file {
        Some(file) => (
            Box::new(File::open(file).with_context(|| format!("Failed to open {}", file.display()))?),
            put::host_timestamp(file),
        ),
        None => (Box::new(io::stdin().lock()), None),
    };
    _ = put_command(fs, path, source.as_mut(), append, timestamp, out)?;
    Ok(())
}
