mod lifecycle;
mod streaming;

use crate::config::DbfsConfig;
use crate::fs::Dbfs;
use crate::root::RootInfo;
use crate::schema::Contents;
use crate::stat::ContentInfo;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tempfile::TempDir;

/// A store in a fresh temporary directory. The directory lives as long as
/// the returned guard.
pub(crate) fn open_store() -> (TempDir, Dbfs) {
    open_store_with(|config| config)
}

pub(crate) fn open_store_with<F>(configure: F) -> (TempDir, Dbfs)
where
    F: FnOnce(DbfsConfig) -> DbfsConfig,
{
    let dir = tempfile::tempdir().unwrap();
    let config = configure(
        DbfsConfig::new(dir.path().join("dbfs.db"))
            .with_auto_close(Duration::from_secs(60)),
    );
    let fs = Dbfs::open(config).unwrap();
    (dir, fs)
}

pub(crate) fn home(fs: &Dbfs) -> RootInfo {
    RootInfo::new(fs, "home").unwrap()
}

/// Reproducible pseudo-random bytes
pub(crate) fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Stored parts of the live file at `path`
pub(crate) fn parts(fs: &Dbfs, path: &str) -> Vec<ContentInfo> {
    let stat = fs.stat(path).unwrap().unwrap();
    fs.read(|conn| Contents::infos(conn, stat.id)).unwrap()
}
