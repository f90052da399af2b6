use super::{home, open_store, open_store_with};
use crate::config::DbfsConfig;
use crate::error::Error;
use crate::fs::Dbfs;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_transaction_is_atomic() {
    let (_dir, fs) = open_store();
    let result: crate::Result<()> = fs.transaction(|txn| {
        _ = txn.write("home/one", b"1", None, None)?;
        _ = txn.write("home/two", b"2", None, None)?;
        assert_eq!(txn.read_dir("home")?.len(), 2);
        Err(Error::transaction("abandoned"))
    });
    assert!(result.is_err());
    assert!(fs.read_dir("home").unwrap().is_empty());
}

#[test]
fn test_nested_failure_only_undoes_inner_work() {
    let (_dir, fs) = open_store();
    let kept = fs
        .transaction(|txn| {
            _ = txn.write("home/outer", b"o", None, None)?;
            let inner = txn.transaction(|inner| {
                assert_eq!(inner.depth(), 2);
                _ = inner.write("home/inner", b"i", None, None)?;
                inner.mkdirs("home/outer/sub")
            });
            assert!(matches!(inner, Err(Error::InvalidDestination(_))));
            Ok(txn.stat("home/inner")?.is_none())
        })
        .unwrap();
    assert!(kept);
    assert!(fs.stat("home/outer").unwrap().is_some());
    assert!(fs.stat("home/inner").unwrap().is_none());
}

#[test]
fn test_store_api_inside_transaction_is_refused() {
    let (_dir, fs) = open_store();
    let result = fs.transaction(|_| fs.stat("home"));
    assert!(matches!(result, Err(Error::Transaction { .. })));
    // The failed attempt leaves the store usable
    assert!(fs.stat("home").unwrap().is_some());
}

#[test]
fn test_content_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = DbfsConfig::new(dir.path().join("dbfs.db"));
    {
        let fs = Dbfs::open(config.clone()).unwrap();
        _ = fs.write("home/persist", b"across opens", None, Some(3)).unwrap();
    }
    let fs = Dbfs::open(config.clone()).unwrap();
    let stat = fs.stat("home/persist").unwrap().unwrap();
    assert_eq!(stat.last_modified, 3);
    assert!(fs.verify("home/persist").unwrap());
    drop(fs);

    let fresh = Dbfs::init(config).unwrap();
    assert!(fresh.stat("home/persist").unwrap().is_none());
    assert!(fresh.stat("external-backup").unwrap().unwrap().is_dir);
}

#[test]
fn test_custom_roots() {
    let (_dir, fs) = open_store_with(|config| config.with_roots(["docs", "media"]));
    let names: Vec<String> = fs.read_dir("").unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["docs", "media"]);
    assert!(matches!(
        crate::root::RootInfo::new(&fs, "home"),
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_close_then_resume() {
    let (_dir, fs) = open_store();
    _ = fs.write("home/f", b"data", None, None).unwrap();
    let root = home(&fs);

    assert!(fs.close().await);
    assert!(fs.is_closed());
    assert!(matches!(fs.stat("home/f"), Err(Error::Closed)));
    assert!(matches!(fs.write("home/g", b"x", None, None), Err(Error::Closed)));
    assert!(root.read_dir().unwrap().is_empty());

    fs.resume();
    assert!(!fs.is_closed());
    assert_eq!(fs.stat("home/f").unwrap().unwrap().length, 4);
    _ = fs.write("home/g", b"x", None, None).unwrap();
}

#[tokio::test]
async fn test_close_waits_for_open_writer() {
    let (_dir, fs) = open_store_with(|config| {
        let mut config = config;
        config.close_tick_ms = 20;
        config
    });
    let mut writer = fs.output_stream("home/slow", false).unwrap();
    writer.write_all(b"draining").unwrap();

    let closer = fs.clone();
    let closing = tokio::spawn(async move { closer.close().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // New work is refused while the writer drains
    assert!(matches!(fs.write("home/other", b"x", None, None), Err(Error::Closed)));
    let stat = writer.close().unwrap();
    assert_eq!(stat.length, 8);

    assert!(closing.await.unwrap());
    assert!(fs.is_closed());
    fs.resume();
    assert!(fs.verify("home/slow").unwrap());
}

#[tokio::test]
async fn test_pause_forces_close_of_forgotten_stream() {
    let (_dir, fs) = open_store_with(|config| {
        let mut config = config;
        config.close_tick_ms = 10;
        config.close_iterations = 3;
        config
    });
    _ = fs.write("home/r", b"held", None, None).unwrap();
    let (reader, _) = fs.input_stream("home/r").unwrap();

    assert!(!fs.pause().await);
    assert!(fs.is_closed());
    assert_eq!(fs.open_streams(), 0);
    drop(reader);

    fs.resume();
    assert!(fs.output_stream("home/r", true).is_ok());
}
