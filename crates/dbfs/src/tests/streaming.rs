use super::{open_store, open_store_with, parts, random_bytes};
use crate::config::PART_SIZE;
use crate::error::Error;
use crate::stat::Checksum;
use sha2::{Digest, Sha256};
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Duration;

#[test]
fn test_large_file_is_stored_in_full_parts() {
    let (_dir, fs) = open_store();
    _ = fs.mkdirs("home").unwrap();
    let data = random_bytes(2_500_000, 1);

    let mut writer = fs.output_stream("home/big.bin", false).unwrap();
    for chunk in data.chunks(100_000) {
        writer.write_all(chunk).unwrap();
    }
    let stat = writer.close().unwrap();

    assert_eq!(stat.length, 2_500_000);
    let lengths: Vec<i64> = parts(&fs, "home/big.bin").iter().map(|p| p.length).collect();
    assert_eq!(lengths, vec![1_048_576, 1_048_576, 402_848]);
    let digest = Sha256::digest(&data);
    assert_eq!(stat.checksum.unwrap().as_bytes(), digest.as_slice());

    let (mut reader, _) = fs.input_stream("home/big.bin").unwrap();
    assert_eq!(reader.read_all().unwrap(), data);
}

#[test]
fn test_round_trip_across_part_boundaries() {
    let (_dir, fs) = open_store();
    for (i, len) in [0, 1, PART_SIZE - 1, PART_SIZE, PART_SIZE + 1, 2 * PART_SIZE + 7]
        .into_iter()
        .enumerate()
    {
        let data = random_bytes(len, i as u64);
        let path = format!("home/f{i}");
        let stat = fs.write(&path, &data, None, None).unwrap();
        assert_eq!(stat.length, len as i64);
        assert_eq!(stat.checksum, Some(Checksum::of(&data)));
        assert_eq!(parts(&fs, &path).len(), len.div_ceil(PART_SIZE));

        let (mut reader, _) = fs.input_stream(&path).unwrap();
        assert_eq!(reader.len(), len as u64);
        assert_eq!(reader.read_all().unwrap(), data, "length {len}");
        assert!(fs.verify(&path).unwrap());
    }
}

#[test]
fn test_append_extends_short_tail() {
    let (_dir, fs) = open_store();
    let head = random_bytes(PART_SIZE + 10, 3);
    let tail = random_bytes(PART_SIZE, 4);
    _ = fs.write("home/log", &head, None, None).unwrap();

    let mut writer = fs.output_stream("home/log", true).unwrap();
    assert_eq!(writer.position(), head.len() as u64);
    writer.write_all(&tail).unwrap();
    let stat = writer.close().unwrap();

    let mut all = head.clone();
    all.extend_from_slice(&tail);
    assert_eq!(stat.length, all.len() as i64);
    assert_eq!(stat.checksum, Some(Checksum::of(&all)));
    let lengths: Vec<i64> = parts(&fs, "home/log").iter().map(|p| p.length).collect();
    assert_eq!(lengths, vec![PART_SIZE as i64, PART_SIZE as i64, 10]);
    let (mut reader, _) = fs.input_stream("home/log").unwrap();
    assert_eq!(reader.read_all().unwrap(), all);
}

#[test]
fn test_append_creates_missing_file() {
    let (_dir, fs) = open_store();
    let mut writer = fs.output_stream("home/new", true).unwrap();
    writer.write_all(b"first").unwrap();
    _ = writer.close().unwrap();
    let mut writer = fs.output_stream("home/new", true).unwrap();
    writer.write_all(b" second").unwrap();
    let stat = writer.close().unwrap();
    assert_eq!(stat.checksum, Some(Checksum::of(b"first second")));
}

#[test]
fn test_output_stream_needs_parent() {
    let (_dir, fs) = open_store();
    let err = fs.output_stream("home/missing/f", false).unwrap_err();
    assert!(matches!(err, Error::InvalidDestination(_)));
    let err = fs.output_stream("home", false).unwrap_err();
    assert!(matches!(err, Error::InvalidDestination(_)));
}

#[test]
fn test_second_writer_and_reader_fail_fast() {
    let (_dir, fs) = open_store();
    _ = fs.write("home/a", b"old", None, None).unwrap();
    let mut writer = fs.output_stream("home/a", true).unwrap();
    writer.write_all(b"+new").unwrap();

    assert!(fs.output_stream("home/a", true).unwrap_err().is_in_use());
    assert!(fs.output_stream("home/a", false).unwrap_err().is_in_use());
    assert!(fs.input_stream("home/a").unwrap_err().is_in_use());
    assert!(fs.delete("home/a").unwrap_err().is_in_use());
    assert_eq!(fs.open_streams(), 1);

    _ = writer.close().unwrap();
    assert_eq!(fs.open_streams(), 0);
    let (mut reader, _) = fs.input_stream("home/a").unwrap();
    assert_eq!(reader.read_all().unwrap(), b"old+new");
}

#[test]
fn test_readers_share_and_block_writers() {
    let (_dir, fs) = open_store();
    _ = fs.write("home/r", b"shared", None, None).unwrap();
    let (first, _) = fs.input_stream("home/r").unwrap();
    let (second, _) = fs.input_stream("home/r").unwrap();
    assert!(fs.output_stream("home/r", true).unwrap_err().is_in_use());
    first.close();
    assert!(fs.output_stream("home/r", true).unwrap_err().is_in_use());
    drop(second);
    assert!(fs.output_stream("home/r", true).is_ok());
}

#[test]
fn test_dropped_writer_is_closed() {
    let (_dir, fs) = open_store();
    {
        let mut writer = fs.output_stream("home/d", false).unwrap();
        writer.write_all(b"forgotten").unwrap();
    }
    let stat = fs.stat("home/d").unwrap().unwrap();
    assert_eq!(stat.length, 9);
    assert_eq!(stat.checksum, Some(Checksum::of(b"forgotten")));
    assert_eq!(fs.open_streams(), 0);
}

#[test]
fn test_reader_seek_and_read_at() {
    let (_dir, fs) = open_store();
    let data = random_bytes(3 * PART_SIZE + 100, 5);
    _ = fs.write("home/s", &data, None, None).unwrap();
    let (mut reader, _) = fs.input_stream("home/s").unwrap();

    // A read straddling a part boundary
    let start = PART_SIZE - 5;
    assert_eq!(reader.seek(SeekFrom::Start(start as u64)).unwrap(), start as u64);
    let mut buf = [0u8; 10];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf[..], &data[start..start + 10]);
    assert_eq!(reader.position(), (start + 10) as u64);

    let end = reader.seek(SeekFrom::End(-4)).unwrap();
    assert_eq!(end, data.len() as u64 - 4);
    let mut rest = Vec::new();
    _ = reader.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, &data[data.len() - 4..]);
    assert_eq!(reader.read(&mut buf).unwrap(), 0);

    let err = reader.seek(SeekFrom::Start(data.len() as u64 + 1)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    assert!(reader.seek(SeekFrom::Current(-(data.len() as i64) - 1)).is_err());

    let mut buf = [0u8; 8];
    assert_eq!(reader.read_at(2 * PART_SIZE as u64, &mut buf).unwrap(), 8);
    assert_eq!(&buf[..], &data[2 * PART_SIZE..2 * PART_SIZE + 8]);
    assert_eq!(reader.position(), data.len() as u64);
}

#[test]
fn test_reader_keeps_three_parts_cached() {
    let (_dir, fs) = open_store();
    let data = random_bytes(4 * PART_SIZE, 6);
    _ = fs.write("home/c", &data, None, None).unwrap();
    let ids: Vec<i64> = parts(&fs, "home/c").iter().map(|p| p.id).collect();
    let (reader, _) = fs.input_stream("home/c").unwrap();

    let mut buf = [0u8; 1];
    for part in 0..4 {
        _ = reader.read_at((part * PART_SIZE) as u64, &mut buf).unwrap();
    }
    assert_eq!(reader.cached(), 3);
    assert!(!reader.is_cached(ids[0]));
    assert!(reader.is_cached(ids[3]));

    // Touching part 1 makes part 2 the eviction candidate
    _ = reader.read_at(PART_SIZE as u64, &mut buf).unwrap();
    _ = reader.read_at(0, &mut buf).unwrap();
    assert!(reader.is_cached(ids[1]));
    assert!(!reader.is_cached(ids[2]));
}

#[test]
fn test_input_stream_of_releases_locks() {
    let (_dir, fs) = open_store();
    _ = fs.write("home/x", b"abc", None, None).unwrap();
    let stat = fs.stat("home/x").unwrap().unwrap();
    let reader = fs.input_stream_of(&stat).unwrap();
    let copy = fs.input_stream_of(&stat).unwrap();
    reader.close();
    drop(copy);
    assert_eq!(fs.open_streams(), 0);
}

#[tokio::test]
async fn test_idle_writer_is_flushed_and_closed() {
    let (_dir, fs) = open_store_with(|config| config.with_auto_close(Duration::from_millis(200)));
    let mut writer = fs.output_stream("home/idle.txt", false).unwrap();
    writer.write_all(b"0123456789").unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(writer.is_closed());
    let stat = fs.stat("home/idle.txt").unwrap().unwrap();
    assert_eq!(stat.length, 10);
    assert_eq!(stat.checksum, Some(Checksum::of(b"0123456789")));
    assert_eq!(fs.open_streams(), 0);
    let err = writer.write(b"late").unwrap_err();
    assert!(err.to_string().contains("closed"));
}

#[tokio::test]
async fn test_writer_active_near_deadline_stays_open() {
    let (_dir, fs) = open_store_with(|config| config.with_auto_close(Duration::from_millis(300)));
    let mut writer = fs.output_stream("home/busy.txt", false).unwrap();
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(250)).await;
        writer.write_all(b"tick").unwrap();
        assert!(!writer.is_closed());
    }
    assert_eq!(fs.open_streams(), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(writer.is_closed());
    let stat = fs.stat("home/busy.txt").unwrap().unwrap();
    assert_eq!(stat.length, 24);
}

#[tokio::test]
async fn test_idle_reader_releases_lock() {
    let (_dir, fs) = open_store_with(|config| config.with_auto_close(Duration::from_millis(200)));
    _ = fs.write("home/r.txt", b"payload", None, None).unwrap();
    let (mut reader, _) = fs.input_stream("home/r.txt").unwrap();
    assert_eq!(fs.open_streams(), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(reader.is_closed());
    assert_eq!(fs.open_streams(), 0);
    let mut buf = [0u8; 4];
    assert!(reader.read(&mut buf).is_err());
}
