use rusqlite::Row;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Current time in milliseconds since the Unix epoch
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SHA-256 digest of a file's full byte stream
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Checksum)
    }

    /// Finishes a running digest
    #[must_use]
    pub fn finish(hasher: sha2::Sha256) -> Self {
        use sha2::Digest;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Checksum(bytes)
    }

    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        use sha2::Digest;
        Self::finish(sha2::Sha256::new_with_prefix(data))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        Checksum::from_slice(&bytes)
            .ok_or_else(|| serde::de::Error::custom(format!("bad checksum length: {}", text)))
    }
}

/// One row of the files table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub id: i64,
    #[serde(default)]
    pub dir_id: i64,
    pub name: String,
    pub is_dir: bool,
    pub last_modified: i64,
    pub length: i64,
    pub writable: bool,
    pub is_deleted: bool,
    pub last_deleted: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
}

impl FileStat {
    /// Reads the files columns of a row. Returns None when the row came from
    /// an outer join that matched nothing.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Option<Self>> {
        let Some(id) = row.get::<_, Option<i64>>("id")? else {
            return Ok(None);
        };
        let checksum: Option<Vec<u8>> = row.get("checksum")?;
        Ok(Some(FileStat {
            id,
            dir_id: row.get("dir_id")?,
            name: row.get("name")?,
            is_dir: row.get("is_dir")?,
            last_modified: row.get("last_modified")?,
            length: row.get("length")?,
            writable: row.get("writable")?,
            is_deleted: row.get("is_deleted")?,
            last_deleted: row.get("last_deleted")?,
            checksum: checksum.as_deref().and_then(Checksum::from_slice),
        }))
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    #[must_use]
    pub fn perm(&self) -> &'static str {
        if self.writable { "rw" } else { "r-" }
    }

    #[must_use]
    pub fn checksum_hex(&self) -> String {
        self.checksum.map(|c| c.to_hex()).unwrap_or_default()
    }
}

/// A trash entry: a soft-deleted row together with the path of its directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedFileStat {
    pub dir: String,
    #[serde(flatten)]
    pub stat: FileStat,
}

impl DeletedFileStat {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Option<Self>> {
        let Some(stat) = FileStat::from_row(row)? else {
            return Ok(None);
        };
        let Some(dir) = row.get::<_, Option<String>>("path")? else {
            return Ok(None);
        };
        Ok(Some(DeletedFileStat { dir, stat }))
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.stat.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.stat.name
    }

    #[must_use]
    pub fn last_deleted(&self) -> i64 {
        self.stat.last_deleted
    }

    /// Path of the entry itself
    #[must_use]
    pub fn path(&self) -> String {
        crate::path::join_rpath(&self.dir, &self.stat.name)
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn from_json(value: &serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}

impl fmt::Display for DeletedFileStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeletedFileStat({}, {}, {}, {}, {}, {})",
            self.dir,
            self.stat.name,
            self.stat.is_dir,
            self.stat.length,
            self.stat.is_deleted,
            self.stat.last_deleted
        )
    }
}

/// One row of the dirs table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    pub id: i64,
    pub path: String,
}

/// One content part of a file
#[derive(Clone, PartialEq, Eq)]
pub struct Content {
    pub id: i64,
    pub offset: i64,
    pub data: Vec<u8>,
}

impl Content {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Content {
            id: row.get("id")?,
            offset: row.get("offset")?,
            data: row.get("data")?,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn end(&self) -> i64 {
        self.offset + self.data.len() as i64
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("length", &self.data.len())
            .finish()
    }
}

/// Position of a content part without its bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentInfo {
    pub id: i64,
    pub offset: i64,
    pub length: i64,
}

impl ContentInfo {
    #[must_use]
    pub fn end(&self) -> i64 {
        self.offset + self.length
    }

    #[must_use]
    pub fn contains(&self, position: i64) -> bool {
        self.offset <= position && position < self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeletedFileStat {
        DeletedFileStat {
            dir: "home/notes".to_string(),
            stat: FileStat {
                id: 42,
                dir_id: 7,
                name: "a.txt".to_string(),
                is_dir: false,
                last_modified: 1_600_000_000_000,
                length: 3,
                writable: true,
                is_deleted: true,
                last_deleted: 1_600_000_100_000,
                checksum: Some(Checksum([0xab; 32])),
            },
        }
    }

    #[test]
    fn test_deleted_stat_json() {
        let deleted = sample();
        let json = deleted.to_json().unwrap();
        assert_eq!(json["dir"], "home/notes");
        assert_eq!(json["name"], "a.txt");
        assert_eq!(json["checksum"], "ab".repeat(32));

        let back = DeletedFileStat::from_json(&json).unwrap();
        assert_eq!(back, deleted);
        assert_eq!(back.path(), "home/notes/a.txt");
    }

    #[test]
    fn test_content_info_range() {
        let info = ContentInfo {
            id: 1,
            offset: 1024,
            length: 10,
        };
        assert!(info.contains(1024));
        assert!(info.contains(1033));
        assert!(!info.contains(1034));
        assert_eq!(info.end(), 1034);
    }
}
