// Error types for Dbfs operations

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Advisory lock contention on a file id
    #[error("File in use: {0}")]
    InUse(String),

    /// Destination exists and may not be overwritten, or its parent is missing
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("End of stream")]
    Eof,

    #[error("Database is closed")]
    Closed,

    #[error("Transaction error: {message}")]
    Transaction { message: String },
}

impl Error {
    pub fn not_found<S: AsRef<str>>(path: S) -> Self {
        Error::NotFound(path.as_ref().to_string())
    }

    pub fn not_a_file<S: AsRef<str>>(path: S) -> Self {
        Error::NotAFile(path.as_ref().to_string())
    }

    pub fn not_a_directory<S: AsRef<str>>(path: S) -> Self {
        Error::NotADirectory(path.as_ref().to_string())
    }

    pub fn directory_not_empty<S: AsRef<str>>(path: S) -> Self {
        Error::DirectoryNotEmpty(path.as_ref().to_string())
    }

    pub fn in_use<S: AsRef<str>>(what: S) -> Self {
        Error::InUse(what.as_ref().to_string())
    }

    pub fn invalid_destination<S: AsRef<str>>(path: S) -> Self {
        Error::InvalidDestination(path.as_ref().to_string())
    }

    pub fn transaction<S: Into<String>>(message: S) -> Self {
        Error::Transaction {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_in_use(&self) -> bool {
        matches!(self, Error::InUse(_))
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> std::io::Error {
        use std::io::ErrorKind;
        match err {
            Error::Io(e) => e,
            Error::NotFound(_) => std::io::Error::new(ErrorKind::NotFound, err),
            Error::InUse(_) => std::io::Error::new(ErrorKind::WouldBlock, err),
            Error::Eof => std::io::Error::new(ErrorKind::UnexpectedEof, err),
            Error::InvalidDestination(_) => std::io::Error::new(ErrorKind::InvalidInput, err),
            _ => std::io::Error::other(err),
        }
    }
}
