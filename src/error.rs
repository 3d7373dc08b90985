use std::fmt;
use std::io;
use std::path::PathBuf;

/// Unified error type for the storage engine.
#[derive(Debug)]
pub enum Error {
    /// IO error from disk operations. Partial writes land here too —
    /// they are hard failures, never retried at this layer.
    Io(io::Error),
    /// A serialized record line that cannot be parsed back. Fatal for the
    /// file being read.
    MalformedRecord(String),
    /// Caller handed us a key the wire format cannot carry.
    InvalidKey(String),
    /// Caller handed us a value the wire format cannot carry.
    InvalidValue(String),
    /// Bad engine/level-set configuration. Fails fast at construction.
    InvalidConfig(String),
    /// Exclusive create hit an occupied path. Callers pick a fresh name.
    AlreadyExists(PathBuf),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::MalformedRecord(msg) => write!(f, "Malformed record: {msg}"),
            Error::InvalidKey(msg) => write!(f, "Invalid key: {msg}"),
            Error::InvalidValue(msg) => write!(f, "Invalid value: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "Invalid config: {msg}"),
            Error::AlreadyExists(path) => write!(f, "Already exists: {}", path.display()),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
