pub use anyhow::bail;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Error taxonomy for the clone/export/restore engine.
///
/// `UserInput` and `Precondition` abort before any storage mutation;
/// `Storage` aborts the remaining steps of the current job only, leaving
/// completed work in place; `CorruptBundle` is fatal to a single restore.
#[derive(Error, Debug)]
pub enum ZvError {
    UserInput(String),
    Precondition(String),
    Storage(String),
    CorruptBundle(String),
    Command(String),
    Config(String),
    Io(#[from] std::io::Error),
    Serialization(String),
    Internal(String),
    Other(anyhow::Error),
}

impl From<anyhow::Error> for ZvError {
    fn from(err: anyhow::Error) -> Self {
        ZvError::Other(err)
    }
}

impl Display for ZvError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ZvError::UserInput(s) => write!(f, "Invalid input: {}", s),
            ZvError::Precondition(s) => write!(f, "Precondition failed: {}", s),
            ZvError::Storage(s) => write!(f, "Storage operation failed: {}", s),
            ZvError::CorruptBundle(s) => write!(f, "Corrupt bundle: {}", s),
            ZvError::Command(s) => write!(f, "Command failed: {}", s),
            ZvError::Config(s) => write!(f, "Configuration error: {}", s),
            ZvError::Io(e) => write!(f, "I/O error: {}", e),
            ZvError::Serialization(s) => write!(f, "Serialization error: {}", s),
            ZvError::Internal(s) => write!(f, "Internal error: {}", s),
            ZvError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ZvError>;
