//! Typed errors for tree loading, process execution, and secret handling.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The inventory tree description was invalid; no partial tree is
    /// installed.
    #[error("malformed inventory tree: {0}")]
    MalformedTree(String),

    /// The child process could not be started.
    #[error("failed to spawn {command}: {message}")]
    Spawn { command: String, message: String },

    /// An unexpected I/O failure while reading the pseudo-terminal, distinct
    /// from normal EOF/hangup.
    #[error("read error on pty: {0}")]
    Read(String),

    /// The vault secret file could not be created, written, or deleted.
    #[error("vault secret file: {0}")]
    SecretFile(String),
}

pub type Result<T> = std::result::Result<T, Error>;
