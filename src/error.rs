use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The socket path is missing or nothing is listening on it.
    #[error("could not connect to p0f socket {path:?}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Writing to or reading from an established connection failed. The
    /// connection should be considered broken.
    #[error("could not communicate with p0f socket: {0}")]
    Communication(#[source] io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("p0f rejected the query as malformed")]
    BadQuery,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Whether the caller should tear down the connection and reconnect.
    pub fn is_communication(&self) -> bool {
        matches!(self, Error::Communication(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("truncated {what}: expected {expected} bytes, got {got}")]
    Truncated {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("missing data: {0}")]
    MissingData(&'static str),
    #[error("bad magic: {0:#x}")]
    BadMagic(u32),
    #[error("unknown response status: {0:#x}")]
    UnknownStatus(u32),
    #[error("unknown address type: {0:#x}")]
    UnknownAddressType(u8),
}
