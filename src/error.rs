use thiserror::Error;

/// Error taxonomy for the engine. `Congestion` is deliberately absent: a full
/// hash-index row is counted in `Stats`, never propagated as an error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive corrupt: {0}")]
    Corrupt(String),

    #[error("archive version mismatch: on-disk {found:?}, engine supports {supported:?}")]
    VersionMismatch { found: (u8, u8), supported: (u8, u8) },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("checksum mismatch restoring {path}")]
    ChecksumMismatch { path: String },

    #[error("unknown codec id {0}")]
    UnknownCodec(u8),

    #[error("unknown packet kind {0}")]
    UnknownPacketKind(u8),
}

pub type Result<T> = std::result::Result<T, EngineError>;
