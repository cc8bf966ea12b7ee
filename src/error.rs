//! Flat error taxonomy shared by the raw chunk layer, writer, and reader.
//!
//! There is exactly one error type in this crate. Internal errors bubble up
//! to the public call unchanged; a failed call leaves the writer/reader
//! usable for unrelated signals (no global poisoning).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Argument failed a precondition: null, out-of-range id, wrong signal_type.
    #[error("parameter invalid: {0}")]
    ParameterInvalid(String),

    /// Id unknown, or list empty where a value was required.
    #[error("not found")]
    NotFound,

    /// Defining a source/signal that is already defined.
    #[error("already exists")]
    AlreadyExists,

    /// Feature not yet implemented for this configuration.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Allocation failure or internal scratch-buffer overrun.
    #[error("not enough memory")]
    NotEnoughMemory,

    /// End of stream / no next item. Control-flow signal, not a true error.
    #[error("empty")]
    Empty,

    /// Raw-layer caller must enlarge the payload buffer and retry.
    #[error("payload too big: requires {required} bytes")]
    TooBig { required: u32 },

    /// File-layer failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Chunk header CRC32 mismatch — chunk is unreadable.
    #[error("header crc mismatch")]
    CrcHeader,

    /// Chunk payload CRC32 mismatch — chunk is unreadable.
    #[error("payload crc mismatch")]
    CrcPayload,
}

pub type Result<T> = std::result::Result<T, Error>;
