//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file is an invalid archive
    #[error("file is an invalid archive: {0}")]
    InvalidArchive(&'static str),

    /// unable to decompress entry
    #[error("unable to decompress entry")]
    Decompression(#[from] DecompressionError),

    /// compressed length {length:#x} has no magic integer encoding
    #[error("compressed length {length:#x} has no magic integer encoding")]
    #[diagnostic(help("the container's lsb multiplier and mask cannot express this length"))]
    UnencodableLength {
        /// The rounded compressed length that was looked up
        length: u32,
    },

    /// unsupported container kind {0}
    #[error("unsupported container kind {0}")]
    UnsupportedContainerKind(String),

    /// invalid offset remap on line {line}: {reason}
    #[error("invalid offset remap on line {line}: {reason}")]
    InvalidRemap {
        /// One based line number within the remap text
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// unable to find requested entry
    #[error("unable to find requested entry")]
    EntryNotFound(#[from] EntryNotFoundError),

    /// payload could not be decoded or encoded
    #[error("payload error: {0}")]
    Payload(String),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when a compressed stream is malformed
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum DecompressionError {
    /// stream ended inside an opcode
    #[error("stream ended inside an opcode at {position:#x}")]
    Truncated {
        /// Position in the compressed stream where more input was expected
        position: usize,
    },

    /// backreference reaches outside of the decoded data
    #[error("backreference at {position:#x} reaches {displacement:#x} back but only {available:#x} bytes are decoded")]
    InvalidBackreference {
        /// Position of the opcode in the compressed stream
        position: usize,
        /// Encoded displacement
        displacement: usize,
        /// Bytes decoded so far
        available: usize,
    },
}

/// Error type to provide further information when an entry has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested entry")]
pub enum EntryNotFoundError {
    /// at table index {0}
    #[error("at table index {0}")]
    Index(usize),

    /// at sub archive {0}, record {1}
    #[error("at sub archive {0}, record {1}")]
    Location(usize, usize),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
