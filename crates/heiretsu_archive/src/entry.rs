//! Files stored inside an archive and their decoded payloads

use std::fmt::{self, Debug};

use crate::compression::{compress, decompress};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::error::Result;

/// Interpretation of the decompressed bytes of an entry
///
/// An archive is loaded with one payload type for all of its entries. Decoding receives the
/// decompressed bytes and the entry's offset inside its archive, encoding has to produce the bytes
/// that get compressed back into the archive.
pub trait Payload: Sized {
    /// Decode decompressed entry bytes
    fn decode(data: &[u8], offset: u32) -> Result<Self>;

    /// Encode the payload into uncompressed entry bytes
    fn encode(&self) -> Result<Vec<u8>>;
}

/// Payload keeping the decompressed bytes as they are
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPayload(pub Vec<u8>);

impl RawPayload {
    /// The decompressed bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawPayload {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl Payload for RawPayload {
    fn decode(data: &[u8], _offset: u32) -> Result<Self> {
        Ok(Self(data.to_vec()))
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// A file stored in an archive
#[derive(Clone)]
pub struct FileEntry<P = RawPayload> {
    pub(crate) offset: u32,
    pub(crate) compressed_length: u32,
    pub(crate) magic_integer: u32,
    pub(crate) index: Option<usize>,
    pub(crate) compressed: Vec<u8>,
    pub(crate) payload: Option<P>,
    pub(crate) edited: bool,
    pub(crate) location: Option<(usize, usize)>,
}

impl<P> Debug for FileEntry<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("compressed_length", &format_args!("{:#x}", self.compressed_length))
            .field("magic_integer", &format_args!("{:#010x}", self.magic_integer))
            .field("index", &self.index)
            .field("decoded", &self.payload.is_some())
            .field("edited", &self.edited)
            .field("location", &self.location)
            .finish()
    }
}

impl<P: Payload> FileEntry<P> {
    /// Decompress and decode `compressed`, reporting failures instead of returning them.
    pub(crate) fn new(
        offset: u32,
        compressed: Vec<u8>,
        diagnostics: &mut dyn DiagnosticSink,
    ) -> Self {
        let payload = match decompress(&compressed).and_then(|data| P::decode(&data, offset)) {
            Ok(payload) => Some(payload),
            Err(err) => {
                diagnostics.report(
                    DiagnosticKind::CorruptEntry,
                    &format!("entry at {offset:#x} could not be decoded: {err}"),
                );
                None
            }
        };

        Self {
            offset,
            compressed_length: compressed.len() as u32,
            magic_integer: 0,
            index: None,
            compressed,
            payload,
            edited: false,
            location: None,
        }
    }
}

impl<P> FileEntry<P> {
    /// Offset of the entry inside its archive
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length of the stored compressed bytes
    ///
    /// For tabled archives this is the quantized length from the magic integer.
    pub fn compressed_length(&self) -> u32 {
        self.compressed_length
    }

    /// Packed offset and length, zero for nested archive records
    pub fn magic_integer(&self) -> u32 {
        self.magic_integer
    }

    /// One based position of the entry in its archive's table, if it has one
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// The compressed bytes as stored in the archive
    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    /// The decoded payload, `None` when the entry could not be decoded
    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    /// Mutable access to the decoded payload, marking the entry as edited
    pub fn payload_mut(&mut self) -> Option<&mut P> {
        if self.payload.is_some() {
            self.edited = true;
        }
        self.payload.as_mut()
    }

    /// Replace the payload and mark the entry as edited
    pub fn set_payload(&mut self, payload: P) {
        self.payload = Some(payload);
        self.edited = true;
    }

    /// Whether the entry gets recompressed on serialization
    pub fn edited(&self) -> bool {
        self.edited
    }

    /// Set or clear the edited flag
    pub fn set_edited(&mut self, edited: bool) {
        self.edited = edited;
    }

    /// Sub archive and record position for nested archive records
    pub fn location(&self) -> Option<(usize, usize)> {
        self.location
    }
}

impl<P: Payload> FileEntry<P> {
    /// Encode and compress the payload of an edited entry, `None` when the stored bytes are kept
    pub(crate) fn recompress(&self) -> Result<Option<Vec<u8>>> {
        match &self.payload {
            Some(payload) if self.edited => Ok(Some(compress(&payload.encode()?))),
            _ => Ok(None),
        }
    }

    /// Replace the stored bytes after a successful serialization
    pub(crate) fn commit(&mut self, offset: u32, compressed: Option<Vec<u8>>) {
        self.offset = offset;
        if let Some(compressed) = compressed {
            self.compressed = compressed;
            self.edited = false;
        }
    }
}
