//! This library handles reading and rewriting the archive containers used by *Suzumiya Haruhi no
//! Heiretsu*.
//!
//! # Archive Format Documentation
//!
//! The game stores its assets in three kinds of containers. Every file inside them is compressed
//! with the same LZ scheme, described in [`compression`]. All multi-byte integers are little
//! endian.
//!
//! ## Fixed header archives (`grp.bin`, `dat.bin`, `scr.bin`, `evt.bin`)
//!
//! A header of five scalars is followed by a table of magic integers, one per file.
//!
//! | Offset (bytes) | Field           | Description                                                  |
//! |----------------|-----------------|--------------------------------------------------------------|
//! | 0x0000         | Count           | 4 bytes: Number of magic integers                            |
//! | 0x0004         | File alignment  | 4 bytes: Spacing of file offsets                             |
//! | 0x0008         | LSB multiplier  | 4 bytes: Scale of the length bits                            |
//! | 0x000C         | MSB shift       | 4 bytes: Shift separating the offset bits                    |
//! | 0x0010         | LSB mask        | 4 bytes: Mask selecting the length bits                      |
//! | 0x0014         | Magic integers  | 4 bytes each: Packed offset and length of every file         |
//!
//! - **Offset**: `(magic >> msb_shift) * file_alignment`
//! - **Length**: derived from `magic & lsb_mask` and the LSB multiplier, see [`quantize`]. The
//!   length is a multiple of 0x800 and usually longer than the compressed data.
//!
//! Files are placed in offset order, with zero padding up to the next offset.
//!
//! ## Zero run archives (`.bln`)
//!
//! | Offset (bytes) | Field           | Description                                                  |
//! |----------------|-----------------|--------------------------------------------------------------|
//! | 0x0000         | Count           | 4 bytes: Number of entries in each table                     |
//! | 0x0004         | MSB multiplier  | 4 bytes: Spacing of file offsets                             |
//! | 0x0008         | LSB multiplier  | 4 bytes: Scale of the length bits                            |
//! | 0x000C         | MSB shift       | 4 bytes: Shift of the offset bits                            |
//! | 0x0010         | LSB mask        | 4 bytes: Mask selecting the length bits                      |
//! | 0x0014         | Unknown         | 8 bytes                                                      |
//! | 0x001C         | Length seed     | 4 bytes: Header length minus the size of both tables         |
//! | 0x0020         | Pointers        | 4 bytes each: Offset in the high half, length in the low half |
//! | ...            | Second numbers  | 4 bytes each: Parallel to the pointers                       |
//!
//! The header ends with a run of at least 16 zero bytes. Files follow on 16 byte lines and each
//! ends with a line of zeros.
//!
//! ## Nested archives (`mcb0.bln` and `mcb1.bln`)
//!
//! The index file is a list of sub archives, ended by a zero id and padded to 0x3000 bytes.
//!
//! | Offset (bytes) | Field    | Description                                       |
//! |----------------|----------|---------------------------------------------------|
//! | 0x0000         | Id       | 2 bytes: Identifier, zero ends the index          |
//! | 0x0002         | Padding  | 2 bytes                                           |
//! | 0x0004         | Offset   | 4 bytes: Offset of the sub archive in `mcb1.bln`  |
//! | 0x0008         | Size     | 4 bytes: Size of the sub archive                  |
//!
//! Each sub archive is a sequence of records, ended by a kind of `0x7FFF` and padded to 0x1000.
//!
//! | Offset (bytes) | Field           | Description                                              |
//! |----------------|-----------------|----------------------------------------------------------|
//! | 0x0000         | Kind            | 4 bytes: `0` grp, `1` dat, `2` scr, `3` evt              |
//! | 0x0004         | External offset | 4 bytes: Offset of the file in that archive              |
//! | 0x0008         | Size            | 4 bytes: Size of the compressed payload that follows     |
//!
//! Records point into the fixed header archives, so after repacking one of those the
//! [`OffsetRemap`] it produced has to be applied with [`McbArchive::apply_remap`].

pub mod bin;
pub mod compression;
pub mod diagnostics;
pub mod entry;
pub mod error;
pub mod layout;
pub mod mcb;
pub mod quantize;
pub mod remap;
pub mod types;
pub mod zero_run;

pub use bin::BinArchive;
pub use compression::{compress, decompress};
pub use diagnostics::{DiagnosticKind, DiagnosticSink, TracingDiagnostics};
pub use entry::{FileEntry, Payload, RawPayload};
pub use mcb::{McbArchive, McbOptions, McbRecord, McbSubArchive};
pub use quantize::LengthQuantizer;
pub use remap::{ContainerKind, OffsetRemap};
pub use zero_run::ZeroRunArchive;
