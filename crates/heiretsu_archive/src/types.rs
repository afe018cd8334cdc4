//! Base types for the structure of the archive files.

use binrw::{BinRead, BinWrite};

/// Fixed header archive header
///
/// Five scalars followed by one magic integer per file. All data is stored in little endian format
#[derive(BinRead, BinWrite, Debug, Default, Clone, PartialEq)]
#[brw(little)]
pub struct BinHeader {
    /// The number of magic integers in the table
    pub count: u32,

    /// Spacing of file offsets, the offset multiplier
    pub file_alignment: u32,

    /// Multiplier applied to the length bits of a magic integer
    pub lsb_multiplier: u32,

    /// How far a magic integer is shifted right to get the offset bits
    pub msb_shift: u32,

    /// Mask selecting the length bits of a magic integer
    pub lsb_mask: u32,

    /// Packed offset and length of every file
    #[br(count = count)]
    pub magic_integers: Vec<u32>,
}

impl BinHeader {
    /// Position of the first magic integer in the file
    pub const TABLE_START: usize = 0x14;

    /// Position of the magic integer for a one based table index
    pub fn slot(index: usize) -> usize {
        Self::TABLE_START + (index - 1) * 4
    }
}

/// Zero run archive header
///
/// Header scalars, then a pointer table and a table of second numbers, each `count` entries long.
/// The header is followed by a run of zero bytes before the first file.
#[derive(BinRead, BinWrite, Debug, Default, Clone, PartialEq)]
#[brw(little)]
pub struct ZeroRunHeader {
    /// The number of entries in each table
    pub count: u32,

    /// Spacing of file offsets
    pub msb_multiplier: u32,

    /// Multiplier applied to the length bits of a pointer
    pub lsb_multiplier: u32,

    /// How far a pointer's offset bits are shifted left
    pub msb_shift: u32,

    /// Mask selecting the length bits of a pointer
    pub lsb_mask: u32,

    /// Not understood, kept for round trips
    pub unknown: [u32; 2],

    /// Seed for the header length
    pub header_length_seed: u32,

    /// Packed offset and length of every file
    #[br(count = count)]
    pub pointers: Vec<u32>,

    /// Parallel table to the pointers
    #[br(count = count)]
    pub second_numbers: Vec<u32>,
}

impl ZeroRunHeader {
    /// Position of the first pointer in the file
    pub const TABLE_START: usize = 0x20;

    /// Position of the pointer for a one based table index
    pub fn slot(index: usize) -> usize {
        0x1C + index * 4
    }

    /// Length of the header as declared by the header itself
    pub fn header_length(&self) -> u32 {
        self.header_length_seed
            .wrapping_add(self.count.wrapping_mul(2).wrapping_add(8).wrapping_mul(4))
    }
}

/// Entry of the nested archive's index file
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct McbIndexRecord {
    /// Identifier of the sub archive, zero ends the index
    pub id: u16,

    /// Always zero in shipped files
    pub padding: i16,

    /// Offset of the sub archive in the data file
    pub offset: u32,

    /// Size of the sub archive in the data file
    pub size: u32,
}

impl McbIndexRecord {
    /// Size of the record in bytes
    pub const SIZE: usize = 12;
}

/// Header preceding each record of a sub archive
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct McbRecordHeader {
    /// Which external archive the record belongs to
    pub kind: i32,

    /// Offset of the matching file in that external archive
    pub external_offset: u32,

    /// Size of the compressed payload that follows
    pub size: u32,
}

impl McbRecordHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 12;

    /// Kind value of the record ending a sub archive
    pub const TERMINATOR: i32 = 0x7FFF;
}
