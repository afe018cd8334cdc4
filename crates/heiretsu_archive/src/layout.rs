//! Alignment and relocation arithmetic shared by the archive writers

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Entries are padded to this boundary before the next entry is placed
pub const ENTRY_ALIGNMENT: usize = 0x10;

/// Serialized flat archives are padded to this boundary
pub const ARCHIVE_ALIGNMENT: usize = 0x800;

/// Round `value` up to the next multiple of `alignment`.
pub fn align(value: usize, alignment: usize) -> usize {
    match value % alignment {
        0 => value,
        rem => value + alignment - rem,
    }
}

/// Zero-pad `buffer` to the next multiple of `alignment`.
pub fn pad(buffer: &mut Vec<u8>, alignment: usize) {
    buffer.resize(align(buffer.len(), alignment), 0);
}

/// Zero-pad `buffer` to the next multiple of `alignment`, adding a whole block when already
/// aligned.
pub fn pad_block(buffer: &mut Vec<u8>, alignment: usize) {
    let rem = buffer.len() % alignment;
    buffer.resize(buffer.len() + alignment - rem, 0);
}

/// Number of `multiplier` sized steps the next entry must move so that it starts at or after
/// `written`.
pub fn relocation_shift(written: usize, next_offset: usize, multiplier: usize) -> usize {
    if written <= next_offset || multiplier == 0 {
        return 0;
    }
    (written - next_offset).div_ceil(multiplier)
}

/// Write a table value into the header part of `output`
pub(crate) fn patch_slot(output: &mut [u8], slot: usize, value: u32) -> Result<()> {
    let slot = output
        .get_mut(slot..slot + 4)
        .ok_or(Error::InvalidArchive("table slot lies outside of the header"))?;
    LittleEndian::write_u32(slot, value);
    Ok(())
}
