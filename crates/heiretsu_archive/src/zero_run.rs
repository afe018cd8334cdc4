//! Archives whose header ends at the first run of zero bytes
//!
//! Files are stored as 16 byte lines and end at the first line that is entirely zero. The
//! pointer table is only used to find the length of a file and to move it, so entries are
//! discovered by walking the data rather than the table.

use std::io::Cursor;

use binrw::BinRead;
use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, instrument};

use crate::diagnostics::{DiagnosticKind, DiagnosticSink, TracingDiagnostics};
use crate::entry::{FileEntry, Payload, RawPayload};
use crate::error::{EntryNotFoundError, Error, Result};
use crate::layout::{
    align, pad, patch_slot, relocation_shift, ARCHIVE_ALIGNMENT, ENTRY_ALIGNMENT,
};
use crate::quantize::{LengthQuantizer, LENGTH_QUANTUM};
use crate::remap::OffsetRemap;
use crate::types::ZeroRunHeader;

const LINE: usize = 0x10;

/// Bits of a pointer that hold the file offset
const OFFSET_BITS: u32 = 0xFFFF_0000;

fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

/// Archive with a zero terminated header, a pointer table and a table of second numbers
#[derive(Debug, Clone)]
pub struct ZeroRunArchive<P = RawPayload> {
    header: ZeroRunHeader,
    header_bytes: Vec<u8>,
    quantizer: LengthQuantizer,
    entries: Vec<FileEntry<P>>,
}

impl<P: Payload> ZeroRunArchive<P> {
    /// Load an archive, logging entries that fail to decode
    pub fn load(data: &[u8]) -> Result<Self> {
        Self::load_with_diagnostics(data, &mut TracingDiagnostics)
    }

    /// Load an archive, reporting entries that fail to decode or have no pointer to
    /// `diagnostics`
    #[instrument(skip_all, err, fields(size = data.len()))]
    pub fn load_with_diagnostics(
        data: &[u8],
        diagnostics: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        let header_end = data
            .windows(LINE)
            .position(is_zero)
            .ok_or(Error::InvalidArchive("header is not followed by a zero run"))?;
        let first_file = header_end
            + data[header_end..]
                .iter()
                .take_while(|&&b| b == 0)
                .count();

        if header_end < ZeroRunHeader::TABLE_START {
            return Err(Error::InvalidArchive("header is truncated"));
        }
        let count = LittleEndian::read_u32(data) as usize;
        if first_file < ZeroRunHeader::TABLE_START + count * 8 {
            return Err(Error::InvalidArchive("pointer tables are truncated"));
        }

        let header = ZeroRunHeader::read(&mut Cursor::new(data))?;
        if header.msb_multiplier == 0 {
            return Err(Error::InvalidArchive("offset multiplier is zero"));
        }
        let quantizer = LengthQuantizer::new(header.lsb_mask, header.lsb_multiplier);

        let mut entries = Vec::new();
        let mut position = first_file;
        while position < data.len() {
            let offset = position;
            let mut compressed = Vec::new();
            loop {
                let line = &data[position.min(data.len())..(position + LINE).min(data.len())];
                position += LINE;
                if is_zero(line) {
                    break;
                }
                compressed.extend_from_slice(line);
            }

            if !compressed.is_empty() {
                compressed.resize(compressed.len() + LINE, 0);

                let mut entry: FileEntry<P> =
                    FileEntry::new(offset as u32, compressed, diagnostics);
                match find_pointer(&header, offset) {
                    Some((index, pointer)) => {
                        entry.index = Some(index);
                        entry.magic_integer = pointer;
                        entry.compressed_length = quantizer.length_of(pointer);
                    }
                    None => diagnostics.report(
                        DiagnosticKind::UnindexedEntry,
                        &format!("no pointer matches the entry at {offset:#x}"),
                    ),
                }
                entries.push(entry);
            }

            position += data[position.min(data.len())..]
                .iter()
                .take_while(|&&b| b == 0)
                .count();
        }

        debug!(entries = entries.len(), "loaded archive");

        Ok(Self {
            header,
            header_bytes: data[..first_file].to_vec(),
            quantizer,
            entries,
        })
    }

    /// Serialize the archive, recompressing edited entries and moving later entries out of
    /// their way.
    ///
    /// The returned remap lists the original and new offset of every entry. Nothing is changed
    /// when an error is returned.
    #[instrument(skip_all, err)]
    pub fn serialize(&mut self) -> Result<(Vec<u8>, OffsetRemap)> {
        let multiplier = self.header.msb_multiplier as usize;
        let shift = self.header.msb_shift;
        let mut output = self.header_bytes.clone();
        let mut pointers = self.header.pointers.clone();
        let mut remap = OffsetRemap::new();

        let mut offsets: Vec<usize> = self.entries.iter().map(|e| e.offset as usize).collect();
        let mut updates = Vec::with_capacity(self.entries.len());

        for (i, entry) in self.entries.iter().enumerate() {
            let offset = offsets[i];
            if output.len() > offset {
                return Err(Error::InvalidArchive("entry overlaps preceding data"));
            }
            output.resize(offset, 0);
            remap.insert(entry.offset, offset as u32);

            // The length covers the codec output, files end at the first zero line after it
            let recompressed = entry.recompress()?.map(|mut compressed| {
                let length = align(compressed.len(), LENGTH_QUANTUM as usize) as u32;
                pad(&mut compressed, LINE);
                compressed.resize(compressed.len() + LINE, 0);
                (compressed, length)
            });

            let mut pointer = entry.index.map_or(entry.magic_integer, |index| pointers[index - 1]);
            let mut length = entry.compressed_length;
            if let Some((_, quantized)) = &recompressed {
                length = *quantized;
                if let Some(index) = entry.index {
                    let offset_bits = ((offset / multiplier) as u32).wrapping_shl(shift);
                    pointer = offset_bits | self.quantizer.low_bits_for(length)?;
                    patch_slot(&mut output, ZeroRunHeader::slot(index), pointer)?;
                    pointers[index - 1] = pointer;
                }
            }

            let recompressed = recompressed.map(|(compressed, _)| compressed);
            output.extend_from_slice(recompressed.as_deref().unwrap_or(&entry.compressed));

            if let Some(next) = offsets.get_mut(i + 1) {
                pad(&mut output, ENTRY_ALIGNMENT);
                let steps = relocation_shift(output.len(), *next, multiplier);
                if steps > 0 {
                    let moved = self.relocate(&mut output, &mut pointers, i + 1, *next, steps)?;
                    debug!(from = *next, to = moved, "relocating entry");
                    *next = moved;
                }
            }

            updates.push((offset as u32, pointer, length, recompressed));
        }

        pad(&mut output, ARCHIVE_ALIGNMENT);

        for (entry, (offset, pointer, length, compressed)) in self.entries.iter_mut().zip(updates) {
            entry.magic_integer = pointer;
            entry.compressed_length = length;
            entry.commit(offset, compressed);
        }
        let header_len = self.header_bytes.len();
        self.header_bytes.copy_from_slice(&output[..header_len]);
        self.header.pointers = pointers;

        Ok((output, remap))
    }

    /// Move entry `position` forward by `steps` multiples, returning its new offset.
    ///
    /// Only the offset half of the pointer is rewritten and the offset is read back from it.
    fn relocate(
        &self,
        output: &mut [u8],
        pointers: &mut [u32],
        position: usize,
        offset: usize,
        steps: usize,
    ) -> Result<usize> {
        let multiplier = self.header.msb_multiplier as usize;
        let Some(index) = self.entries[position].index else {
            return Ok(offset + steps * multiplier);
        };

        let offset_bits = ((offset / multiplier + steps) as u32).wrapping_shl(self.header.msb_shift);
        let slot = ZeroRunHeader::slot(index);
        output
            .get_mut(slot + 2..slot + 4)
            .ok_or(Error::InvalidArchive("table slot lies outside of the header"))?
            .copy_from_slice(&offset_bits.to_le_bytes()[2..]);

        let pointer = (pointers[index - 1] & !OFFSET_BITS) | (offset_bits & OFFSET_BITS);
        pointers[index - 1] = pointer;

        Ok(pointer
            .wrapping_shr(self.header.msb_shift)
            .wrapping_mul(self.header.msb_multiplier) as usize)
    }
}

/// One based index and value of the pointer whose offset bits match `offset`
fn find_pointer(header: &ZeroRunHeader, offset: usize) -> Option<(usize, u32)> {
    let offset_bits = ((offset / header.msb_multiplier as usize) as u32).wrapping_shl(header.msb_shift);
    header
        .pointers
        .iter()
        .position(|&p| p & OFFSET_BITS == offset_bits)
        .map(|i| (i + 1, header.pointers[i]))
}

impl<P> ZeroRunArchive<P> {
    /// Number of entries in each table
    pub fn count(&self) -> u32 {
        self.header.count
    }

    /// Spacing of file offsets
    pub fn msb_multiplier(&self) -> u32 {
        self.header.msb_multiplier
    }

    /// Multiplier applied to the length bits of a pointer
    pub fn lsb_multiplier(&self) -> u32 {
        self.header.lsb_multiplier
    }

    /// Shift of the offset bits of a pointer
    pub fn msb_shift(&self) -> u32 {
        self.header.msb_shift
    }

    /// Mask selecting the length bits of a pointer
    pub fn lsb_mask(&self) -> u32 {
        self.header.lsb_mask
    }

    /// Length of the header as declared by its seed field
    pub fn header_length(&self) -> u32 {
        self.header.header_length()
    }

    /// Raw header bytes, up to the first file
    pub fn header_bytes(&self) -> &[u8] {
        &self.header_bytes
    }

    /// The pointer table
    pub fn pointers(&self) -> &[u32] {
        &self.header.pointers
    }

    /// The table following the pointers
    pub fn second_numbers(&self) -> &[u32] {
        &self.header.second_numbers
    }

    /// Quantizer built from the header
    pub fn quantizer(&self) -> &LengthQuantizer {
        &self.quantizer
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending offset order
    pub fn entries(&self) -> &[FileEntry<P>] {
        &self.entries
    }

    /// Mutable entries in ascending offset order
    pub fn entries_mut(&mut self) -> &mut [FileEntry<P>] {
        &mut self.entries
    }

    /// Entry for a one based pointer index
    pub fn entry_by_index(&self, index: usize) -> Result<&FileEntry<P>> {
        self.entries
            .iter()
            .find(|e| e.index == Some(index))
            .ok_or(EntryNotFoundError::Index(index).into())
    }

    /// Mutable entry for a one based pointer index
    pub fn entry_by_index_mut(&mut self, index: usize) -> Result<&mut FileEntry<P>> {
        self.entries
            .iter_mut()
            .find(|e| e.index == Some(index))
            .ok_or(EntryNotFoundError::Index(index).into())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::diagnostics::DiagnosticKind;
    use crate::entry::RawPayload;
    use crate::error::{Error, Result};
    use crate::zero_run::ZeroRunArchive;

    fn archive(pointers: &[u32], files: &[(usize, &[u8])], size: usize) -> Vec<u8> {
        let mut data = vec![];
        for value in [pointers.len() as u32, 0x800, 0x800, 16, 0xFFFF, 0x11, 0x22, 0x40] {
            data.extend(value.to_le_bytes());
        }
        for value in pointers {
            data.extend(value.to_le_bytes());
        }
        for i in 0..pointers.len() as u32 {
            data.extend((0x100 + i).to_le_bytes());
        }
        data.resize(size, 0);
        for (offset, bytes) in files {
            data[*offset..*offset + bytes.len()].copy_from_slice(bytes);
        }
        data
    }

    #[test]
    fn load_entries() -> Result<()> {
        let data = archive(
            &[0x0002_0001, 0x0001_0001],
            &[(0x800, &[0x02, 0xAA, 0xBB, 0x00]), (0x1000, &[0x41, 0x07, 0x00])],
            0x1800,
        );
        let mut reports: Vec<(DiagnosticKind, String)> = Vec::new();
        let archive: ZeroRunArchive = ZeroRunArchive::load_with_diagnostics(&data, &mut reports)?;

        assert!(reports.is_empty());
        assert_eq!(archive.count(), 2);
        assert_eq!(archive.header_bytes().len(), 0x800);
        assert_eq!(archive.header_length(), 0x40 + (2 * 2 + 8) * 4);
        assert_eq!(archive.second_numbers(), &[0x100, 0x101]);

        let first = &archive.entries()[0];
        assert_eq!(first.offset(), 0x800);
        assert_eq!(first.index(), Some(2));
        assert_eq!(first.compressed().len(), 0x20);
        assert_eq!(first.compressed_length(), 0x800);

        assert_eq!(archive.entry_by_index(1)?.offset(), 0x1000);
        Ok(())
    }

    #[test]
    fn unindexed_entries_are_reported() -> Result<()> {
        let data = archive(&[0x0001_0001], &[(0x800, &[0x01, 0x01]), (0x1000, &[0x01, 0x02])], 0x1800);
        let mut reports: Vec<(DiagnosticKind, String)> = Vec::new();
        let archive: ZeroRunArchive = ZeroRunArchive::load_with_diagnostics(&data, &mut reports)?;

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entries()[1].index(), None);
        assert_eq!(reports, vec![(DiagnosticKind::UnindexedEntry, "no pointer matches the entry at 0x1000".to_owned())]);
        Ok(())
    }

    #[test]
    fn header_without_zero_run() {
        assert!(matches!(
            ZeroRunArchive::<RawPayload>::load(&[0xFF; 0x40]),
            Err(Error::InvalidArchive(_))
        ));
    }

    #[test]
    fn relocation_patches_offset_half() -> Result<()> {
        let data = archive(
            &[0x0001_0001, 0x0002_0001],
            &[(0x800, &[0x01, 0x01]), (0x1000, &[0x01, 0x02])],
            0x1800,
        );
        let mut archive: ZeroRunArchive = ZeroRunArchive::load(&data)?;

        let counter: Vec<u8> = (0..0x480u16).flat_map(|k| k.to_be_bytes()).collect();
        archive.entries_mut()[0].set_payload(RawPayload(counter));
        let (bytes, remap) = archive.serialize()?;

        let moved = remap.get(0x1000).unwrap_or_default();
        assert_eq!(moved, 0x1800);
        assert_eq!(archive.pointers()[0], 0x0001_0002);
        assert_eq!(archive.pointers()[1] & 0xFFFF, 0x0001);
        assert_eq!(archive.pointers()[1] >> 16, moved / 0x800);
        assert_eq!(&bytes[0x24..0x28], &archive.pointers()[1].to_le_bytes());
        assert_eq!(bytes.len() % 0x800, 0);

        let reloaded: ZeroRunArchive = ZeroRunArchive::load(&bytes)?;
        assert_eq!(reloaded.entry_by_index(2)?.offset(), moved);
        assert_eq!(reloaded.entry_by_index(2)?.payload(), archive.entries()[1].payload());
        Ok(())
    }

    #[test]
    fn length_excludes_terminating_line() -> Result<()> {
        let data = archive(
            &[0x0001_0001, 0x0002_0001],
            &[(0x800, &[0x01, 0x01]), (0x1000, &[0x01, 0x02])],
            0x1800,
        );
        let mut archive: ZeroRunArchive = ZeroRunArchive::load(&data)?;

        // Stored as 0x7F8 codec bytes, padded to a line and followed by a zero line
        let counter: Vec<u8> = (0..0x3FBu16).flat_map(|k| k.to_be_bytes()).collect();
        archive.entries_mut()[0].set_payload(RawPayload(counter.clone()));
        let (bytes, remap) = archive.serialize()?;

        assert_eq!(archive.entries()[0].compressed().len(), 0x810);
        assert_eq!(archive.entries()[0].compressed_length(), 0x800);
        assert_eq!(archive.pointers()[0], 0x0001_0001);
        assert_eq!(remap.get(0x1000), Some(0x1800));

        let reloaded: ZeroRunArchive = ZeroRunArchive::load(&bytes)?;
        let decoded = reloaded.entry_by_index(1)?.payload().map(RawPayload::as_bytes).unwrap_or_default();
        assert_eq!(&decoded[..counter.len()], &counter[..]);
        Ok(())
    }
}
