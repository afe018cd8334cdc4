//! Archives with a fixed size header followed by a table of magic integers
//!
//! ```no_run
//! use heiretsu_archive::{BinArchive, RawPayload};
//!
//! fn repack(data: &[u8]) -> heiretsu_archive::error::Result<Vec<u8>> {
//!     let mut archive: BinArchive<RawPayload> = BinArchive::load(data)?;
//!
//!     let entry = archive.entry_by_index_mut(1)?;
//!     entry.set_payload(RawPayload(b"replacement".to_vec()));
//!
//!     let (bytes, remap) = archive.serialize()?;
//!     for (original, new) in remap.moved() {
//!         println!("{original:#x} -> {new:#x}");
//!     }
//!     Ok(bytes)
//! }
//! ```

use std::collections::HashMap;
use std::io::Cursor;

use binrw::BinRead;
use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, instrument};

use crate::compression::END_OF_STREAM;
use crate::diagnostics::{DiagnosticSink, TracingDiagnostics};
use crate::entry::{FileEntry, Payload, RawPayload};
use crate::error::{EntryNotFoundError, Error, Result};
use crate::layout::{
    align, pad, patch_slot, relocation_shift, ARCHIVE_ALIGNMENT, ENTRY_ALIGNMENT,
};
use crate::quantize::{LengthQuantizer, LENGTH_QUANTUM};
use crate::remap::OffsetRemap;
use crate::types::BinHeader;

/// Archive with a fixed size header and one magic integer per file
#[derive(Debug, Clone)]
pub struct BinArchive<P = RawPayload> {
    header: BinHeader,
    header_bytes: Vec<u8>,
    quantizer: LengthQuantizer,
    entries: Vec<FileEntry<P>>,
    aliases: Vec<(usize, usize)>,
}

impl<P: Payload> BinArchive<P> {
    /// Load an archive, logging entries that fail to decode
    pub fn load(data: &[u8]) -> Result<Self> {
        Self::load_with_diagnostics(data, &mut TracingDiagnostics)
    }

    /// Load an archive, reporting entries that fail to decode to `diagnostics`
    #[instrument(skip_all, err, fields(size = data.len()))]
    pub fn load_with_diagnostics(
        data: &[u8],
        diagnostics: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        if data.len() < BinHeader::TABLE_START {
            return Err(Error::InvalidArchive("header is truncated"));
        }
        let count = LittleEndian::read_u32(data) as usize;
        if data.len() < BinHeader::TABLE_START + count * 4 {
            return Err(Error::InvalidArchive("magic integer table is truncated"));
        }

        let header = BinHeader::read(&mut Cursor::new(data))?;
        if header.file_alignment == 0 {
            return Err(Error::InvalidArchive("file alignment is zero"));
        }
        let quantizer = LengthQuantizer::new(header.lsb_mask, header.lsb_multiplier);

        let mut slots: Vec<(usize, u32, usize, usize)> = header
            .magic_integers
            .iter()
            .enumerate()
            .map(|(i, &magic)| {
                let offset = magic
                    .wrapping_shr(header.msb_shift)
                    .wrapping_mul(header.file_alignment) as usize;
                (i + 1, magic, offset, quantizer.length_of(magic) as usize)
            })
            .filter(|&(_, _, offset, length)| length > 0 && offset < data.len())
            .collect();
        slots.sort_by_key(|&(_, _, offset, _)| offset);

        let mut entries: Vec<FileEntry<P>> = Vec::with_capacity(slots.len());
        let mut aliases = Vec::new();
        for (position, &(index, magic, offset, length)) in slots.iter().enumerate() {
            if let Some(owner) = entries.last().filter(|e| e.offset as usize == offset) {
                debug!(index, owner = owner.index, "magic integer shares its offset");
                aliases.push((index, entries.len() - 1));
                continue;
            }

            let next = slots[position..]
                .iter()
                .map(|&(_, _, o, _)| o)
                .find(|&o| o > offset)
                .unwrap_or(data.len());
            let end = (offset + length).min(next).min(data.len());

            let mut entry = FileEntry::new(offset as u32, data[offset..end].to_vec(), diagnostics);
            entry.compressed_length = length as u32;
            entry.magic_integer = magic;
            entry.index = Some(index);
            entries.push(entry);
        }

        let header_end = entries
            .first()
            .map_or(data.len(), |e| e.offset as usize)
            .max(BinHeader::TABLE_START + count * 4);
        let header_bytes = data[..header_end.min(data.len())].to_vec();

        debug!(entries = entries.len(), aliases = aliases.len(), "loaded archive");

        Ok(Self {
            header,
            header_bytes,
            quantizer,
            entries,
            aliases,
        })
    }

    /// Serialize the archive, recompressing edited entries and moving later entries out of
    /// their way.
    ///
    /// The returned remap lists the original and new offset of every entry. Nothing is changed
    /// when an error is returned.
    #[instrument(skip_all, err)]
    pub fn serialize(&mut self) -> Result<(Vec<u8>, OffsetRemap)> {
        let alignment = self.header.file_alignment as usize;
        let mut output = self.header_bytes.clone();
        let mut magic_integers = self.header.magic_integers.clone();
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

            let offset_bits = ((offset / alignment) as u32).wrapping_shl(self.header.msb_shift);
            let recompressed = entry.recompress()?.map(|mut compressed| {
                compressed.push(END_OF_STREAM);
                compressed
            });

            let (magic, length) = match &recompressed {
                Some(compressed) => {
                    let length = align(compressed.len(), LENGTH_QUANTUM as usize) as u32;
                    (offset_bits | self.quantizer.low_bits_for(length)?, length)
                }
                None if offset != entry.offset as usize => (
                    offset_bits | (entry.magic_integer & self.header.lsb_mask),
                    entry.compressed_length,
                ),
                None => (entry.magic_integer, entry.compressed_length),
            };

            if magic != entry.magic_integer {
                let index = entry.index.ok_or(EntryNotFoundError::Index(0))?;
                patch_slot(&mut output, BinHeader::slot(index), magic)?;
                magic_integers[index - 1] = magic;
            }

            output.extend_from_slice(recompressed.as_deref().unwrap_or(&entry.compressed));

            if let Some(next) = offsets.get_mut(i + 1) {
                pad(&mut output, ENTRY_ALIGNMENT);
                let shift = relocation_shift(output.len(), *next, alignment);
                if shift > 0 {
                    debug!(from = *next, to = *next + shift * alignment, "relocating entry");
                    *next += shift * alignment;
                }
            }

            updates.push((offset as u32, magic, length, recompressed));
        }

        for &(index, owner) in &self.aliases {
            let magic = updates[owner].1;
            if magic != self.entries[owner].magic_integer {
                patch_slot(&mut output, BinHeader::slot(index), magic)?;
                magic_integers[index - 1] = magic;
            }
        }

        pad(&mut output, ARCHIVE_ALIGNMENT);

        for (entry, (offset, magic, length, compressed)) in self.entries.iter_mut().zip(updates) {
            entry.magic_integer = magic;
            entry.compressed_length = length;
            entry.commit(offset, compressed);
        }
        let header_len = self.header_bytes.len();
        self.header_bytes.copy_from_slice(&output[..header_len]);
        self.header.magic_integers = magic_integers;

        Ok((output, remap))
    }
}

impl<P> BinArchive<P> {
    /// Number of magic integers in the table
    pub fn count(&self) -> u32 {
        self.header.count
    }

    /// Spacing of file offsets
    pub fn file_alignment(&self) -> u32 {
        self.header.file_alignment
    }

    /// Multiplier applied to the length bits of a magic integer
    pub fn lsb_multiplier(&self) -> u32 {
        self.header.lsb_multiplier
    }

    /// Shift separating the offset bits of a magic integer
    pub fn msb_shift(&self) -> u32 {
        self.header.msb_shift
    }

    /// Mask selecting the length bits of a magic integer
    pub fn lsb_mask(&self) -> u32 {
        self.header.lsb_mask
    }

    /// The magic integer table
    pub fn magic_integers(&self) -> &[u32] {
        &self.header.magic_integers
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

    /// Table indices that point at the same data as an earlier entry, with that entry's position
    pub fn aliases(&self) -> impl Iterator<Item = (usize, &FileEntry<P>)> + '_ {
        self.aliases
            .iter()
            .map(|&(index, owner)| (index, &self.entries[owner]))
    }

    /// Entry for a one based table index, following aliases
    pub fn entry_by_index(&self, index: usize) -> Result<&FileEntry<P>> {
        let position = self.position_of(index)?;
        Ok(&self.entries[position])
    }

    /// Mutable entry for a one based table index, following aliases
    pub fn entry_by_index_mut(&mut self, index: usize) -> Result<&mut FileEntry<P>> {
        let position = self.position_of(index)?;
        Ok(&mut self.entries[position])
    }

    /// Map of table index to entry position for every index with data
    pub fn index_map(&self) -> HashMap<usize, usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(position, e)| e.index.map(|index| (index, position)))
            .chain(self.aliases.iter().copied())
            .collect()
    }

    fn position_of(&self, index: usize) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.index == Some(index))
            .or_else(|| {
                self.aliases
                    .iter()
                    .find(|&&(alias, _)| alias == index)
                    .map(|&(_, owner)| owner)
            })
            .ok_or(EntryNotFoundError::Index(index).into())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::bin::BinArchive;
    use crate::diagnostics::DiagnosticKind;
    use crate::entry::RawPayload;
    use crate::error::{EntryNotFoundError, Error, Result};

    #[rustfmt::skip]
    fn header(magic_integers: &[u32]) -> Vec<u8> {
        let mut data = vec![];
        for value in [magic_integers.len() as u32, 0x800, 0x800, 8, 0xFF] {
            data.extend(value.to_le_bytes());
        }
        for value in magic_integers {
            data.extend(value.to_le_bytes());
        }
        data
    }

    fn archive(magic_integers: &[u32], files: &[(usize, &[u8])], size: usize) -> Vec<u8> {
        let mut data = header(magic_integers);
        data.resize(size, 0);
        for (offset, bytes) in files {
            data[*offset..*offset + bytes.len()].copy_from_slice(bytes);
        }
        data
    }

    #[test]
    fn load_entries() -> Result<()> {
        let data = archive(
            &[0x201, 0x101, 0],
            &[(0x800, &[0x02, 0xAA, 0xBB, 0x00]), (0x1000, &[0x41, 0x07, 0x00])],
            0x1800,
        );
        let archive: BinArchive = BinArchive::load(&data)?;

        assert_eq!(archive.count(), 3);
        assert_eq!(archive.file_alignment(), 0x800);
        assert_eq!(archive.len(), 2);

        let first = &archive.entries()[0];
        assert_eq!(first.offset(), 0x800);
        assert_eq!(first.index(), Some(2));
        assert_eq!(first.compressed_length(), 0x800);
        assert_eq!(first.compressed().len(), 0x800);
        let decoded = first.payload().map(RawPayload::as_bytes).unwrap_or_default();
        assert_eq!(&decoded[..3], &[0xAA, 0xBB, 0x00]);

        assert_eq!(archive.entry_by_index(1)?.offset(), 0x1000);
        assert!(matches!(
            archive.entry_by_index(3),
            Err(Error::EntryNotFound(EntryNotFoundError::Index(3)))
        ));

        Ok(())
    }

    #[test]
    fn load_reports_corrupt_entries() -> Result<()> {
        let data = archive(&[0x101, 0x201], &[(0x800, &[0x80, 0x40]), (0x1000, &[0x01, 0x05])], 0x1800);
        let mut reports: Vec<(DiagnosticKind, String)> = Vec::new();
        let archive: BinArchive = BinArchive::load_with_diagnostics(&data, &mut reports)?;

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entries()[0].payload(), None);
        assert!(archive.entries()[1].payload().is_some());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, DiagnosticKind::CorruptEntry);

        Ok(())
    }

    #[test]
    fn shared_offsets_become_aliases() -> Result<()> {
        let data = archive(&[0x101, 0x101, 0x201], &[(0x800, &[0x01, 0x01]), (0x1000, &[0x01, 0x02])], 0x1800);
        let mut archive: BinArchive = BinArchive::load(&data)?;

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.aliases().count(), 1);
        assert_eq!(archive.entry_by_index(2)?.index(), Some(1));
        assert_eq!(archive.index_map().len(), 3);

        let (bytes, remap) = archive.serialize()?;
        assert_eq!(bytes, data);
        assert_eq!(remap.len(), 2);

        Ok(())
    }

    #[test]
    fn truncated_archives() {
        assert!(matches!(
            BinArchive::<RawPayload>::load(&[0; 0x10]),
            Err(Error::InvalidArchive(_))
        ));
        assert!(matches!(
            BinArchive::<RawPayload>::load(&header(&[0x101, 0x201])[..0x18]),
            Err(Error::InvalidArchive(_))
        ));
    }

    #[test]
    fn unencodable_length_leaves_archive_untouched() -> Result<()> {
        let mut data = header(&[0x101]);
        data[0x08..0x0C].copy_from_slice(&0x1000u32.to_le_bytes());
        data[0x10..0x14].copy_from_slice(&1u32.to_le_bytes());
        data.resize(0x1800, 0);
        data[0x800] = 0x01;
        data[0x801] = 0x05;

        let mut archive: BinArchive = BinArchive::load(&data)?;
        assert_eq!(archive.entries()[0].compressed_length(), 0x1000);
        archive.entries_mut()[0].set_payload(RawPayload(vec![1, 2, 3]));

        assert!(matches!(
            archive.serialize(),
            Err(Error::UnencodableLength { length: 0x800 })
        ));
        assert!(archive.entries()[0].edited());
        assert_eq!(archive.entries()[0].magic_integer(), 0x101);
        assert_eq!(archive.magic_integers(), &[0x101]);

        Ok(())
    }
}
