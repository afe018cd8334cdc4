//! The two file nested archive (`mcb0.bln` index, `mcb1.bln` data)
//!
//! The index file lists sub archives by id, offset and size. Every sub archive is a sequence of
//! records, each with a header naming the external archive and offset the record was built from,
//! followed by the compressed payload. After one of the external archives is repacked, its offset
//! remap has to be applied here so that the records keep pointing at the right files.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use bon::Builder;
use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::bin::BinArchive;
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, TracingDiagnostics};
use crate::entry::{FileEntry, Payload, RawPayload};
use crate::error::{EntryNotFoundError, Result};
use crate::layout::{pad, pad_block, patch_slot};
use crate::remap::{ContainerKind, OffsetRemap};
use crate::types::{McbIndexRecord, McbRecordHeader};

/// Edited payloads are padded to this boundary
const PAYLOAD_ALIGNMENT: usize = 0x800;

/// Sub archives are padded to this boundary
const SUB_ARCHIVE_ALIGNMENT: usize = 0x1000;

/// Padded size of the index file the game ships with
pub const GAME_INDEX_SIZE: usize = 0x3000;

/// Options for how the nested archive should be written
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct McbOptions {
    /// Size the index file is padded to, the size of the loaded index file when unset.
    /// The game ships a 0x3000 byte index.
    pub index_size: Option<usize>,
}

/// Header position and recompressed payload of every record of a serialized sub archive
type RecordCommits = Vec<(usize, Option<Vec<u8>>)>;

/// A record of a sub archive
#[derive(Debug, Clone)]
pub struct McbRecord<P = RawPayload> {
    kind: i32,
    external_offset: u32,
    header_position: usize,
    entry: FileEntry<P>,
}

impl<P> McbRecord<P> {
    /// Raw kind field
    pub fn kind(&self) -> i32 {
        self.kind
    }

    /// External archive the record belongs to, if the kind is a known one
    pub fn container_kind(&self) -> Option<ContainerKind> {
        ContainerKind::from_record_kind(self.kind)
    }

    /// Offset of the matching file in the external archive
    pub fn external_offset(&self) -> u32 {
        self.external_offset
    }

    /// Point the record at another offset of its external archive
    pub fn set_external_offset(&mut self, offset: u32) {
        self.external_offset = offset;
    }

    /// The stored file
    pub fn entry(&self) -> &FileEntry<P> {
        &self.entry
    }

    /// The stored file, for editing
    pub fn entry_mut(&mut self) -> &mut FileEntry<P> {
        &mut self.entry
    }
}

/// A sub archive listed in the index file
#[derive(Debug, Clone)]
pub struct McbSubArchive<P = RawPayload> {
    id: u16,
    padding: i16,
    offset: u32,
    size: u32,
    records: Vec<McbRecord<P>>,
    raw: Vec<u8>,
}

impl<P: Payload> McbSubArchive<P> {
    fn load(
        parent: usize,
        index: McbIndexRecord,
        data: &[u8],
        diagnostics: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        let start = (index.offset as usize).min(data.len());
        let end = start.saturating_add(index.size as usize).min(data.len());
        let raw = &data[start..end];

        let mut records = Vec::new();
        let mut position = 0;
        while position + McbRecordHeader::SIZE <= raw.len() {
            let header = McbRecordHeader::read(&mut Cursor::new(&raw[position..]))?;
            if header.kind == McbRecordHeader::TERMINATOR {
                break;
            }

            let payload_start = position + McbRecordHeader::SIZE;
            let payload_end = payload_start
                .saturating_add(header.size as usize)
                .min(raw.len());

            let mut entry = FileEntry::new(
                (start + position) as u32,
                raw[payload_start..payload_end].to_vec(),
                diagnostics,
            );
            entry.compressed_length = header.size;
            entry.location = Some((parent, records.len()));

            records.push(McbRecord {
                kind: header.kind,
                external_offset: header.external_offset,
                header_position: position,
                entry,
            });
            position = payload_start.saturating_add(header.size as usize);
        }

        Ok(Self {
            id: index.id,
            padding: index.padding,
            offset: index.offset,
            size: index.size,
            records,
            raw: raw.to_vec(),
        })
    }

    /// Bytes of the sub archive with the record positions and recompressed payloads to commit
    fn serialize(&self) -> Result<(Vec<u8>, RecordCommits)> {
        let recompressed = self
            .records
            .iter()
            .map(|r| r.entry.recompress())
            .collect::<Result<Vec<_>>>()?;

        if recompressed.iter().all(Option::is_none) {
            let mut bytes = self.raw.clone();
            for record in &self.records {
                patch_slot(&mut bytes, record.header_position + 4, record.external_offset)?;
            }
            let positions = self
                .records
                .iter()
                .map(|r| (r.header_position, None))
                .collect();
            return Ok((bytes, positions));
        }

        let mut output = Cursor::new(Vec::new());
        let mut positions = Vec::with_capacity(self.records.len());
        for (record, compressed) in self.records.iter().zip(recompressed) {
            let position = output.get_ref().len();
            let compressed = compressed.map(|mut compressed| {
                pad_block(&mut compressed, PAYLOAD_ALIGNMENT);
                compressed
            });
            let payload = compressed.as_deref().unwrap_or(&record.entry.compressed[..]);

            McbRecordHeader {
                kind: record.kind,
                external_offset: record.external_offset,
                size: payload.len() as u32,
            }
            .write(&mut output)?;
            output.get_mut().extend_from_slice(payload);
            output.set_position(output.get_ref().len() as u64);

            positions.push((position, compressed));
        }

        let mut bytes = output.into_inner();
        bytes.extend_from_slice(&(McbRecordHeader::TERMINATOR as u32).to_le_bytes());
        pad_block(&mut bytes, SUB_ARCHIVE_ALIGNMENT);

        Ok((bytes, positions))
    }
}

impl<P> McbSubArchive<P> {
    /// Identifier from the index file
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Offset in the data file
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Size in the data file
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Records in file order
    pub fn records(&self) -> &[McbRecord<P>] {
        &self.records
    }

    /// Records in file order, for editing
    pub fn records_mut(&mut self) -> &mut [McbRecord<P>] {
        &mut self.records
    }
}

/// The nested archive, made of the index and data files
#[derive(Debug, Clone)]
pub struct McbArchive<P = RawPayload> {
    sub_archives: Vec<McbSubArchive<P>>,
    index_size: usize,
}

impl<P: Payload> McbArchive<P> {
    /// Load from the index and data files, logging records that fail to decode
    pub fn load(index: &[u8], data: &[u8]) -> Result<Self> {
        Self::load_with_diagnostics(index, data, &mut TracingDiagnostics)
    }

    /// Load from the index and data files, reporting records that fail to decode to
    /// `diagnostics`
    #[instrument(skip_all, err, fields(index = index.len(), data = data.len()))]
    pub fn load_with_diagnostics(
        index: &[u8],
        data: &[u8],
        diagnostics: &mut dyn DiagnosticSink,
    ) -> Result<Self> {
        let mut sub_archives = Vec::new();
        let mut position = 0;
        while position + McbIndexRecord::SIZE <= index.len() {
            let record = McbIndexRecord::read(&mut Cursor::new(&index[position..]))?;
            if record.id == 0 {
                break;
            }

            sub_archives.push(McbSubArchive::load(
                sub_archives.len(),
                record,
                data,
                diagnostics,
            )?);
            position += McbIndexRecord::SIZE;
        }

        debug!(sub_archives = sub_archives.len(), "loaded nested archive");

        Ok(Self {
            sub_archives,
            index_size: index.len(),
        })
    }

    /// Serialize into the index and data files, padding the index to the loaded size
    pub fn serialize(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        self.serialize_with_options(McbOptions::default())
    }

    /// Serialize into the index and data files
    ///
    /// Sub archives without edited records are written as they were loaded, apart from their
    /// external offsets. Nothing is changed when an error is returned.
    #[instrument(skip_all, err)]
    pub fn serialize_with_options(&mut self, options: McbOptions) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut index = Cursor::new(Vec::new());
        let mut data = Vec::new();
        let mut commits = Vec::with_capacity(self.sub_archives.len());

        for sub_archive in &self.sub_archives {
            let offset = data.len() as u32;
            let (bytes, positions) = sub_archive.serialize()?;

            McbIndexRecord {
                id: sub_archive.id,
                padding: sub_archive.padding,
                offset,
                size: bytes.len() as u32,
            }
            .write(&mut index)?;

            data.extend_from_slice(&bytes);
            commits.push((offset, bytes, positions));
        }

        let mut index = index.into_inner();
        let index_size = options.index_size.unwrap_or(self.index_size);
        if index.len() < index_size {
            index.resize(index_size, 0);
        } else {
            pad(&mut index, McbIndexRecord::SIZE);
        }

        for (sub_archive, (offset, bytes, positions)) in self.sub_archives.iter_mut().zip(commits) {
            sub_archive.offset = offset;
            sub_archive.size = bytes.len() as u32;
            sub_archive.raw = bytes;
            for (record, (position, compressed)) in sub_archive.records.iter_mut().zip(positions) {
                record.header_position = position;
                if let Some(compressed) = &compressed {
                    record.entry.compressed_length = compressed.len() as u32;
                }
                record
                    .entry
                    .commit(offset + position as u32, compressed);
            }
        }

        Ok((index, data))
    }
}

impl<P> McbArchive<P> {
    /// Sub archives in index order
    pub fn sub_archives(&self) -> &[McbSubArchive<P>] {
        &self.sub_archives
    }

    /// Sub archives in index order, for editing
    pub fn sub_archives_mut(&mut self) -> &mut [McbSubArchive<P>] {
        &mut self.sub_archives
    }

    /// Every record with its location
    pub fn records(&self) -> impl Iterator<Item = ((usize, usize), &McbRecord<P>)> + '_ {
        self.sub_archives.iter().enumerate().flat_map(|(parent, sub)| {
            sub.records
                .iter()
                .enumerate()
                .map(move |(child, record)| ((parent, child), record))
        })
    }

    /// Record at a sub archive and record position
    pub fn record(&self, parent: usize, child: usize) -> Result<&McbRecord<P>> {
        self.sub_archives
            .get(parent)
            .and_then(|sub| sub.records.get(child))
            .ok_or_else(|| EntryNotFoundError::Location(parent, child).into())
    }

    /// Mutable record at a sub archive and record position
    pub fn record_mut(&mut self, parent: usize, child: usize) -> Result<&mut McbRecord<P>> {
        self.sub_archives
            .get_mut(parent)
            .and_then(|sub| sub.records.get_mut(child))
            .ok_or_else(|| EntryNotFoundError::Location(parent, child).into())
    }

    /// Rewrite the external offsets of every record of `kind` found in `remap`, returning the
    /// number of records changed.
    #[instrument(skip(self, remap), fields(entries = remap.len()))]
    pub fn adjust_offsets(&mut self, kind: ContainerKind, remap: &OffsetRemap) -> usize {
        let mut adjusted = 0;
        for record in self
            .sub_archives
            .iter_mut()
            .flat_map(|sub| sub.records.iter_mut())
            .filter(|r| r.kind == kind.record_kind())
        {
            if let Some(new) = remap.get(record.external_offset) {
                if new != record.external_offset {
                    record.external_offset = new;
                    adjusted += 1;
                }
            }
        }

        debug!(adjusted, "adjusted external offsets");
        adjusted
    }

    /// [`McbArchive::adjust_offsets`] for an archive named by file name.
    ///
    /// Unknown names are reported to `diagnostics` and change nothing.
    pub fn adjust_offsets_named(
        &mut self,
        name: &str,
        remap: &OffsetRemap,
        diagnostics: &mut dyn DiagnosticSink,
    ) -> usize {
        match name.parse::<ContainerKind>() {
            Ok(kind) => self.adjust_offsets(kind, remap),
            Err(err) => {
                diagnostics.report(DiagnosticKind::UnsupportedContainerKind, &err.to_string());
                0
            }
        }
    }

    /// [`McbArchive::adjust_offsets_named`] using the archive name stored in the remap
    pub fn apply_remap(&mut self, remap: &OffsetRemap, diagnostics: &mut dyn DiagnosticSink) -> usize {
        let name = remap.target().unwrap_or_default();
        self.adjust_offsets_named(name, remap, diagnostics)
    }

    /// Map each table index of `archive` to the locations of the records of `kind` built from it
    pub fn file_map<Q>(
        &self,
        kind: ContainerKind,
        archive: &BinArchive<Q>,
    ) -> IndexMap<usize, Vec<(usize, usize)>> {
        let indices: IndexMap<u32, usize> = archive
            .entries()
            .iter()
            .filter_map(|e| e.index().map(|index| (e.offset(), index)))
            .collect();

        let mut map: IndexMap<usize, Vec<(usize, usize)>> = IndexMap::new();
        for (location, record) in self.records().filter(|(_, r)| r.kind == kind.record_kind()) {
            match indices.get(&record.external_offset) {
                Some(&index) => map.entry(index).or_default().push(location),
                None => debug!(
                    ?location,
                    offset = record.external_offset,
                    "record has no matching entry"
                ),
            }
        }
        map
    }
}
