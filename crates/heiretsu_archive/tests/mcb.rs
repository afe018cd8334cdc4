use heiretsu_archive::{
    error::Error, BinArchive, ContainerKind, DiagnosticKind, McbArchive, OffsetRemap, RawPayload,
};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

fn dat_archive() -> Vec<u8> {
    let mut data = vec![];
    for value in [3u32, 0x800, 0x800, 8, 0xFF, 0x101, 0x201, 0x301] {
        data.extend(value.to_le_bytes());
    }
    data.resize(0x2000, 0);
    data[0x800..0x802].copy_from_slice(&[0x01, 0x10]);
    data[0x1000..0x1002].copy_from_slice(&[0x01, 0x20]);
    data[0x1800..0x1802].copy_from_slice(&[0x01, 0x30]);
    data
}

/// Nested archive files for sub archives of `(kind, external offset)` records
fn nested(subs: &[&[(i32, u32)]]) -> (Vec<u8>, Vec<u8>) {
    let mut index = vec![];
    let mut data = vec![];
    for (i, records) in subs.iter().enumerate() {
        let start = data.len();
        for (kind, offset) in *records {
            data.extend(kind.to_le_bytes());
            data.extend(offset.to_le_bytes());
            data.extend(2u32.to_le_bytes());
            data.extend([0x01, 0x7E]);
        }
        data.extend(0x7FFFu32.to_le_bytes());
        data.resize(data.len().next_multiple_of(0x1000), 0);

        index.extend((i as u16 + 1).to_le_bytes());
        index.extend(0u16.to_le_bytes());
        index.extend((start as u32).to_le_bytes());
        index.extend(((data.len() - start) as u32).to_le_bytes());
    }
    index.resize(0x3000, 0);
    (index, data)
}

#[traced_test]
#[test]
fn repacked_archive_offsets_follow_into_records() -> Result<(), Error> {
    let mut dat: BinArchive = BinArchive::load(&dat_archive())?;
    let (index, data) = nested(&[&[(1, 0x1000), (1, 0x1800), (2, 0x1000)], &[(1, 0x1800)]]);
    let mut mcb: McbArchive = McbArchive::load(&index, &data)?;

    let before = mcb.file_map(ContainerKind::Dat, &dat);
    assert_eq!(before.get(&2), Some(&vec![(0, 0)]));
    assert_eq!(before.get(&3), Some(&vec![(0, 1), (1, 0)]));
    assert_eq!(before.get(&1), None);

    dat.entry_by_index_mut(1)?
        .set_payload(RawPayload((0..0x480u16).flat_map(|k| k.to_be_bytes()).collect()));
    let (_, remap) = dat.serialize()?;

    // The remap travels as text between the two tools
    let remap: OffsetRemap = remap.with_target("dat.bin").to_string().parse()?;
    let mut reports: Vec<(DiagnosticKind, String)> = Vec::new();
    assert_eq!(mcb.apply_remap(&remap, &mut reports), 3);
    assert!(reports.is_empty());

    assert_eq!(mcb.record(0, 0)?.external_offset(), 0x1800);
    assert_eq!(mcb.record(0, 1)?.external_offset(), 0x2000);
    assert_eq!(mcb.record(0, 2)?.external_offset(), 0x1000);
    assert_eq!(mcb.record(1, 0)?.external_offset(), 0x2000);
    assert_eq!(mcb.file_map(ContainerKind::Dat, &dat), before);

    let (new_index, new_data) = mcb.serialize()?;
    assert_eq!(new_index.len(), index.len());
    assert_eq!(new_data.len(), data.len());
    assert_eq!(&new_data[4..8], &0x1800u32.to_le_bytes());

    let reloaded: McbArchive = McbArchive::load(&new_index, &new_data)?;
    assert_eq!(reloaded.record(1, 0)?.external_offset(), 0x2000);
    assert_eq!(
        reloaded.record(1, 0)?.entry().payload().map(|p| p.as_bytes()[0]),
        Some(0x7E)
    );
    Ok(())
}

#[traced_test]
#[test]
fn empty_index_loads_nothing() -> Result<(), Error> {
    let mut mcb: McbArchive = McbArchive::load(&[0; 0x3000], &[])?;
    assert!(mcb.sub_archives().is_empty());

    let (index, data) = mcb.serialize()?;
    assert_eq!(index, vec![0; 0x3000]);
    assert!(data.is_empty());
    Ok(())
}
