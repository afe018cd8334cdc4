use std::{io::Write, path::PathBuf};

use clap::Args;
use heiretsu_archive::{BinArchive, RawPayload};
use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use tracing::{info, warn};

use crate::commands::{create, read};

#[derive(Args)]
pub struct ExtractArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Write the stored compressed bytes instead of the decompressed data
    #[arg(long, default_value_t = false)]
    compressed: bool,

    /// Name files by decimal instead of hexadecimal table index
    #[arg(long, default_value_t = false)]
    decimal: bool,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// File name and contents for every table index, with the number of entries left out because
/// they could not be decompressed
fn entry_files(
    archive: &BinArchive<RawPayload>,
    compressed: bool,
    decimal: bool,
) -> (Vec<(String, &[u8])>, usize) {
    let mut indices = archive.index_map().into_iter().collect::<Vec<_>>();
    indices.sort();

    let mut files = Vec::with_capacity(indices.len());
    let mut skipped = 0;
    for (index, position) in indices {
        let entry = &archive.entries()[position];
        let bytes = if compressed {
            entry.compressed()
        } else if let Some(payload) = entry.payload() {
            payload.as_bytes()
        } else {
            warn!(index, "skipping entry that could not be decompressed");
            skipped += 1;
            continue;
        };

        let name = if decimal {
            format!("{index:04}.bin")
        } else {
            format!("{index:04x}.bin")
        };
        files.push((name, bytes));
    }
    (files, skipped)
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let data = read(&self.file)?;
        let archive: BinArchive<RawPayload> = BinArchive::load(&data)
            .context(format!("loading {}", self.file.display()))?;

        let (files, skipped) = entry_files(&archive, self.compressed, self.decimal);
        for (name, bytes) in &files {
            let p = self.directory.join(name);
            info!("writing {}", p.display());

            create(&p, self.overwrite)?
                .write_all(bytes)
                .into_diagnostic()
                .context(format!("writing {}", p.display()))?;
        }

        println!(
            "{} entries extracted to {}",
            files.len().green(),
            self.directory.display()
        );
        if skipped > 0 {
            println!("{} entries skipped", skipped.red());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use heiretsu_archive::{BinArchive, RawPayload};
    use pretty_assertions::assert_eq;

    use super::entry_files;

    #[test]
    fn corrupt_entries_are_not_counted() -> heiretsu_archive::error::Result<()> {
        let mut data = vec![];
        for value in [3u32, 0x800, 0x800, 8, 0xFF, 0x101, 0x101, 0x201] {
            data.extend(value.to_le_bytes());
        }
        data.resize(0x1800, 0);
        data[0x800..0x802].copy_from_slice(&[0x01, 0x10]);
        data[0x1000..0x1002].copy_from_slice(&[0x80, 0x40]);
        let archive: BinArchive<RawPayload> = BinArchive::load(&data)?;

        let (written, skipped) = entry_files(&archive, false, false);
        let names: Vec<&str> = written.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["0001.bin", "0002.bin"]);
        assert_eq!(written[1].1[0], 0x10);
        assert_eq!(skipped, 1);

        let (written, skipped) = entry_files(&archive, true, true);
        assert_eq!(written.len(), 3);
        assert_eq!(written[2].0, "0003.bin");
        assert_eq!(skipped, 0);
        Ok(())
    }
}
