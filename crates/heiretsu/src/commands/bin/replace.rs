use std::{collections::BTreeMap, io::Write, path::PathBuf};

use clap::Args;
use heiretsu_archive::{BinArchive, RawPayload};
use miette::{miette, Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::commands::{create, read};

#[derive(Args)]
pub struct ReplaceArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A directory of replacement files named `<archive>-<index>`, e.g. `dat-0012.bin`
    #[arg(short, long, value_name = "DIR")]
    replacements: PathBuf,

    /// The archive to write
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Where to write the offset remap, next to the output by default
    #[arg(long, value_name = "FILE")]
    remap: Option<PathBuf>,

    /// Allow overwriting the targets
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// Table index of a replacement file for the archive called `stem`
fn replacement_index(stem: &str, file_name: &str) -> Option<usize> {
    let (kind, rest) = file_name.split_once('-')?;
    if !kind.eq_ignore_ascii_case(stem) {
        return None;
    }
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .map_or(rest, |end| &rest[..end]);
    digits.parse().ok()
}

impl ReplaceArgs {
    pub fn handle(&self) -> Result<()> {
        let name = self
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(miette!("unable to read the name of {}", self.file.display()))?;
        let stem = name.split('.').next().unwrap_or(name);

        let mut replacements = BTreeMap::new();
        for file in WalkDir::new(&self.replacements)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
        {
            let Some(index) = file
                .file_name()
                .to_str()
                .and_then(|n| replacement_index(stem, n))
            else {
                debug!("ignoring {}", file.path().display());
                continue;
            };
            replacements.insert(index, file.into_path());
        }

        if replacements.is_empty() {
            return Err(miette!(
                "no replacement files for {} in {}",
                name,
                self.replacements.display()
            ));
        }

        let data = read(&self.file)?;
        let mut archive: BinArchive<RawPayload> = BinArchive::load(&data)
            .context(format!("loading {}", self.file.display()))?;

        for (index, path) in &replacements {
            info!("replacing entry {} with {}", index, path.display());
            archive
                .entry_by_index_mut(*index)
                .context(format!("replacing with {}", path.display()))?
                .set_payload(RawPayload(read(path)?));
        }

        let (bytes, remap) = archive.serialize().context("repacking archive")?;
        let remap = remap.with_target(name);

        create(&self.output, self.overwrite)?
            .write_all(&bytes)
            .into_diagnostic()
            .context(format!("writing {}", self.output.display()))?;

        let remap_path = self
            .remap
            .clone()
            .unwrap_or_else(|| self.output.with_extension("remap.txt"));
        create(&remap_path, self.overwrite)?
            .write_all(remap.to_string().as_bytes())
            .into_diagnostic()
            .context(format!("writing {}", remap_path.display()))?;

        println!(
            "{} entries replaced, {} entries moved",
            replacements.len().green(),
            remap.moved().count().yellow()
        );
        println!("offset remap written to {}", remap_path.display());
        Ok(())
    }
}
