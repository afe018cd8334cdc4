use std::{io::Write, path::PathBuf};

use clap::Args;
use heiretsu_archive::{McbArchive, McbSubArchive, RawPayload};
use miette::{miette, Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use tracing::{info, warn};

use crate::commands::{create, read};

#[derive(Args)]
pub struct ExtractArgs {
    /// The index file, mcb0.bln
    #[arg(short, long, value_name = "FILE")]
    index: PathBuf,

    /// The data file, mcb1.bln
    #[arg(short, long, value_name = "FILE")]
    data: PathBuf,

    /// Position of the sub archive in the index
    #[arg(short, long, value_name = "N")]
    sub_archive: usize,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// File name and contents of every record, with the number of records left out because they
/// could not be decompressed
fn record_files(sub: &McbSubArchive<RawPayload>) -> (Vec<(String, &[u8])>, usize) {
    let mut files = Vec::with_capacity(sub.records().len());
    let mut skipped = 0;
    for (child, record) in sub.records().iter().enumerate() {
        let Some(payload) = record.entry().payload() else {
            warn!(child, "skipping record that could not be decompressed");
            skipped += 1;
            continue;
        };

        let kind = record
            .container_kind()
            .map_or(record.kind().to_string(), |k| k.to_string());
        let name = format!(
            "{:04x}-{child:03}-{}-{:08x}",
            sub.id(),
            kind.trim_end_matches(".bin"),
            record.external_offset()
        );
        files.push((name, payload.as_bytes()));
    }
    (files, skipped)
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mcb: McbArchive<RawPayload> = McbArchive::load(&read(&self.index)?, &read(&self.data)?)
            .context(format!("loading {}", self.data.display()))?;

        let sub = mcb.sub_archives().get(self.sub_archive).ok_or(miette!(
            "sub archive {} does not exist, the index lists {}",
            self.sub_archive,
            mcb.sub_archives().len()
        ))?;

        let (files, skipped) = record_files(sub);
        for (name, bytes) in &files {
            let p = self.output.join(name);
            info!("writing {}", p.display());

            create(&p, self.overwrite)?
                .write_all(bytes)
                .into_diagnostic()
                .context(format!("writing {}", p.display()))?;
        }

        println!(
            "{} records extracted to {}",
            files.len().green(),
            self.output.display()
        );
        if skipped > 0 {
            println!("{} records skipped", skipped.red());
        }
        Ok(())
    }
}
