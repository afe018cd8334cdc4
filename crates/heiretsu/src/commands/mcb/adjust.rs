use std::{io::Write, path::PathBuf};

use clap::Args;
use heiretsu_archive::{McbArchive, OffsetRemap, RawPayload, TracingDiagnostics};
use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use tracing::info;

use crate::commands::{create, read};

#[derive(Args)]
pub struct AdjustArgs {
    /// The index file, mcb0.bln
    #[arg(short, long, value_name = "FILE")]
    index: PathBuf,

    /// The data file, mcb1.bln
    #[arg(short, long, value_name = "FILE")]
    data: PathBuf,

    /// Offset remap files written when repacking the external archives
    #[arg(short, long, value_name = "FILE", num_args = 1.., required = true)]
    remap: Vec<PathBuf>,

    /// A target directory for the adjusted index and data files
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Allow overwriting the targets
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl AdjustArgs {
    pub fn handle(&self) -> Result<()> {
        let mut mcb: McbArchive<RawPayload> =
            McbArchive::load(&read(&self.index)?, &read(&self.data)?)
                .context(format!("loading {}", self.data.display()))?;

        let mut adjusted = 0;
        for path in &self.remap {
            let text = std::fs::read_to_string(path)
                .into_diagnostic()
                .context(format!("reading {}", path.display()))?;
            let remap = OffsetRemap::parse(&text).context(format!("parsing {}", path.display()))?;

            let count = mcb.apply_remap(&remap, &mut TracingDiagnostics);
            info!(
                "{} records adjusted for {}",
                count,
                remap.target().unwrap_or_default()
            );
            adjusted += count;
        }

        let (index, data) = mcb.serialize().context("repacking nested archive")?;
        for (source, bytes) in [(&self.index, index), (&self.data, data)] {
            let p = self.output.join(source.file_name().unwrap_or(source.as_os_str()));
            info!("writing {}", p.display());
            create(&p, self.overwrite)?
                .write_all(&bytes)
                .into_diagnostic()
                .context(format!("writing {}", p.display()))?;
        }

        println!("{} records adjusted", adjusted.green());
        Ok(())
    }
}
