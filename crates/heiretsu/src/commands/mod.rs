use std::{fs::File, path::Path};

use miette::{Context, IntoDiagnostic, Result};

pub mod bin;
pub mod mcb;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle fixed header archives (grp.bin, dat.bin, scr.bin, evt.bin)
    Bin {
        #[command(subcommand)]
        command: bin::BinCommands,
    },
    /// Handle the nested mcb0.bln and mcb1.bln archive
    Mcb {
        #[command(subcommand)]
        command: mcb::McbCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> Result<()> {
        match self {
            Commands::Bin { command } => command.handle(),
            Commands::Mcb { command } => command.handle(),
        }
    }
}

/// Create `path`, failing if it exists unless `overwrite` is set
pub(crate) fn create(path: &Path, overwrite: bool) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .into_diagnostic()
            .context(format!("creating {}", parent.display()))?;
    }

    if !overwrite {
        File::create_new(path)
            .into_diagnostic()
            .context(format!("creating {}", path.display()))
    } else {
        File::create(path)
            .into_diagnostic()
            .context(format!("creating {}", path.display()))
    }
}

/// Read all of `path`
pub(crate) fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .into_diagnostic()
        .context(format!("reading {}", path.display()))
}
