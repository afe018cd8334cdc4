pub mod adjust;
pub mod extract;

#[derive(clap::Subcommand)]
pub enum McbCommands {
    /// Apply offset remap files to the records and rewrite both files
    Adjust(adjust::AdjustArgs),
    /// Extract the records of one sub archive into a directory
    Extract(extract::ExtractArgs),
}

impl McbCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            McbCommands::Adjust(adjust) => adjust.handle(),
            McbCommands::Extract(extract) => extract.handle(),
        }
    }
}
