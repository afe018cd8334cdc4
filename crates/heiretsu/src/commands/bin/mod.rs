pub mod extract;
pub mod replace;

#[derive(clap::Subcommand)]
pub enum BinCommands {
    /// Extract every entry of an archive into a directory
    Extract(extract::ExtractArgs),
    /// Replace entries of an archive with files from a directory
    Replace(replace::ReplaceArgs),
}

impl BinCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            BinCommands::Extract(extract) => extract.handle(),
            BinCommands::Replace(replace) => replace.handle(),
        }
    }
}
