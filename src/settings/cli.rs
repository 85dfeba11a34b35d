use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "sessionguard", about = "Refresh-token session service")]
pub struct Cli {
    /// Settings file; defaults to settings/dev.toml or settings/release.toml.
    #[arg(long)]
    pub settings: Option<String>,
}
