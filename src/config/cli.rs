use clap::Parser;
use std::path::PathBuf;

/// One ingestion pass over all configured corridors.
#[derive(Debug, Clone, Parser)]
#[command(name = "ingress-adapter-jao")]
#[command(about = "Ingests JAO corridor auctions into the Azure ingress dataset")]
pub struct CliArgs {
    /// Path to the TOML configuration file (defaults to the standard locations)
    #[arg(short, long, env = "INGRESS_ADAPTER_JAO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Keep watermarks in this local JSON file instead of the data lake
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Write batches below this directory instead of the data lake
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Resolve corridors and print the planned windows without fetching
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Local-only runs need no Azure credentials at all.
    pub fn is_local(&self) -> bool {
        self.state_file.is_some() && self.output_dir.is_some()
    }
}
