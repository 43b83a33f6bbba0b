pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "augury")]
#[command(about = "Nostr relay, CID content store and static site tiles")]
#[command(version)]
pub struct Args {
    /// Configuration file (TOML, or JSON when it ends in .json)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
