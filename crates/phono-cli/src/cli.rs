use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "phono",
    about = "Inspect and query Phono annotation stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory; overrides `store.path` from the config
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Record counts per type and store access counters
    Stats,
    /// List stored keys
    Keys(KeysArgs),
    /// Decode and print one record
    Show(ShowArgs),
    /// Filter and order objects of one type
    Query(QueryArgs),
    /// List speaker-audio links
    Links(LinksArgs),
    /// Rewrite the journal to live entries only
    Compact,
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct KeysArgs {
    /// Only keys of this type (Audio, Phrase, Word, Syllable, Phone, Speaker)
    #[arg(short = 't', long = "type")]
    pub object_type: Option<String>,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Hex-encoded store key
    pub key: String,
    /// Also list the record's children
    #[arg(long)]
    pub children: bool,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Object type to query
    pub object_type: String,
    /// `lookup=value`, e.g. `words__phones__label=t`; repeatable
    #[arg(short, long)]
    pub filter: Vec<String>,
    /// `lookup=value` to exclude; repeatable
    #[arg(short = 'x', long)]
    pub exclude: Vec<String>,
    /// Ordering field, `-` prefix for descending; repeatable
    #[arg(short, long)]
    pub order_by: Vec<String>,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct LinksArgs {
    /// Hex identifier of a speaker or an audio
    pub identifier: Option<String>,
}
