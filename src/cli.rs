use clap::{Parser, Subcommand};

/// Discovers news articles, reconciles them against the content store and
/// uploads the new ones.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Log level for this crate (overrides RUST_LOG)
    #[arg(long, global = true, env = "HERALD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Directory holding default.toml and friends
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Crawl a site's start page and subpages
    Crawl {
        #[arg(long)]
        site: String,

        /// Cap on discovered URLs passed to reconciliation
        #[arg(long)]
        max_urls: Option<usize>,

        /// Spool records instead of uploading them
        #[arg(long)]
        queue: bool,
    },
    /// Enumerate a site's issue archive
    Archive {
        #[arg(long)]
        site: String,

        #[arg(long)]
        from_year: u32,

        #[arg(long)]
        to_year: u32,

        #[arg(long)]
        queue: bool,
    },
    /// Upload every spooled record
    Upload,
    /// List configured site profiles
    Sites,
}
