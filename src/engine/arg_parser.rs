use clap::Parser;
use std::path::PathBuf;

struct DefaultArgs;

impl DefaultArgs {
    pub const LOCAL: &'static str = ".";
}

/// Three-way sync of a local folder with a remote repository.
#[derive(Clone, Parser)]
#[command(name = "trisync")]
#[command(about = "Reconcile a local folder with a remote folder through a sync ledger.")]
pub struct Cli {
    /// Local folder to synchronize. Default: current directory.
    #[arg(value_name = "LOCAL", default_value = DefaultArgs::LOCAL)]
    pub local: PathBuf,

    /// Directory backing the remote repository. May also come from the config file.
    #[arg(value_name = "REMOTE_DIR")]
    pub remote: Option<PathBuf>,

    /// Folder inside the remote repository mirrored by LOCAL. Default: `/`.
    #[arg(long, short = 'r')]
    pub remote_root: Option<String>,

    /// Path to the ledger file. Default: `.trisync.db` in LOCAL.
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Number of worker threads applying actions.
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Push local changes to the remote as well (default: remote-to-local only).
    #[arg(
        long,
        short = 'b',
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::value_parser!(bool)
    )]
    pub bidirectional: Option<bool>,

    /// Match local and remote names case-insensitively.
    #[arg(
        long,
        short = 'i',
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::value_parser!(bool)
    )]
    pub case_insensitive: Option<bool>,

    /// Use the remote change log when possible instead of crawling both trees.
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::value_parser!(bool)
    )]
    pub incremental: Option<bool>,

    /// Exclude patterns (glob syntax). Can specify multiple: -e pattern1 pattern2 pattern3
    #[arg(long, short = 'e', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Verbose output.
    #[arg(
        long,
        short = 'v',
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::value_parser!(bool)
    )]
    pub verbose: Option<bool>,

    /// Print the pass summary as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}
