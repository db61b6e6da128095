use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter, Record};
use std::io::Write;
use std::thread;

/// Install the crate logger. Dependencies stay at warn; `verbose` lowers ours to debug
/// and tags each line with the emitting thread.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(move |buf, record| writeln!(buf, "{}", format_record(record, verbose)))
        .try_init()
        .ok();
}

fn format_record(record: &Record, verbose: bool) -> String {
    let tag = env!("CARGO_PKG_NAME").cyan();
    let level = match record.level() {
        Level::Error => Some("ERROR".red()),
        Level::Warn => Some("WARN".yellow()),
        Level::Debug | Level::Trace if verbose => Some("DEBUG".dimmed()),
        _ => None,
    };
    let thread = if verbose {
        format!(" {}", thread::current().name().unwrap_or("thread").dimmed())
    } else {
        String::new()
    };
    match level {
        Some(level) => format!(
            "[{tag}{thread} {level} {}] {}",
            record.target().white(),
            record.args()
        ),
        None => format!("[{tag}{thread}] {}", record.args()),
    }
}

/// Terminal colours for the sync summary.
pub struct Colors;

impl Colors {
    pub const SUCCEEDED: &'static str = "green";
    pub const FAILED: &'static str = "red";
    pub const CONFLICTED: &'static str = "yellow";
    pub const UNCHANGED: &'static str = "white";

    pub fn colorize(color: &str, text: &str) -> String {
        match color {
            "green" => text.green().to_string(),
            "red" => text.red().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.white().to_string(),
        }
    }
}
