//! CLI command handler: one sync pass, incremental when asked and possible.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Opts;
use crate::SyncOpts;
use crate::engine::arg_parser::Cli;
use crate::engine::progress::ProgressNotifier;
use crate::ledger::SqliteLedger;
use crate::notify::{LogNotifier, Notifier};
use crate::remote::DirRemote;
use crate::session::SyncSession;
use crate::types::SyncReport;
use crate::utils::sync_toml::{apply_file_to_opts, load_sync_toml};
use crate::utils::{Colors, setup_logging};

/// Build options: defaults, then the config file in the local folder, then CLI flags.
pub fn setup_opts(cli: &Cli) -> Opts {
    let mut opts = Opts {
        local_root: cli.local.clone(),
        ..Default::default()
    };
    if let Some(file) = load_sync_toml(&cli.local) {
        apply_file_to_opts(&file, &mut opts);
    }
    if let Some(ref remote) = cli.remote {
        opts.remote_dir = remote.clone();
    }
    if let Some(ref root) = cli.remote_root {
        opts.remote_root = root.clone();
    }
    if cli.db.is_some() {
        opts.db_path = cli.db.clone();
    }
    if let Some(w) = cli.workers {
        opts.workers = w;
    }
    if let Some(v) = cli.bidirectional {
        opts.bidirectional = v;
    }
    if let Some(v) = cli.case_insensitive {
        opts.case_insensitive = v;
    }
    if let Some(v) = cli.incremental {
        opts.incremental = v;
    }
    if !cli.exclude.is_empty() {
        opts.exclude = cli.exclude.clone();
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
    opts.json = cli.json;
    opts
}

/// Run one sync pass. Returns an error unless the pass fully succeeded, so scripts can tell.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli);
    setup_logging(opts.verbose);
    if opts.remote_dir.as_os_str().is_empty() {
        bail!("no remote directory given (argument REMOTE_DIR or `remote_dir` in the config file)");
    }
    debug!("{:#?}", opts);

    let ledger = Arc::new(SqliteLedger::open(&opts.ledger_path())?);
    let remote = Arc::new(
        DirRemote::new(&opts.remote_dir)
            .with_context(|| format!("remote directory {}", opts.remote_dir.display()))?,
    );
    let notifier: Arc<dyn Notifier> = if opts.verbose && !opts.json {
        Arc::new(ProgressNotifier::new("Syncing"))
    } else {
        Arc::new(LogNotifier)
    };

    let cancel_requested = Arc::new(AtomicBool::new(false));
    let cancel_requested_handler = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        cancel_requested_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    let session = SyncSession::new(&opts.local_root, SyncOpts::from(&opts), ledger, remote)?
        .with_notifier(notifier)
        .with_cancel_flag(Arc::clone(&cancel_requested));
    let report = session.run(opts.incremental)?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if cancel_requested.load(Ordering::Relaxed) {
        bail!("sync cancelled by user; queued items were completed");
    }
    if !report.is_success() {
        bail!(
            "sync incomplete: {} failed, {} conflicts, {} paths not observed",
            report.failed,
            report.conflicted,
            report.crawl_errors.len()
        );
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    info!(
        "{} | {} | {} | {}",
        Colors::colorize(Colors::SUCCEEDED, &format!("Synced: {}", report.succeeded)),
        Colors::colorize(Colors::UNCHANGED, &format!("Unchanged: {}", report.unchanged)),
        Colors::colorize(Colors::CONFLICTED, &format!("Conflicts: {}", report.conflicted)),
        Colors::colorize(Colors::FAILED, &format!("Failed: {}", report.failed))
    );
    for name in &report.conflicts {
        info!("  conflict: {}", name);
    }
    for f in &report.failures {
        info!("  failed: {} ({})", f.name, f.error);
    }
    for e in &report.crawl_errors {
        info!("  not observed: {}", e);
    }
}
