//! Load `.trisync.toml` from the local folder (CLI only). The lib takes its settings from
//! [`SyncOpts`](crate::SyncOpts).

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Deserialize)]
pub struct SyncToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    remote_dir: Option<String>,
    remote_root: Option<String>,
    db_path: Option<String>,
    workers: Option<usize>,
    bidirectional: Option<bool>,
    case_insensitive: Option<bool>,
    incremental: Option<bool>,
    exclude: Option<Vec<String>>,
    verbose: Option<bool>,
}

/// Load the config file from `dir` if present. Returns None if missing or unreadable.
pub fn load_sync_toml(dir: &Path) -> Option<SyncToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    toml::from_str(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident) => {
        if let Some(v) = $sec.$sec_field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI.
pub fn apply_file_to_opts(file: &SyncToml, opts: &mut Opts) {
    let sec = &file.settings;
    if let Some(ref p) = sec.remote_dir {
        opts.remote_dir = PathBuf::from(p);
    }
    if let Some(ref p) = sec.db_path {
        opts.db_path = Some(PathBuf::from(p));
    }
    apply_file_opt!(sec, opts, remote_root => remote_root);
    apply_file_opt!(sec, opts, workers => workers);
    apply_file_opt!(sec, opts, bidirectional => bidirectional);
    apply_file_opt!(sec, opts, case_insensitive => case_insensitive);
    apply_file_opt!(sec, opts, incremental => incremental);
    apply_file_opt!(sec, opts, exclude => exclude);
    apply_file_opt!(sec, opts, verbose => verbose);
}
