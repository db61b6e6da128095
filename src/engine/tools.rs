//! Path and filter utilities

use std::path::{Path, PathBuf};

use crate::triplet::ItemKind;
use crate::utils::config::PackagePaths;

/// Convert absolute path to relative path from base
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Relative path as a `/`-separated string (ledger and identity format on every platform).
pub fn path_to_db_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Identity of an item: its relative path, with a trailing `/` for folders.
pub fn item_name(rel_path: &str, kind: ItemKind) -> String {
    let rel = rel_path.trim_matches('/');
    match kind {
        ItemKind::Folder => format!("{rel}/"),
        ItemKind::File => rel.to_string(),
    }
}

/// Identity of the folder containing `name`, or None for root-level items.
pub fn parent_name(name: &str) -> Option<String> {
    let trimmed = name.trim_end_matches('/');
    trimmed
        .rsplit_once('/')
        .map(|(parent, _)| format!("{parent}/"))
}

/// Number of path components in an identity (`a/b/` and `a/b` are both 2).
pub fn depth(name: &str) -> usize {
    name.trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .count()
}

/// Absolute remote path for a relative path under `remote_root`.
pub fn join_remote(remote_root: &str, rel_path: &str) -> String {
    let root = remote_root.trim_end_matches('/');
    let rel = rel_path.trim_matches('/');
    if rel.is_empty() {
        return if root.is_empty() { "/".to_string() } else { root.to_string() };
    }
    format!("{root}/{rel}")
}

/// Relative path of `remote_path` under `remote_root`, or None when it lies outside.
pub fn strip_remote_root(remote_root: &str, remote_path: &str) -> Option<String> {
    let root = remote_root.trim_end_matches('/');
    let rest = remote_path.strip_prefix(root)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(rest.trim_matches('/').to_string())
}

/// Key used to match local and remote names; case-folded when matching is case-insensitive.
pub fn match_key(name: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

/// In-progress download path next to `target` (renamed onto `target` when complete).
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(PackagePaths::get().partial_suffix());
    target.with_file_name(name)
}

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            // macOS
            ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
            // Windows
            "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
            // Linux
            ".directory" => true,
            _ => {
                // macOS resource forks, Office lock files, editor swap files
                name.starts_with("._")
                    || name.starts_with("~$")
                    || name.starts_with(".Trash-")
                    || name.ends_with(".swp")
                    || name.ends_with('~')
            }
        }
    } else {
        false
    }
}

/// Returns true if the path should be included in the local crawl (not reserved or excluded).
pub fn should_include_in_walk(
    path: &Path,
    root: &Path,
    ledger_canonical: &Option<PathBuf>,
    exclude_patterns: &[String],
) -> bool {
    if path == root {
        return false;
    }
    if let Some(ledger) = ledger_canonical
        && path == ledger.as_path()
    {
        return false;
    }
    if is_os_hidden_file(path) {
        return false;
    }
    if exclude_patterns.is_empty() {
        return true;
    }
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return true,
    };
    let rel = path_relative_to(path, root)
        .map(|p| path_to_db_string(&p))
        .unwrap_or_default();
    for pattern in exclude_patterns {
        if glob_match(pattern, name) || glob_match(pattern, &rel) {
            return false;
        }
    }
    true
}

/// Simple glob pattern matching (supports * and ?)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    // Remove leading '!' if present (negation handled by caller)
    let pattern = pattern.strip_prefix('!').unwrap_or(pattern);

    let mut pattern_chars = pattern.chars().peekable();
    let mut text_chars = text.chars().peekable();

    while let Some(&p) = pattern_chars.peek() {
        match p {
            '*' => {
                pattern_chars.next();
                if pattern_chars.peek().is_none() {
                    return true; // trailing * matches everything
                }
                let rest: String = pattern_chars.clone().collect();
                while text_chars.peek().is_some() {
                    if glob_match(&rest, &text_chars.clone().collect::<String>()) {
                        return true;
                    }
                    text_chars.next();
                }
                return false;
            }
            '?' => {
                pattern_chars.next();
                if text_chars.next().is_none() {
                    return false;
                }
            }
            _ => {
                pattern_chars.next();
                if text_chars.next() != Some(p) {
                    return false;
                }
            }
        }
    }

    text_chars.peek().is_none()
}
