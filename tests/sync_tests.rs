//! End-to-end passes against the in-memory remote: pull, push, conflicts, deletes, incremental
//! change-log passes and local renames.

mod common;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use common::{MemoryRemote, memory_ledger, opts, read_file, session, write_file};
use crossbeam_channel::unbounded;
use trisync::engine::hashing::hash_bytes;
use trisync::ledger::LedgerRow;
use trisync::notify::Notifier;
use trisync::pipeline::{CrawlContext, scan_ledger_deletions};
use trisync::triplet::{ItemKind, TripletFactory};
use trisync::{ItemOutcome, Ledger, RemoteRepository, SyncOpts};

/// Notifier that remembers the order items finished in.
#[derive(Default)]
struct Finished(Mutex<Vec<String>>);

impl Notifier for Finished {
    fn error(&self, _name: &str, _err: &anyhow::Error) {}

    fn item_finished(&self, name: &str, _outcome: ItemOutcome) {
        self.0.lock().unwrap().push(name.to_string());
    }
}

// --- first pass ---

#[test]
fn test_first_pass_pulls_remote_tree() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"alpha");
    remote.put_file("/docs/x.txt", b"x");
    remote.put_file("/docs/y.txt", b"y");

    let report = session(dir.path(), &ledger, &remote, opts(false))
        .run_full_crawl_sync()
        .unwrap();

    assert_eq!(report.succeeded, 4);
    assert!(report.is_success());
    assert_eq!(read_file(dir.path(), "a.txt").unwrap(), b"alpha");
    assert_eq!(read_file(dir.path(), "docs/x.txt").unwrap(), b"x");
    assert_eq!(read_file(dir.path(), "docs/y.txt").unwrap(), b"y");
    assert_eq!(ledger.rows().unwrap().len(), 4);
    assert!(ledger.changelog_token().unwrap().is_some());
}

// --- P1 idempotence / Scenario A ---

#[test]
fn test_second_pass_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"alpha");
    remote.put_file("/docs/x.txt", b"x");
    let s = session(dir.path(), &ledger, &remote, opts(true));
    s.run_full_crawl_sync().unwrap();
    let rows_before = ledger.rows().unwrap();

    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.succeeded, 0);
    assert_eq!(report.unchanged, 3);
    assert!(report.is_success());
    assert_eq!(remote.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(remote.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(ledger.rows().unwrap(), rows_before);
}

// --- P2 pull ---

#[test]
fn test_remote_update_is_pulled() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"v1");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    remote.put_file("/a.txt", b"version two");
    remote.put_file("/new/b.txt", b"b");
    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(read_file(dir.path(), "a.txt").unwrap(), b"version two");
    assert_eq!(read_file(dir.path(), "new/b.txt").unwrap(), b"b");
}

#[test]
fn test_remote_file_delete_removes_local() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    remote.put_file("/keep.txt", b"k");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    remote.remove_tree("/a.txt");
    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(!dir.path().join("a.txt").exists());
    assert!(dir.path().join("keep.txt").exists());
    assert_eq!(ledger.local_to_remote("a.txt", ItemKind::File).unwrap(), None);
}

// --- Scenario C: remote folder deleted ---

#[test]
fn test_remote_folder_delete_removes_contents_first() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/docs/one.txt", b"1");
    remote.put_file("/docs/two.txt", b"2");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();
    assert!(dir.path().join("docs/one.txt").exists());

    remote.remove_tree("/docs");
    let finished = Arc::new(Finished::default());
    let report = session(dir.path(), &ledger, &remote, opts(false))
        .with_notifier(finished.clone())
        .run_full_crawl_sync()
        .unwrap();

    assert_eq!(report.succeeded, 3);
    assert!(report.is_success());
    assert!(!dir.path().join("docs").exists());
    assert!(ledger.rows().unwrap().is_empty());
    let order = finished.0.lock().unwrap().clone();
    assert_eq!(order.last().map(String::as_str), Some("docs/"));
}

// --- Scenario B / P3 push ---

#[test]
fn test_local_delete_pushed_when_bidirectional() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(true));
    s.run_full_crawl_sync().unwrap();

    fs::remove_file(dir.path().join("a.txt")).unwrap();
    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(!remote.exists("/a.txt"));
    assert!(ledger.rows().unwrap().is_empty());
}

#[test]
fn test_local_delete_ignored_when_push_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    fs::remove_file(dir.path().join("a.txt")).unwrap();
    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.succeeded, 0);
    assert_eq!(report.unchanged, 1);
    assert!(remote.exists("/a.txt"));
    assert_eq!(ledger.rows().unwrap().len(), 1);
}

#[test]
fn test_local_changes_pushed_when_bidirectional() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(true));
    s.run_full_crawl_sync().unwrap();

    write_file(dir.path(), "a.txt", b"edited locally");
    write_file(dir.path(), "b.txt", b"brand new");
    write_file(dir.path(), "n/deep/f.txt", b"nested");
    let report = s.run_full_crawl_sync().unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded, 5);
    assert_eq!(remote.content("/a.txt").unwrap(), b"edited locally");
    assert_eq!(remote.content("/b.txt").unwrap(), b"brand new");
    assert_eq!(remote.content("/n/deep/f.txt").unwrap(), b"nested");

    let again = s.run_full_crawl_sync().unwrap();
    assert_eq!(again.succeeded, 0);
    assert_eq!(again.unchanged, 5);
}

#[test]
fn test_local_changes_not_pushed_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    write_file(dir.path(), "a.txt", b"edited locally");
    write_file(dir.path(), "b.txt", b"brand new");
    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.succeeded, 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(remote.content("/a.txt").unwrap(), b"a");
    assert!(!remote.exists("/b.txt"));
    assert_eq!(remote.uploads.load(Ordering::SeqCst), 0);
}

// --- Scenario D / P4 conflicts ---

#[test]
fn test_conflict_keeps_local_copy_aside() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/report.txt", b"v1");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    write_file(dir.path(), "report.txt", b"local edit");
    remote.put_file("/report.txt", b"remote edit");
    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.conflicted, 1);
    assert_eq!(report.conflicts, vec!["report.txt".to_string()]);
    assert!(!report.is_success());
    assert_eq!(
        read_file(dir.path(), "report-conflict-version.txt").unwrap(),
        b"local edit"
    );
    assert_eq!(read_file(dir.path(), "report.txt").unwrap(), b"remote edit");
    assert_eq!(remote.content("/report.txt").unwrap(), b"remote edit");

    // Resolved item is in sync now; the renamed copy is local-only.
    let next = s.run_full_crawl_sync().unwrap();
    assert_eq!(next.conflicted, 0);
    assert_eq!(next.succeeded, 0);
    assert!(next.is_success());
}

#[test]
fn test_conflict_name_gets_counter_when_taken() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/report.txt", b"v1");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    write_file(dir.path(), "report-conflict-version.txt", b"older conflict");
    write_file(dir.path(), "report.txt", b"local edit");
    remote.put_file("/report.txt", b"remote edit");
    s.run_full_crawl_sync().unwrap();

    assert_eq!(
        read_file(dir.path(), "report-conflict-version.txt").unwrap(),
        b"older conflict"
    );
    assert_eq!(
        read_file(dir.path(), "report-conflict-version-1.txt").unwrap(),
        b"local edit"
    );
}

#[test]
fn test_identical_content_is_adopted() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/same.txt", b"same bytes");
    remote.put_folder("/both");
    write_file(dir.path(), "same.txt", b"same bytes");
    fs::create_dir(dir.path().join("both")).unwrap();

    let report = session(dir.path(), &ledger, &remote, opts(false))
        .run_full_crawl_sync()
        .unwrap();

    assert_eq!(report.conflicted, 0);
    assert_eq!(report.succeeded, 2);
    assert!(!dir.path().join("same-conflict-version.txt").exists());
    assert_eq!(
        ledger.local_to_remote("same.txt", ItemKind::File).unwrap(),
        Some("same.txt".to_string())
    );
    assert!(ledger.local_to_remote("both", ItemKind::Folder).unwrap().is_some());
}

#[test]
fn test_both_new_with_different_content_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/notes.md", b"remote");
    write_file(dir.path(), "notes.md", b"local");

    let report = session(dir.path(), &ledger, &remote, opts(false))
        .run_full_crawl_sync()
        .unwrap();

    assert_eq!(report.conflicted, 1);
    assert_eq!(read_file(dir.path(), "notes.md").unwrap(), b"remote");
    assert_eq!(
        read_file(dir.path(), "notes-conflict-version.md").unwrap(),
        b"local"
    );
}

#[test]
fn test_local_edit_remote_delete_keeps_local_copy() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    write_file(dir.path(), "a.txt", b"edited");
    remote.remove_tree("/a.txt");
    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.conflicted, 1);
    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(
        read_file(dir.path(), "a-conflict-version.txt").unwrap(),
        b"edited"
    );
    assert_eq!(ledger.local_to_remote("a.txt", ItemKind::File).unwrap(), None);
}

#[test]
fn test_local_delete_remote_edit_restores() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(true));
    s.run_full_crawl_sync().unwrap();

    fs::remove_file(dir.path().join("a.txt")).unwrap();
    remote.put_file("/a.txt", b"changed remotely");
    let report = s.run_full_crawl_sync().unwrap();

    assert_eq!(report.conflicted, 1);
    assert_eq!(read_file(dir.path(), "a.txt").unwrap(), b"changed remotely");
    assert!(remote.exists("/a.txt"));
}

// --- failures ---

#[test]
fn test_failed_folder_create_fails_contents() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.fail_on("/n");
    write_file(dir.path(), "n/f.txt", b"f");
    write_file(dir.path(), "ok.txt", b"ok");

    let report = session(dir.path(), &ledger, &remote, opts(true))
        .run_full_crawl_sync()
        .unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures.len(), 2);
    assert!(remote.exists("/ok.txt"));
    assert!(!remote.exists("/n/f.txt"));
    assert_eq!(ledger.changelog_token().unwrap(), None);
}

#[test]
fn test_incomplete_remote_crawl_holds_back_local_only_items() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/docs/x.txt", b"x");
    let s = session(dir.path(), &ledger, &remote, opts(true));
    s.run_full_crawl_sync().unwrap();
    let token = ledger.changelog_token().unwrap();

    remote.fail_listing("/docs");
    remote.put_file("/docs/remote-new.txt", b"r");
    write_file(dir.path(), "local-new.txt", b"l");
    let report = s.run_full_crawl_sync().unwrap();

    assert!(!report.crawl_errors.is_empty());
    assert!(!report.is_success());
    assert!(!remote.exists("/local-new.txt"));
    assert!(!dir.path().join("docs/remote-new.txt").exists());
    assert!(dir.path().join("docs/x.txt").exists());
    assert_eq!(ledger.changelog_token().unwrap(), token);
}

#[test]
fn test_cancelled_pass_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.cancel();

    let report = s.run_full_crawl_sync().unwrap();

    assert!(report.crawl_errors.iter().any(|e| e == "cancelled"));
    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(ledger.changelog_token().unwrap(), None);
}

/// Records `sub/f.txt` as synced and turns the local `sub` into a symlink to itself, so
/// examining `sub/f.txt` fails with ELOOP rather than reporting it missing.
#[cfg(unix)]
fn synced_row_behind_symlink_loop(root: &std::path::Path, ledger: &dyn Ledger) -> Arc<MemoryRemote> {
    let remote = MemoryRemote::new();
    remote.put_file("/sub/f.txt", b"f");
    let mtime = remote.get_object("/sub/f.txt").unwrap().mtime_ns;
    ledger
        .record(&LedgerRow::file("sub/f.txt", "sub/f.txt", hash_bytes(b"f"), mtime))
        .unwrap();
    std::os::unix::fs::symlink("sub", root.join("sub")).unwrap();
    remote
}

#[cfg(unix)]
#[test]
fn test_ledger_scan_skips_paths_it_cannot_examine() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let _remote = synced_row_behind_symlink_loop(dir.path(), ledger.as_ref());

    let ctx = CrawlContext::new(
        dir.path().to_path_buf(),
        None,
        Vec::new(),
        Arc::new(AtomicBool::new(false)),
    );
    let factory = TripletFactory::new(dir.path(), "/", ledger.clone());
    let (tx, rx) = unbounded();
    let sent = scan_ledger_deletions(&tx, &factory, ledger.as_ref(), &ctx).unwrap();
    drop(tx);

    assert_eq!(sent, 0);
    assert_eq!(rx.iter().count(), 0);
    let skipped = ctx.take_skipped();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, "sub/f.txt");
}

#[cfg(unix)]
#[test]
fn test_unexaminable_local_file_keeps_remote_copy() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = synced_row_behind_symlink_loop(dir.path(), ledger.as_ref());

    let report = session(dir.path(), &ledger, &remote, opts(true))
        .run_full_crawl_sync()
        .unwrap();

    assert!(!report.is_success());
    assert!(report.crawl_errors.iter().any(|e| e.starts_with("sub/f.txt: ")));
    assert!(remote.exists("/sub/f.txt"));
    assert_eq!(remote.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(
        ledger.local_to_remote("sub/f.txt", ItemKind::File).unwrap(),
        Some("sub/f.txt".to_string())
    );
}

// --- options ---

#[test]
fn test_excluded_paths_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/keep.txt", b"k");
    remote.put_file("/remote.log", b"r");
    remote.put_file("/cache/data.bin", b"c");
    write_file(dir.path(), "local.log", b"l");

    let options = SyncOpts {
        bidirectional: true,
        exclude: vec!["*.log".to_string(), "cache".to_string()],
        ..Default::default()
    };
    let report = session(dir.path(), &ledger, &remote, options)
        .run_full_crawl_sync()
        .unwrap();

    assert!(report.is_success());
    assert!(dir.path().join("keep.txt").exists());
    assert!(!dir.path().join("remote.log").exists());
    assert!(!dir.path().join("cache").exists());
    assert!(!remote.exists("/local.log"));
}

#[test]
fn test_remote_root_scopes_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/sync/a.txt", b"a");
    remote.put_file("/outside.txt", b"o");
    write_file(dir.path(), "b.txt", b"b");

    let options = SyncOpts {
        remote_root: "/sync".to_string(),
        bidirectional: true,
        ..Default::default()
    };
    let report = session(dir.path(), &ledger, &remote, options)
        .run_full_crawl_sync()
        .unwrap();

    assert!(report.is_success());
    assert_eq!(read_file(dir.path(), "a.txt").unwrap(), b"a");
    assert!(!dir.path().join("outside.txt").exists());
    assert_eq!(remote.content("/sync/b.txt").unwrap(), b"b");
    assert!(!remote.exists("/b.txt"));
}

#[test]
fn test_case_insensitive_matching() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/README.md", b"readme");
    write_file(dir.path(), "Readme.md", b"readme");

    let options = SyncOpts {
        case_insensitive: true,
        bidirectional: true,
        ..Default::default()
    };
    let s = session(dir.path(), &ledger, &remote, options);
    let report = s.run_full_crawl_sync().unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded, 1);
    assert_eq!(
        ledger.local_to_remote("Readme.md", ItemKind::File).unwrap(),
        Some("README.md".to_string())
    );
    assert!(!remote.exists("/Readme.md"));

    let again = s.run_full_crawl_sync().unwrap();
    assert_eq!(again.unchanged, 1);
    assert_eq!(again.succeeded, 0);
}

#[test]
fn test_new_items_follow_folder_spelling_difference() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/docs/a.txt", b"a");
    write_file(dir.path(), "Docs/a.txt", b"a");

    let options = SyncOpts {
        case_insensitive: true,
        bidirectional: true,
        ..Default::default()
    };
    let s = session(dir.path(), &ledger, &remote, options);
    assert!(s.run_full_crawl_sync().unwrap().is_success());
    assert_eq!(
        ledger.local_to_remote("Docs", ItemKind::Folder).unwrap(),
        Some("docs".to_string())
    );

    write_file(dir.path(), "Docs/local_new.txt", b"mine");
    remote.put_file("/docs/remote_new.txt", b"theirs");
    let report = s.run_full_crawl_sync().unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded, 2);
    assert_eq!(remote.content("/docs/local_new.txt").unwrap(), b"mine");
    assert!(!remote.exists("/Docs"));
    assert_eq!(read_file(dir.path(), "Docs/remote_new.txt").unwrap(), b"theirs");
    let top: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(top, vec!["Docs".to_string()]);

    let again = s.run_full_crawl_sync().unwrap();
    assert_eq!(again.succeeded, 0);
    assert_eq!(again.failed, 0);
    assert_eq!(again.unchanged, 4);
}

// --- incremental ---

#[test]
fn test_incremental_without_token_needs_full_crawl() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(false));

    assert!(!s.run_incremental_change_sync().unwrap());
    assert!(!dir.path().join("a.txt").exists());

    let report = s.run(true).unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(dir.path().join("a.txt").exists());
    assert!(ledger.changelog_token().unwrap().is_some());
}

#[test]
fn test_incremental_up_to_date_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    let report = s.run_incremental_report().unwrap().unwrap();
    assert_eq!(report.processed(), 0);
    assert!(report.is_success());
}

#[test]
fn test_incremental_applies_remote_changes() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"v1");
    remote.put_file("/gone.txt", b"g");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    remote.put_file("/a.txt", b"version two");
    remote.put_file("/a.txt", b"version three");
    remote.put_file("/new/b.txt", b"b");
    remote.remove_tree("/gone.txt");
    assert!(s.run_incremental_change_sync().unwrap());

    assert_eq!(read_file(dir.path(), "a.txt").unwrap(), b"version three");
    assert_eq!(read_file(dir.path(), "new/b.txt").unwrap(), b"b");
    assert!(!dir.path().join("gone.txt").exists());

    let next = s.run_incremental_report().unwrap().unwrap();
    assert_eq!(next.processed(), 0);
}

#[test]
fn test_incremental_falls_back_when_history_lost() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(false));
    s.run_full_crawl_sync().unwrap();

    remote.forget_history();
    remote.put_file("/b.txt", b"b");
    assert!(!s.run_incremental_change_sync().unwrap());
    assert!(!dir.path().join("b.txt").exists());

    let report = s.run(true).unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(dir.path().join("b.txt").exists());
}

// --- sync_local_rename ---

#[test]
fn test_local_file_rename_moves_remote() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/a.txt", b"a");
    let s = session(dir.path(), &ledger, &remote, opts(true));
    s.run_full_crawl_sync().unwrap();

    fs::rename(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();
    let report = s.sync_local_rename("a.txt", "b.txt").unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded, 1);
    assert!(!remote.exists("/a.txt"));
    assert_eq!(remote.content("/b.txt").unwrap(), b"a");
    assert_eq!(ledger.local_to_remote("a.txt", ItemKind::File).unwrap(), None);
    assert_eq!(
        ledger.local_to_remote("b.txt", ItemKind::File).unwrap(),
        Some("b.txt".to_string())
    );
}

#[test]
fn test_local_folder_rename_moves_contents() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    remote.put_file("/docs/x.txt", b"x");
    remote.put_file("/docs/sub/y.txt", b"y");
    let s = session(dir.path(), &ledger, &remote, opts(true));
    s.run_full_crawl_sync().unwrap();

    fs::rename(dir.path().join("docs"), dir.path().join("papers")).unwrap();
    let report = s.sync_local_rename("docs", "papers").unwrap();

    assert!(report.is_success());
    assert_eq!(
        remote.paths(),
        vec!["/papers", "/papers/sub", "/papers/sub/y.txt", "/papers/x.txt"]
    );
    let locals: Vec<String> = ledger
        .rows()
        .unwrap()
        .into_iter()
        .map(|r| r.local_path)
        .collect();
    assert_eq!(locals, vec!["papers", "papers/sub", "papers/sub/y.txt", "papers/x.txt"]);

    let after = s.run_full_crawl_sync().unwrap();
    assert_eq!(after.succeeded, 0);
    assert_eq!(after.unchanged, 4);
}

#[test]
fn test_rename_of_missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = memory_ledger();
    let remote = MemoryRemote::new();
    let s = session(dir.path(), &ledger, &remote, opts(true));
    assert!(s.sync_local_rename("a.txt", "b.txt").is_err());
}
