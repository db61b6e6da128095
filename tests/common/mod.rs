//! Shared fixtures: an in-memory remote with a change journal, and helpers for scratch trees.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trisync::remote::{ChangeKind, ChangePage, RemoteChange, RemoteError, RemoteObject};
use trisync::triplet::ItemKind;
use trisync::{RemoteRepository, SqliteLedger, SyncOpts, SyncSession};

#[derive(Clone)]
enum Node {
    Folder,
    Document { content: Vec<u8>, mtime: i64 },
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    clock: i64,
    journal: Vec<RemoteChange>,
    /// Journal entries discarded by `forget_history`; tokens below this are unknown.
    dropped: usize,
}

/// Remote repository held in memory. Every document write bumps a clock used as mtime, and
/// every mutation is appended to a journal; the change token is a journal position.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
    failing: Mutex<HashSet<String>>,
    unlistable: Mutex<HashSet<String>>,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl State {
    fn object(&self, path: &str) -> Option<RemoteObject> {
        if path == "/" {
            return Some(folder_object(path));
        }
        match self.nodes.get(path)? {
            Node::Folder => Some(folder_object(path)),
            Node::Document { mtime, .. } => Some(RemoteObject {
                id: format!("id:{path}"),
                path: path.to_string(),
                kind: ItemKind::File,
                mtime_ns: Some(*mtime),
            }),
        }
    }

    fn is_folder(&self, path: &str) -> bool {
        path == "/" || matches!(self.nodes.get(path), Some(Node::Folder))
    }

    fn log(&mut self, path: &str, kind: ChangeKind, item_kind: ItemKind) {
        let object = match kind {
            ChangeKind::Deleted => None,
            _ => self.object(path),
        };
        self.journal.push(RemoteChange {
            path: path.to_string(),
            kind,
            item_kind,
            object,
        });
    }

    fn write(&mut self, path: &str, content: Vec<u8>) -> RemoteObject {
        self.clock += 1;
        let existed = self.nodes.contains_key(path);
        self.nodes.insert(
            path.to_string(),
            Node::Document {
                content,
                mtime: self.clock,
            },
        );
        let kind = if existed {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        self.log(path, kind, ItemKind::File);
        self.object(path).unwrap_or_else(|| folder_object(path))
    }
}

fn folder_object(path: &str) -> RemoteObject {
    RemoteObject {
        id: format!("id:{path}"),
        path: path.to_string(),
        kind: ItemKind::Folder,
        mtime_ns: None,
    }
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create or overwrite a document, creating missing parent folders.
    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.put_folder(&parent_of(path));
        let mut state = self.state.lock().unwrap();
        state.write(path, content.to_vec());
    }

    pub fn put_folder(&self, path: &str) {
        let path = normalize(path);
        if path == "/" {
            return;
        }
        self.put_folder(&parent_of(&path));
        let mut state = self.state.lock().unwrap();
        if !state.nodes.contains_key(&path) {
            state.nodes.insert(path.clone(), Node::Folder);
            state.log(&path, ChangeKind::Created, ItemKind::Folder);
        }
    }

    /// Remove a path and everything below it.
    pub fn remove_tree(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        let prefix = format!("{path}/");
        let doomed: Vec<(String, ItemKind)> = state
            .nodes
            .iter()
            .filter(|(p, _)| p.as_str() == path || p.starts_with(&prefix))
            .map(|(p, n)| (p.clone(), ItemKind::from_is_dir(matches!(n, Node::Folder))))
            .collect();
        for (p, kind) in doomed.into_iter().rev() {
            state.nodes.remove(&p);
            state.log(&p, ChangeKind::Deleted, kind);
        }
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().unwrap().nodes.get(path)? {
            Node::Document { content, .. } => Some(content.clone()),
            Node::Folder => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().object(path).is_some()
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.lock().unwrap().nodes.keys().cloned().collect()
    }

    /// Every operation on `path` fails with a transient error from now on.
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    /// Drop the journal so every token handed out so far becomes unknown.
    pub fn forget_history(&self) {
        let mut state = self.state.lock().unwrap();
        state.dropped += state.journal.len() + 1;
        state.journal.clear();
    }

    /// Listing `folder` fails from now on; point lookups still work.
    pub fn fail_listing(&self, folder: &str) {
        self.unlistable.lock().unwrap().insert(folder.to_string());
    }

    fn check(&self, path: &str) -> Result<(), RemoteError> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(RemoteError::Transient(format!("injected failure on {path}")));
        }
        Ok(())
    }
}

impl RemoteRepository for MemoryRemote {
    fn get_object(&self, path: &str) -> Result<RemoteObject, RemoteError> {
        let path = normalize(path);
        self.check(&path)?;
        self.state
            .lock()
            .unwrap()
            .object(&path)
            .ok_or(RemoteError::NotFound(path))
    }

    fn list_children(&self, folder: &str) -> Result<Vec<RemoteObject>, RemoteError> {
        let folder = normalize(folder);
        self.check(&folder)?;
        if self.unlistable.lock().unwrap().contains(&folder) {
            return Err(RemoteError::Transient(format!("cannot list {folder}")));
        }
        let state = self.state.lock().unwrap();
        if !state.is_folder(&folder) {
            return Err(RemoteError::NotFound(folder));
        }
        Ok(state
            .nodes
            .keys()
            .filter(|p| parent_of(p) == folder)
            .filter_map(|p| state.object(p))
            .collect())
    }

    fn create_folder(&self, path: &str) -> Result<RemoteObject, RemoteError> {
        let path = normalize(path);
        self.check(&path)?;
        let mut state = self.state.lock().unwrap();
        if !state.is_folder(&parent_of(&path)) {
            return Err(RemoteError::NotFound(parent_of(&path)));
        }
        match state.nodes.get(&path) {
            Some(Node::Folder) => {}
            Some(Node::Document { .. }) => return Err(RemoteError::AlreadyExists(path)),
            None => {
                state.nodes.insert(path.clone(), Node::Folder);
                state.log(&path, ChangeKind::Created, ItemKind::Folder);
            }
        }
        Ok(folder_object(&path))
    }

    fn create_document(
        &self,
        path: &str,
        content: &mut dyn Read,
    ) -> Result<RemoteObject, RemoteError> {
        let path = normalize(path);
        self.check(&path)?;
        let mut buf = Vec::new();
        content.read_to_end(&mut buf)?;
        let mut state = self.state.lock().unwrap();
        if !state.is_folder(&parent_of(&path)) {
            return Err(RemoteError::NotFound(parent_of(&path)));
        }
        if state.nodes.contains_key(&path) {
            return Err(RemoteError::AlreadyExists(path));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(state.write(&path, buf))
    }

    fn update_document(
        &self,
        path: &str,
        content: &mut dyn Read,
    ) -> Result<RemoteObject, RemoteError> {
        let path = normalize(path);
        self.check(&path)?;
        let mut buf = Vec::new();
        content.read_to_end(&mut buf)?;
        let mut state = self.state.lock().unwrap();
        if !matches!(state.nodes.get(&path), Some(Node::Document { .. })) {
            return Err(RemoteError::NotFound(path));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(state.write(&path, buf))
    }

    fn download(&self, path: &str, sink: &mut dyn Write) -> Result<(), RemoteError> {
        let path = normalize(path);
        self.check(&path)?;
        let content = match self.state.lock().unwrap().nodes.get(&path) {
            Some(Node::Document { content, .. }) => content.clone(),
            _ => return Err(RemoteError::NotFound(path)),
        };
        sink.write_all(&content)?;
        Ok(())
    }

    fn delete_object(&self, path: &str) -> Result<(), RemoteError> {
        let path = normalize(path);
        self.check(&path)?;
        let mut state = self.state.lock().unwrap();
        let kind = match state.nodes.get(&path) {
            None => return Err(RemoteError::NotFound(path)),
            Some(Node::Folder) => ItemKind::Folder,
            Some(Node::Document { .. }) => ItemKind::File,
        };
        let prefix = format!("{path}/");
        if kind == ItemKind::Folder && state.nodes.keys().any(|p| p.starts_with(&prefix)) {
            return Err(RemoteError::Transient(format!("{path} is not empty")));
        }
        state.nodes.remove(&path);
        state.log(&path, ChangeKind::Deleted, kind);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn latest_change_token(&self) -> Result<String, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok((state.dropped + state.journal.len()).to_string())
    }

    fn changes_since(&self, token: &str, max_items: usize) -> Result<ChangePage, RemoteError> {
        let state = self.state.lock().unwrap();
        let pos: usize = token.parse().map_err(|_| RemoteError::TokenUnknown)?;
        let total = state.dropped + state.journal.len();
        if pos < state.dropped || pos > total {
            return Err(RemoteError::TokenUnknown);
        }
        let end = (pos + max_items.max(1)).min(total);
        Ok(ChangePage {
            changes: state.journal[pos - state.dropped..end - state.dropped].to_vec(),
            next_token: end.to_string(),
            has_more: end < total,
        })
    }
}

pub fn write_file(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn read_file(root: &Path, rel: &str) -> Option<Vec<u8>> {
    fs::read(root.join(rel)).ok()
}

pub fn opts(bidirectional: bool) -> SyncOpts {
    SyncOpts {
        bidirectional,
        ..Default::default()
    }
}

pub fn session(
    root: &Path,
    ledger: &Arc<SqliteLedger>,
    remote: &Arc<MemoryRemote>,
    opts: SyncOpts,
) -> SyncSession {
    SyncSession::new(root, opts, ledger.clone(), remote.clone()).unwrap()
}

pub fn memory_ledger() -> Arc<SqliteLedger> {
    Arc::new(SqliteLedger::open_in_memory().unwrap())
}
