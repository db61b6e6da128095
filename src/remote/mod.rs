//! Remote repository abstraction: a tree of folders and documents addressed by absolute,
//! `/`-separated paths, with an optional change log.

mod dir;

pub use dir::DirRemote;

use serde::Serialize;
use std::io::{Read, Write};
use thiserror::Error;

use crate::triplet::ItemKind;

/// Server-side snapshot of one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    /// Repository object id (opaque).
    pub id: String,
    /// Absolute remote path, no trailing separator.
    pub path: String,
    pub kind: ItemKind,
    /// Last modification time in ns (documents only).
    pub mtime_ns: Option<i64>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote object not found: {0}")]
    NotFound(String),
    #[error("remote object already exists: {0}")]
    AlreadyExists(String),
    #[error("change token is not known to the repository")]
    TokenUnknown,
    #[error("unsupported remote path: {0}")]
    InvalidPath(String),
    #[error("remote temporarily unavailable: {0}")]
    Transient(String),
    #[error("remote i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One change-log entry. `object` is set for creations and updates.
#[derive(Clone, Debug)]
pub struct RemoteChange {
    pub path: String,
    pub kind: ChangeKind,
    pub item_kind: ItemKind,
    pub object: Option<RemoteObject>,
}

#[derive(Clone, Debug, Default)]
pub struct ChangePage {
    pub changes: Vec<RemoteChange>,
    /// Position after this page.
    pub next_token: String,
    pub has_more: bool,
}

/// Operations the reconciler needs from a remote repository. Shared across worker threads.
pub trait RemoteRepository: Send + Sync {
    fn get_object(&self, path: &str) -> Result<RemoteObject, RemoteError>;
    /// Direct children of a folder, in no particular order.
    fn list_children(&self, folder: &str) -> Result<Vec<RemoteObject>, RemoteError>;
    fn create_folder(&self, path: &str) -> Result<RemoteObject, RemoteError>;
    /// Create a new document. Fails with `AlreadyExists` if the path is taken.
    fn create_document(
        &self,
        path: &str,
        content: &mut dyn Read,
    ) -> Result<RemoteObject, RemoteError>;
    /// Replace the content of an existing document.
    fn update_document(
        &self,
        path: &str,
        content: &mut dyn Read,
    ) -> Result<RemoteObject, RemoteError>;
    fn download(&self, path: &str, sink: &mut dyn Write) -> Result<(), RemoteError>;
    /// Delete a document or an empty folder.
    fn delete_object(&self, path: &str) -> Result<(), RemoteError>;
    /// Current change-log position.
    fn latest_change_token(&self) -> Result<String, RemoteError>;
    /// Changes after `token`, at most `max_items` per page. `TokenUnknown` when the repository
    /// cannot answer from that position.
    fn changes_since(&self, token: &str, max_items: usize) -> Result<ChangePage, RemoteError>;
}
