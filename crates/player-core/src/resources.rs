//! Blob handle bookkeeping for locally added media and subtitle files.
//!
//! Each handle maps to the file it was created for until it is released.
//! Handles are released exactly once: when their playlist entry is removed,
//! or at teardown.  Remote locators never pass through here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use player_proto::protocol::{BlobHandle, Locator, MediaEntry};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Media,
    Subtitle,
}

#[derive(Debug)]
struct BlobResource {
    path: PathBuf,
    kind: BlobKind,
}

#[derive(Debug, Default)]
pub struct ResourceTracker {
    next_handle: u64,
    live: HashMap<BlobHandle, BlobResource>,
    released: u64,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a handle for a local file.
    pub fn register(&mut self, path: PathBuf, kind: BlobKind) -> Locator {
        self.next_handle += 1;
        let handle = BlobHandle(self.next_handle);
        debug!("resources: {} {:?} → {}", handle, kind, path.display());
        self.live.insert(handle, BlobResource { path, kind });
        Locator::Blob(handle)
    }

    pub fn resolve(&self, handle: BlobHandle) -> Option<&Path> {
        self.live.get(&handle).map(|r| r.path.as_path())
    }

    pub fn kind(&self, handle: BlobHandle) -> Option<BlobKind> {
        self.live.get(&handle).map(|r| r.kind)
    }

    /// Playable form of a locator for the engine: a filesystem path for
    /// blobs, the URI itself for remote content.
    pub fn playable(&self, locator: &Locator) -> Option<String> {
        match locator {
            Locator::Blob(h) => self.resolve(*h).map(|p| p.to_string_lossy().into_owned()),
            Locator::Remote(url) => Some(url.clone()),
        }
    }

    /// Release one handle.  Releasing an unknown or already released handle
    /// is logged and otherwise ignored.
    pub fn release(&mut self, handle: BlobHandle) -> bool {
        match self.live.remove(&handle) {
            Some(resource) => {
                debug!(
                    "resources: released {} ({})",
                    handle,
                    resource.path.display()
                );
                self.released += 1;
                true
            }
            None => {
                warn!("resources: {} was not live, ignoring release", handle);
                false
            }
        }
    }

    /// Release the media handle and every subtitle handle of a removed entry.
    pub fn release_entry(&mut self, entry: &MediaEntry) -> usize {
        entry
            .blob_handles()
            .into_iter()
            .filter(|h| self.release(*h))
            .count()
    }

    /// Release everything still live.  Returns how many handles that was.
    pub fn release_all(&mut self) -> usize {
        let handles: Vec<BlobHandle> = self.live.keys().copied().collect();
        handles.into_iter().filter(|h| self.release(*h)).count()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: BlobHandle) -> bool {
        self.live.contains_key(&handle)
    }

    /// Total number of successful releases so far.
    pub fn released_count(&self) -> u64 {
        self.released
    }
}
