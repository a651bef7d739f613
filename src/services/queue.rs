//! Ordered queue of print jobs and the on-disk copies backing them.
//!
//! Every entry owns one file in the queue directory, named by its token. The
//! queue is the only writer of that directory.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::time::Instant;
use thiserror::Error;

/// Longest display name kept for a held entry, in characters.
pub const MAX_DISPLAY_NAME: usize = 64;

/// Opaque handle for a queue entry, stable for the entry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Queued, not yet selected for conversion.
    PendingAttention,
    /// Bound to the active conversion run.
    BeingProcessed,
    /// Deferred by the user for a later manual conversion.
    HeldInQueue,
    /// Superseded by an intermediate file mid-pipeline, awaiting cleanup.
    Discarded,
    /// Marked for deletion in the queue view.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: EntryId,
    pub token: String,
    pub display_name: String,
    pub state: EntryState,
    pub include_in_next_run: bool,
}

/// Errors that can occur while accepting a new job
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to copy {path} into the queue: {source}")]
    CopyFailed {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The authoritative list of job entries.
///
/// Entries live in an [`IndexMap`] so that iteration follows queue order while
/// handle lookups stay O(1).
#[derive(Debug)]
pub struct FileQueue {
    dir: Utf8PathBuf,
    entries: IndexMap<EntryId, QueueEntry>,
    next_id: u64,
    more_pending: bool,
    clock: Instant,
}

impl FileQueue {
    /// Create a queue backed by `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        Ok(Self {
            dir,
            entries: IndexMap::new(),
            next_id: 1,
            more_pending: false,
            clock: Instant::now(),
        })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&QueueEntry> {
        self.entries.get(&id)
    }

    /// Entries in queue order.
    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    pub fn count_in(&self, state: EntryState) -> usize {
        self.entries.values().filter(|e| e.state == state).count()
    }

    /// Whether an earlier promotion scan saw further pending entries.
    ///
    /// Set by [`enqueue`](Self::enqueue), refreshed by
    /// [`promote_next_pending`](Self::promote_next_pending).
    pub fn has_more_pending(&self) -> bool {
        self.more_pending
    }

    pub fn path_for_token(&self, token: &str) -> Utf8PathBuf {
        self.dir.join(token)
    }

    pub fn path_of(&self, id: EntryId) -> Option<Utf8PathBuf> {
        self.entries.get(&id).map(|e| self.path_for_token(&e.token))
    }

    /// Backing files of the entries bound to the active run, in queue order.
    pub fn active_paths(&self) -> Vec<Utf8PathBuf> {
        self.entries
            .values()
            .filter(|e| e.state == EntryState::BeingProcessed)
            .map(|e| self.path_for_token(&e.token))
            .collect()
    }

    /// Entries shown by the queue view.
    pub fn held_entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries
            .values()
            .filter(|e| matches!(e.state, EntryState::HeldInQueue | EntryState::Deleted))
    }

    /// Generate a token not used by any entry or file in the queue directory.
    ///
    /// Tokens are the milliseconds elapsed on the queue's monotonic clock, in
    /// hex, bumped until free.
    pub fn allocate_token(&self) -> String {
        let in_use: HashSet<&str> = self.entries.values().map(|e| e.token.as_str()).collect();
        let mut stamp = self.clock.elapsed().as_millis() as u64;

        loop {
            let token = format!("{:08x}", stamp);
            if !in_use.contains(token.as_str()) && !self.path_for_token(&token).exists() {
                return token;
            }
            stamp = stamp.wrapping_add(1);
        }
    }

    fn push(&mut self, token: String, state: EntryState) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;

        self.entries.insert(
            id,
            QueueEntry {
                id,
                token,
                display_name: String::new(),
                state,
                include_in_next_run: false,
            },
        );
        id
    }

    /// Copy `source` into the queue as a new pending entry.
    ///
    /// Opening the source first rejects files that are missing or still locked
    /// by their writer. A failed copy leaves the queue exactly as it was.
    pub fn enqueue(&mut self, source: &Utf8Path) -> Result<EntryId, IngestError> {
        File::open(source).map_err(|e| IngestError::OpenFailed {
            path: source.to_path_buf(),
            source: e,
        })?;

        let token = self.allocate_token();
        let target = self.path_for_token(&token);
        let id = self.push(token, EntryState::PendingAttention);

        if let Err(e) = fs::copy(source, &target) {
            self.entries.shift_remove(&id);
            // A partial copy may have been left behind.
            let _ = fs::remove_file(&target);
            return Err(IngestError::CopyFailed {
                path: source.to_path_buf(),
                source: e,
            });
        }

        self.more_pending = true;
        tracing::debug!("Queued {} as {} ({})", source, id, target);
        Ok(id)
    }

    /// Promote the earliest pending entry to `BeingProcessed`.
    ///
    /// At most one entry changes per call. The scan continues past the
    /// promoted entry to refresh the "more pending" flag.
    pub fn promote_next_pending(&mut self) -> Option<EntryId> {
        let mut promoted = None;
        let mut remaining = false;

        for entry in self.entries.values_mut() {
            if entry.state != EntryState::PendingAttention {
                continue;
            }
            if promoted.is_none() {
                entry.state = EntryState::BeingProcessed;
                promoted = Some(entry.id);
            } else {
                remaining = true;
                break;
            }
        }

        self.more_pending = remaining;
        if let Some(id) = promoted {
            tracing::debug!("Promoted {} (more pending: {})", id, remaining);
        }
        promoted
    }

    /// Promote every held entry included in the next run.
    pub fn promote_all_held_included(&mut self) -> bool {
        let mut any = false;
        for entry in self.entries.values_mut() {
            if entry.state == EntryState::HeldInQueue && entry.include_in_next_run {
                entry.state = EntryState::BeingProcessed;
                any = true;
            }
        }
        any
    }

    /// Move the active entries to the held list under `display_name`.
    pub fn defer_active_to_held(&mut self, display_name: &str) {
        let name: String = display_name.chars().take(MAX_DISPLAY_NAME).collect();

        for entry in self.entries.values_mut() {
            if entry.state == EntryState::BeingProcessed {
                entry.state = EntryState::HeldInQueue;
                entry.include_in_next_run = true;
                entry.display_name = name.clone();
            }
        }
    }

    /// Replace the active inputs with an intermediate file already written
    /// under `token`.
    ///
    /// The superseded entries keep their files until the next
    /// [`reclaim_terminal`](Self::reclaim_terminal).
    pub fn discard_active_and_append(&mut self, token: String) -> EntryId {
        for entry in self.entries.values_mut() {
            if entry.state == EntryState::BeingProcessed {
                entry.state = EntryState::Discarded;
            }
        }
        self.push(token, EntryState::BeingProcessed)
    }

    pub fn set_include(&mut self, id: EntryId, include: bool) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.state == EntryState::HeldInQueue => {
                entry.include_in_next_run = include;
                true
            }
            _ => false,
        }
    }

    /// Flip an entry between `HeldInQueue` and `Deleted`.
    pub fn toggle_deleted(&mut self, id: EntryId) -> Option<EntryState> {
        let entry = self.entries.get_mut(&id)?;
        entry.state = match entry.state {
            EntryState::HeldInQueue => EntryState::Deleted,
            EntryState::Deleted => EntryState::HeldInQueue,
            _ => return None,
        };
        Some(entry.state)
    }

    fn delete_backing_file(&self, entry: &QueueEntry) {
        let path = self.path_for_token(&entry.token);
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!("Failed to delete queued file {}: {}", path, e);
        }
    }

    fn reclaim_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&QueueEntry) -> bool,
    {
        let doomed: Vec<EntryId> = self
            .entries
            .values()
            .filter(|e| pred(*e))
            .map(|e| e.id)
            .collect();

        for id in &doomed {
            if let Some(entry) = self.entries.shift_remove(id) {
                self.delete_backing_file(&entry);
            }
        }

        if !doomed.is_empty() {
            tracing::debug!("Reclaimed {} queue entries", doomed.len());
        }
        doomed.len()
    }

    /// Remove active and discarded entries along with their files.
    pub fn reclaim_terminal(&mut self) -> usize {
        self.reclaim_where(|e| {
            matches!(e.state, EntryState::BeingProcessed | EntryState::Discarded)
        })
    }

    /// Remove entries marked `Deleted` along with their files.
    pub fn reclaim_deleted(&mut self) -> usize {
        self.reclaim_where(|e| e.state == EntryState::Deleted)
    }

    /// Re-link held/deleted entries into the caller's order.
    ///
    /// The named block is placed where its first member currently sits. Every
    /// other entry keeps its relative position around it. Handles that are
    /// unknown, repeated, or not held/deleted are ignored.
    pub fn reorder(&mut self, order: &[EntryId]) {
        let mut named = Vec::with_capacity(order.len());
        let mut seen = HashSet::new();
        for id in order {
            let eligible = self.entries.get(id).is_some_and(|e| {
                matches!(e.state, EntryState::HeldInQueue | EntryState::Deleted)
            });
            if eligible && seen.insert(*id) {
                named.push(*id);
            }
        }
        if named.is_empty() {
            return;
        }

        let mut old = std::mem::take(&mut self.entries);
        let sequence: Vec<EntryId> = old.keys().copied().collect();
        let mut block_placed = false;

        for id in sequence {
            if seen.contains(&id) {
                if !block_placed {
                    for named_id in &named {
                        if let Some(entry) = old.shift_remove(named_id) {
                            self.entries.insert(*named_id, entry);
                        }
                    }
                    block_placed = true;
                }
            } else if let Some(entry) = old.shift_remove(&id) {
                self.entries.insert(id, entry);
            }
        }
    }

    /// Remove the head entry and its file unconditionally.
    pub fn remove_first(&mut self) -> Option<QueueEntry> {
        let (_, entry) = self.entries.shift_remove_index(0)?;
        self.delete_backing_file(&entry);
        Some(entry)
    }

    /// Remove every entry and file unconditionally.
    pub fn remove_all(&mut self) -> usize {
        let mut removed = 0;
        while self.remove_first().is_some() {
            removed += 1;
        }
        self.more_pending = false;
        removed
    }
}
