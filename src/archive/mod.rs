//! Archive backends
//!
//! A [`ClientData`](crate::ClientData) instance owns an ordered stack of
//! backends. Later entries shadow earlier ones for equal keys; lookups walk
//! the stack newest-first. Backends are not required to be thread-safe on
//! their own — all access is serialized by the owning `ClientData`.

pub mod casc;
pub mod directory;
pub mod mpq;

pub use casc::{CascArchive, CascStore, MemoryStore};
pub use directory::DirectoryArchive;
pub use mpq::MpqArchive;

use std::collections::HashMap;

use crate::filekey::FileKey;
use crate::types::Locale;

/// Opaque handle to a file opened inside one backend.
///
/// Handles are owned by the backend that issued them and are not portable to
/// another backend. They live for a single read sequence (open, size, read,
/// close) and never escape the access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveHandle(u64);

/// Contract every physical archive implementation satisfies.
///
/// Per-operation failures are reported through return values; backends only
/// return errors at construction time.
pub trait ArchiveBackend: Send {
    /// Whether the backend can serve `key`.
    fn exists(&self, key: &FileKey, locale: Locale) -> bool;

    /// Open `key` for reading. `None` means the backend cannot serve it.
    fn open_file(&mut self, key: &FileKey, locale: Locale) -> Option<ArchiveHandle>;

    /// Uncompressed size of an open file. 0 for an unknown handle.
    fn file_size(&self, handle: ArchiveHandle) -> u64;

    /// Read the whole file into `buf`, which the caller has sized to
    /// [`file_size`](Self::file_size).
    fn read_file(&mut self, handle: ArchiveHandle, buf: &mut [u8]) -> bool;

    /// Release an open handle.
    fn close_file(&mut self, handle: ArchiveHandle) -> bool;
}

/// Issues handles and tracks per-backend open-file state.
pub(crate) struct HandleTable<T> {
    next: u64,
    open: HashMap<u64, T>,
}

impl<T> HandleTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            open: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> ArchiveHandle {
        let handle = self.next;
        self.next += 1;
        self.open.insert(handle, value);
        ArchiveHandle(handle)
    }

    pub(crate) fn get(&self, handle: ArchiveHandle) -> Option<&T> {
        self.open.get(&handle.0)
    }

    pub(crate) fn get_mut(&mut self, handle: ArchiveHandle) -> Option<&mut T> {
        self.open.get_mut(&handle.0)
    }

    pub(crate) fn remove(&mut self, handle: ArchiveHandle) -> Option<T> {
        self.open.remove(&handle.0)
    }
}
