//! Directory-backed archive
//!
//! A plain directory mounted into the archive stack, used for project
//! mirrors and extracted data that should override archive contents. Files
//! are expected on disk under their internal-form relative paths (lowercase,
//! forward slashes).

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::archive::{ArchiveBackend, ArchiveHandle, HandleTable};
use crate::filekey::FileKey;
use crate::listfile::Listfile;
use crate::types::Locale;

pub struct DirectoryArchive {
    root: PathBuf,
    listfile: Arc<Listfile>,
    open_files: HandleTable<OpenFile>,
}

struct OpenFile {
    file: File,
    size: u64,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>, listfile: Arc<Listfile>) -> Self {
        let root = root.into();
        debug!("mounted directory archive at {}", root.display());
        Self {
            root,
            listfile,
            open_files: HandleTable::new(),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Resolve a key to an on-disk location. ID-only keys go through the
    /// shared listfile.
    fn resolve(&self, key: &FileKey) -> Option<PathBuf> {
        if let Some(path) = key.path() {
            return Some(self.root.join(path));
        }
        if key.has_fdid() {
            let path = self.listfile.get_path(key.fdid());
            if !path.is_empty() {
                return Some(self.root.join(path));
            }
        }
        None
    }
}

impl ArchiveBackend for DirectoryArchive {
    fn exists(&self, key: &FileKey, _locale: Locale) -> bool {
        self.resolve(key).is_some_and(|path| path.is_file())
    }

    fn open_file(&mut self, key: &FileKey, _locale: Locale) -> Option<ArchiveHandle> {
        let path = self.resolve(key)?;
        let file = File::open(&path).ok()?;
        let size = file.metadata().ok()?.len();

        debug!("opened {} ({size} bytes)", path.display());
        Some(self.open_files.insert(OpenFile { file, size }))
    }

    fn file_size(&self, handle: ArchiveHandle) -> u64 {
        self.open_files.get(handle).map_or(0, |open| open.size)
    }

    fn read_file(&mut self, handle: ArchiveHandle, buf: &mut [u8]) -> bool {
        let Some(open) = self.open_files.get_mut(handle) else {
            return false;
        };
        open.file.read_exact(buf).is_ok()
    }

    fn close_file(&mut self, handle: ArchiveHandle) -> bool {
        self.open_files.remove(handle).is_some()
    }
}
