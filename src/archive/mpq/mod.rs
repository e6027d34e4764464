//! MPQ archive backend
//!
//! One base archive plus an optional chain of patch overlays, as the
//! post-Cataclysm clients deliver updates: patch archives store their files
//! under a prefix directory (`base\...` or a locale code) and shadow the
//! base archive newest-first. A delete marker in a patch hides the file
//! entirely.

pub mod crypt;
mod reader;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::archive::{ArchiveBackend, ArchiveHandle, HandleTable};
use crate::error::Result;
use crate::filekey::FileKey;
use crate::listfile::Listfile;
use crate::types::Locale;

use reader::MpqReader;

/// Name of the path list most archives embed.
const LISTFILE_MEMBER: &str = "(listfile)";

pub struct MpqArchive {
    path: PathBuf,
    base: MpqReader,
    patches: Vec<PatchMount>,
    listfile: Arc<Listfile>,
    open_files: HandleTable<Vec<u8>>,
}

struct PatchMount {
    prefix: String,
    path: PathBuf,
    reader: MpqReader,
}

/// Where a lookup landed in the overlay chain.
enum Lookup {
    /// `None` = base archive, `Some(i)` = patch mount `i`; plus the block
    /// index and the name the entry was found under.
    Found(Option<usize>, usize, String),
    /// A patch explicitly deleted the file.
    Deleted,
    Missing,
}

impl MpqArchive {
    pub fn open(path: impl Into<PathBuf>, listfile: Arc<Listfile>) -> Result<Self> {
        let path = path.into();
        let base = MpqReader::open(&path)?;
        debug!("mounted MPQ archive {}", path.display());

        Ok(Self {
            path,
            base,
            patches: Vec::new(),
            listfile,
            open_files: HandleTable::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attach a patch archive on top of this one. `prefix` is the directory
    /// the patch stores its files under (`"base"` for common archives, the
    /// locale code for locale archives). Later patches shadow earlier ones.
    pub fn add_patch(&mut self, path: impl Into<PathBuf>, prefix: &str) -> Result<()> {
        let path = path.into();
        let reader = MpqReader::open(&path)?;
        debug!(
            "attached patch {} (prefix {prefix}) to {}",
            path.display(),
            self.path.display()
        );

        self.patches.push(PatchMount {
            prefix: prefix.to_owned(),
            path,
            reader,
        });
        Ok(())
    }

    /// The embedded `(listfile)` of the base archive, if it has one.
    pub fn embedded_listfile(&mut self) -> Option<Vec<u8>> {
        let block_index = self.base.find(LISTFILE_MEMBER)?;
        if self.base.block(block_index).is_deleted() {
            return None;
        }
        match self.base.read(LISTFILE_MEMBER, block_index) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("failed to read (listfile) from {}: {e}", self.path.display());
                None
            }
        }
    }

    /// The archive-internal name for a key, from its path component or from
    /// the shared listfile.
    fn resolve_name(&self, key: &FileKey) -> Option<String> {
        if let Some(path) = key.path() {
            return Some(path.to_owned());
        }
        if key.has_fdid() {
            let path = self.listfile.get_path(key.fdid());
            if !path.is_empty() {
                return Some(path.to_owned());
            }
        }
        None
    }

    fn locate(&self, name: &str) -> Lookup {
        for (i, mount) in self.patches.iter().enumerate().rev() {
            let patched = format!("{}\\{}", mount.prefix, name);
            let Some(block_index) = mount.reader.find(&patched) else {
                continue;
            };

            let block = mount.reader.block(block_index);
            if block.is_deleted() {
                return Lookup::Deleted;
            }
            if block.is_patch_file() {
                // Incremental patch entries need the base file applied;
                // fall through to the older data instead of serving them.
                warn!(
                    "skipping incremental patch entry {patched} in {}",
                    mount.path.display()
                );
                continue;
            }
            return Lookup::Found(Some(i), block_index, patched);
        }

        match self.base.find(name) {
            Some(block_index) if !self.base.block(block_index).is_deleted() => {
                Lookup::Found(None, block_index, name.to_owned())
            }
            _ => Lookup::Missing,
        }
    }
}

impl ArchiveBackend for MpqArchive {
    fn exists(&self, key: &FileKey, _locale: Locale) -> bool {
        let Some(name) = self.resolve_name(key) else {
            return false;
        };
        matches!(self.locate(&name), Lookup::Found(..))
    }

    fn open_file(&mut self, key: &FileKey, _locale: Locale) -> Option<ArchiveHandle> {
        let name = self.resolve_name(key)?;

        let (mount, block_index, found_name) = match self.locate(&name) {
            Lookup::Found(mount, block_index, found_name) => (mount, block_index, found_name),
            Lookup::Deleted | Lookup::Missing => return None,
        };

        let reader = match mount {
            Some(i) => &mut self.patches[i].reader,
            None => &mut self.base,
        };

        match reader.read(&found_name, block_index) {
            Ok(data) => Some(self.open_files.insert(data)),
            Err(e) => {
                warn!("failed to read {found_name} from {}: {e}", self.path.display());
                None
            }
        }
    }

    fn file_size(&self, handle: ArchiveHandle) -> u64 {
        self.open_files.get(handle).map_or(0, |data| data.len() as u64)
    }

    fn read_file(&mut self, handle: ArchiveHandle, buf: &mut [u8]) -> bool {
        let Some(data) = self.open_files.get(handle) else {
            return false;
        };
        if buf.len() != data.len() {
            return false;
        }
        buf.copy_from_slice(data);
        true
    }

    fn close_file(&mut self, handle: ArchiveHandle) -> bool {
        self.open_files.remove(handle).is_some()
    }
}
