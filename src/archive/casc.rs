//! CASC archive backend
//!
//! The CASC-era client keeps its data in content-addressed local storage
//! described by a `.build.info` file at the installation root. This backend
//! owns the installation-level concerns — build metadata, open mode, CDN
//! cache location, FileDataID completion through the listfile — and
//! delegates content resolution to a [`CascStore`], the narrow interface the
//! physical storage driver implements. An in-memory store is provided for
//! tools and tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::archive::{ArchiveBackend, ArchiveHandle, HandleTable};
use crate::error::{ClientDataError, Result};
use crate::filekey::FileKey;
use crate::listfile::Listfile;
use crate::paths;
use crate::types::{Locale, OpenMode};

/// Content resolution interface of the CASC storage driver.
///
/// The driver behind this trait is responsible for everything
/// content-addressed: indices, manifests, decompression, CDN fetches. The
/// access layer only asks whether a key resolves and for its bytes.
pub trait CascStore: Send {
    fn contains(&self, key: &FileKey, locale: Locale) -> bool;

    fn read(&self, key: &FileKey, locale: Locale) -> Option<Vec<u8>>;
}

/// In-memory [`CascStore`], keyed by FileDataID and/or internal-form path.
#[derive(Default)]
pub struct MemoryStore {
    by_fdid: HashMap<u32, Vec<u8>>,
    by_path: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_fdid(&mut self, fdid: u32, data: impl Into<Vec<u8>>) {
        self.by_fdid.insert(fdid, data.into());
    }

    pub fn insert_path(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        self.by_path
            .insert(paths::normalize_internal(path), data.into());
    }
}

impl CascStore for MemoryStore {
    fn contains(&self, key: &FileKey, _locale: Locale) -> bool {
        (key.has_fdid() && self.by_fdid.contains_key(&key.fdid()))
            || key.path().is_some_and(|p| self.by_path.contains_key(p))
    }

    fn read(&self, key: &FileKey, _locale: Locale) -> Option<Vec<u8>> {
        if key.has_fdid()
            && let Some(data) = self.by_fdid.get(&key.fdid())
        {
            return Some(data.clone());
        }
        key.path().and_then(|p| self.by_path.get(p)).cloned()
    }
}

/// Parsed `.build.info`: a pipe-separated table whose header row carries
/// `Name!TYPE:len` column declarations.
#[derive(Debug)]
pub struct BuildInfo {
    fields: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl BuildInfo {
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|line| !line.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| ClientDataError::BuildInfo("file is empty".into()))?;
        let fields: Vec<String> = header
            .split('|')
            .map(|field| {
                field
                    .split('!')
                    .next()
                    .unwrap_or(field)
                    .trim()
                    .to_owned()
            })
            .collect();

        let mut rows = Vec::new();
        for line in lines {
            let row: Vec<String> = line.split('|').map(str::to_owned).collect();
            if row.len() != fields.len() {
                warn!(
                    ".build.info row has {} fields, header declares {}; skipping",
                    row.len(),
                    fields.len()
                );
                continue;
            }
            rows.push(row);
        }

        Ok(Self { fields, rows })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn get(&self, row: usize, field: &str) -> Option<&str> {
        let index = self.fields.iter().position(|f| f == field)?;
        self.rows.get(row).map(|r| r[index].as_str())
    }

    /// Index of the active row (`Active == 1`). Installations normally have
    /// exactly one.
    pub fn active_row(&self) -> Option<usize> {
        (0..self.rows.len()).find(|&row| self.get(row, "Active") == Some("1"))
    }

    pub fn version(&self) -> Option<&str> {
        self.get(self.active_row()?, "Version")
    }

    pub fn product(&self) -> Option<&str> {
        self.get(self.active_row()?, "Product")
    }
}

pub struct CascArchive {
    storage_path: PathBuf,
    build_info: BuildInfo,
    cdn_cache_path: Option<PathBuf>,
    open_mode: OpenMode,
    listfile: Arc<Listfile>,
    store: Option<Box<dyn CascStore>>,
    open_files: HandleTable<Vec<u8>>,
}

impl std::fmt::Debug for CascArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascArchive")
            .field("storage_path", &self.storage_path)
            .field("build_info", &self.build_info)
            .field("cdn_cache_path", &self.cdn_cache_path)
            .field("open_mode", &self.open_mode)
            .finish_non_exhaustive()
    }
}

impl CascArchive {
    /// Open the storage rooted at `storage_path` (the directory containing
    /// `.build.info`). Remote mode requires a CDN cache path; the store is
    /// the driver that resolves content, `None` meaning no content is
    /// resolvable through this backend.
    pub fn open(
        storage_path: impl Into<PathBuf>,
        cdn_cache_path: Option<PathBuf>,
        open_mode: OpenMode,
        listfile: Arc<Listfile>,
        store: Option<Box<dyn CascStore>>,
    ) -> Result<Self> {
        let storage_path = storage_path.into();
        debug_assert!(open_mode == OpenMode::Local || cdn_cache_path.is_some());

        let info_path = storage_path.join(".build.info");
        if !info_path.is_file() {
            return Err(ClientDataError::ArchiveOpen(format!(
                "no .build.info in {}",
                storage_path.display()
            )));
        }
        let build_info = BuildInfo::from_path(&info_path)?;

        info!(
            "mounted CASC storage {} (product {}, version {})",
            storage_path.display(),
            build_info.product().unwrap_or("unknown"),
            build_info.version().unwrap_or("unknown"),
        );

        Ok(Self {
            storage_path,
            build_info,
            cdn_cache_path,
            open_mode,
            listfile,
            store,
            open_files: HandleTable::new(),
        })
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn build_info(&self) -> &BuildInfo {
        &self.build_info
    }

    pub fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    pub fn cdn_cache_path(&self) -> Option<&Path> {
        self.cdn_cache_path.as_deref()
    }

    /// Keys may arrive with only one component; give the store both when the
    /// listfile knows the other.
    fn complete_key(&self, key: &FileKey) -> FileKey {
        let mut completed = key.clone();
        completed.deduce_other(&self.listfile);
        completed
    }
}

impl ArchiveBackend for CascArchive {
    fn exists(&self, key: &FileKey, locale: Locale) -> bool {
        let Some(store) = self.store.as_deref() else {
            return false;
        };
        store.contains(&self.complete_key(key), locale)
    }

    fn open_file(&mut self, key: &FileKey, locale: Locale) -> Option<ArchiveHandle> {
        let completed = self.complete_key(key);
        let data = self.store.as_deref()?.read(&completed, locale)?;

        debug!("resolved {completed} ({} bytes)", data.len());
        Some(self.open_files.insert(data))
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BUILD_INFO: &str = "\
Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|Version!STRING:0|Product!STRING:0
eu|0|1b2c3d4e5f60718293a4b5c6d7e8f901|aabbccddeeff00112233445566778899|9.2.7.45338|wow
us|1|0123456789abcdef0123456789abcdef|ffeeddccbbaa99887766554433221100|9.2.7.45745|wow
";

    #[test]
    fn build_info_selects_the_active_row() {
        let info = BuildInfo::parse(BUILD_INFO).unwrap();
        assert_eq!(info.row_count(), 2);
        assert_eq!(info.active_row(), Some(1));
        assert_eq!(info.version(), Some("9.2.7.45745"));
        assert_eq!(info.product(), Some("wow"));
    }

    #[test]
    fn build_info_rejects_empty_input() {
        assert!(matches!(
            BuildInfo::parse("\n\n"),
            Err(ClientDataError::BuildInfo(_))
        ));
    }

    #[test]
    fn open_requires_build_info() {
        let dir = tempfile::tempdir().unwrap();
        let listfile = Arc::new(Listfile::new());

        let err = CascArchive::open(dir.path(), None, OpenMode::Local, listfile.clone(), None)
            .unwrap_err();
        assert!(matches!(err, ClientDataError::ArchiveOpen(_)));

        std::fs::write(dir.path().join(".build.info"), BUILD_INFO).unwrap();
        let archive =
            CascArchive::open(dir.path(), None, OpenMode::Local, listfile, None).unwrap();
        assert_eq!(archive.build_info().version(), Some("9.2.7.45745"));
    }

    #[test]
    fn memory_store_serves_and_completes_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".build.info"), BUILD_INFO).unwrap();

        let listfile = Arc::new(Listfile::new());
        let mut csv = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut csv, b"77;interface/icons/icon.blp\n").unwrap();
        listfile.init_from_csv(csv.path()).unwrap();

        let mut store = MemoryStore::new();
        store.insert_fdid(77, b"pixels".to_vec());

        let mut archive = CascArchive::open(
            dir.path(),
            None,
            OpenMode::Local,
            listfile,
            Some(Box::new(store)),
        )
        .unwrap();

        // The store only knows the id; a path key resolves through the
        // listfile completion.
        let by_path = FileKey::from_path("Interface\\Icons\\Icon.blp", None);
        assert!(archive.exists(&by_path, Locale::EnUs));

        let handle = archive.open_file(&by_path, Locale::EnUs).unwrap();
        let mut buf = vec![0u8; archive.file_size(handle) as usize];
        assert!(archive.read_file(handle, &mut buf));
        assert_eq!(buf, b"pixels");
        assert!(archive.close_file(handle));
    }

    #[test]
    fn storeless_archive_serves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".build.info"), BUILD_INFO).unwrap();

        let listfile = Arc::new(Listfile::new());
        let mut archive =
            CascArchive::open(dir.path(), None, OpenMode::Local, listfile, None).unwrap();

        let key = FileKey::from_fdid(1, None);
        assert!(!archive.exists(&key, Locale::EnUs));
        assert!(archive.open_file(&key, Locale::EnUs).is_none());
    }
}
