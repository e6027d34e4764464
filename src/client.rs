//! Archive-agnostic client data façade
//!
//! `ClientData` discovers and mounts the archives of a client installation
//! according to its generation, shares one listfile with every backend, and
//! serves reads through a single coarse lock. Callers ask for assets by
//! [`FileKey`] and never learn which physical archive answered.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::archive::{ArchiveBackend, CascArchive, CascStore, DirectoryArchive, MpqArchive};
use crate::error::{ClientDataError, Result};
use crate::filekey::FileKey;
use crate::listfile::Listfile;
use crate::paths;
use crate::types::{ClientVersion, LOCALE_CODES, Locale, OpenMode, StorageType};

/// Archive templates in mount order for classic through WotLK clients.
/// `{locale}` expands to the resolved locale code, `{number}` to the digits
/// 2..=9 and `{character}` to a..=z, one candidate per substitution.
const PRE_CATA_ARCHIVE_TEMPLATES: [&str; 29] = [
    // common archives
    "art.MPQ",
    "alternate.MPQ",
    "common.MPQ",
    "common-2.MPQ",
    "dbc.MPQ",
    "expansion.MPQ",
    "expansion{number}.MPQ",
    "fonts.MPQ",
    "interface.MPQ",
    "itemtexture.MPQ",
    "lichking.MPQ",
    "misc.MPQ",
    "model.MPQ",
    "terrain.MPQ",
    "texture.MPQ",
    "wmo.MPQ",
    "world.MPQ",
    "world2.MPQ",
    "patch.MPQ",
    "patch-{number}.MPQ",
    "patch-{character}.MPQ",
    // locale archives
    "{locale}/expansion-locale-{locale}.MPQ",
    "{locale}/expansion{number}-locale-{locale}.MPQ",
    "{locale}/locale-{locale}.MPQ",
    "{locale}/lichking-locale-{locale}.MPQ",
    "{locale}/patch-{locale}.MPQ",
    "{locale}/patch-{locale}-{number}.MPQ",
    "{locale}/patch-{locale}-{character}.MPQ",
    "development.MPQ",
];

/// Archive templates for Cataclysm and Mists clients. Only the first
/// candidate that loads becomes a backend; every later one is attached to it
/// as a patch overlay. `{patch}` expands to the build numbers found on disk,
/// in ascending order.
const POST_CATA_ARCHIVE_TEMPLATES: [&str; 11] = [
    "misc.MPQ",
    "texture.MPQ",
    "itemtexture.MPQ",
    "model.MPQ",
    "world.MPQ",
    "world2.MPQ",
    "interface.MPQ",
    "expansion{number}.MPQ",
    "{locale}/expansion{number}-locale-{locale}.MPQ",
    "wow-update-base-{patch}.MPQ",
    "{locale}/wow-update-{locale}-{patch}.MPQ",
];

/// Top-level access to the data of one client installation.
///
/// The archive stack is immutable after construction; all archive-touching
/// operations serialize on one mutex, so independent readers on multiple
/// threads always observe the same contents for the same key.
pub struct ClientData {
    version: ClientVersion,
    storage_type: StorageType,
    open_mode: OpenMode,
    locale: Locale,
    path: PathBuf,
    project_path: PathBuf,
    listfile: Arc<Listfile>,
    archives: Mutex<Vec<Box<dyn ArchiveBackend>>>,
}

impl std::fmt::Debug for ClientData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientData")
            .field("version", &self.version)
            .field("storage_type", &self.storage_type)
            .field("open_mode", &self.open_mode)
            .field("locale", &self.locale)
            .field("path", &self.path)
            .field("project_path", &self.project_path)
            .finish_non_exhaustive()
    }
}

impl ClientData {
    /// Open a local installation.
    ///
    /// `path` is the game directory for MPQ-era clients, or the storage
    /// directory containing `.build.info` for CASC-era clients. The project
    /// directory holds the disk mirror and, for CASC-era clients, the
    /// `listfile.csv`. `Locale::Auto` is only valid for MPQ-era clients.
    pub fn open(
        path: impl Into<PathBuf>,
        version: ClientVersion,
        locale: Locale,
        project_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::init(
            path.into(),
            None,
            OpenMode::Local,
            version,
            locale,
            project_path.into(),
            None,
        )
    }

    /// Open a CDN-backed installation, caching fetched content under
    /// `cdn_cache_path`. Only CASC-era clients support remote loading.
    pub fn open_remote(
        path: impl Into<PathBuf>,
        cdn_cache_path: impl Into<PathBuf>,
        version: ClientVersion,
        locale: Locale,
        project_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::init(
            path.into(),
            Some(cdn_cache_path.into()),
            OpenMode::Remote,
            version,
            locale,
            project_path.into(),
            None,
        )
    }

    /// Open a local CASC installation with a caller-supplied storage driver.
    pub fn open_with_store(
        path: impl Into<PathBuf>,
        version: ClientVersion,
        locale: Locale,
        project_path: impl Into<PathBuf>,
        store: Box<dyn CascStore>,
    ) -> Result<Self> {
        Self::init(
            path.into(),
            None,
            OpenMode::Local,
            version,
            locale,
            project_path.into(),
            Some(store),
        )
    }

    fn init(
        path: PathBuf,
        cdn_cache_path: Option<PathBuf>,
        open_mode: OpenMode,
        version: ClientVersion,
        locale: Locale,
        project_path: PathBuf,
        store: Option<Box<dyn CascStore>>,
    ) -> Result<Self> {
        let storage_type = version.storage_type();
        let project_path = PathBuf::from(paths::normalize_unix(&project_path.to_string_lossy()));

        if storage_type == StorageType::Mpq && open_mode == OpenMode::Remote {
            return Err(ClientDataError::ArchiveOpen(
                "MPQ storage does not support remote loading".into(),
            ));
        }

        let locale = resolve_locale(&path, storage_type, locale)?;
        let listfile = Arc::new(Listfile::new());

        let archives = match storage_type {
            StorageType::Mpq if version.uses_patch_overlays() => {
                init_mpq_post_cata(&path, locale, &project_path, &listfile)?
            }
            StorageType::Mpq => init_mpq_pre_cata(&path, locale, &project_path, &listfile)?,
            StorageType::Casc => init_casc(
                &path,
                cdn_cache_path,
                open_mode,
                &project_path,
                &listfile,
                store,
            )?,
        };

        info!(
            "opened {storage_type:?} client at {} ({} archives, locale {locale})",
            path.display(),
            archives.len(),
        );

        Ok(Self {
            version,
            storage_type,
            open_mode,
            locale,
            path,
            project_path,
            listfile,
            archives: Mutex::new(archives),
        })
    }

    pub fn version(&self) -> ClientVersion {
        self.version
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    /// The resolved locale; never `Auto`.
    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn listfile(&self) -> &Listfile {
        &self.listfile
    }

    /// Read the file for `key` into `buffer`, resizing it to the exact file
    /// size. Archives are consulted newest-first; the first that can open
    /// the key serves it. On `false` the buffer contents are unspecified.
    pub fn read_file(&self, key: &FileKey, buffer: &mut Vec<u8>) -> bool {
        let mut archives = self.archives.lock();

        for backend in archives.iter_mut().rev() {
            let Some(handle) = backend.open_file(key, self.locale) else {
                continue;
            };

            let size = backend.file_size(handle);
            buffer.resize(size as usize, 0);

            let read_ok = backend.read_file(handle, buffer);
            debug_assert!(read_ok, "read failed after successful open");
            let close_ok = backend.close_file(handle);
            debug_assert!(close_ok, "close failed after successful open");

            return true;
        }

        false
    }

    /// Whether `key` resolves anywhere: the disk mirror first (mirrored
    /// files override archives), then the archive stack newest-first.
    pub fn exists(&self, key: &FileKey) -> bool {
        if self.exists_on_disk(key) {
            return true;
        }

        let archives = self.archives.lock();
        archives
            .iter()
            .rev()
            .any(|backend| backend.exists(key, self.locale))
    }

    /// Whether the mirrored location for `key` exists on disk. Keys without
    /// a path component cannot resolve a disk location and report `false`.
    pub fn exists_on_disk(&self, key: &FileKey) -> bool {
        if !key.has_path() {
            return false;
        }
        self.disk_path(key).exists()
    }

    /// The location under the project directory that mirrors `key`. ID-only
    /// keys resolve through the listfile, or under `unknown_files/<id>` when
    /// the listfile does not know them.
    pub fn disk_path(&self, key: &FileKey) -> PathBuf {
        let _lock = self.archives.lock();

        if let Some(path) = key.path() {
            return self.project_path.join(paths::normalize_unix(path));
        }

        debug_assert!(key.has_fdid(), "disk path queried for an empty key");
        let path = self.listfile.get_path(key.fdid());
        if path.is_empty() {
            self.project_path
                .join("unknown_files")
                .join(key.fdid().to_string())
        } else {
            self.project_path.join(paths::normalize_unix(path))
        }
    }
}

impl Drop for ClientData {
    fn drop(&mut self) {
        // Unmount newest-first, the reverse of construction order.
        let archives = self.archives.get_mut();
        while archives.pop().is_some() {}
    }
}

fn resolve_locale(path: &Path, storage_type: StorageType, locale: Locale) -> Result<Locale> {
    match storage_type {
        StorageType::Casc => {
            if locale == Locale::Auto {
                return Err(ClientDataError::IncorrectLocaleMode(
                    "automatic locale detection is not supported for CASC-based clients".into(),
                ));
            }
            Ok(locale)
        }
        StorageType::Mpq => match locale.code() {
            Some(code) => {
                if !path.join("Data").join(code).exists() {
                    return Err(ClientDataError::LocaleNotFound(format!(
                        "requested locale \"{code}\" does not exist in the client directory"
                    )));
                }
                Ok(locale)
            }
            None => detect_mpq_locale(path),
        },
    }
}

/// Automatic locale detection for MPQ-era clients: first locale directory
/// containing `realmlist.wtf`, then the locale named in `WTF/Config.wtf`.
fn detect_mpq_locale(path: &Path) -> Result<Locale> {
    for code in LOCALE_CODES {
        if path.join("Data").join(code).join("realmlist.wtf").exists()
            && let Some(locale) = Locale::from_code(code)
        {
            debug!("detected locale {locale} from realmlist.wtf");
            return Ok(locale);
        }
    }

    let config_path = path.join("WTF").join("Config.wtf");
    if let Ok(config) = std::fs::read_to_string(&config_path) {
        // Tokens like `"enUS"`: drop the first character, take four.
        for token in config.split_whitespace() {
            if let Some(candidate) = token.get(1..5)
                && let Some(locale) = Locale::from_code(candidate)
            {
                debug!("detected locale {locale} from Config.wtf");
                return Ok(locale);
            }
        }
    }

    Err(ClientDataError::LocaleNotFound(
        "automatic locale detection failed; no locale directory contains realmlist.wtf".into(),
    ))
}

fn init_mpq_pre_cata(
    path: &Path,
    locale: Locale,
    project_path: &Path,
    listfile: &Arc<Listfile>,
) -> Result<Vec<Box<dyn ArchiveBackend>>> {
    let data_dir = path.join("Data");
    let locale_code = locale.code().unwrap_or_default();
    let mut archives: Vec<Box<dyn ArchiveBackend>> = Vec::new();

    for template in PRE_CATA_ARCHIVE_TEMPLATES {
        for candidate in expand_candidates(template, locale_code, &data_dir) {
            if !candidate.exists() || is_same_location(&candidate, project_path) {
                continue;
            }

            if candidate.is_dir() {
                archives.push(Box::new(DirectoryArchive::new(
                    candidate.as_path(),
                    listfile.clone(),
                )));
            } else {
                let mut archive = MpqArchive::open(&candidate, listfile.clone())?;
                bootstrap_embedded_listfile(&mut archive, listfile);
                archives.push(Box::new(archive));
            }
        }
    }

    Ok(archives)
}

fn init_mpq_post_cata(
    path: &Path,
    locale: Locale,
    project_path: &Path,
    listfile: &Arc<Listfile>,
) -> Result<Vec<Box<dyn ArchiveBackend>>> {
    let data_dir = path.join("Data");
    let locale_code = locale.code().unwrap_or_default();
    let mut archives: Vec<Box<dyn ArchiveBackend>> = Vec::new();
    let mut base: Option<MpqArchive> = None;

    for template in POST_CATA_ARCHIVE_TEMPLATES {
        let prefix = if template.contains("{locale}") {
            locale_code
        } else {
            "base"
        };

        for candidate in expand_candidates(template, locale_code, &data_dir) {
            if !candidate.exists() || is_same_location(&candidate, project_path) {
                continue;
            }

            // Directories cannot take patch overlays; mount them standalone.
            if candidate.is_dir() {
                archives.push(Box::new(DirectoryArchive::new(
                    candidate.as_path(),
                    listfile.clone(),
                )));
                continue;
            }

            match base.as_mut() {
                None => {
                    let mut archive = MpqArchive::open(&candidate, listfile.clone())?;
                    bootstrap_embedded_listfile(&mut archive, listfile);
                    base = Some(archive);
                }
                Some(base) => base.add_patch(&candidate, prefix)?,
            }
        }
    }

    if let Some(base) = base {
        archives.push(Box::new(base));
    }
    Ok(archives)
}

fn init_casc(
    path: &Path,
    cdn_cache_path: Option<PathBuf>,
    open_mode: OpenMode,
    project_path: &Path,
    listfile: &Arc<Listfile>,
    store: Option<Box<dyn CascStore>>,
) -> Result<Vec<Box<dyn ArchiveBackend>>> {
    listfile.init_from_csv(project_path.join("listfile.csv"))?;

    let archive = CascArchive::open(path, cdn_cache_path, open_mode, listfile.clone(), store)?;
    Ok(vec![Box::new(archive)])
}

/// MPQ-era clients ship the listfile inside their archives; the first one
/// that carries a `(listfile)` member initializes the shared instance.
fn bootstrap_embedded_listfile(archive: &mut MpqArchive, listfile: &Arc<Listfile>) {
    if listfile.is_initialized() {
        return;
    }
    if let Some(data) = archive.embedded_listfile() {
        listfile.init_from_file_list(data);
    }
}

/// Expand one template into candidate archive paths, in mount order.
fn expand_candidates(template: &str, locale_code: &str, data_dir: &Path) -> Vec<PathBuf> {
    let filled = template.replace("{locale}", locale_code);

    if filled.contains("{number}") {
        ('2'..='9')
            .map(|digit| data_dir.join(filled.replace("{number}", &digit.to_string())))
            .collect()
    } else if filled.contains("{character}") {
        ('a'..='z')
            .map(|ch| data_dir.join(filled.replace("{character}", &ch.to_string())))
            .collect()
    } else if filled.contains("{patch}") {
        expand_patch_candidates(&filled, data_dir)
    } else {
        vec![data_dir.join(filled)]
    }
}

/// `{patch}` stands for a client build number; enumerate the matching files
/// on disk and order them by build so newer updates mount later.
fn expand_patch_candidates(filled: &str, data_dir: &Path) -> Vec<PathBuf> {
    let rel = Path::new(filled);
    let dir = match rel.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => data_dir.join(parent),
        _ => data_dir.to_path_buf(),
    };
    let Some(file_template) = rel.file_name().and_then(|name| name.to_str()) else {
        return Vec::new();
    };
    let Some((prefix, suffix)) = file_template.split_once("{patch}") else {
        return vec![data_dir.join(filled)];
    };

    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut builds: Vec<(u32, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.len() <= prefix.len() + suffix.len() {
            continue;
        }

        let bytes = name.as_bytes();
        let (head, rest) = bytes.split_at(prefix.len());
        let (middle, tail) = rest.split_at(rest.len() - suffix.len());
        if !head.eq_ignore_ascii_case(prefix.as_bytes())
            || !tail.eq_ignore_ascii_case(suffix.as_bytes())
        {
            continue;
        }

        if let Ok(build) = std::str::from_utf8(middle).unwrap_or("").parse::<u32>() {
            builds.push((build, entry.path()));
        }
    }

    builds.sort_unstable_by_key(|(build, _)| *build);
    builds.into_iter().map(|(_, path)| path).collect()
}

/// Whether two paths point at the same location on disk, as far as the
/// filesystem can tell. Used to keep the project mirror out of the stack.
fn is_same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_expansion() {
        let data = Path::new("/client/Data");

        let plain = expand_candidates("misc.MPQ", "enUS", data);
        assert_eq!(plain, vec![PathBuf::from("/client/Data/misc.MPQ")]);

        let numbered = expand_candidates("expansion{number}.MPQ", "enUS", data);
        assert_eq!(numbered.len(), 8);
        assert_eq!(numbered[0], PathBuf::from("/client/Data/expansion2.MPQ"));
        assert_eq!(numbered[7], PathBuf::from("/client/Data/expansion9.MPQ"));

        let lettered = expand_candidates("patch-{character}.MPQ", "enUS", data);
        assert_eq!(lettered.len(), 26);
        assert_eq!(lettered[0], PathBuf::from("/client/Data/patch-a.MPQ"));
        assert_eq!(lettered[25], PathBuf::from("/client/Data/patch-z.MPQ"));

        let localized = expand_candidates("{locale}/locale-{locale}.MPQ", "deDE", data);
        assert_eq!(localized, vec![PathBuf::from("/client/Data/deDE/locale-deDE.MPQ")]);
    }

    #[test]
    fn patch_expansion_orders_by_build() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path();
        for name in [
            "wow-update-base-13329.MPQ",
            "wow-update-base-13164.MPQ",
            "wow-update-base-13205.MPQ",
            "wow-update-base-junk.MPQ",
            "unrelated.MPQ",
        ] {
            std::fs::write(data.join(name), b"").unwrap();
        }

        let candidates = expand_candidates("wow-update-base-{patch}.MPQ", "enUS", data);
        let names: Vec<_> = candidates
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "wow-update-base-13164.MPQ",
                "wow-update-base-13205.MPQ",
                "wow-update-base-13329.MPQ",
            ]
        );
    }

    #[test]
    fn config_wtf_locale_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("WTF")).unwrap();
        std::fs::write(
            dir.path().join("WTF/Config.wtf"),
            "SET textLocale \"ruRU\"\nSET gxResolution \"1920x1080\"\n",
        )
        .unwrap();

        let locale = detect_mpq_locale(dir.path()).unwrap();
        assert_eq!(locale, Locale::RuRu);
    }

    #[test]
    fn realmlist_locale_detection_precedes_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Data/deDE")).unwrap();
        std::fs::write(dir.path().join("Data/deDE/realmlist.wtf"), b"").unwrap();
        std::fs::create_dir_all(dir.path().join("WTF")).unwrap();
        std::fs::write(dir.path().join("WTF/Config.wtf"), "SET locale \"ruRU\"\n").unwrap();

        assert_eq!(detect_mpq_locale(dir.path()).unwrap(), Locale::DeDe);
    }

    #[test]
    fn detection_failure_is_locale_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            detect_mpq_locale(dir.path()),
            Err(ClientDataError::LocaleNotFound(_))
        ));
    }
}
