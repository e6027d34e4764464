//! File keys: path, FileDataID, or both
//!
//! Every lookup in the access layer goes through a [`FileKey`]. MPQ-era
//! archives only understand paths, CASC-era storage prefers FileDataIDs, and
//! callers may hold either; a key carries whichever components it has and the
//! missing one can be deduced from a [`Listfile`].

use std::fmt;

use crate::listfile::Listfile;
use crate::paths;

/// A reference to one client asset by path, FileDataID, or both.
///
/// FileDataID 0 is the sentinel for "absent". Paths are stored in internal
/// form (lowercase, forward slashes, `.mdx`/`.mdl` unified to `.m2`). A
/// default-constructed key has neither component and is only useful as a
/// placeholder.
#[derive(Debug, Clone, Default)]
pub struct FileKey {
    fdid: u32,
    path: Option<String>,
}

impl FileKey {
    /// Key from a textual path, normalized to internal form. If a listfile is
    /// given, the FileDataID is deduced from it when known.
    pub fn from_path(path: impl AsRef<str>, listfile: Option<&Listfile>) -> Self {
        let mut key = Self {
            fdid: 0,
            path: Some(paths::normalize_internal(path.as_ref())),
        };
        if let Some(listfile) = listfile {
            key.deduce_other(listfile);
        }
        key
    }

    /// Key from a FileDataID. If a listfile is given, the path is deduced
    /// from it when known.
    pub fn from_fdid(fdid: u32, listfile: Option<&Listfile>) -> Self {
        let mut key = Self { fdid, path: None };
        if let Some(listfile) = listfile {
            key.deduce_other(listfile);
        }
        key
    }

    /// Key carrying both components verbatim (the path is still normalized).
    /// No deduction is attempted.
    pub fn from_both(path: impl AsRef<str>, fdid: u32) -> Self {
        Self {
            fdid,
            path: Some(paths::normalize_internal(path.as_ref())),
        }
    }

    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }

    pub fn has_fdid(&self) -> bool {
        self.fdid != 0
    }

    /// The path component in internal form, if present.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The FileDataID component; 0 means absent.
    pub fn fdid(&self) -> u32 {
        self.fdid
    }

    pub fn set_path(&mut self, path: impl AsRef<str>) {
        self.path = Some(paths::normalize_internal(path.as_ref()));
    }

    pub fn set_fdid(&mut self, fdid: u32) {
        self.fdid = fdid;
    }

    /// Fill in the missing component from the listfile.
    ///
    /// Returns `true` if a component was filled in. Never overwrites a
    /// component that is already present; a key with both or with neither
    /// returns `false`.
    pub fn deduce_other(&mut self, listfile: &Listfile) -> bool {
        if self.has_fdid() && !self.has_path() {
            let path = listfile.get_path(self.fdid);
            if path.is_empty() {
                return false;
            }
            self.path = Some(path.to_owned());
            true
        } else if self.has_path() && !self.has_fdid() {
            let fdid = listfile.get_fdid(self.path.as_deref().unwrap_or_default());
            if fdid == 0 {
                return false;
            }
            self.fdid = fdid;
            true
        } else {
            false
        }
    }
}

/// Keys compare by FileDataID when both sides have one, otherwise by path
/// when both sides have one, otherwise they are unequal.
///
/// Deliberately not an equivalence relation: a path-only key and an ID-only
/// key never compare equal even when they would resolve to the same asset.
/// Deduce both sides first when structural equality is wanted. For the same
/// reason this type implements neither `Eq` nor `Ord`.
impl PartialEq for FileKey {
    fn eq(&self, other: &Self) -> bool {
        if self.has_fdid() && other.has_fdid() {
            self.fdid == other.fdid
        } else if self.has_path() && other.has_path() {
            self.path == other.path
        } else {
            false
        }
    }
}

impl PartialOrd for FileKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.has_fdid() && other.has_fdid() {
            self.fdid.partial_cmp(&other.fdid)
        } else if self.has_path() && other.has_path() {
            self.path.partial_cmp(&other.path)
        } else {
            None
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => f.write_str(path),
            None => write!(f, "{}", self.fdid),
        }
    }
}
