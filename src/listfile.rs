//! Path ↔ FileDataID listfile
//!
//! The listfile maps between textual asset paths and the client's numeric
//! FileDataIDs. It ships either as a CSV artifact next to the project
//! (`<id>;<path>` lines, CASC-era) or embedded as a bare path list inside the
//! first MPQ archive (MPQ-era).
//!
//! The whole file is normalized in place inside a single owned blob
//! (lowercase, forward slashes, line terminators turned into NUL record
//! separators) and both lookup maps borrow their strings straight out of that
//! blob, so a path obtained from one map is pointer-identical to the key of
//! the other.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::error::{ClientDataError, Result};

/// Blob allocations are padded up to this so the normalization sweep can
/// work in whole 16-byte chunks without a remainder loop.
const BLOB_CHUNK: usize = 16;

/// Bi-directional path ↔ FileDataID map over a single normalized text blob.
///
/// A `Listfile` starts empty and is initialized exactly once, from a CSV file
/// or from a raw path list. Backends share it by reference before it is
/// initialized (the MPQ-era listfile only becomes available once the first
/// archive is open), so initialization goes through a [`OnceLock`]; lookups
/// against an uninitialized listfile simply miss.
pub struct Listfile {
    inner: OnceLock<ListfileIndex>,
}

struct ListfileIndex {
    path_to_fdid: HashMap<&'static str, u32>,
    fdid_to_path: HashMap<u32, &'static str>,
    // The maps above borrow from this allocation; they are declared first so
    // they drop first. The blob is never touched again once the maps exist.
    _blob: Box<[u8]>,
}

impl Listfile {
    pub fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Whether one of the `init_*` calls has populated this listfile.
    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Initialize from a CSV listfile of `<decimal id>;<path>` lines.
    ///
    /// If the listfile was already initialized the call is a no-op; the first
    /// initialization wins, mirroring the per-record duplicate rule.
    pub fn init_from_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ClientDataError::ListfileNotFound(path.to_path_buf()),
            _ => ClientDataError::Io(e),
        })?;

        let count = self.init_blob(raw, true);
        debug!("loaded listfile from {}: {count} entries", path.display());
        Ok(())
    }

    /// Initialize from a raw `\n`-separated path list, e.g. the `(listfile)`
    /// member embedded in an MPQ archive. Records carry no IDs; every path
    /// maps to 0 and the listfile acts as a membership set.
    ///
    /// Takes the buffer by value; it becomes the backing blob.
    pub fn init_from_file_list(&self, data: Vec<u8>) {
        let count = self.init_blob(data, false);
        debug!("loaded embedded listfile: {count} entries");
    }

    /// The FileDataID mapped to `path`, or 0 if absent.
    ///
    /// `path` must already be in internal form (lowercase, forward slashes);
    /// lookups do not re-normalize.
    pub fn get_fdid(&self, path: &str) -> u32 {
        self.inner
            .get()
            .and_then(|ix| ix.path_to_fdid.get(path).copied())
            .unwrap_or(0)
    }

    /// The path mapped to `fdid`, or an empty string if absent.
    pub fn get_path(&self, fdid: u32) -> &str {
        self.inner
            .get()
            .and_then(|ix| ix.fdid_to_path.get(&fdid).copied())
            .unwrap_or("")
    }

    /// Number of known paths.
    pub fn len(&self) -> usize {
        self.inner.get().map_or(0, |ix| ix.path_to_fdid.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over all `(fdid, path)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> {
        self.inner
            .get()
            .into_iter()
            .flat_map(|ix| ix.fdid_to_path.iter().map(|(&fdid, &path)| (fdid, path)))
    }

    /// Normalize, split and index `raw`. Returns the number of entries kept.
    fn init_blob(&self, raw: Vec<u8>, csv: bool) -> usize {
        let data_len = raw.len();
        let padded_len = data_len.div_ceil(BLOB_CHUNK) * BLOB_CHUNK;

        let mut blob = raw;
        blob.resize(padded_len, 0);
        let mut blob = blob.into_boxed_slice();

        normalize_in_place(&mut blob);

        // Pre-count records off the NUL separators so the collections start
        // at final size.
        let record_count = blob[..data_len].iter().filter(|&&b| b == 0).count();
        let mut records: Vec<(Option<Range<usize>>, Range<usize>)> =
            Vec::with_capacity(record_count);

        split_records(&mut blob, data_len, csv, &mut records);

        // SAFETY: the blob is boxed and never mutated, grown or freed until
        // the maps referencing it are dropped (`ListfileIndex` drops the maps
        // first). Slices handed out through the public API are re-bound to
        // the lifetime of `&self`.
        let bytes: &'static [u8] =
            unsafe { std::slice::from_raw_parts(blob.as_ptr(), blob.len()) };

        let mut path_to_fdid: HashMap<&'static str, u32> =
            HashMap::with_capacity(records.len());
        let mut fdid_to_path: HashMap<u32, &'static str> =
            HashMap::with_capacity(if csv { records.len() } else { 0 });

        for (id_range, path_range) in records {
            let fdid = id_range.map_or(0, |r| parse_fdid(&bytes[r]));

            let Ok(path) = std::str::from_utf8(&bytes[path_range]) else {
                warn!("listfile path is not valid UTF-8, skipping record");
                continue;
            };

            // First writer wins on duplicate paths.
            if path.is_empty() || path_to_fdid.contains_key(path) {
                continue;
            }
            path_to_fdid.insert(path, fdid);
            if csv {
                fdid_to_path.entry(fdid).or_insert(path);
            }
        }

        let count = path_to_fdid.len();
        let index = ListfileIndex {
            path_to_fdid,
            fdid_to_path,
            _blob: blob,
        };

        if self.inner.set(index).is_err() {
            debug!("listfile already initialized, keeping existing contents");
            return self.len();
        }

        count
    }
}

impl Default for Listfile {
    fn default() -> Self {
        Self::new()
    }
}

/// Bulk-normalize the blob: ASCII uppercase to lowercase, `\` to `/`, CR/LF
/// to NUL. Every other byte passes through untouched, including non-ASCII.
///
/// Works in fixed 16-byte chunks of branch-free selects so the loop lowers
/// to vector compare/blend instructions; the blob length is padded to a
/// multiple of the chunk size and the tail is zero, which all three
/// transforms map to zero again, so the sweep is idempotent over the padding.
fn normalize_in_place(blob: &mut [u8]) {
    debug_assert_eq!(blob.len() % BLOB_CHUNK, 0);

    for chunk in blob.chunks_exact_mut(BLOB_CHUNK) {
        for b in chunk {
            let c = *b;
            let c = c + (c.is_ascii_uppercase() as u8) * 32;
            let c = if c == b'\\' { b'/' } else { c };
            let c = if c == b'\r' || c == b'\n' { 0 } else { c };
            *b = c;
        }
    }
}

/// Walk the normalized blob splitting it into records.
///
/// Two cursors: `current` marks the start of the record, `forward` scans. In
/// CSV mode the last `;` of the record is overwritten with NUL so the blob
/// ends up holding two NUL-terminated substrings per record (ID text and
/// path), and the pushed ranges never include separators. Runs of NULs
/// (CRLF endings, blank lines) are skipped in one step.
fn split_records(
    blob: &mut [u8],
    data_len: usize,
    csv: bool,
    records: &mut Vec<(Option<Range<usize>>, Range<usize>)>,
) {
    let mut current = 0usize;
    let mut semicolon: Option<usize> = None;
    let mut forward = 0usize;

    while forward < data_len {
        match blob[forward] {
            b';' if csv => semicolon = Some(forward),
            0 => {
                if csv {
                    if let Some(semi) = semicolon {
                        blob[semi] = 0;
                        records.push((Some(current..semi), semi + 1..forward));
                    } else if forward > current {
                        warn!("listfile record without field separator, skipping");
                    }
                } else if forward > current {
                    records.push((None, current..forward));
                }

                semicolon = None;
                while forward < data_len && blob[forward] == 0 {
                    forward += 1;
                }
                current = forward;
                continue;
            }
            _ => {}
        }
        forward += 1;
    }
}

/// Decimal conversion of the leading digit run; anything else yields 0.
fn parse_fdid(text: &[u8]) -> u32 {
    let mut value: u64 = 0;
    for &b in text {
        if !b.is_ascii_digit() {
            break;
        }
        value = value * 10 + u64::from(b - b'0');
        if value > u64::from(u32::MAX) {
            return 0;
        }
    }
    value as u32
}
