//! Archive-agnostic access to game client data
//!
//! This crate reads assets out of MMO client installations regardless of
//! which archive generation ships them: the hash-indexed MPQ archives of
//! classic through Mists clients, or the content-addressed CASC storage of
//! everything newer. Higher-level tools (world editors, viewers, converters)
//! ask for a file by textual path or FileDataID and get bytes back without
//! knowing which physical archive answered.
//!
//! ## Quick start
//!
//! ```no_run
//! use wow_client_data::{ClientData, ClientVersion, FileKey, Locale};
//!
//! # fn example() -> wow_client_data::Result<()> {
//! let client = ClientData::open(
//!     "/games/wotlk",
//!     ClientVersion::Wotlk,
//!     Locale::Auto,
//!     "/projects/my-map",
//! )?;
//!
//! let key = FileKey::from_path("World\\Maps\\Azeroth\\Azeroth.wdt", Some(client.listfile()));
//! let mut buffer = Vec::new();
//! if client.read_file(&key, &mut buffer) {
//!     println!("{} is {} bytes", key, buffer.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Pieces
//!
//! - [`ClientData`] — the façade: discovers and orders the archive stack for
//!   a client generation and serves reads through it, newest archive first.
//! - [`Listfile`] — the path ↔ FileDataID map, bulk-normalized into a single
//!   owned blob.
//! - [`FileKey`] — a lookup key carrying a path, a FileDataID, or both.
//! - [`archive`] — the backend contract and the MPQ, directory and CASC
//!   implementations.

pub mod archive;
pub mod client;
pub mod error;
pub mod filekey;
pub mod listfile;
pub mod paths;
pub mod types;

pub use client::ClientData;
pub use error::{ClientDataError, Result};
pub use filekey::FileKey;
pub use listfile::Listfile;
pub use types::{ClientVersion, LOCALE_CODES, Locale, OpenMode, StorageType};

// Re-export commonly used backend types
pub use archive::{
    ArchiveBackend, ArchiveHandle, CascArchive, CascStore, DirectoryArchive, MemoryStore,
    MpqArchive,
};
