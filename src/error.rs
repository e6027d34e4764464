//! Error types for client data access

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientDataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Listfile not found at {0}")]
    ListfileNotFound(PathBuf),

    #[error("Locale not found: {0}")]
    LocaleNotFound(String),

    #[error("Incorrect locale mode: {0}")]
    IncorrectLocaleMode(String),

    #[error("Failed to open archive: {0}")]
    ArchiveOpen(String),

    #[error("Invalid MPQ format: {0}")]
    MpqFormat(String),

    #[error("Unsupported MPQ feature: {0}")]
    MpqUnsupported(String),

    #[error("Invalid .build.info: {0}")]
    BuildInfo(String),
}

pub type Result<T> = std::result::Result<T, ClientDataError>;
