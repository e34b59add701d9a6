//! Error taxonomy for the triage workflow.
//!
//! Only `StartupError` ends the process. Conversion failures are recovered
//! locally (auto-skip or retry-by-omission), metadata failures never leave
//! `raw::metadata`, and move failures are shown to the user.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;

/// Failure to turn a RAW source into a displayable preview.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("decoder `{program}` could not be started for {path}: {source}")]
    Unavailable {
        program: PathBuf,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("decoder exited with {status} for {path}")]
    Exit { path: PathBuf, status: ExitStatus },
    #[error("failed to write preview artifact for {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("decoder output for {path} is not a readable image: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("conversion worker for {path} stopped before finishing")]
    Worker { path: PathBuf },
}

impl ConversionError {
    /// The RAW source the failed conversion was working on.
    pub fn path(&self) -> &Path {
        match self {
            ConversionError::Unavailable { path, .. }
            | ConversionError::Exit { path, .. }
            | ConversionError::Artifact { path, .. }
            | ConversionError::Decode { path, .. }
            | ConversionError::Worker { path } => path,
        }
    }
}

/// Moving a source file into its target directory failed.
#[derive(Debug, Error)]
#[error("failed to move {path} into {target}: {source}")]
pub struct MoveError {
    pub path: PathBuf,
    pub target: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("could not read metadata: {0}")]
    Io(#[from] io::Error),
    #[error("could not parse EXIF: {0}")]
    Exif(#[from] exif::Error),
    #[error("capture time tag holds an unusable value")]
    Malformed,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("there is no image to classify")]
    NothingToClassify,
    #[error(transparent)]
    Move(#[from] MoveError),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not determine the configuration directory")]
    NoConfigDir,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no source directory was selected")]
    NoSelection,
    #[error("source directory {0} does not exist")]
    MissingSource(PathBuf),
    #[error("could not resolve source directory {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("user interface failed: {0}")]
    Ui(#[from] iced::Error),
}
