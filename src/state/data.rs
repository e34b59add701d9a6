/// Shared data structures for the triage workflow
///
/// These types flow between the directory state machine, the readiness
/// pipeline and the UI layer.
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identity of a RAW source file: its absolute path.
///
/// File names alone are not enough because the overflow directory can
/// hold a file with the same name as one in the primary directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(PathBuf);

impl ItemId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Full path to the RAW file
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Filename only (e.g., "DSC_0001.NEF")
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// The user's verdict on a single photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Keep,
    Skip,
    Maybe,
}

impl Decision {
    pub const ALL: [Decision; 3] = [Decision::Keep, Decision::Skip, Decision::Maybe];

    /// Name of the target directory, also used in the UI
    pub fn label(self) -> &'static str {
        match self {
            Decision::Keep => "keep",
            Decision::Skip => "skip",
            Decision::Maybe => "maybe",
        }
    }

    /// Keyboard shortcut
    pub fn shortcut(self) -> char {
        match self {
            Decision::Keep => 'k',
            Decision::Skip => 's',
            Decision::Maybe => 'm',
        }
    }

    pub fn from_shortcut(key: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|decision| decision.shortcut() == key.to_ascii_lowercase())
    }
}

/// The three directories classified files are moved into.
///
/// They live inside the chosen source directory and are created the first
/// time a file is moved into them. `maybe` doubles as the overflow
/// directory that is triaged again once the source directory is drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    pub keep: PathBuf,
    pub skip: PathBuf,
    pub maybe: PathBuf,
}

impl Targets {
    pub fn under(root: &Path) -> Self {
        Self {
            keep: root.join(Decision::Keep.label()),
            skip: root.join(Decision::Skip.label()),
            maybe: root.join(Decision::Maybe.label()),
        }
    }

    pub fn dir_for(&self, decision: Decision) -> &Path {
        match decision {
            Decision::Keep => &self.keep,
            Decision::Skip => &self.skip,
            Decision::Maybe => &self.maybe,
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.keep, &self.skip, &self.maybe]
    }

    /// The overflow directory re-processed after the primary one
    pub fn overflow(&self) -> &Path {
        &self.maybe
    }
}
