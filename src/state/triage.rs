//! Directory state machine: which directory is being triaged, where
//! classified files go, and what happens when a directory runs dry.
//!
//! ```text
//! Loading(dir) -> Active -> Draining -> Loading(maybe) | Finished
//! ```
//!
//! The primary directory is triaged first, then the `maybe` overflow
//! directory. A directory is never loaded twice.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::data::{ItemId, Targets};
use super::queue::Queue;
use crate::error::MoveError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// About to list the given directory
    Loading(PathBuf),
    /// The queue holds undecided items
    Active,
    /// The queue ran dry, the next directory has not been picked yet
    Draining,
    /// Every directory is processed; terminal
    Finished,
}

#[derive(Debug)]
pub struct Triage {
    targets: Targets,
    extensions: Vec<String>,
    active: Option<PathBuf>,
    processed: Vec<PathBuf>,
    phase: Phase,
}

impl Triage {
    /// Start in `Loading(root)`; nothing touches the disk until `settle`.
    pub fn new(root: &Path, extensions: Vec<String>) -> Self {
        Self {
            targets: Targets::under(root),
            extensions,
            active: None,
            processed: Vec::new(),
            phase: Phase::Loading(root.to_path_buf()),
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// The directory the queue was last loaded from
    #[cfg(test)]
    pub fn active_dir(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    /// Directories that have been fully drained, in order
    #[cfg(test)]
    pub fn processed(&self) -> &[PathBuf] {
        &self.processed
    }

    /// Run transitions until the machine is `Active` with a non-drained
    /// queue or `Finished`. Loading a directory replaces the queue.
    pub fn settle(&mut self, queue: &mut Queue) -> &Phase {
        loop {
            let next = match &self.phase {
                Phase::Loading(dir) => {
                    let dir = dir.clone();
                    self.load(dir, queue)
                }
                Phase::Active if queue.is_drained() => Phase::Draining,
                Phase::Active | Phase::Finished => break,
                Phase::Draining => {
                    let dir = self.active.clone().unwrap_or_default();
                    info!(directory = %dir.display(), "directory drained");
                    self.processed.push(dir.clone());
                    self.after(&dir)
                }
            };

            if next == Phase::Finished {
                self.finish();
            }
            self.phase = next;
        }

        &self.phase
    }

    fn load(&mut self, dir: PathBuf, queue: &mut Queue) -> Phase {
        if self.processed.contains(&dir) {
            debug!(directory = %dir.display(), "directory already processed");
            return Phase::Finished;
        }

        info!(directory = %dir.display(), "processing directory");
        let items = list_sources(&dir, &self.extensions);
        self.active = Some(dir.clone());

        if items.is_empty() {
            info!(directory = %dir.display(), "no RAW files found");
            queue.replace(Vec::new());
            self.processed.push(dir.clone());
            return self.after(&dir);
        }

        info!(directory = %dir.display(), count = items.len(), "loaded RAW files");
        queue.replace(items);
        Phase::Active
    }

    /// Where to go once `dir` is exhausted
    fn after(&self, dir: &Path) -> Phase {
        let overflow = self.targets.overflow();
        if dir == overflow || self.processed.iter().any(|done| done == overflow) {
            Phase::Finished
        } else {
            Phase::Loading(overflow.to_path_buf())
        }
    }

    fn finish(&self) {
        for dir in self.targets.all() {
            remove_if_empty(dir);
        }
        info!(keep = %self.targets.keep.display(), "all images have been processed");
    }
}

/// List the RAW files directly inside `dir`, sorted by file name.
/// A missing or unreadable directory lists as empty.
pub fn list_sources(dir: &Path, extensions: &[String]) -> Vec<ItemId> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_raw_file(entry.path(), extensions))
        .map(|entry| ItemId::new(entry.into_path()))
        .collect()
}

pub fn is_raw_file(path: &Path, extensions: &[String]) -> bool {
    let Some(extension) = path.extension() else {
        return false;
    };
    let ext = extension.to_string_lossy();
    extensions.iter().any(|known| known.eq_ignore_ascii_case(&ext))
}

/// Move `path` into `target`, creating the directory on first use and
/// overwriting a file of the same name. Returns the new location.
pub fn move_into(path: &Path, target: &Path) -> Result<PathBuf, MoveError> {
    let fail = |source: io::Error| MoveError {
        path: path.to_path_buf(),
        target: target.to_path_buf(),
        source,
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| fail(io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")))?;
    let destination = target.join(file_name);

    // Re-deciding a file that already sits in its target
    if path.parent() == Some(target) {
        return Ok(destination);
    }

    fs::create_dir_all(target).map_err(fail)?;

    if let Err(err) = fs::rename(path, &destination) {
        // Rename cannot cross filesystems; fall back to copy + delete
        debug!(path = %path.display(), error = %err, "rename failed, copying instead");
        fs::copy(path, &destination)
            .and_then(|_| fs::remove_file(path))
            .map_err(fail)?;
    }

    info!(
        file = %file_name.to_string_lossy(),
        target = %target.display(),
        "moved"
    );
    Ok(destination)
}

fn remove_if_empty(dir: &Path) {
    let is_empty = match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => return,
    };
    if !is_empty {
        return;
    }

    match fs::remove_dir(dir) {
        Ok(()) => debug!(directory = %dir.display(), "deleted empty directory"),
        Err(err) => warn!(directory = %dir.display(), error = %err, "failed to delete directory"),
    }
}
