//! The triage session: queue, cursor, directory state, readiness cache and
//! prefetcher owned together by the context that drives the UI.
//!
//! Every mutation goes through `&mut Session`, so "is this identity still
//! in the queue?" and "write the cache" are always one step. Conversion
//! work leaves the session as [`Job`]s (see [`Session::take_jobs`]) and
//! comes back as [`Completion`]s through [`Session::apply`].

use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use super::cache::{CacheEntry, ReadinessCache};
use super::prefetch::{Completion, Job, JobKind, Prefetcher};
use crate::error::{ClassifyError, ConversionError, StartupError};
use crate::raw::convert::{discard, Converter, Preview};
use crate::state::data::{Decision, ItemId, Targets};
use crate::state::queue::Queue;
use crate::state::settings::Settings;
use crate::state::triage::{self, Phase, Triage};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub window: usize,
    pub workers: usize,
    pub skip_unreadable: bool,
    pub extensions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Settings::default().into()
    }
}

impl From<Settings> for PipelineConfig {
    fn from(settings: Settings) -> Self {
        Self {
            window: settings.prefetch_count,
            workers: settings.workers,
            skip_unreadable: settings.skip_unreadable,
            extensions: settings.extensions,
        }
    }
}

/// Everything the UI needs to put the current photo on screen
#[derive(Debug, Clone)]
pub struct Shown {
    pub id: ItemId,
    pub preview: Preview,
    pub captured_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub enum Display {
    Ready(Shown),
    /// A conversion for this item is in flight
    Loading(ItemId),
    /// Conversion failed and automatic skipping is off
    Unreadable { id: ItemId, message: String },
    /// No undecided items left; call `advance_if_drained`
    Drained,
}

#[derive(Debug)]
pub enum Event {
    /// The item on screen has just become ready
    CurrentReady(ItemId),
    /// The item on screen could not be converted and was routed to `skip`.
    /// `moved` is `None` if the move itself failed.
    AutoSkipped {
        id: ItemId,
        error: ConversionError,
        moved: Option<PathBuf>,
        next: Display,
    },
    /// The item on screen could not be converted and stays in the queue
    CurrentFailed { id: ItemId, message: String },
}

#[derive(Debug)]
pub struct Session {
    triage: Triage,
    queue: Queue,
    cache: ReadinessCache,
    prefetcher: Prefetcher,
    outbox: Vec<Job>,
    skip_unreadable: bool,
}

impl Session {
    /// Open `root` and load its RAW files. A missing root is the only
    /// error that ends the workflow.
    pub fn start(
        root: &Path,
        config: PipelineConfig,
        converter: Converter,
    ) -> Result<Self, StartupError> {
        if !root.is_dir() {
            return Err(StartupError::MissingSource(root.to_path_buf()));
        }
        let root = fs::canonicalize(root).map_err(|source| StartupError::Resolve {
            path: root.to_path_buf(),
            source,
        })?;
        info!(
            root = %root.display(),
            decoder = %converter.program().display(),
            window = config.window,
            workers = config.workers,
            "starting triage"
        );

        let mut triage = Triage::new(&root, config.extensions);
        let mut queue = Queue::default();
        triage.settle(&mut queue);

        Ok(Self {
            triage,
            queue,
            cache: ReadinessCache::new(),
            prefetcher: Prefetcher::new(Arc::new(converter), config.window, config.workers),
            outbox: Vec::new(),
            skip_unreadable: config.skip_unreadable,
        })
    }

    pub fn current_identity(&self) -> Option<&ItemId> {
        self.queue.current()
    }

    #[cfg(test)]
    pub fn phase(&self) -> &Phase {
        self.triage.phase()
    }

    pub fn targets(&self) -> &Targets {
        self.triage.targets()
    }

    /// Undecided items from the cursor on, including the current one
    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.queue.cursor())
    }

    #[cfg(test)]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    #[cfg(test)]
    pub fn cache(&self) -> &ReadinessCache {
        &self.cache
    }

    /// What to show for the current item. Starts a direct conversion if
    /// nothing is cached or in flight for it, and tops up the prefetch
    /// window either way.
    pub fn request_display(&mut self) -> Display {
        let Some(id) = self.queue.current().cloned() else {
            return Display::Drained;
        };

        let display = match self.cache.get(&id) {
            Some(CacheEntry::Ready(conversion)) => {
                debug!(item = %id, "used preloaded image");
                Display::Ready(Shown {
                    id: id.clone(),
                    preview: conversion.preview.clone(),
                    captured_at: conversion.captured_at,
                })
            }
            Some(CacheEntry::Pending(..)) => Display::Loading(id.clone()),
            Some(CacheEntry::Failed(err)) => Display::Unreadable {
                id: id.clone(),
                message: err.to_string(),
            },
            None => {
                if let Some(job) = self.prefetcher.load_now(&id, &mut self.cache) {
                    self.outbox.push(job);
                }
                Display::Loading(id.clone())
            }
        };

        self.reschedule();
        display
    }

    /// Move the current item into the target for `decision` and drop it
    /// from the queue. On a move failure nothing changes.
    pub fn classify(&mut self, decision: Decision) -> Result<PathBuf, ClassifyError> {
        let id = self
            .queue
            .current()
            .cloned()
            .ok_or(ClassifyError::NothingToClassify)?;

        info!(file = %id.file_name(), decision = decision.label(), "classifying");
        let target = self.targets().dir_for(decision).to_path_buf();
        let moved = triage::move_into(id.path(), &target).inspect_err(|err| {
            error!(error = %err, "failed to move file");
        })?;

        self.queue.remove_current();
        self.cache.remove_and_clean(&id);
        self.after_queue_change();
        Ok(moved)
    }

    /// If the queue is drained, move on to the next directory (or finish).
    pub fn advance_if_drained(&mut self) -> Phase {
        if self.queue.is_drained() {
            self.triage.settle(&mut self.queue);
            self.after_queue_change();
        }
        self.triage.phase().clone()
    }

    /// Claim prefetch jobs for the window after the cursor
    pub fn reschedule(&mut self) {
        let jobs = self.prefetcher.reschedule(&self.queue, &mut self.cache);
        self.outbox.extend(jobs);
    }

    /// Jobs claimed since the last call. Every job must be run and its
    /// completion applied, or its identity stays `Pending`.
    pub fn take_jobs(&mut self) -> Vec<Job> {
        mem::take(&mut self.outbox)
    }

    /// Fold a finished job back in.
    ///
    /// Results for identities that left the queue, or whose claim was
    /// dropped in the meantime, are discarded and their artifacts deleted.
    pub fn apply(&mut self, completion: Completion) -> Option<Event> {
        let Completion {
            id,
            ticket,
            kind,
            result,
        } = completion;

        if !self.queue.contains(&id) || !self.cache.is_pending(&id, ticket) {
            debug!(item = %id, %ticket, "discarded stale conversion");
            if let Ok(conversion) = result {
                discard(conversion.artifact);
            }
            return None;
        }

        let is_current = self.queue.current() == Some(&id);

        let error = match result {
            Ok(conversion) => {
                debug!(item = %id, ?kind, "conversion ready");
                self.cache.put(id.clone(), CacheEntry::Ready(conversion));
                return is_current.then_some(Event::CurrentReady(id));
            }
            Err(error) => error,
        };

        match kind {
            JobKind::Display if is_current => {
                error!(path = %error.path().display(), error = %error, "error converting image");
                if self.skip_unreadable {
                    Some(self.skip_unreadable_current(id, error))
                } else {
                    let message = error.to_string();
                    self.cache.put(id.clone(), CacheEntry::Failed(error));
                    Some(Event::CurrentFailed { id, message })
                }
            }
            _ => {
                // Leave no entry so the display path can try again
                warn!(path = %error.path().display(), error = %error, "error preloading image");
                self.cache.remove_and_clean(&id);
                if is_current {
                    if let Some(job) = self.prefetcher.load_now(&id, &mut self.cache) {
                        self.outbox.push(job);
                    }
                }
                None
            }
        }
    }

    /// Stop the pool and delete every cached artifact
    pub fn shutdown(&mut self) {
        self.prefetcher.shutdown();
        self.outbox.clear();
        self.cache.clear();
    }

    fn skip_unreadable_current(&mut self, id: ItemId, error: ConversionError) -> Event {
        let skip = self.targets().skip.clone();
        // The item leaves the queue even if the move fails
        let moved = match triage::move_into(id.path(), &skip) {
            Ok(moved) => Some(moved),
            Err(err) => {
                error!(error = %err, "failed to move unreadable file");
                None
            }
        };

        self.queue.remove(&id);
        self.cache.remove_and_clean(&id);
        self.after_queue_change();

        let next = self.request_display();
        Event::AutoSkipped {
            id,
            error,
            moved,
            next,
        }
    }

    fn after_queue_change(&mut self) {
        let queue = &self.queue;
        let evicted = self.cache.evict_if(|id| queue.contains(id));
        if evicted > 0 {
            debug!(evicted, "evicted cache entries");
        }
        self.reschedule();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
