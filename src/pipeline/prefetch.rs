//! Prefetch scheduling over a bounded conversion pool.
//!
//! Scheduling is synchronous and runs on the owning context: it claims an
//! identity in the cache (`Pending`) before handing out a [`Job`], so no
//! identity ever has two conversions in flight. Jobs themselves are plain
//! futures; whoever drives the session spawns them and passes each
//! [`Completion`] back to [`Session::apply`](super::session::Session::apply).

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use super::cache::{Cancel, ReadinessCache, Ticket};
use crate::error::ConversionError;
use crate::raw::convert::{Conversion, Converter};
use crate::state::data::ItemId;
use crate::state::queue::Queue;

/// Number of images after the current one converted ahead of time
pub const DEFAULT_WINDOW: usize = 10;
/// Concurrent decoder processes for prefetching
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Look-ahead conversion; waits for a pool slot
    Prefetch,
    /// The item on screen has nothing cached; runs immediately
    Display,
}

/// A claimed conversion, ready to be spawned
#[derive(Debug)]
pub struct Job {
    id: ItemId,
    ticket: Ticket,
    kind: JobKind,
    converter: Arc<Converter>,
    permits: Option<Arc<Semaphore>>,
    cancel: Cancel,
}

/// What a finished job hands back to the session
#[derive(Debug)]
pub struct Completion {
    pub id: ItemId,
    pub ticket: Ticket,
    pub kind: JobKind,
    pub result: Result<Conversion, ConversionError>,
}

impl Job {
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub async fn run(self) -> Completion {
        let result = self.execute().await;
        Completion {
            id: self.id,
            ticket: self.ticket,
            kind: self.kind,
            result,
        }
    }

    async fn execute(&self) -> Result<Conversion, ConversionError> {
        let stopped = || ConversionError::Worker {
            path: self.id.path().to_path_buf(),
        };

        // Held until the conversion is done; a closed pool means shutdown
        let _permit = match &self.permits {
            Some(permits) => Some(permits.clone().acquire_owned().await.map_err(|_| stopped())?),
            None => None,
        };
        if self.cancel.is_cancelled() {
            debug!(item = %self.id, ticket = %self.ticket, "claim dropped before conversion");
            return Err(stopped());
        }

        // Spawn blocking because the decoder process and image decode are slow
        let converter = self.converter.clone();
        let source = self.id.path().to_path_buf();
        tokio::task::spawn_blocking(move || converter.convert(&source))
            .await
            .map_err(|_| stopped())?
    }
}

#[derive(Debug)]
pub struct Prefetcher {
    converter: Arc<Converter>,
    permits: Arc<Semaphore>,
    window: usize,
    last_ticket: u64,
}

impl Prefetcher {
    pub fn new(converter: Arc<Converter>, window: usize, workers: usize) -> Self {
        Self {
            converter,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            window,
            last_ticket: 0,
        }
    }

    /// Claim and return jobs for every item in the window after the
    /// cursor that has nothing cached or in flight. Calling it again with
    /// an unchanged queue returns nothing.
    pub fn reschedule(&mut self, queue: &Queue, cache: &mut ReadinessCache) -> Vec<Job> {
        let jobs: Vec<Job> = queue
            .window(self.window)
            .iter()
            .filter_map(|id| self.claim(id, JobKind::Prefetch, cache))
            .collect();

        if !jobs.is_empty() {
            debug!(count = jobs.len(), cursor = queue.cursor(), "scheduled prefetch");
        }
        jobs
    }

    /// Job for the item on screen, unless something is already recorded
    /// for it (in which case the caller waits for that instead)
    pub fn load_now(&mut self, id: &ItemId, cache: &mut ReadinessCache) -> Option<Job> {
        self.claim(id, JobKind::Display, cache)
    }

    /// Stop handing out pool slots. Queued prefetch jobs then finish with
    /// `ConversionError::Worker`; running decoder processes are not killed.
    /// Jobs whose claim was dropped while they waited finish the same way.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    fn claim(&mut self, id: &ItemId, kind: JobKind, cache: &mut ReadinessCache) -> Option<Job> {
        let ticket = Ticket(self.last_ticket + 1);
        let cancel = cache.mark_pending(id, ticket)?;
        self.last_ticket = ticket.0;

        debug!(item = %id, %ticket, ?kind, "claimed conversion");
        Some(Job {
            id: id.clone(),
            ticket,
            kind,
            converter: self.converter.clone(),
            permits: match kind {
                JobKind::Prefetch => Some(self.permits.clone()),
                JobKind::Display => None,
            },
            cancel,
        })
    }
}
