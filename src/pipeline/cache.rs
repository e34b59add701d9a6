use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::ConversionError;
use crate::raw::convert::{discard, Conversion};
use crate::state::data::ItemId;

/// Identifies one dispatched conversion job. A completion is accepted only
/// while its identity is still `Pending` with the same ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub(crate) u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Set when a pending claim is dropped before its job ran, so the job
/// can give up its worker slot instead of decoding a file nobody needs.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub enum CacheEntry {
    /// A conversion job is in flight
    Pending(Ticket, Cancel),
    /// Preview, artifact and capture time are available
    Ready(Conversion),
    /// The display conversion failed and is not retried automatically
    Failed(ConversionError),
}

impl CacheEntry {
    pub fn is_ready(&self) -> bool {
        matches!(self, CacheEntry::Ready(_))
    }

    /// Drop the entry, deleting its artifact if it has one
    fn release(self) {
        match self {
            CacheEntry::Pending(_, cancel) => cancel.cancel(),
            CacheEntry::Ready(conversion) => discard(conversion.artifact),
            CacheEntry::Failed(_) => {}
        }
    }
}

/// Completed (and in-flight) conversions keyed by identity.
///
/// The cache is the sole owner of every artifact it holds: replacing or
/// removing an entry deletes the old file, so an identity never has more
/// than one artifact on disk. It is owned by the session and mutated only
/// through `&mut self`; workers hand results back instead of writing here.
#[derive(Debug, Default)]
pub struct ReadinessCache {
    entries: HashMap<ItemId, CacheEntry>,
}

impl ReadinessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ItemId) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    #[cfg(test)]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.entries.contains_key(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.entries.keys()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or overwrite; a superseded artifact is deleted first
    pub fn put(&mut self, id: ItemId, entry: CacheEntry) {
        debug!(item = %id, ready = entry.is_ready(), "cache put");
        if let Some(old) = self.entries.insert(id, entry) {
            old.release();
        }
    }

    /// Claim `id` for a new job. Fails if anything (pending, ready or
    /// failed) is already recorded for it, which is what keeps a single
    /// conversion in flight per identity. The returned flag is raised
    /// when the claim is evicted or superseded.
    pub fn mark_pending(&mut self, id: &ItemId, ticket: Ticket) -> Option<Cancel> {
        if self.entries.contains_key(id) {
            return None;
        }
        let cancel = Cancel::default();
        self.entries.insert(id.clone(), CacheEntry::Pending(ticket, cancel.clone()));
        Some(cancel)
    }

    pub fn is_pending(&self, id: &ItemId, ticket: Ticket) -> bool {
        matches!(self.entries.get(id), Some(CacheEntry::Pending(t, _)) if *t == ticket)
    }

    /// Evict every entry whose identity fails `is_live`, deleting artifacts.
    /// Returns how many were evicted.
    pub fn evict_if(&mut self, mut is_live: impl FnMut(&ItemId) -> bool) -> usize {
        let dead: Vec<ItemId> = self
            .entries
            .keys()
            .filter(|id| !is_live(*id))
            .cloned()
            .collect();

        for id in &dead {
            if let Some(entry) = self.entries.remove(id) {
                debug!(item = %id, "cache evict");
                entry.release();
            }
        }
        dead.len()
    }

    /// Evict one identity immediately, e.g. right after it was classified
    pub fn remove_and_clean(&mut self, id: &ItemId) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                debug!(item = %id, "cache remove");
                entry.release();
                true
            }
            None => false,
        }
    }

    /// Release everything (shutdown)
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.release();
        }
    }
}

impl Drop for ReadinessCache {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::convert::Preview;
    use image::RgbaImage;
    use std::path::PathBuf;

    fn conversion() -> (Conversion, PathBuf) {
        let artifact = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let path = artifact.to_path_buf();
        let conversion = Conversion {
            preview: Preview::new(RgbaImage::new(2, 2)),
            artifact,
            captured_at: None,
        };
        (conversion, path)
    }

    fn id(name: &str) -> ItemId {
        ItemId::new(format!("/src/{name}"))
    }

    #[test]
    fn test_put_supersedes_and_deletes_old_artifact() {
        let mut cache = ReadinessCache::new();
        let (first, first_path) = conversion();
        let (second, second_path) = conversion();

        cache.put(id("A"), CacheEntry::Ready(first));
        cache.put(id("A"), CacheEntry::Ready(second));

        assert!(!first_path.exists());
        assert!(second_path.exists());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_mark_pending_only_once() {
        let mut cache = ReadinessCache::new();

        assert!(cache.mark_pending(&id("A"), Ticket(1)).is_some());
        assert!(cache.mark_pending(&id("A"), Ticket(2)).is_none());
        assert!(cache.is_pending(&id("A"), Ticket(1)));
        assert!(!cache.is_pending(&id("A"), Ticket(2)));

        let (ready, _) = conversion();
        cache.put(id("B"), CacheEntry::Ready(ready));
        assert!(cache.mark_pending(&id("B"), Ticket(3)).is_none());
    }

    #[test]
    fn test_evict_if_cleans_dead_entries() {
        let mut cache = ReadinessCache::new();
        let (a, a_path) = conversion();
        let (b, b_path) = conversion();
        cache.put(id("A"), CacheEntry::Ready(a));
        cache.put(id("B"), CacheEntry::Ready(b));
        cache.mark_pending(&id("C"), Ticket(1));

        let evicted = cache.evict_if(|item| *item == id("B"));

        assert_eq!(evicted, 2);
        assert!(!a_path.exists());
        assert!(b_path.exists());
        assert!(!cache.contains(&id("C")));
    }

    #[test]
    fn test_dropping_a_claim_cancels_it() {
        let mut cache = ReadinessCache::new();
        let evicted = cache.mark_pending(&id("A"), Ticket(1)).unwrap();
        let removed = cache.mark_pending(&id("B"), Ticket(2)).unwrap();
        let kept = cache.mark_pending(&id("C"), Ticket(3)).unwrap();

        cache.evict_if(|item| *item != id("A"));
        cache.remove_and_clean(&id("B"));

        assert!(evicted.is_cancelled());
        assert!(removed.is_cancelled());
        assert!(!kept.is_cancelled());

        cache.clear();
        assert!(kept.is_cancelled());
    }

    #[test]
    fn test_remove_and_clean() {
        let mut cache = ReadinessCache::new();
        let (a, a_path) = conversion();
        cache.put(id("A"), CacheEntry::Ready(a));

        assert!(cache.remove_and_clean(&id("A")));
        assert!(!a_path.exists());
        assert!(!cache.remove_and_clean(&id("A")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_drop_releases_artifacts() {
        let (a, a_path) = conversion();
        {
            let mut cache = ReadinessCache::new();
            cache.put(id("A"), CacheEntry::Ready(a));
        }
        assert!(!a_path.exists());
    }
}
