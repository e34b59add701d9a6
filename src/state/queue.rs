use std::collections::HashSet;

use super::data::ItemId;

/// The ordered list of undecided files in the active directory, plus the
/// cursor pointing at the one under review.
///
/// Order is fixed when the directory is loaded and only changes through
/// removals. The cursor always denotes "the next undecided item": removing
/// the item at the cursor leaves the cursor where it is (the list shifts
/// left under it), removing an earlier item moves it back by one.
#[derive(Debug, Default)]
pub struct Queue {
    items: Vec<ItemId>,
    live: HashSet<ItemId>,
    cursor: usize,
}

impl Queue {
    #[cfg(test)]
    pub fn new(items: impl IntoIterator<Item = ItemId>) -> Self {
        let mut queue = Self::default();
        queue.replace(items);
        queue
    }

    /// Swap in the contents of a freshly loaded directory.
    /// Duplicates are dropped, keeping the first occurrence.
    pub fn replace(&mut self, items: impl IntoIterator<Item = ItemId>) {
        self.items.clear();
        self.live.clear();
        self.cursor = 0;

        for item in items {
            if self.live.insert(item.clone()) {
                self.items.push(item);
            }
        }
    }

    pub fn current(&self) -> Option<&ItemId> {
        self.items.get(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True once the cursor has run off the end
    pub fn is_drained(&self) -> bool {
        self.cursor >= self.items.len()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.live.contains(id)
    }

    /// Up to `count` items strictly after the cursor
    pub fn window(&self, count: usize) -> &[ItemId] {
        let start = (self.cursor + 1).min(self.items.len());
        let end = start.saturating_add(count).min(self.items.len());
        &self.items[start..end]
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.items.iter()
    }

    /// Remove the item under review; the cursor now points at its successor.
    pub fn remove_current(&mut self) -> Option<ItemId> {
        if self.is_drained() {
            return None;
        }
        let removed = self.items.remove(self.cursor);
        self.live.remove(&removed);
        Some(removed)
    }

    /// Remove an arbitrary item, re-clamping the cursor so nothing is
    /// skipped or shown twice. Returns the index it occupied.
    pub fn remove(&mut self, id: &ItemId) -> Option<usize> {
        if !self.live.remove(id) {
            return None;
        }
        let index = self.items.iter().position(|item| item == id)?;
        self.items.remove(index);

        if index < self.cursor {
            self.cursor -= 1;
        }
        self.cursor = self.cursor.min(self.items.len());

        Some(index)
    }
}
