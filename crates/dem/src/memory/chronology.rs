//! Chronological order of the occupied slots of one memory

use crate::ids::EntryIndex;

/// Occupied slots, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chronology {
    order: Vec<EntryIndex>,
}

impl Chronology {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            order: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert as newest entry
    pub fn push_newest(&mut self, index: EntryIndex) {
        self.remove(index);
        self.order.push(index);
    }

    pub fn remove(&mut self, index: EntryIndex) -> bool {
        match self.order.iter().position(|i| *i == index) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = EntryIndex> + '_ {
        self.order.iter().copied()
    }

    /// Rebuild from `(slot, timestamp)` pairs, e.g. after NV restore
    pub fn rebuild<I>(&mut self, slots: I)
    where
        I: IntoIterator<Item = (EntryIndex, u32)>,
    {
        let mut slots: Vec<(EntryIndex, u32)> = slots.into_iter().collect();
        slots.sort_by_key(|(index, timestamp)| (*timestamp, *index));
        self.order = slots.into_iter().map(|(index, _)| index).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_refresh() {
        let mut chrono = Chronology::with_capacity(3);
        chrono.push_newest(EntryIndex(2));
        chrono.push_newest(EntryIndex(0));
        chrono.push_newest(EntryIndex(1));
        assert_eq!(chrono.iter().next(), Some(EntryIndex(2)));

        chrono.push_newest(EntryIndex(2));
        assert_eq!(chrono.iter().collect::<Vec<_>>(), vec![EntryIndex(0), EntryIndex(1), EntryIndex(2)]);
        assert_eq!(chrono.len(), 3);
    }

    #[test]
    fn test_rebuild_sorts_by_timestamp() {
        let mut chrono = Chronology::default();
        chrono.rebuild([(EntryIndex(0), 30), (EntryIndex(1), 10), (EntryIndex(2), 20)]);
        assert_eq!(chrono.iter().collect::<Vec<_>>(), vec![EntryIndex(1), EntryIndex(2), EntryIndex(0)]);
        assert!(chrono.remove(EntryIndex(2)));
        assert!(!chrono.remove(EntryIndex(2)));
        assert_eq!(chrono.iter().collect::<Vec<_>>(), vec![EntryIndex(1), EntryIndex(0)]);
    }
}
