//! File-descriptor arena with free-list reuse.

/// First fd handed out by the VFS. Values below are reserved for the
/// process's standard streams and always invalid here.
pub const FIRST_FILE_DESCRIPTOR: i32 = 3;

/// Growable slot arena mapping fds to open-file state.
///
/// `fd = slot index + FIRST_FILE_DESCRIPTOR`. Closed slots go onto an
/// explicit free list and are reused; a live slot is never handed out
/// twice.
pub struct FdTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Default for FdTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FdTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Insert an entry and return its fd.
    pub fn add(&mut self, entry: T) -> i32 {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        slot as i32 + FIRST_FILE_DESCRIPTOR
    }

    fn slot_of(&self, fd: i32) -> Option<usize> {
        if fd < FIRST_FILE_DESCRIPTOR {
            return None;
        }
        let slot = (fd - FIRST_FILE_DESCRIPTOR) as usize;
        if slot < self.slots.len() { Some(slot) } else { None }
    }

    /// Look up an open entry.
    pub fn get(&self, fd: i32) -> Option<&T> {
        self.slot_of(fd).and_then(|slot| self.slots[slot].as_ref())
    }

    /// Remove an entry, freeing its slot for reuse.
    pub fn remove(&mut self, fd: i32) -> Option<T> {
        let slot = self.slot_of(fd)?;
        let entry = self.slots[slot].take();
        if entry.is_some() {
            self.free.push(slot);
        }
        entry
    }

    /// Number of currently open entries.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// True if nothing is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fds_start_at_the_reserved_offset() {
        let mut table = FdTable::new();
        assert_eq!(table.add("a"), FIRST_FILE_DESCRIPTOR);
        assert_eq!(table.add("b"), FIRST_FILE_DESCRIPTOR + 1);
    }

    #[test]
    fn low_and_unknown_fds_are_invalid() {
        let mut table = FdTable::new();
        table.add("a");
        for fd in [-1, 0, 1, 2] {
            assert!(table.get(fd).is_none());
        }
        assert!(table.get(FIRST_FILE_DESCRIPTOR + 5).is_none());
        assert!(table.remove(0).is_none());
    }

    #[test]
    fn closed_slots_are_reused_never_while_open() {
        let mut table = FdTable::new();
        let a = table.add("a");
        let b = table.add("b");
        assert_ne!(a, b);

        assert_eq!(table.remove(a), Some("a"));
        // Double close is a no-op, the slot is not freed twice.
        assert_eq!(table.remove(a), None);

        let c = table.add("c");
        assert_eq!(c, a);
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.get(c), Some(&"c"));
        assert_eq!(table.len(), 2);
    }
}
