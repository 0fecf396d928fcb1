//! Fixed-capacity identifier pools.
//!
//! User and group ids are small integers drawn from bounded pools. The
//! presence JSON the browser renders depends on predictable ordering, so
//! allocation is always lowest-free-first. The pool is a sorted free list
//! rather than a scanned flag array: allocate and release are O(log n).

use std::collections::BTreeSet;

/// A fixed-capacity id allocator handing out the lowest free id.
#[derive(Debug)]
pub struct IdPool {
    capacity: u32,
    free: BTreeSet<u32>,
}

impl IdPool {
    /// Create a pool with ids `0..capacity`, all free.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            free: (0..capacity).collect(),
        }
    }

    /// Take the lowest free id, or `None` if the pool is exhausted.
    pub fn allocate(&mut self) -> Option<u32> {
        self.free.pop_first()
    }

    /// Return an id to the pool.
    ///
    /// Releasing an id that is out of range or already free is a no-op;
    /// double-release cannot corrupt the pool. Returns `true` if the id
    /// was actually in use.
    pub fn release(&mut self, id: u32) -> bool {
        if id >= self.capacity {
            return false;
        }
        self.free.insert(id)
    }

    /// Whether the given id is currently allocated.
    #[must_use]
    pub fn in_use(&self, id: u32) -> bool {
        id < self.capacity && !self.free.contains(&id)
    }

    /// Number of ids still available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Total pool capacity.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_first_allocation() {
        let mut pool = IdPool::new(4);
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
    }

    #[test]
    fn test_release_makes_id_next() {
        let mut pool = IdPool::new(4);
        for _ in 0..3 {
            pool.allocate();
        }
        assert!(pool.release(1));
        // 1 is the lowest free id; it comes back before 3.
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(3));
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = IdPool::new(2);
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), None);

        pool.release(0);
        assert_eq!(pool.allocate(), Some(0));
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut pool = IdPool::new(2);
        pool.allocate();
        assert!(pool.release(0));
        assert!(!pool.release(0));
        // The duplicate release must not create a second copy of the id.
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn test_out_of_range_release_is_noop() {
        let mut pool = IdPool::new(2);
        assert!(!pool.release(2));
        assert!(!pool.release(u32::MAX));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_in_use() {
        let mut pool = IdPool::new(2);
        assert!(!pool.in_use(0));
        pool.allocate();
        assert!(pool.in_use(0));
        assert!(!pool.in_use(1));
        assert!(!pool.in_use(5));
    }
}
