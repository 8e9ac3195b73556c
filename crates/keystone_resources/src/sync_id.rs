//! Sync id allocation.

use hashbrown::HashSet;

use crate::error::{ResourceError, ResourceResult};
use crate::resource::SyncId;

/// Hands out host-scoped 16-bit ids.
///
/// A cursor walks the id space and wraps around, skipping the sentinel and
/// any id still in use. A released id therefore only comes back after the
/// cursor has passed every other free id.
#[derive(Debug, Default)]
pub struct SyncIdAllocator {
    next: u16,
    in_use: HashSet<u16>,
}

impl SyncIdAllocator {
    /// Creates an allocator starting at id 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next free id.
    ///
    /// # Errors
    ///
    /// [`ResourceError::SyncIdsExhausted`] when every valid id is in use.
    pub fn allocate(&mut self) -> ResourceResult<SyncId> {
        for _ in 0..=u32::from(u16::MAX) {
            let candidate = self.next;
            self.next = self.next.wrapping_add(1);

            let Some(id) = SyncId::new(candidate) else {
                continue;
            };
            if self.in_use.insert(candidate) {
                return Ok(id);
            }
        }
        Err(ResourceError::SyncIdsExhausted)
    }

    /// Returns an id to the free pool. Releasing a free id is a no-op.
    pub fn release(&mut self, id: SyncId) {
        self.in_use.remove(&id.get());
    }

    /// Returns true if the id is currently allocated.
    #[must_use]
    pub fn is_in_use(&self, id: SyncId) -> bool {
        self.in_use.contains(&id.get())
    }

    /// Number of allocated ids.
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially() {
        let mut allocator = SyncIdAllocator::new();
        assert_eq!(allocator.allocate().unwrap().get(), 0);
        assert_eq!(allocator.allocate().unwrap().get(), 1);
        assert_eq!(allocator.in_use_count(), 2);
    }

    #[test]
    fn skips_sentinel_on_wrap() {
        let mut allocator = SyncIdAllocator {
            next: SyncId::INVALID_RAW - 1,
            in_use: HashSet::new(),
        };
        assert_eq!(allocator.allocate().unwrap().get(), SyncId::INVALID_RAW - 1);
        assert_eq!(allocator.allocate().unwrap().get(), 0);
    }

    #[test]
    fn skips_ids_in_use_after_wrap() {
        let mut allocator = SyncIdAllocator::new();
        let first = allocator.allocate().unwrap();
        allocator.next = SyncId::INVALID_RAW;

        let next = allocator.allocate().unwrap();
        assert_ne!(next, first);
        assert_eq!(next.get(), 1);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut allocator = SyncIdAllocator::new();
        for _ in 0..SyncId::INVALID_RAW {
            allocator.allocate().unwrap();
        }
        assert_eq!(allocator.allocate(), Err(ResourceError::SyncIdsExhausted));

        let freed = SyncId::new(42).unwrap();
        allocator.release(freed);
        assert_eq!(allocator.allocate(), Ok(freed));
    }

    #[test]
    fn release_is_idempotent() {
        let mut allocator = SyncIdAllocator::new();
        let id = allocator.allocate().unwrap();
        allocator.release(id);
        allocator.release(id);
        assert!(!allocator.is_in_use(id));
        assert_eq!(allocator.in_use_count(), 0);
    }
}
