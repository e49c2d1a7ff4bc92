use std::collections::HashSet;

use tracing::warn;

use crate::error::RoutingError;

/// Lowest correlation id the pool issues.
pub const POOL_MIN: u64 = 1;
/// Highest correlation id the pool issues.
pub const POOL_MAX: u64 = 65_535;

/// Bounded correlation-id pool owned by one transport session.
///
/// `alloc()` walks a rotating cursor over `1..65536` and hands out the first
/// unused id, failing with [`RoutingError::AllocationFailure`] once every id
/// is taken. The session never releases ids on its own — a long-lived session
/// that exhausts the pool surfaces the failure to the caller rather than
/// recycling silently. Hosts that want recycling call [`release`] themselves.
///
/// [`release`]: CorrelationAllocator::release
#[derive(Debug, Clone)]
pub struct CorrelationAllocator {
    used: HashSet<u64>,
    cursor: u64,
    min: u64,
    max: u64,
}

impl Default for CorrelationAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationAllocator {
    /// Pool over the full `1..65536` range.
    #[must_use]
    pub fn new() -> Self {
        Self::with_range(POOL_MIN, POOL_MAX)
    }

    /// Pool over a custom inclusive range. Used by tests to exercise
    /// exhaustion without walking 65535 ids.
    #[must_use]
    pub fn with_range(min: u64, max: u64) -> Self {
        debug_assert!(min <= max);
        CorrelationAllocator {
            used: HashSet::new(),
            cursor: min,
            min,
            max,
        }
    }

    /// Issue an unused id, or fail when the pool is exhausted.
    pub fn alloc(&mut self) -> Result<u64, RoutingError> {
        let capacity = (self.max - self.min + 1) as usize;
        if self.used.len() >= capacity {
            warn!(
                in_use = self.used.len(),
                capacity = capacity,
                "Correlation-id pool exhausted"
            );
            return Err(RoutingError::AllocationFailure);
        }
        loop {
            let candidate = self.cursor;
            self.cursor = if self.cursor >= self.max {
                self.min
            } else {
                self.cursor + 1
            };
            if self.used.insert(candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Return an id to the pool.
    ///
    /// The session itself never calls this; it exists for hosts that layer
    /// explicit recycling on top of `request()`.
    pub fn release(&mut self, id: u64) {
        self.used.remove(&id);
    }

    /// Number of ids currently issued.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_sequential_from_one() {
        let mut pool = CorrelationAllocator::new();
        assert_eq!(pool.alloc().unwrap(), 1);
        assert_eq!(pool.alloc().unwrap(), 2);
        assert_eq!(pool.alloc().unwrap(), 3);
    }

    #[test]
    fn test_exhaustion_fails() {
        let mut pool = CorrelationAllocator::with_range(1, 3);
        assert!(pool.alloc().is_ok());
        assert!(pool.alloc().is_ok());
        assert!(pool.alloc().is_ok());
        assert_eq!(pool.alloc(), Err(RoutingError::AllocationFailure));
    }

    #[test]
    fn test_release_makes_id_reusable() {
        let mut pool = CorrelationAllocator::with_range(1, 2);
        let a = pool.alloc().unwrap();
        let _b = pool.alloc().unwrap();
        pool.release(a);
        assert_eq!(pool.alloc().unwrap(), a);
    }

    #[test]
    fn test_cursor_wraps_over_released_ids() {
        let mut pool = CorrelationAllocator::with_range(1, 3);
        let _ = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        let _ = pool.alloc().unwrap();
        pool.release(b);
        assert_eq!(pool.alloc().unwrap(), b);
    }
}
