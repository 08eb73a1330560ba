//! Limit on concurrently served clients.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Counts open client connections against a fixed ceiling.
#[derive(Debug)]
pub struct ConnectionPool {
    active: AtomicUsize,
    max_connections: usize,
}

impl ConnectionPool {
    pub fn new(max_connections: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            max_connections: max_connections.max(1),
        })
    }

    /// Claim a slot for a new connection, or `None` at the ceiling. The slot
    /// is released when the guard drops, so it can move into the task that
    /// serves the connection.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::Relaxed, |current| {
                (current < self.max_connections).then_some(current + 1)
            })
            .ok()
            .map(|_| ConnectionGuard { pool: self.clone() })
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

pub struct ConnectionGuard {
    pool: Arc<ConnectionPool>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_released_on_drop() {
        let pool = ConnectionPool::new(2);
        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.active_count(), 2);

        drop(a);
        assert_eq!(pool.active_count(), 1);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn zero_limit_still_admits_one() {
        let pool = ConnectionPool::new(0);
        assert_eq!(pool.max_connections(), 1);
        assert!(pool.try_acquire().is_some());
    }
}
