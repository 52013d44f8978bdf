//! Worker pool for admission control
//!
//! A fixed number of permits bounds how many connections are served at
//! once. The accept loop takes a permit before accepting, so clients beyond
//! the limit wait in the listen backlog instead of being rejected.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// Largest pool size (`wait_idle` takes every slot in one request)
const MAX_CAPACITY: usize = u16::MAX as usize;

/// Fixed-size pool of connection slots
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held connection slot, released on drop
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    /// Create a pool with `capacity` slots (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<WorkerPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;
        Ok(WorkerPermit { _permit: permit })
    }

    /// Wait until no slot is held
    pub async fn wait_idle(&self) -> Result<()> {
        let _all = self
            .semaphore
            .acquire_many(self.capacity as u32)
            .await
            .map_err(|_| Error::PoolClosed)?;
        Ok(())
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held
    pub fn active(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Stop handing out slots; pending and later `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_acquire_up_to_capacity() {
        let pool = WorkerPool::new(2);

        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.active(), 2);

        drop(a);
        assert_eq!(pool.active(), 1);
    }

    #[tokio::test]
    async fn test_excess_acquire_waits() {
        let pool = WorkerPool::new(1);
        let held = pool.acquire().await.unwrap();

        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("waiter should get the released slot")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_fails_pending() {
        let pool = WorkerPool::new(1);
        let _held = pool.acquire().await.unwrap();
        pool.close();

        assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_release() {
        let pool = WorkerPool::new(2);
        let held = pool.acquire().await.unwrap();

        let idle = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.wait_idle().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!idle.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), idle)
            .await
            .expect("pool should become idle")
            .unwrap()
            .unwrap();
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn test_capacity_bounds() {
        assert_eq!(WorkerPool::new(0).capacity(), 1);
        assert_eq!(WorkerPool::new(usize::MAX).capacity(), u16::MAX as usize);
    }
}
