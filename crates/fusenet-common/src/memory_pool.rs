//! Scratch memory pool for bound intermediate buffers.
//!
//! A thread-safe, size-bucketed pool that recycles word-aligned buffers.
//! Requests are rounded up to a power-of-two *size class* (minimum 64
//! bytes) so a re-bind with the same shapes hands back the same storage.
//! An optional allocation limit caps the bytes lent out at once; exceeding
//! it, or failing to reserve fresh memory, is reported as
//! [`FusenetError::Allocation`] instead of aborting.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{FusenetError, Result};

const MIN_CLASS: usize = 64;
const WORD: usize = std::mem::size_of::<u64>();

// ── Statistics ───────────────────────────────────────────────────────

/// Cumulative statistics for a [`ScratchPool`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// `allocate` calls served from a cached buffer.
    pub hits: u64,
    /// `allocate` calls that reserved fresh memory.
    pub misses: u64,
    /// `allocate` calls refused by the limit or the allocator.
    pub failures: u64,
    /// Bytes cached inside the pool.
    pub pooled_bytes: usize,
    /// Bytes lent out via live [`PooledBuffer`] handles.
    pub active_bytes: usize,
}

impl PoolStats {
    pub fn total_allocations(&self) -> u64 {
        self.hits + self.misses
    }
}

// ── Pool internals ──────────────────────────────────────────────────

struct PoolInner {
    max_pooled_bytes: usize,
    allocation_limit: Option<usize>,
    buckets: HashMap<usize, Vec<Vec<u64>>>,
    stats: PoolStats,
}

fn lock(inner: &Mutex<PoolInner>) -> MutexGuard<'_, PoolInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── ScratchPool ─────────────────────────────────────────────────────

/// Size-bucketed pool of scratch buffers.
///
/// Cloning shares the underlying pool.
#[derive(Clone)]
pub struct ScratchPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl std::fmt::Debug for ScratchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchPool").field("stats", &self.stats()).finish()
    }
}

impl ScratchPool {
    /// Pool caching at most `max_pooled_bytes` of idle memory, with no cap
    /// on lent-out bytes.
    pub fn new(max_pooled_bytes: usize) -> Self {
        Self::with_allocation_limit(max_pooled_bytes, None)
    }

    pub fn with_allocation_limit(max_pooled_bytes: usize, allocation_limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                max_pooled_bytes,
                allocation_limit,
                buckets: HashMap::new(),
                stats: PoolStats::default(),
            })),
        }
    }

    /// Lend a zeroed buffer of at least `size` bytes.
    pub fn allocate(&self, size: usize) -> Result<PooledBuffer> {
        let class = size_class(size).ok_or(FusenetError::Allocation { size })?;
        let mut inner = lock(&self.inner);

        if let Some(limit) = inner.allocation_limit {
            if inner.stats.active_bytes.saturating_add(class) > limit {
                inner.stats.failures += 1;
                return Err(FusenetError::Allocation { size });
            }
        }

        let recycled = inner.buckets.get_mut(&class).and_then(Vec::pop);
        let words = match recycled {
            Some(mut v) => {
                inner.stats.hits += 1;
                inner.stats.pooled_bytes -= class;
                v.fill(0);
                v
            }
            None => {
                let mut v: Vec<u64> = Vec::new();
                if v.try_reserve_exact(class / WORD).is_err() {
                    inner.stats.failures += 1;
                    return Err(FusenetError::Allocation { size });
                }
                v.resize(class / WORD, 0);
                inner.stats.misses += 1;
                v
            }
        };

        inner.stats.active_bytes += class;
        Ok(PooledBuffer { words: Some(words), pool: Arc::clone(&self.inner) })
    }

    pub fn stats(&self) -> PoolStats {
        lock(&self.inner).stats.clone()
    }
}

/// Round `size` up to the next power of two, minimum 64 bytes.
fn size_class(size: usize) -> Option<usize> {
    if size <= MIN_CLASS {
        return Some(MIN_CLASS);
    }
    size.checked_next_power_of_two()
}

// ── PooledBuffer ────────────────────────────────────────────────────

/// Scratch buffer that returns to its [`ScratchPool`] on drop.
///
/// Storage is 8-byte aligned, so `f32` views never fail.
pub struct PooledBuffer {
    words: Option<Vec<u64>>,
    pool: Arc<Mutex<PoolInner>>,
}

impl PooledBuffer {
    fn words(&self) -> &[u64] {
        self.words.as_deref().unwrap_or(&[])
    }

    fn words_mut(&mut self) -> &mut [u64] {
        self.words.as_deref_mut().unwrap_or(&mut [])
    }

    /// Size class in bytes.
    pub fn capacity(&self) -> usize {
        self.words().len() * WORD
    }

    pub fn as_f32_slice(&self) -> &[f32] {
        bytemuck::cast_slice(self.words())
    }

    pub fn as_f32_mut_slice(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(self.words_mut())
    }

    /// Start address of the storage, stable for the buffer's lifetime.
    pub fn addr(&self) -> usize {
        self.words().as_ptr() as usize
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("capacity", &self.capacity())
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        bytemuck::cast_slice(self.words())
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.words_mut())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(words) = self.words.take() {
            let class = words.len() * WORD;
            let mut inner = lock(&self.pool);
            inner.stats.active_bytes = inner.stats.active_bytes.saturating_sub(class);

            if inner.stats.pooled_bytes + class <= inner.max_pooled_bytes {
                inner.stats.pooled_bytes += class;
                inner.buckets.entry(class).or_default().push(words);
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn size_class_rounds_up() {
        let pool = ScratchPool::new(4096);
        assert_eq!(pool.allocate(100).unwrap().capacity(), 128);
        assert_eq!(pool.allocate(1).unwrap().capacity(), 64);
        assert_eq!(pool.allocate(0).unwrap().capacity(), 64);
        assert_eq!(pool.allocate(256).unwrap().capacity(), 256);
    }

    #[test]
    fn recycled_buffer_is_zeroed() {
        let pool = ScratchPool::new(4096);
        let mut buf = pool.allocate(64).unwrap();
        buf.as_f32_mut_slice()[3] = 7.5;
        drop(buf);

        let buf = pool.allocate(64).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(pool.stats().hits, 1);
    }

    #[test]
    fn same_class_reuses_same_storage() {
        let pool = ScratchPool::new(4096);
        let buf = pool.allocate(200).unwrap();
        let addr = buf.addr();
        drop(buf);
        let again = pool.allocate(150).unwrap();
        assert_eq!(again.addr(), addr);
    }

    #[test]
    fn stats_track_active_and_pooled() {
        let pool = ScratchPool::new(4096);
        {
            let _a = pool.allocate(64).unwrap();
            let _b = pool.allocate(128).unwrap();
            let stats = pool.stats();
            assert_eq!(stats.misses, 2);
            assert_eq!(stats.active_bytes, 64 + 128);
            assert_eq!(stats.pooled_bytes, 0);
        }
        let stats = pool.stats();
        assert_eq!(stats.active_bytes, 0);
        assert_eq!(stats.pooled_bytes, 64 + 128);
    }

    #[test]
    fn idle_cap_frees_overflow() {
        let pool = ScratchPool::new(128);
        let a = pool.allocate(128).unwrap();
        let b = pool.allocate(128).unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.stats().pooled_bytes, 128);
    }

    #[test]
    fn allocation_limit_reports_failure() {
        let pool = ScratchPool::with_allocation_limit(4096, Some(256));
        let _a = pool.allocate(256).unwrap();
        let err = pool.allocate(10).unwrap_err();
        assert_eq!(err, FusenetError::Allocation { size: 10 });
        assert_eq!(pool.stats().failures, 1);
    }

    #[test]
    fn limit_frees_up_after_drop() {
        let pool = ScratchPool::with_allocation_limit(4096, Some(128));
        let a = pool.allocate(128).unwrap();
        drop(a);
        assert!(pool.allocate(128).is_ok());
    }

    #[test]
    fn oversized_request_fails_cleanly() {
        let pool = ScratchPool::new(0);
        assert!(matches!(pool.allocate(usize::MAX), Err(FusenetError::Allocation { .. })));
    }

    #[test]
    fn f32_view_covers_capacity() {
        let pool = ScratchPool::new(4096);
        let mut buf = pool.allocate(48).unwrap();
        assert_eq!(buf.as_f32_slice().len(), 16);
        buf.as_f32_mut_slice()[1] = -2.5;
        assert_eq!(buf.as_f32_slice()[1], -2.5);
    }

    #[test]
    fn thread_safety() {
        let pool = ScratchPool::new(1 << 20);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = pool.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = p.allocate(256).unwrap();
                        buf[0] = 42;
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread panicked");
        }

        let stats = pool.stats();
        assert_eq!(stats.total_allocations(), 800);
        assert_eq!(stats.active_bytes, 0);
    }
}
