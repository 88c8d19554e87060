use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};

use log::warn;
use parking_lot::Mutex;

/// One row worth of scratch memory, handed out by a `BufferPool`.
///
/// It can only be created by the pool, so its length always matches the
/// pool's embedding size. Moving it moves the ownership.
pub struct RowBuffer(Box<[f32]>);

impl Deref for RowBuffer {
    type Target = [f32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for RowBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for RowBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RowBuffer").field(&self.0.len()).finish()
    }
}

/// A recycler of fixed size row buffers shared by every worker thread.
///
/// The free list grows whenever it can't satisfy a request and never shrinks,
/// released buffers are kept for the next `acquire` until the pool is dropped.
#[derive(Debug)]
pub struct BufferPool {
    dim: usize,
    free: Mutex<Vec<RowBuffer>>,
    in_flight: AtomicUsize,
}

impl BufferPool {
    /// Creates a new empty `BufferPool`.
    ///
    /// # Arguments
    /// * `dim` - The length of every buffer, i.e. the embedding size.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            free: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Takes `count` buffers out of the pool, allocating the missing ones.
    ///
    /// The content of a recycled buffer is whatever its previous owner left in it.
    ///
    /// # Arguments
    /// * `count` - The amount of buffers to hand out.
    ///
    /// # Returns
    /// Exactly `count` buffers of `dim` length.
    pub fn acquire(&self, count: usize) -> Vec<RowBuffer> {
        let mut bufs = {
            let mut free = self.free.lock();
            let keep = free.len().saturating_sub(count);
            free.split_off(keep)
        };

        let missing = count - bufs.len();
        bufs.extend((0..missing).map(|_| RowBuffer(vec![0.; self.dim].into_boxed_slice())));

        self.in_flight.fetch_add(count, Ordering::AcqRel);
        bufs
    }

    /// Hands the buffers back to the pool.
    ///
    /// Buffers of a different length were never handed out by this pool, they're
    /// dropped instead of recycled.
    ///
    /// # Arguments
    /// * `bufs` - The buffers to recycle, the caller gives up their ownership.
    pub fn release<I>(&self, bufs: I)
    where
        I: IntoIterator<Item = RowBuffer>,
    {
        let mut returned = 0;
        let mut foreign = 0;

        {
            let mut free = self.free.lock();
            for buf in bufs {
                if buf.len() == self.dim {
                    free.push(buf);
                    returned += 1;
                } else {
                    foreign += 1;
                }
            }
        }

        if foreign > 0 {
            warn!(dim = self.dim, foreign = foreign; "dropped buffers of a foreign size");
        }

        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(returned))
            });
    }

    /// Returns the length of every buffer in this pool.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the amount of buffers ready to be recycled.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Returns the amount of buffers currently handed out.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    const DIM: usize = 4;

    #[test]
    fn acquire_allocates_on_miss() {
        let pool = BufferPool::new(DIM);
        let bufs = pool.acquire(3);

        assert_eq!(bufs.len(), 3);
        assert!(bufs.iter().all(|buf| buf.len() == DIM));
        assert_eq!(pool.in_flight(), 3);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn balanced_sequence_restores_free_list() {
        let pool = BufferPool::new(DIM);
        pool.release(pool.acquire(5));
        assert_eq!(pool.available(), 5);

        let a = pool.acquire(2);
        let b = pool.acquire(6);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.in_flight(), 8);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.available(), 8);

        let c = pool.acquire(8);
        pool.release(c);
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn recycled_buffers_keep_their_content() {
        let pool = BufferPool::new(DIM);
        let mut bufs = pool.acquire(1);
        bufs[0].fill(3.);
        pool.release(bufs);

        let bufs = pool.acquire(1);
        assert_eq!(*bufs[0], [3.; DIM]);
    }

    #[test]
    fn foreign_buffers_are_not_pooled() {
        let pool = BufferPool::new(DIM);
        let other = BufferPool::new(DIM + 1);

        pool.release(other.acquire(2));

        assert_eq!(pool.available(), 0);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn zero_count() {
        let pool = BufferPool::new(DIM);
        assert!(pool.acquire(0).is_empty());
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn concurrent_acquire_release() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 200;

        let pool = BufferPool::new(DIM);

        thread::scope(|s| {
            for t in 0..THREADS {
                let pool = &pool;
                s.spawn(move || {
                    for round in 0..ROUNDS {
                        let bufs = pool.acquire(1 + (t + round) % 5);
                        pool.release(bufs);
                    }
                });
            }
        });

        assert_eq!(pool.in_flight(), 0);
        assert!(pool.available() <= THREADS * 5);
    }
}
