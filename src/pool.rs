//! Thread-local pool of output segments.
//!
//! Writers without an external sink rent their segments here and hand them back when they are
//! dropped or flushed. `BytesMut::clear()` keeps the allocation, so after warmup a serialize call
//! on a thread does not allocate segment storage.

use bytes::BytesMut;
use std::cell::RefCell;
use tracing::trace;

/// Default capacity of a freshly allocated segment.
pub const DEFAULT_SEGMENT_SIZE: usize = 4096;

/// Maximum segments retained per thread.
pub const MAX_POOLED_SEGMENTS: usize = 16;

/// Segments that grew beyond this are dropped instead of pooled.
pub const MAX_RETAINED_CAPACITY: usize = 1 << 20;

thread_local! {
    static SEGMENT_POOL: RefCell<Vec<BytesMut>> =
        RefCell::new(Vec::with_capacity(MAX_POOLED_SEGMENTS));
}

/// Pool operations. The pool itself is created per thread on first access.
pub struct SegmentPool;

impl SegmentPool {
    /// Rents an empty segment with at least `min_capacity` bytes of capacity.
    ///
    /// The caller owns the segment until it passes it to [`SegmentPool::release`].
    pub fn rent(min_capacity: usize) -> BytesMut {
        let pooled = SEGMENT_POOL
            .try_with(|pool| {
                let mut pool = pool.borrow_mut();
                let index = pool
                    .iter()
                    .position(|segment| segment.capacity() >= min_capacity)?;
                Some(pool.swap_remove(index))
            })
            .ok()
            .flatten();

        match pooled {
            Some(segment) => {
                trace!(capacity = segment.capacity(), "reused pooled segment");
                segment
            }
            None => BytesMut::with_capacity(min_capacity),
        }
    }

    /// Returns a segment to the pool. Dropped if the pool is full or the segment is oversized.
    pub fn release(mut segment: BytesMut) {
        segment.clear();
        if segment.capacity() == 0 || segment.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        // Ignored during thread teardown, when the pool may already be gone.
        let _ = SEGMENT_POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            if pool.len() < MAX_POOLED_SEGMENTS {
                trace!(capacity = segment.capacity(), "segment returned to pool");
                pool.push(segment);
            }
        });
    }

    /// Number of segments currently pooled on this thread.
    pub fn pooled_count() -> usize {
        SEGMENT_POOL
            .try_with(|pool| pool.borrow().len())
            .unwrap_or(0)
    }

    /// Drops every pooled segment on this thread.
    pub fn clear() {
        let _ = SEGMENT_POOL.try_with(|pool| pool.borrow_mut().clear());
    }
}
