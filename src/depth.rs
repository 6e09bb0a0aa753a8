//! Thread-local depth counter for one serialize or deserialize call tree.
//!
//! Formatters that can recurse into nested values call [`enter`] and hold the returned guard for
//! the duration of the nested work. The counter unwinds as guards drop, including on `?` paths.

use crate::{CodecError, Result};
use std::cell::Cell;
use std::marker::PhantomData;
use tracing::debug;

pub const DEFAULT_MAX_DEPTH: usize = 500;

thread_local! {
    static CURRENT: Cell<usize> = const { Cell::new(0) };
    static MAX: Cell<usize> = const { Cell::new(DEFAULT_MAX_DEPTH) };
}

/// Decrements the depth counter when dropped.
#[must_use = "the depth is released as soon as the guard is dropped"]
pub struct DepthGuard {
    _not_send: PhantomData<*const ()>,
}

/// Enters one nesting level, failing with [`CodecError::DepthExceeded`] past the maximum.
pub fn enter() -> Result<DepthGuard> {
    let max = MAX.with(Cell::get);
    let depth = CURRENT.with(Cell::get);
    if depth >= max {
        debug!(depth, max, "object graph depth limit reached");
        return Err(CodecError::DepthExceeded { max });
    }
    CURRENT.with(|current| current.set(depth + 1));
    Ok(DepthGuard {
        _not_send: PhantomData,
    })
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(current.get().saturating_sub(1)));
    }
}

/// Current nesting level on this thread.
pub fn current() -> usize {
    CURRENT.with(Cell::get)
}

pub fn max_depth() -> usize {
    MAX.with(Cell::get)
}

/// Restores the previous maximum when dropped.
#[must_use = "the limit is restored as soon as the scope is dropped"]
pub struct DepthScope {
    previous: usize,
    _not_send: PhantomData<*const ()>,
}

/// Sets the maximum depth for a top-level call.
///
/// A nested scope can only tighten the limit set by an outer one.
pub fn scope(max: usize) -> DepthScope {
    let previous = MAX.with(Cell::get);
    let effective = if CURRENT.with(Cell::get) > 0 {
        previous.min(max)
    } else {
        max
    };
    MAX.with(|cell| cell.set(effective));
    DepthScope {
        previous,
        _not_send: PhantomData,
    }
}

impl Drop for DepthScope {
    fn drop(&mut self) {
        MAX.with(|cell| cell.set(self.previous));
    }
}
