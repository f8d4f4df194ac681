//! Pool of reusable compilation contexts.
//!
//! Contexts live in an index arena. A slot is idle (holding its context),
//! in use (its context lent out to a [`PooledContext`]), or vacant (trimmed).
//! The arena lock is held only while scanning or updating slots, never while a
//! context is built or used.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use kiln_common::GfxIpVersion;
use parking_lot::Mutex;

use crate::context::CompilationContext;

enum Slot {
    Vacant,
    Idle(Box<CompilationContext>),
    InUse,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    vacant: Vec<usize>,
}

/// Counters describing the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Contexts that exist (idle or in use).
    pub live: usize,
    /// Contexts lent out.
    pub in_use: usize,
    /// Contexts created over the pool's lifetime.
    pub created: u64,
}

/// Thread-safe pool of [`CompilationContext`]s.
pub struct ContextPool {
    arena: Mutex<Arena>,
    next_id: AtomicU64,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            arena: Mutex::new(Arena::default()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Lends out an idle context bound to exactly `gfxip`, creating one if
    /// none is free. Never fails.
    pub fn acquire(&self, gfxip: GfxIpVersion) -> PooledContext<'_> {
        let index = {
            let mut arena = self.arena.lock();
            for (index, slot) in arena.slots.iter_mut().enumerate() {
                if !matches!(slot, Slot::Idle(ctx) if ctx.gfxip() == gfxip) {
                    continue;
                }
                if let Slot::Idle(context) = std::mem::replace(slot, Slot::InUse) {
                    log::debug!("reusing compilation context #{} (slot {index})", context.id());
                    return PooledContext {
                        pool: self,
                        index,
                        context: Some(context),
                    };
                }
            }
            match arena.vacant.pop() {
                Some(index) => {
                    arena.slots[index] = Slot::InUse;
                    index
                }
                None => {
                    arena.slots.push(Slot::InUse);
                    arena.slots.len() - 1
                }
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        PooledContext {
            pool: self,
            index,
            context: Some(Box::new(CompilationContext::new(id, gfxip))),
        }
    }

    /// Destroys idle contexts until at most `floor` contexts remain.
    ///
    /// Contexts in use are never touched. Returns the number destroyed.
    pub fn trim(&self, floor: usize) -> usize {
        let mut arena = self.arena.lock();
        let mut live = arena
            .slots
            .iter()
            .filter(|s| !matches!(s, Slot::Vacant))
            .count();
        let mut destroyed = 0;
        for index in 0..arena.slots.len() {
            if live <= floor {
                break;
            }
            if matches!(arena.slots[index], Slot::Idle(_)) {
                if let Slot::Idle(context) = std::mem::replace(&mut arena.slots[index], Slot::Vacant) {
                    log::debug!("destroying compilation context #{}", context.id());
                }
                arena.vacant.push(index);
                live -= 1;
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        let arena = self.arena.lock();
        let mut stats = PoolStats {
            created: self.next_id.load(Ordering::Relaxed),
            ..PoolStats::default()
        };
        for slot in &arena.slots {
            match slot {
                Slot::Vacant => {}
                Slot::Idle(_) => stats.live += 1,
                Slot::InUse => {
                    stats.live += 1;
                    stats.in_use += 1;
                }
            }
        }
        stats
    }

    fn give_back(&self, index: usize, mut context: Box<CompilationContext>) {
        context.reset();
        let mut arena = self.arena.lock();
        arena.slots[index] = Slot::Idle(context);
    }
}

/// Exclusive use of one pooled context; returned to the pool on drop.
pub struct PooledContext<'p> {
    pool: &'p ContextPool,
    index: usize,
    context: Option<Box<CompilationContext>>,
}

impl PooledContext<'_> {
    /// Arena slot this context occupies.
    pub fn slot(&self) -> usize {
        self.index
    }
}

impl Deref for PooledContext<'_> {
    type Target = CompilationContext;

    fn deref(&self) -> &CompilationContext {
        self.context
            .as_deref()
            .expect("context is only taken on drop")
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut CompilationContext {
        self.context
            .as_deref_mut()
            .expect("context is only taken on drop")
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.pool.give_back(self.index, context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GFX9: GfxIpVersion = GfxIpVersion::new(9, 0, 0);
    const GFX10: GfxIpVersion = GfxIpVersion::new(10, 1, 0);

    #[test]
    fn release_then_acquire_reuses() {
        let pool = ContextPool::new();
        let first_id = {
            let ctx = pool.acquire(GFX9);
            assert_eq!(pool.stats().in_use, 1);
            ctx.id()
        };
        assert_eq!(pool.stats().in_use, 0);
        let ctx = pool.acquire(GFX9);
        assert_eq!(ctx.id(), first_id);
        assert_eq!(pool.stats().created, 1);
    }

    #[test]
    fn simultaneous_acquires_get_distinct_contexts() {
        let pool = ContextPool::new();
        let a = pool.acquire(GFX9);
        let b = pool.acquire(GFX9);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.slot(), b.slot());
        assert_eq!(pool.stats().live, 2);
    }

    #[test]
    fn versions_must_match_exactly() {
        let pool = ContextPool::new();
        drop(pool.acquire(GFX9));
        let ctx = pool.acquire(GFX10);
        assert_eq!(ctx.gfxip(), GFX10);
        assert_eq!(pool.stats().created, 2);
        drop(ctx);
        let stepping = pool.acquire(GfxIpVersion::new(9, 0, 1));
        assert_eq!(stepping.gfxip(), GfxIpVersion::new(9, 0, 1));
        assert_eq!(pool.stats().created, 3);
    }

    #[test]
    fn released_context_is_reset() {
        let pool = ContextPool::new();
        {
            let mut ctx = pool.acquire(GFX9);
            ctx.set_subgroup_size(32);
            ctx.set_user_data(vec![crate::user_data::ResourceNode::push_const(0, 1)]);
        }
        let ctx = pool.acquire(GFX9);
        assert!(ctx.is_clean());
        assert_eq!(ctx.subgroup_size(), 64);
    }

    #[test]
    fn trim_keeps_floor_and_busy_contexts() {
        let pool = ContextPool::new();
        let busy = pool.acquire(GFX9);
        drop(pool.acquire(GFX9));
        {
            let _a = pool.acquire(GFX10);
            let _b = pool.acquire(GFX10);
        }
        assert_eq!(pool.stats().live, 4);

        assert_eq!(pool.trim(2), 2);
        assert_eq!(pool.stats().live, 2);
        assert_eq!(pool.trim(0), 1);
        let stats = pool.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.in_use, 1);
        drop(busy);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[test]
    fn lent_slots_count_for_every_target() {
        let pool = ContextPool::new();
        let a = pool.acquire(GFX9);
        let b = pool.acquire(GFX10);
        assert_eq!(pool.stats(), PoolStats { live: 2, in_use: 2, created: 2 });
        // Nothing idle to destroy.
        assert_eq!(pool.trim(0), 0);
        drop(a);
        assert_eq!(pool.trim(0), 1);
        assert_eq!(pool.stats(), PoolStats { live: 1, in_use: 1, created: 2 });
        drop(b);
    }

    #[test]
    fn vacant_slots_are_recycled() {
        let pool = ContextPool::new();
        drop(pool.acquire(GFX9));
        pool.trim(0);
        let ctx = pool.acquire(GFX9);
        assert_eq!(ctx.slot(), 0);
        assert_eq!(pool.stats().created, 2);
    }
}
