//! Sandbox element cache.
//!
//! Testing a candidate chain needs a live instance of every factory in
//! it. Instances are expensive to create and planning tests thousands of
//! chains, so instances are pooled per factory and reused across tests
//! within one planning pass. In-use tracking is explicit: acquiring marks
//! a slot busy, releasing returns it to idle.

use compact_str::CompactString;
use rustc_hash::FxHashMap;

use crate::factory::{ElementFactory, TransformElement};

/// One pooled instance plus its busy flag.
struct CachedElement {
    element: Box<dyn TransformElement>,
    in_use: bool,
}

/// Handle to an acquired instance; index into the factory's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementTicket {
    slot: usize,
}

/// Pool of sandbox instances keyed by factory name.
///
/// The cache lives for one planning pass and is confined to it; the
/// structural lock serializes all access, so no interior locking here.
#[derive(Default)]
pub struct ElementCache {
    pools: FxHashMap<CompactString, Vec<CachedElement>>,
    created: usize,
    reused: usize,
}

impl ElementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire an instance of `factory`, reusing an idle pooled one when
    /// available. The returned ticket must be released back.
    pub fn acquire(&mut self, factory: &dyn ElementFactory) -> ElementTicket {
        let pool = self
            .pools
            .entry(CompactString::from(factory.name()))
            .or_default();

        if let Some(slot) = pool.iter().position(|c| !c.in_use) {
            pool[slot].in_use = true;
            self.reused += 1;
            return ElementTicket { slot };
        }

        pool.push(CachedElement {
            element: factory.create(),
            in_use: true,
        });
        self.created += 1;
        ElementTicket {
            slot: pool.len() - 1,
        }
    }

    /// Access an acquired instance.
    pub fn element(&self, factory_name: &str, ticket: ElementTicket) -> &dyn TransformElement {
        self.pools[factory_name][ticket.slot].element.as_ref()
    }

    /// Return an instance to the idle pool.
    pub fn release(&mut self, factory_name: &str, ticket: ElementTicket) {
        if let Some(pool) = self.pools.get_mut(factory_name) {
            if let Some(cached) = pool.get_mut(ticket.slot) {
                cached.in_use = false;
            }
        }
    }

    /// Instances created so far (cache misses).
    pub fn created(&self) -> usize {
        self.created
    }

    /// Acquisitions served from the idle pool.
    pub fn reused(&self) -> usize {
        self.reused
    }
}

// =============================================================================
// Tests
// =============================================================================
