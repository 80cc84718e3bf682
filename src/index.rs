//! Factory index: the precomputed catalog the planner enumerates over.
//!
//! Built once from the policy-provided catalog and rebuilt only on
//! explicit request. Each entry resolves a factory's single sink/src
//! template pair to concrete template caps and derives the klass mask the
//! ordering validator consumes. Factories that do not have exactly one
//! sink template and one src template are silently skipped.

use std::sync::Arc;

use tracing::debug;

use crate::caps::Caps;
use crate::factory::{ElementFactory, KlassMask};

// =============================================================================
// FactoryEntry
// =============================================================================

/// One indexed factory. Immutable once built.
#[derive(Clone)]
pub struct FactoryEntry {
    factory: Arc<dyn ElementFactory>,
    sink_caps: Caps,
    src_caps: Caps,
    klass_mask: KlassMask,
}

impl FactoryEntry {
    /// The underlying factory.
    pub fn factory(&self) -> &Arc<dyn ElementFactory> {
        &self.factory
    }

    /// The factory's stable name.
    pub fn factory_id(&self) -> &str {
        self.factory.name()
    }

    /// Template caps consumable on the sink side.
    pub fn sink_caps(&self) -> &Caps {
        &self.sink_caps
    }

    /// Template caps producible on the src side.
    pub fn src_caps(&self) -> &Caps {
        &self.src_caps
    }

    /// Classification bitset.
    pub fn klass_mask(&self) -> KlassMask {
        self.klass_mask
    }
}

impl PartialEq for FactoryEntry {
    /// Structural equality: same factory name, templates and klass. Used
    /// by the idempotence checks; identity of the `Arc` does not matter.
    fn eq(&self, other: &Self) -> bool {
        self.factory_id() == other.factory_id()
            && self.sink_caps == other.sink_caps
            && self.src_caps == other.src_caps
            && self.klass_mask == other.klass_mask
    }
}

impl Eq for FactoryEntry {}

impl std::fmt::Debug for FactoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryEntry")
            .field("factory", &self.factory_id())
            .field("sink_caps", &self.sink_caps.to_string())
            .field("src_caps", &self.src_caps.to_string())
            .field("klass_mask", &self.klass_mask)
            .finish()
    }
}

// =============================================================================
// FactoryIndex
// =============================================================================

/// The catalog the chain generator walks, plus the capability unions that
/// drive outward endpoint queries.
#[derive(Debug, Default)]
pub struct FactoryIndex {
    entries: Vec<FactoryEntry>,
    all_sink_caps: Caps,
    all_src_caps: Caps,
}

impl FactoryIndex {
    /// Index a catalog. Entry order follows catalog order, which is what
    /// makes enumeration (and therefore planning) deterministic.
    pub fn build(catalog: &[Arc<dyn ElementFactory>]) -> Self {
        let mut entries = Vec::with_capacity(catalog.len());
        let mut all_sink_caps = Caps::empty();
        let mut all_src_caps = Caps::empty();
        let mut skipped = 0usize;

        for factory in catalog {
            let Some((sink, src)) = factory.single_templates() else {
                skipped += 1;
                continue;
            };
            let sink_caps = sink.caps().clone();
            let src_caps = src.caps().clone();
            all_sink_caps = all_sink_caps.union(&sink_caps);
            all_src_caps = all_src_caps.union(&src_caps);
            entries.push(FactoryEntry {
                factory: Arc::clone(factory),
                sink_caps,
                src_caps,
                klass_mask: KlassMask::from_klass(factory.klass()),
            });
        }

        debug!(
            target: "autoroute::index",
            indexed = entries.len(),
            skipped,
            "factory index built"
        );

        Self {
            entries,
            all_sink_caps,
            all_src_caps,
        }
    }

    pub fn entries(&self) -> &[FactoryEntry] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> &FactoryEntry {
        &self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of every entry's sink template caps.
    pub fn all_sink_caps(&self) -> &Caps {
        &self.all_sink_caps
    }

    /// Union of every entry's src template caps.
    pub fn all_src_caps(&self) -> &Caps {
        &self.all_src_caps
    }
}

// =============================================================================
// Tests
// =============================================================================
