//! Chain materialization, negotiation and costing.
//!
//! A candidate chain that survives the validators is still only
//! template-compatible. The tester materializes it in a sandbox —
//! instances from the [`ElementCache`], linked head to tail, with a
//! synthetic downstream endpoint advertising the target caps — and drives
//! capability negotiation through it. Only a chain whose every boundary
//! fixates to concrete caps becomes a costed result; everything else is
//! dropped silently and the search continues.
//!
//! Sandbox instances never touch the live graph; they exist to negotiate
//! and are returned to the idle pool afterwards on every exit path.

use compact_str::CompactString;
use smallvec::SmallVec;
use tracing::trace;

use crate::caps::Caps;
use crate::chain::cache::{ElementCache, ElementTicket};
use crate::chain::MAX_CHAIN_LENGTH;
use crate::factory::PadDirection;
use crate::index::FactoryIndex;
use crate::plan::{Steps, TransformationStep};
use crate::policy::Policy;

/// A chain that negotiated end-to-end, with fixated per-step caps and its
/// total cost.
#[derive(Debug, Clone)]
pub struct TestedChain {
    pub steps: Steps,
    pub cost: u32,
}

impl TestedChain {
    /// The zero-step result of a successful passthrough probe.
    fn passthrough() -> Self {
        Self {
            steps: Steps::new(),
            cost: 0,
        }
    }
}

// =============================================================================
// Scoped acquisition
// =============================================================================

/// Holds the instances acquired for one test and returns every one of
/// them to the cache when dropped, no matter which check aborted the
/// test.
struct AcquiredChain<'a> {
    cache: &'a mut ElementCache,
    acquired: Vec<(CompactString, ElementTicket)>,
}

impl<'a> AcquiredChain<'a> {
    fn acquire(cache: &'a mut ElementCache, index: &FactoryIndex, chain: &[usize]) -> Self {
        let mut acquired = Vec::with_capacity(chain.len());
        for &entry_idx in chain {
            let factory = index.entry(entry_idx).factory();
            let ticket = cache.acquire(factory.as_ref());
            acquired.push((CompactString::from(factory.name()), ticket));
        }
        Self { cache, acquired }
    }

    fn element(&self, pos: usize) -> &dyn crate::factory::TransformElement {
        let (name, ticket) = &self.acquired[pos];
        self.cache.element(name, *ticket)
    }

    fn len(&self) -> usize {
        self.acquired.len()
    }
}

impl Drop for AcquiredChain<'_> {
    fn drop(&mut self) {
        for (name, ticket) in self.acquired.drain(..) {
            self.cache.release(&name, ticket);
        }
    }
}

// =============================================================================
// ChainTester
// =============================================================================

/// Materializes and costs candidate chains against a factory index and a
/// policy.
pub struct ChainTester<'a> {
    index: &'a FactoryIndex,
    policy: &'a Policy,
}

impl<'a> ChainTester<'a> {
    pub fn new(index: &'a FactoryIndex, policy: &'a Policy) -> Self {
        Self { index, policy }
    }

    /// Probe the zero-step route: the head caps delivered directly to the
    /// downstream endpoint.
    pub fn test_passthrough(&self, sink_caps: &Caps, downstream_caps: &Caps) -> Option<TestedChain> {
        if sink_caps.intersects(downstream_caps) {
            trace!(target: "autoroute::tester", %sink_caps, "passthrough viable");
            Some(TestedChain::passthrough())
        } else {
            None
        }
    }

    /// Materialize `chain` in the sandbox and negotiate `sink_caps`
    /// through it toward a downstream endpoint advertising
    /// `downstream_caps`. Returns the fixated, costed result, or `None`
    /// on any negotiation failure.
    pub fn test_chain(
        &self,
        cache: &mut ElementCache,
        chain: &[usize],
        sink_caps: &Caps,
        downstream_caps: &Caps,
    ) -> Option<TestedChain> {
        if chain.is_empty() {
            return self.test_passthrough(sink_caps, downstream_caps);
        }

        let sandbox = AcquiredChain::acquire(cache, self.index, chain);

        // The head must accept something the offered caps cover before we
        // bother propagating anything.
        let head_accepts = sandbox.element(0).query_sink_caps(&Caps::empty());
        if !head_accepts.intersects(sink_caps) {
            return None;
        }

        // Forward propagation: collect the caps at every boundary, sink
        // end first. boundaries[i] sits on the sink side of element i;
        // the final entry faces the downstream endpoint.
        let mut boundaries: SmallVec<[Caps; MAX_CHAIN_LENGTH + 1]> = SmallVec::new();
        let mut cursor = sink_caps.clone();
        for pos in 0..sandbox.len() {
            let element = sandbox.element(pos);
            let accepted = cursor.intersect(element.sink_caps());
            if accepted.is_empty() {
                return None;
            }
            cursor = element.transform_caps(PadDirection::Sink, &accepted);
            boundaries.push(accepted);
        }
        let terminal = cursor.intersect(downstream_caps);
        if terminal.is_empty() {
            return None;
        }
        boundaries.push(terminal);

        // Every boundary must fixate to fully concrete caps; a boundary
        // that cannot means negotiation left something undecided.
        let mut fixed: SmallVec<[Caps; MAX_CHAIN_LENGTH + 1]> = SmallVec::new();
        for boundary in &boundaries {
            let caps = boundary.fixate()?;
            if !caps.is_fixed() {
                return None;
            }
            fixed.push(caps);
        }

        let mut steps = Steps::new();
        let mut cost = 0u32;
        for (pos, &entry_idx) in chain.iter().enumerate() {
            let step =
                TransformationStep::new(entry_idx, fixed[pos].clone(), fixed[pos + 1].clone());
            cost += self.policy.cost_step(&step);
            steps.push(step);
        }

        trace!(
            target: "autoroute::tester",
            chain = ?chain,
            cost,
            "chain negotiated"
        );
        Some(TestedChain { steps, cost })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{FieldValue, Structure};
    use crate::factory::CapsTransformFactory;
    use std::sync::Arc;

    fn index() -> FactoryIndex {
        FactoryIndex::build(&[
            CapsTransformFactory::new(
                "rgb2yuv",
                "Converter/Video",
                Caps::media("video/x-raw-rgb"),
                Caps::media("video/x-raw-yuv"),
            ) as Arc<_>,
            CapsTransformFactory::new(
                "h264enc",
                "Codec/Encoder/Video",
                Caps::media("video/x-raw-yuv"),
                Caps::media("video/x-h264"),
            ),
        ])
    }

    #[test]
    fn test_passthrough_probe() {
        let index = index();
        let policy = Policy::new();
        let tester = ChainTester::new(&index, &policy);

        let rgb = Caps::media("video/x-raw-rgb");
        let result = tester.test_passthrough(&rgb, &rgb).unwrap();
        assert!(result.steps.is_empty());
        assert_eq!(result.cost, 0);

        assert!(tester
            .test_passthrough(&rgb, &Caps::media("video/x-raw-yuv"))
            .is_none());
    }

    #[test]
    fn test_single_step_negotiation() {
        let index = index();
        let policy = Policy::new();
        let tester = ChainTester::new(&index, &policy);
        let mut cache = ElementCache::new();

        let result = tester
            .test_chain(
                &mut cache,
                &[0],
                &Caps::media("video/x-raw-rgb"),
                &Caps::media("video/x-raw-yuv"),
            )
            .unwrap();

        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.cost, 1);
        let step = &result.steps[0];
        assert!(step.sink_caps().is_fixed());
        assert!(step.src_caps().is_fixed());
        assert_eq!(step.sink_caps(), &Caps::media("video/x-raw-rgb"));
        assert_eq!(step.src_caps(), &Caps::media("video/x-raw-yuv"));
    }

    #[test]
    fn test_two_step_boundaries_chain_up() {
        let index = index();
        let policy = Policy::new();
        let tester = ChainTester::new(&index, &policy);
        let mut cache = ElementCache::new();

        let result = tester
            .test_chain(
                &mut cache,
                &[0, 1],
                &Caps::media("video/x-raw-rgb"),
                &Caps::media("video/x-h264"),
            )
            .unwrap();

        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.cost, 2);
        // Adjacent steps share their boundary caps
        assert_eq!(result.steps[0].src_caps(), result.steps[1].sink_caps());
    }

    #[test]
    fn test_negotiation_fixates_templates() {
        let index = FactoryIndex::build(&[CapsTransformFactory::new(
            "scaler",
            "Converter/Video",
            Caps::from_structures(vec![Structure::new("video/x-raw")
                .field("width", FieldValue::range(16, 4096))]),
            Caps::from_structures(vec![Structure::new("video/x-raw")
                .field("width", FieldValue::range(16, 4096))]),
        ) as Arc<_>]);
        let policy = Policy::new();
        let tester = ChainTester::new(&index, &policy);
        let mut cache = ElementCache::new();

        let offered = Caps::from_structures(vec![
            Structure::new("video/x-raw").field("width", FieldValue::Int(320))
        ]);
        let result = tester
            .test_chain(&mut cache, &[0], &offered, &Caps::media("video/x-raw"))
            .unwrap();

        // The sink side keeps the offered width; the src side fixates the
        // template range to a concrete value.
        assert_eq!(
            result.steps[0].sink_caps().first().unwrap().get("width"),
            Some(&FieldValue::Int(320))
        );
        assert!(result.steps[0].src_caps().is_fixed());
    }

    #[test]
    fn test_rejection_returns_instances() {
        let index = index();
        let policy = Policy::new();
        let tester = ChainTester::new(&index, &policy);
        let mut cache = ElementCache::new();

        // Head mismatch: audio cannot enter rgb2yuv
        assert!(tester
            .test_chain(
                &mut cache,
                &[0],
                &Caps::media("audio/x-raw"),
                &Caps::media("video/x-raw-yuv"),
            )
            .is_none());

        // The instance acquired for the failed test is idle again
        let result = tester.test_chain(
            &mut cache,
            &[0],
            &Caps::media("video/x-raw-rgb"),
            &Caps::media("video/x-raw-yuv"),
        );
        assert!(result.is_some());
        assert_eq!(cache.created(), 1);
        assert_eq!(cache.reused(), 1);
    }

    #[test]
    fn test_custom_step_cost() {
        let index = index();
        let policy = Policy::new().with_step_cost(|step| {
            // Encoders are expensive
            if step.src_caps().first().map(|s| s.media()) == Some("video/x-h264") {
                10
            } else {
                1
            }
        });
        let tester = ChainTester::new(&index, &policy);
        let mut cache = ElementCache::new();

        let result = tester
            .test_chain(
                &mut cache,
                &[0, 1],
                &Caps::media("video/x-raw-rgb"),
                &Caps::media("video/x-h264"),
            )
            .unwrap();
        assert_eq!(result.cost, 11);
    }
}
