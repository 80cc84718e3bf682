//! Minimum-cost exact cover over the output endpoints.
//!
//! Every proposal covers the output set accumulated along its ancestor
//! chain, at the chain's accumulated cost. With one bit per output
//! endpoint, `best[s]` is the cheapest way to cover exactly the subset
//! `s`; subsets combine by splitting `s` into nonempty proper halves.
//! O(3^m) over subsets, comfortable for the small output counts a bin
//! carries.

use tracing::debug;

use crate::graph::endpoint::EndpointId;
use crate::plan::proposal::{ProposalArena, ProposalId};

const INFINITE: u64 = u64::MAX;

/// Pick the minimum-cost set of proposals whose combined ancestor chains
/// cover every output in `outputs`.
///
/// Returns `None` when no combination covers the full set; infinity is
/// absorbing, so partially coverable configurations never produce a
/// partial cover here. Ties resolve toward the earliest-generated
/// proposals, which keeps planning deterministic.
pub fn select_cover(arena: &ProposalArena, outputs: &[EndpointId]) -> Option<Vec<ProposalId>> {
    let m = outputs.len();
    if m == 0 {
        return Some(Vec::new());
    }
    debug_assert!(m <= 16, "output count beyond the DP's comfort zone");

    let full: usize = (1usize << m) - 1;
    let mut best: Vec<(u64, Vec<ProposalId>)> = vec![(INFINITE, Vec::new()); full + 1];

    // Seed: each proposal covers its ancestor chain's output set.
    for id in arena.ids() {
        let mut mask = 0usize;
        for endpoint in arena.covered_endpoints(id) {
            if let Some(bit) = outputs.iter().position(|&o| o == endpoint) {
                mask |= 1 << bit;
            }
        }
        if mask == 0 {
            continue;
        }
        let cost = arena.chain_cost(id);
        if cost < best[mask].0 {
            best[mask] = (cost, vec![id]);
        }
    }

    // Combine: split every subset into nonempty proper halves.
    for s in 1..=full {
        let mut t = (s - 1) & s;
        while t != 0 {
            let rest = s & !t;
            let (a, b) = (best[t].0, best[rest].0);
            if a != INFINITE && b != INFINITE && a.saturating_add(b) < best[s].0 {
                let mut combined = best[t].1.clone();
                combined.extend_from_slice(&best[rest].1);
                best[s] = (a + b, combined);
            }
            t = (t - 1) & s;
        }
    }

    let (cost, picks) = &best[full];
    if *cost == INFINITE {
        debug!(target: "autoroute::plan", "no viable cover");
        return None;
    }
    debug!(
        target: "autoroute::plan",
        cost,
        proposals = picks.len(),
        "cover selected"
    );
    Some(picks.clone())
}

// =============================================================================
// Tests
// =============================================================================
