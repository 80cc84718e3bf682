//! Composable chain validators.
//!
//! A validator inspects a candidate chain between the head caps `S` and
//! the downstream caps `T` and either accepts it (`None`) or reports a
//! failing position. The reported position is the deepest one whose
//! current assignment must change for the failure to go away; the
//! enumerator resumes by advancing exactly that position and resetting
//! everything deeper, so a shallow report prunes a whole subtree of the
//! cartesian product.
//!
//! Validators run in a fixed order — caps connectivity, consecutive
//! duplicates, class ordering — and the first one that reports decides
//! the backtrack point.

use crate::caps::Caps;
use crate::index::FactoryIndex;

/// Caps connectivity: every boundary along the chain must be satisfiable.
///
/// Walks boundaries in order — `S` against element 0's sink template, each
/// element's src template against its successor's sink template, and the
/// last element's src template against `T`. A failing boundary is
/// attributed to its deeper element (the fixed ends `S` and `T` cannot
/// change).
pub fn validate_caps_connectivity(
    sink_caps: &Caps,
    src_caps: &Caps,
    chain: &[usize],
    index: &FactoryIndex,
) -> Option<usize> {
    if chain.is_empty() {
        return None;
    }

    if !sink_caps.intersects(index.entry(chain[0]).sink_caps()) {
        return Some(0);
    }
    for i in 0..chain.len() - 1 {
        let src = index.entry(chain[i]).src_caps();
        let next_sink = index.entry(chain[i + 1]).sink_caps();
        if !src.intersects(next_sink) {
            return Some(i + 1);
        }
    }
    let tail = index.entry(chain[chain.len() - 1]);
    if !tail.src_caps().intersects(src_caps) {
        return Some(chain.len() - 1);
    }
    None
}

/// The same factory twice in a row never helps; reject at the repeat.
pub fn validate_no_consecutive_duplicates(
    _sink_caps: &Caps,
    _src_caps: &Caps,
    chain: &[usize],
    _index: &FactoryIndex,
) -> Option<usize> {
    for i in 0..chain.len().saturating_sub(1) {
        if chain[i] == chain[i + 1] {
            return Some(i + 1);
        }
    }
    None
}

/// Class ordering: mapping each element to the first stage whose bit is
/// set (parser, decoder, converter, encoder), stages must be
/// non-decreasing from the sink end to the src end. Elements with no
/// recognized class do not constrain the ordering.
pub fn validate_klass_ordering(
    _sink_caps: &Caps,
    _src_caps: &Caps,
    chain: &[usize],
    index: &FactoryIndex,
) -> Option<usize> {
    let mut current = None;
    for (pos, &entry_idx) in chain.iter().enumerate() {
        let Some(stage) = index.entry(entry_idx).klass_mask().first_stage() else {
            continue;
        };
        if let Some(prev) = current {
            if stage < prev {
                return Some(pos);
            }
        }
        current = Some(stage);
    }
    None
}

/// The built-in composition: connectivity, duplicates, then class
/// ordering when the policy enables it.
pub fn validate_default(
    sink_caps: &Caps,
    src_caps: &Caps,
    chain: &[usize],
    index: &FactoryIndex,
    klass_ordering: bool,
) -> Option<usize> {
    if let Some(depth) = validate_caps_connectivity(sink_caps, src_caps, chain, index) {
        return Some(depth);
    }
    if let Some(depth) = validate_no_consecutive_duplicates(sink_caps, src_caps, chain, index) {
        return Some(depth);
    }
    if klass_ordering {
        if let Some(depth) = validate_klass_ordering(sink_caps, src_caps, chain, index) {
            return Some(depth);
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
