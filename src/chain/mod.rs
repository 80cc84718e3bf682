//! Candidate transformation chains.
//!
//! A chain is an ordered run of factory-index positions: element 0 sits at
//! the sink end (it consumes the caps injected at the head), the last
//! element sits at the src end (it feeds the downstream endpoint). Chains
//! are enumerated lazily ([`generator`]), pruned by composable validators
//! ([`validator`]), and turned into costed proposals by materializing them
//! in a sandbox ([`tester`]).

pub mod cache;
pub mod generator;
pub mod tester;
pub mod validator;

use smallvec::SmallVec;

/// Longest chain the enumerator will ever produce.
pub const MAX_CHAIN_LENGTH: usize = 4;

/// A candidate chain: factory-index positions, sink end first.
pub type Chain = SmallVec<[usize; MAX_CHAIN_LENGTH]>;

pub use cache::ElementCache;
pub use generator::ChainGenerator;
pub use tester::ChainTester;
