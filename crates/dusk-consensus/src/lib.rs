//! Dusk Consensus - resolving many individual choices into one.
//!
//! Votes and Aggressor night actions are both plurality decisions: the most
//! named target wins, ties are broken uniformly at random. The engine holds
//! no state between calls; the caller owns the random source.

pub mod tally;

pub use tally::{seeded_rng, tally, DecisionRecord, TallyOutcome, TallyResult};
