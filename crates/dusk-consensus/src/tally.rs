//! Plurality tally with uniform random tie-break.
//!
//! 1. Count how many actors named each target
//! 2. A single target with the highest count wins
//! 3. Several targets sharing the highest count: pick one uniformly at random
//! 4. No entries at all: no decision
//!
//! Actors who never answered are simply absent from the record and do not
//! count towards anything.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use dusk_protocol::PeerName;

/// Random source for tie-breaks. `Some(seed)` makes every draw reproducible.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Actor → declared target, one entry per actor, in first-recorded order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionRecord {
    entries: Vec<(PeerName, PeerName)>,
}

impl DecisionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `actor`'s choice. A second choice from the same actor replaces
    /// the first.
    pub fn record(&mut self, actor: PeerName, target: PeerName) {
        match self.entries.iter_mut().find(|(a, _)| *a == actor) {
            Some(entry) => entry.1 = target,
            None => self.entries.push((actor, target)),
        }
    }

    pub fn get(&self, actor: &PeerName) -> Option<&PeerName> {
        self.entries.iter().find(|(a, _)| a == actor).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerName, &PeerName)> {
        self.entries.iter().map(|(a, t)| (a, t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ballots as JSON values for logs and session history.
    pub fn as_json(&self) -> Vec<serde_json::Value> {
        self.entries
            .iter()
            .map(|(actor, target)| {
                serde_json::json!({
                    "actor": actor.as_str(),
                    "target": target.as_str(),
                })
            })
            .collect()
    }
}

impl FromIterator<(PeerName, PeerName)> for DecisionRecord {
    fn from_iter<I: IntoIterator<Item = (PeerName, PeerName)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (actor, target) in iter {
            record.record(actor, target);
        }
        record
    }
}

/// Details of a resolved tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyResult {
    /// The chosen target.
    pub winner: PeerName,
    /// Votes the winner received.
    pub votes: usize,
    /// Count per target, in first-named order.
    pub tallies: Vec<(PeerName, usize)>,
    /// Every target that reached the top count (one entry when there was no tie).
    pub tied: Vec<PeerName>,
    /// Number of ballots counted.
    pub total_votes: usize,
}

impl TallyResult {
    pub fn was_tie(&self) -> bool {
        self.tied.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyOutcome {
    Decided(TallyResult),
    NoDecision,
}

impl TallyOutcome {
    pub fn winner(&self) -> Option<&PeerName> {
        match self {
            Self::Decided(result) => Some(&result.winner),
            Self::NoDecision => None,
        }
    }
}

/// Resolve `decisions` into a single target.
pub fn tally<R: Rng + ?Sized>(decisions: &DecisionRecord, rng: &mut R) -> TallyOutcome {
    let mut tallies: Vec<(PeerName, usize)> = Vec::new();
    for (_, target) in decisions.iter() {
        match tallies.iter_mut().find(|(t, _)| t == target) {
            Some((_, count)) => *count += 1,
            None => tallies.push((target.clone(), 1)),
        }
    }

    let Some(max_count) = tallies.iter().map(|(_, count)| *count).max() else {
        tracing::debug!("Empty decision record, no decision");
        return TallyOutcome::NoDecision;
    };

    let tied: Vec<PeerName> = tallies
        .iter()
        .filter(|(_, count)| *count == max_count)
        .map(|(target, _)| target.clone())
        .collect();

    let winner = match tied.as_slice() {
        [only] => only.clone(),
        candidates => match candidates.choose(rng) {
            Some(pick) => pick.clone(),
            None => return TallyOutcome::NoDecision,
        },
    };

    tracing::debug!(
        winner = %winner,
        votes = max_count,
        tied = tied.len(),
        total = decisions.len(),
        "Tally resolved"
    );

    TallyOutcome::Decided(TallyResult {
        winner,
        votes: max_count,
        tallies,
        tied,
        total_votes: decisions.len(),
    })
}
