//! The authoritative game loop.
//!
//! ```text
//! AssignRoles -> Day -> Vote -> Night -> CheckEnd -+-> Terminal
//!                 ^                                |
//!                 +--------- round += 1 -----------+
//! ```
//!
//! The session owns the [`PeerDirectory`] outright. Every phase asks the
//! directory who is eligible, fans a request out through the
//! [`Dispatcher`], waits for the whole group to settle, and only then
//! mutates the directory. A peer that is slow, silent, unreachable or talks
//! nonsense is left out of that phase's decision; only a broken table at
//! `AssignRoles` aborts the game.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::oneshot;

use dusk_consensus::{seeded_rng, tally, DecisionRecord, TallyOutcome};
use dusk_network::{CallOutcome, DispatchResults, Dispatcher};
use dusk_protocol::*;
use dusk_state::{assign_roles, evaluate, PeerDirectory, StateError, Verdict};

use crate::config::GameConfig;
use crate::shutdown::ShutdownHandle;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("Game cancelled in round {round} during {phase}")]
    Cancelled { round: u32, phase: Phase },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AssignRoles,
    Day,
    Vote,
    Night,
    CheckEnd,
    Terminal,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssignRoles => "assign_roles",
            Self::Day => "day",
            Self::Vote => "vote",
            Self::Night => "night",
            Self::CheckEnd => "check_end",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationCause {
    Vote,
    NightAction,
}

/// Timeline entry kept for the live run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    RolesAssigned {
        players: usize,
        aggressors: usize,
        investigators: usize,
        bystanders: usize,
    },
    PhaseEntered {
        round: u32,
        phase: Phase,
    },
    Eliminated {
        round: u32,
        target: PeerName,
        cause: EliminationCause,
        votes: usize,
        ballots: usize,
    },
    NoElimination {
        round: u32,
        cause: EliminationCause,
        reason: String,
    },
    Investigated {
        round: u32,
        investigator: PeerName,
        target: PeerName,
        is_aggressor: bool,
    },
    GameOver {
        round: u32,
        winner: Faction,
    },
}

/// Timing and randomness knobs for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub call_timeout: Duration,
    pub discussion_window: Duration,
    pub seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&GameConfig::default())
    }
}

impl From<&GameConfig> for SessionSettings {
    fn from(config: &GameConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            discussion_window: config.discussion_window(),
            seed: config.seed,
        }
    }
}

/// One game, owned end to end by the coordinator.
///
/// Holds the peer directory, the current phase and round, and the rng used
/// for role shuffling and tie-breaks. Drive it with [`GameSession::run`], or
/// one phase at a time with [`GameSession::step`].
pub struct GameSession {
    /// The coordinator's own name, reserved and never a player.
    name: PeerName,
    /// Discovered peer names, in discovery order.
    candidates: Vec<PeerName>,
    directory: PeerDirectory,
    phase: Phase,
    round: u32,
    rng: StdRng,
    dispatcher: Dispatcher,
    settings: SessionSettings,
    events: Vec<SessionEvent>,
    outcome: Option<GameOutcome>,
    completion: Option<oneshot::Sender<GameOutcome>>,
    shutdown: ShutdownHandle,
}

impl GameSession {
    /// Create a session that will seat `candidates`, skipping `name`
    /// (the coordinator itself). Nothing is sent until the first step.
    pub fn new(
        name: PeerName,
        candidates: Vec<PeerName>,
        dispatcher: Dispatcher,
        settings: SessionSettings,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            directory: PeerDirectory::new(name.clone()),
            name,
            candidates,
            phase: Phase::AssignRoles,
            round: 1,
            rng: seeded_rng(settings.seed),
            dispatcher,
            settings,
            events: Vec::new(),
            outcome: None,
            completion: None,
            shutdown,
        }
    }

    /// Receiver that resolves with the outcome once the game ends.
    pub fn on_complete(&mut self) -> oneshot::Receiver<GameOutcome> {
        let (tx, rx) = oneshot::channel();
        self.completion = Some(tx);
        rx
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        self.outcome
    }

    /// Drive the game to its end.
    ///
    /// An external stop is honoured between phases only: a phase that has
    /// started always finishes, so eliminations and the final result are
    /// never half-announced. Stops with [`SessionError::Cancelled`] if the
    /// shutdown hook fires before the game is decided.
    pub async fn run(&mut self) -> Result<GameOutcome, SessionError> {
        loop {
            if let Some(outcome) = self.outcome {
                return Ok(outcome);
            }
            if self.shutdown.is_triggered() {
                return Err(self.cancelled());
            }
            self.step().await?;
        }
    }

    fn cancelled(&self) -> SessionError {
        tracing::warn!(round = self.round, phase = %self.phase, "Game cancelled");
        SessionError::Cancelled {
            round: self.round,
            phase: self.phase,
        }
    }

    /// Run the current phase and move to the next one.
    pub async fn step(&mut self) -> Result<Phase, SessionError> {
        if self.phase != Phase::Terminal {
            tracing::info!(round = self.round, phase = %self.phase, "Phase entered");
            self.events.push(SessionEvent::PhaseEntered {
                round: self.round,
                phase: self.phase,
            });
        }

        self.phase = match self.phase {
            Phase::AssignRoles => {
                self.assign().await?;
                Phase::Day
            }
            Phase::Day => {
                self.day().await;
                Phase::Vote
            }
            Phase::Vote => {
                self.vote().await;
                Phase::Night
            }
            Phase::Night => {
                self.night().await;
                Phase::CheckEnd
            }
            Phase::CheckEnd => self.check_end().await,
            Phase::Terminal => Phase::Terminal,
        };
        Ok(self.phase)
    }

    fn envelope(&self, to: &PeerName, message: Message) -> Envelope {
        Envelope::new(self.name.clone(), to.clone(), message).with_round(self.round)
    }

    async fn broadcast(&self, targets: &[PeerName], message: Message) -> DispatchResults {
        let template = self.envelope(&self.name, message);
        let results = self
            .dispatcher
            .dispatch(targets, &template, self.settings.call_timeout)
            .await;
        for (peer, outcome) in results.iter().filter(|(_, o)| !o.is_response()) {
            tracing::warn!(
                peer = %peer,
                kind = %template.kind(),
                outcome = outcome.label(),
                "Notice not delivered"
            );
        }
        results
    }

    /// Turn replies into a decision record. Anything that is not a readable
    /// target is left out, exactly like a timeout.
    fn collect(&self, results: &DispatchResults) -> DecisionRecord {
        let mut record = DecisionRecord::new();
        for (actor, outcome) in results.iter() {
            match outcome {
                CallOutcome::Response(reply) => match decode_target(reply) {
                    Ok(target) => record.record(actor.clone(), target),
                    Err(e) => {
                        tracing::warn!(peer = %actor, error = %e, "Malformed decision, ignoring");
                    }
                },
                other => {
                    tracing::debug!(peer = %actor, outcome = other.label(), "No decision from peer");
                }
            }
        }
        record
    }

    async fn assign(&mut self) -> Result<(), SessionError> {
        let assignment = match assign_roles(&self.candidates, &self.name, &mut self.rng) {
            Ok(assignment) => assignment,
            Err(e) => {
                tracing::error!(error = %e, candidates = self.candidates.len(), "Cannot start game");
                return Err(e.into());
            }
        };
        assignment.apply(&mut self.directory)?;

        let counts = assignment.counts();
        self.events.push(SessionEvent::RolesAssigned {
            players: assignment.len(),
            aggressors: counts.aggressors,
            investigators: counts.investigators,
            bystanders: counts.bystanders,
        });

        let roles: HashMap<PeerName, Role> = assignment.entries().iter().cloned().collect();
        let players = self.directory.all_peers();
        let results = self
            .dispatcher
            .dispatch_each(
                &players,
                |to| {
                    let role = roles.get(to).copied().unwrap_or(Role::Bystander);
                    self.envelope(
                        to,
                        Message::RoleAssigned(RoleAssignedParams {
                            role,
                            briefing: role.briefing().to_string(),
                        }),
                    )
                },
                self.settings.call_timeout,
            )
            .await;

        for (peer, outcome) in results.iter().filter(|(_, o)| !o.is_response()) {
            tracing::warn!(peer = %peer, outcome = outcome.label(), "Role notice not delivered");
        }
        Ok(())
    }

    async fn day(&mut self) {
        let alive = self.directory.alive_peers(None);
        if self.round == 1 {
            let results = self
                .broadcast(
                    &alive,
                    Message::IntroductionRequest(IntroductionRequestParams {
                        peers: alive.clone(),
                    }),
                )
                .await;
            tracing::info!(
                round = self.round,
                introduced = results.response_count(),
                alive = alive.len(),
                "Introductions done"
            );
        } else {
            let window = self.settings.discussion_window;
            self.broadcast(
                &alive,
                Message::DiscussionRequest(DiscussionRequestParams {
                    alive: alive.clone(),
                    window_ms: window.as_millis() as u64,
                }),
            )
            .await;
            tracing::info!(round = self.round, window_ms = window.as_millis() as u64, "Discussion window");
            // A stop ends the window early; the phase itself still completes.
            tokio::select! {
                _ = tokio::time::sleep(window) => {}
                _ = self.shutdown.wait() => {
                    tracing::info!(round = self.round, "Discussion window cut short");
                }
            }
        }
    }

    async fn vote(&mut self) {
        let alive = self.directory.alive_peers(None);
        let template = self.envelope(
            &self.name,
            Message::VoteRequest(VoteRequestParams {
                candidates: alive.clone(),
            }),
        );
        let results = self
            .dispatcher
            .dispatch(&alive, &template, self.settings.call_timeout)
            .await;
        let ballots = self.collect(&results);
        tracing::info!(round = self.round, ballots = ballots.len(), voters = alive.len(), "Votes collected");

        let outcome = tally(&ballots, &mut self.rng);
        self.resolve_elimination(outcome, EliminationCause::Vote).await;
    }

    async fn night(&mut self) {
        let candidates = self.directory.alive_peers(None);
        let aggressors = self.directory.alive_peers(Some(Role::Aggressor));
        let investigators = self.directory.alive_peers(Some(Role::Investigator));

        let actors: Vec<PeerName> = aggressors.iter().chain(investigators.iter()).cloned().collect();
        let results = self
            .dispatcher
            .dispatch_each(
                &actors,
                |to| {
                    let role = if aggressors.contains(to) {
                        Role::Aggressor
                    } else {
                        Role::Investigator
                    };
                    self.envelope(
                        to,
                        Message::NightActionRequest(NightActionRequestParams {
                            role,
                            candidates: candidates.clone(),
                        }),
                    )
                },
                self.settings.call_timeout,
            )
            .await;
        let decisions = self.collect(&results);

        let kills: DecisionRecord = decisions
            .iter()
            .filter(|(actor, _)| aggressors.contains(actor))
            .map(|(actor, target)| (actor.clone(), target.clone()))
            .collect();
        let outcome = tally(&kills, &mut self.rng);
        self.resolve_elimination(outcome, EliminationCause::NightAction).await;

        let mut findings: HashMap<PeerName, InvestigationResultParams> = HashMap::new();
        for (investigator, target) in decisions.iter().filter(|(a, _)| investigators.contains(a)) {
            let is_aggressor = self.directory.role_of(target) == Some(Role::Aggressor);
            tracing::info!(
                round = self.round,
                investigator = %investigator,
                target = %target,
                is_aggressor,
                "Investigation resolved"
            );
            self.events.push(SessionEvent::Investigated {
                round: self.round,
                investigator: investigator.clone(),
                target: target.clone(),
                is_aggressor,
            });
            findings.insert(
                investigator.clone(),
                InvestigationResultParams {
                    target: target.clone(),
                    is_aggressor,
                },
            );
        }

        if !findings.is_empty() {
            let recipients: Vec<PeerName> = investigators
                .iter()
                .filter(|i| findings.contains_key(*i))
                .cloned()
                .collect();
            let results = self
                .dispatcher
                .dispatch_each(
                    &recipients,
                    |to| {
                        let finding = findings.get(to).cloned().unwrap_or(InvestigationResultParams {
                            target: to.clone(),
                            is_aggressor: false,
                        });
                        self.envelope(to, Message::NightActionResult(finding))
                    },
                    self.settings.call_timeout,
                )
                .await;
            for (peer, outcome) in results.iter().filter(|(_, o)| !o.is_response()) {
                tracing::warn!(peer = %peer, outcome = outcome.label(), "Investigation result not delivered");
            }
        }
    }

    /// Apply a tally: eliminate the winner if it is a living player and tell
    /// everyone, living or not.
    async fn resolve_elimination(&mut self, outcome: TallyOutcome, cause: EliminationCause) {
        let result = match outcome {
            TallyOutcome::Decided(result) => result,
            TallyOutcome::NoDecision => {
                self.no_elimination(cause, "no decisions received".to_string());
                return;
            }
        };

        let target = result.winner.clone();
        if !self.directory.contains(&target) {
            self.no_elimination(cause, format!("{target} is not a player"));
            return;
        }
        if !self.directory.is_alive(&target) {
            self.no_elimination(cause, format!("{target} is already eliminated"));
            return;
        }

        self.directory.eliminate(&target);
        tracing::info!(
            round = self.round,
            target = %target,
            cause = ?cause,
            votes = result.votes,
            ballots = result.total_votes,
            tie = result.was_tie(),
            "Player eliminated"
        );
        self.events.push(SessionEvent::Eliminated {
            round: self.round,
            target: target.clone(),
            cause,
            votes: result.votes,
            ballots: result.total_votes,
        });

        let params = EliminationParams { target };
        let message = match cause {
            EliminationCause::Vote => Message::EliminationResult(params),
            EliminationCause::NightAction => Message::EliminationByNightAction(params),
        };
        let everyone = self.directory.all_peers();
        self.broadcast(&everyone, message).await;
    }

    fn no_elimination(&mut self, cause: EliminationCause, reason: String) {
        tracing::info!(round = self.round, cause = ?cause, reason = %reason, "No elimination");
        self.events.push(SessionEvent::NoElimination {
            round: self.round,
            cause,
            reason,
        });
    }

    async fn check_end(&mut self) -> Phase {
        let Verdict::Over(winner) = evaluate(&self.directory) else {
            self.round += 1;
            return Phase::Day;
        };

        let outcome = GameOutcome {
            winner,
            rounds: self.round,
        };
        self.outcome = Some(outcome);
        tracing::info!(round = self.round, winner = %winner, "Game over");
        self.events.push(SessionEvent::GameOver {
            round: self.round,
            winner,
        });

        let everyone = self.directory.all_peers();
        self.broadcast(
            &everyone,
            Message::GameResult(GameResultParams {
                winner,
                rounds: self.round,
            }),
        )
        .await;

        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
        self.shutdown.trigger();
        Phase::Terminal
    }
}
