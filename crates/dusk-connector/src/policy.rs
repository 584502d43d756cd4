//! Decision policies for the peer responder.
//!
//! A [`DecisionPolicy`] answers one [`DecisionRequest`] at a time. The
//! [`BaselinePolicy`] is a small rule set with seeded randomness; the
//! [`ExternalPolicy`] asks a child process and falls back to the baseline
//! whenever the process fails, stalls or answers nonsense.
//!
//! External protocol: the request is written to the child's stdin as one JSON
//! object, the child prints one JSON [`Decision`] on stdout and exits.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use dusk_consensus::seeded_rng;
use dusk_protocol::{PeerName, Role};

use crate::config::{PolicyConfig, PolicyKind};

/// What the responder needs decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Self-introduction text for round one.
    Introduction,
    /// Answer to a question from `subject`.
    Answer,
    /// Question to put to `subject`.
    Question,
    /// Whether `text` from `subject` sounds suspicious.
    Judge,
    Vote,
    NightAction,
}

/// Everything a policy gets to see. Built fresh for every decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub kind: DecisionKind,
    pub me: PeerName,
    pub role: Option<Role>,
    pub round: Option<u32>,
    /// Other players believed alive, in table order.
    pub known_peers: Vec<PeerName>,
    #[serde(default)]
    pub suspicion: BTreeMap<PeerName, i32>,
    /// Investigation findings: target → is an Aggressor.
    #[serde(default)]
    pub findings: BTreeMap<PeerName, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<PeerName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DecisionRequest {
    pub fn new(kind: DecisionKind, me: PeerName) -> Self {
        Self {
            kind,
            me,
            role: None,
            round: None,
            known_peers: Vec::new(),
            suspicion: BTreeMap::new(),
            findings: BTreeMap::new(),
            subject: None,
            text: None,
        }
    }

    /// Known peers with the highest positive suspicion score, in table order.
    pub fn most_suspicious(&self) -> Vec<PeerName> {
        let score = |p: &PeerName| self.suspicion.get(p).copied().unwrap_or(0);
        let Some(top) = self.known_peers.iter().map(score).max() else {
            return Vec::new();
        };
        if top <= 0 {
            return Vec::new();
        }
        self.known_peers
            .iter()
            .filter(|p| score(p) == top)
            .cloned()
            .collect()
    }

    /// Known peers an investigation found to be Aggressors.
    pub fn confirmed_aggressors(&self) -> Vec<PeerName> {
        self.known_peers
            .iter()
            .filter(|p| self.findings.get(*p).copied().unwrap_or(false))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Target { target: PeerName },
    Abstain,
    Text { text: String },
    Verdict { suspicious: bool },
}

impl Decision {
    /// Whether this is an acceptable answer to a request of `kind`.
    pub fn answers(&self, kind: DecisionKind) -> bool {
        match (kind, self) {
            (DecisionKind::Vote, Self::Target { .. }) => true,
            (DecisionKind::NightAction, Self::Target { .. } | Self::Abstain) => true,
            (
                DecisionKind::Introduction | DecisionKind::Answer | DecisionKind::Question,
                Self::Text { .. },
            ) => true,
            (DecisionKind::Judge, Self::Verdict { .. }) => true,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Failed to run policy command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Policy command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Policy command exited with {0}")]
    Exit(String),

    #[error("Policy output is not a decision: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Policy answered a {kind:?} request with {got:?}")]
    Mismatch { kind: DecisionKind, got: Decision },
}

/// Strategy behind a peer's choices.
pub trait DecisionPolicy: Send + Sync {
    fn decide<'a>(
        &'a self,
        request: &'a DecisionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Decision, PolicyError>> + Send + 'a>>;

    fn name(&self) -> &'static str;
}

/// Build the policy selected in `config`.
pub fn policy_from_config(config: &PolicyConfig, seed: Option<u64>) -> Arc<dyn DecisionPolicy> {
    let baseline = BaselinePolicy::new(seed);
    match (config.kind, config.command_line()) {
        (PolicyKind::External, Some((program, args))) => {
            Arc::new(ExternalPolicy::new(program, args, config.timeout(), baseline))
        }
        (PolicyKind::External, None) => {
            tracing::warn!("External policy without a command, using baseline");
            Arc::new(baseline)
        }
        (PolicyKind::Baseline, _) => Arc::new(baseline),
    }
}

// ── Baseline ──

const SUSPICIOUS_PHRASES: &[&str] = &[
    "trust me",
    "let me handle",
    "get rid of",
    "quietly",
    "no need to vote",
    "eliminate everyone",
    "not fair",
];

pub struct BaselinePolicy {
    rng: Mutex<StdRng>,
}

impl BaselinePolicy {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: Mutex::new(seeded_rng(seed)),
        }
    }

    fn pick(&self, candidates: &[PeerName]) -> Option<PeerName> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        candidates.choose(&mut *rng).cloned()
    }

    /// Highest suspicion first, then anyone known, then self.
    fn pick_target(&self, request: &DecisionRequest, pool: &[PeerName]) -> PeerName {
        let suspicious: Vec<PeerName> = request
            .most_suspicious()
            .into_iter()
            .filter(|p| pool.contains(p))
            .collect();
        self.pick(&suspicious)
            .or_else(|| self.pick(pool))
            .unwrap_or_else(|| request.me.clone())
    }

    pub fn decide_now(&self, request: &DecisionRequest) -> Decision {
        let me = &request.me;
        match request.kind {
            DecisionKind::Introduction => Decision::Text {
                text: match request.role {
                    // Aggressors pass themselves off as ordinary players.
                    Some(Role::Aggressor) | Some(Role::Bystander) | None => format!(
                        "Hi, I'm {me}. Just an ordinary bystander here, happy to work this out together."
                    ),
                    Some(Role::Investigator) => {
                        format!("Hi, I'm {me}. I'll do my best for the bystanders.")
                    }
                },
            },
            DecisionKind::Answer => Decision::Text {
                text: match request.role {
                    Some(Role::Aggressor) => "Just my opinion, nothing more. No reason to suspect me.".into(),
                    Some(Role::Investigator) => "I only act to keep the table honest.".into(),
                    Some(Role::Bystander) | None => "I'm just an ordinary bystander.".into(),
                },
            },
            DecisionKind::Question => Decision::Text {
                text: match &request.subject {
                    Some(subject) => format!("{subject}, why did you say that?"),
                    None => "Why did you say that?".into(),
                },
            },
            DecisionKind::Judge => {
                let text = request.text.as_deref().unwrap_or_default().to_lowercase();
                Decision::Verdict {
                    suspicious: SUSPICIOUS_PHRASES.iter().any(|phrase| text.contains(phrase)),
                }
            }
            DecisionKind::Vote => {
                let confirmed = request.confirmed_aggressors();
                let target = self
                    .pick(&confirmed)
                    .unwrap_or_else(|| self.pick_target(request, &request.known_peers));
                Decision::Target { target }
            }
            DecisionKind::NightAction => match request.role {
                Some(Role::Aggressor) => Decision::Target {
                    target: self.pick_target(request, &request.known_peers),
                },
                Some(Role::Investigator) => {
                    let unchecked: Vec<PeerName> = request
                        .known_peers
                        .iter()
                        .filter(|p| !request.findings.contains_key(*p))
                        .cloned()
                        .collect();
                    let pool = if unchecked.is_empty() {
                        &request.known_peers
                    } else {
                        &unchecked
                    };
                    Decision::Target {
                        target: self.pick_target(request, pool),
                    }
                }
                Some(Role::Bystander) | None => Decision::Abstain,
            },
        }
    }
}

impl DecisionPolicy for BaselinePolicy {
    fn decide<'a>(
        &'a self,
        request: &'a DecisionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Decision, PolicyError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.decide_now(request)) })
    }

    fn name(&self) -> &'static str {
        "baseline"
    }
}

// ── External process ──

pub struct ExternalPolicy {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    fallback: BaselinePolicy,
}

impl ExternalPolicy {
    pub fn new(program: String, args: Vec<String>, timeout: Duration, fallback: BaselinePolicy) -> Self {
        Self {
            program,
            args,
            timeout,
            fallback,
        }
    }

    /// Run the command once, without falling back.
    pub async fn ask(&self, request: &DecisionRequest) -> Result<Decision, PolicyError> {
        let input = serde_json::to_vec(request)?;
        let output = tokio::time::timeout(self.timeout, self.exchange(&input))
            .await
            .map_err(|_| PolicyError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(PolicyError::Exit(output.status.to_string()));
        }

        let decision: Decision = serde_json::from_slice(&output.stdout)?;
        if !decision.answers(request.kind) {
            return Err(PolicyError::Mismatch {
                kind: request.kind,
                got: decision,
            });
        }
        Ok(decision)
    }

    /// Spawn the child, feed it `input` and collect its output. The child is
    /// killed if this future is dropped.
    async fn exchange(&self, input: &[u8]) -> std::io::Result<std::process::Output> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            stdin.write_all(b"\n").await?;
        }
        child.wait_with_output().await
    }
}

impl DecisionPolicy for ExternalPolicy {
    fn decide<'a>(
        &'a self,
        request: &'a DecisionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Decision, PolicyError>> + Send + 'a>> {
        Box::pin(async move {
            match self.ask(request).await {
                Ok(decision) => Ok(decision),
                Err(e) => {
                    tracing::warn!(
                        program = %self.program,
                        kind = ?request.kind,
                        error = %e,
                        "External policy failed, using baseline"
                    );
                    Ok(self.fallback.decide_now(request))
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "external"
    }
}
