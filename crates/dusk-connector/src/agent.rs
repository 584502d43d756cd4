//! Peer-side responder.
//!
//! [`PeerAgent`] answers every envelope the coordinator (or another peer)
//! sends it. Choices come from its [`DecisionPolicy`]; what it has learned
//! so far (role, who is still around, suspicion scores, investigation
//! findings, dialogue) lives in [`AgentState`].
//!
//! The state lock is never held across an await.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use dusk_network::{CallOutcome, Dispatcher, HandlerError, MessageHandler};
use dusk_protocol::*;

use crate::policy::{Decision, DecisionKind, DecisionPolicy, DecisionRequest};
use crate::shutdown::ShutdownHandle;

/// Suspicion added for text the policy finds suspicious.
const SUSPICION_STEP: i32 = 1;
/// Suspicion added when an investigation confirms an Aggressor.
const CONFIRMED_SUSPICION: i32 = 10;

/// One line of table talk this peer heard or said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueLine {
    pub from: PeerName,
    pub text: String,
    pub round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentState {
    pub role: Option<Role>,
    pub alive: bool,
    /// Other players believed alive, in table order.
    pub known_peers: Vec<PeerName>,
    pub suspicion: BTreeMap<PeerName, i32>,
    pub findings: BTreeMap<PeerName, bool>,
    pub dialogue: Vec<DialogueLine>,
    pub votes_cast: Vec<PeerName>,
    pub round: Option<u32>,
    pub result: Option<GameResultParams>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            role: None,
            alive: true,
            known_peers: Vec::new(),
            suspicion: BTreeMap::new(),
            findings: BTreeMap::new(),
            dialogue: Vec::new(),
            votes_cast: Vec::new(),
            round: None,
            result: None,
        }
    }
}

pub struct PeerAgent {
    name: PeerName,
    coordinator: PeerName,
    policy: Arc<dyn DecisionPolicy>,
    /// Route for peer-to-peer chatter. Without one the agent stays quiet.
    dispatcher: Option<Dispatcher>,
    chat_timeout: Duration,
    shutdown: ShutdownHandle,
    state: Mutex<AgentState>,
}

impl PeerAgent {
    pub fn new(name: PeerName, policy: Arc<dyn DecisionPolicy>, shutdown: ShutdownHandle) -> Self {
        Self {
            name,
            coordinator: PeerName::new(DEFAULT_COORDINATOR_NAME),
            policy,
            dispatcher: None,
            chat_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS / 2),
            shutdown,
            state: Mutex::new(AgentState::default()),
        }
    }

    pub fn with_coordinator(mut self, coordinator: PeerName) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher, chat_timeout: Duration) -> Self {
        self.dispatcher = Some(dispatcher);
        self.chat_timeout = chat_timeout;
        self
    }

    /// Players known before the game starts. Refreshed from later requests.
    pub fn with_known_peers(self, peers: &[PeerName]) -> Self {
        self.state().known_peers = self.others(peers);
        self
    }

    pub fn name(&self) -> &PeerName {
        &self.name
    }

    /// Copy of everything the agent currently believes.
    pub fn snapshot(&self) -> AgentState {
        self.state().clone()
    }

    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn others(&self, peers: &[PeerName]) -> Vec<PeerName> {
        peers
            .iter()
            .filter(|p| **p != self.name && **p != self.coordinator)
            .cloned()
            .collect()
    }

    fn refresh_known(&self, peers: &[PeerName]) {
        if peers.is_empty() {
            return;
        }
        let others = self.others(peers);
        self.state().known_peers = others;
    }

    fn request(&self, kind: DecisionKind) -> DecisionRequest {
        let state = self.state();
        DecisionRequest {
            kind,
            me: self.name.clone(),
            role: state.role,
            round: state.round,
            known_peers: state.known_peers.clone(),
            suspicion: state.suspicion.clone(),
            findings: state.findings.clone(),
            subject: None,
            text: None,
        }
    }

    async fn decide(&self, request: DecisionRequest) -> Option<Decision> {
        match self.policy.decide(&request).await {
            Ok(decision) if decision.answers(request.kind) => Some(decision),
            Ok(decision) => {
                tracing::warn!(
                    peer = %self.name,
                    kind = ?request.kind,
                    decision = ?decision,
                    "Policy answered the wrong question"
                );
                None
            }
            Err(e) => {
                tracing::warn!(peer = %self.name, kind = ?request.kind, error = %e, "Policy failed");
                None
            }
        }
    }

    async fn decide_text(&self, request: DecisionRequest, fallback: impl FnOnce() -> String) -> String {
        match self.decide(request).await {
            Some(Decision::Text { text }) => text,
            _ => fallback(),
        }
    }

    async fn decide_target(&self, request: DecisionRequest) -> Option<PeerName> {
        match self.decide(request).await {
            Some(Decision::Target { target }) => Some(target),
            _ => None,
        }
    }

    /// Record `line`, have the policy judge it, and adjust suspicion of the
    /// speaker. Returns the verdict.
    async fn hear(&self, line: ChatParams) -> bool {
        let speaker = line.from.clone();
        {
            let mut state = self.state();
            let round = state.round;
            state.dialogue.push(DialogueLine {
                from: line.from.clone(),
                text: line.text.clone(),
                round,
            });
        }
        if speaker == self.name {
            return false;
        }

        let mut request = self.request(DecisionKind::Judge);
        request.subject = Some(speaker.clone());
        request.text = Some(line.text);
        let suspicious = matches!(
            self.decide(request).await,
            Some(Decision::Verdict { suspicious: true })
        );

        let mut state = self.state();
        let score = state.suspicion.entry(speaker.clone()).or_insert(0);
        if suspicious {
            *score += SUSPICION_STEP;
        } else if *score > 0 {
            *score -= SUSPICION_STEP;
        }
        tracing::debug!(
            peer = %self.name,
            speaker = %speaker,
            suspicious,
            score = *score,
            "Judged a line"
        );
        suspicious
    }

    fn forget(&self, target: &PeerName) {
        let mut state = self.state();
        state.known_peers.retain(|p| p != target);
        state.suspicion.remove(target);
        if *target == self.name {
            state.alive = false;
            tracing::info!(peer = %self.name, "Eliminated");
        }
    }

    fn ack(kind: MessageType) -> serde_json::Value {
        json!({ "ack": kind.as_str() })
    }

    async fn on_introduction_request(&self, params: IntroductionRequestParams) -> serde_json::Value {
        self.refresh_known(&params.peers);
        let intro = self
            .decide_text(self.request(DecisionKind::Introduction), || {
                format!("Hi, I'm {}.", self.name)
            })
            .await;

        let line = ChatParams {
            from: self.name.clone(),
            text: intro,
        };
        self.state().dialogue.push(DialogueLine {
            from: line.from.clone(),
            text: line.text.clone(),
            round: Some(1),
        });

        if let Some(dispatcher) = &self.dispatcher {
            let others = self.snapshot().known_peers;
            let template = Envelope::new(
                self.name.clone(),
                self.name.clone(),
                Message::IntroductionResponse(line),
            )
            .with_round(1);
            let results = dispatcher.dispatch(&others, &template, self.chat_timeout).await;
            tracing::debug!(
                peer = %self.name,
                delivered = results.response_count(),
                total = results.len(),
                "Introduction shared"
            );
        }

        json!(format!("Hello, I'm {}.", self.name))
    }

    async fn on_discussion_request(&self, params: DiscussionRequestParams) -> serde_json::Value {
        self.refresh_known(&params.alive);
        if !self.state().alive {
            return json!({ "asked": null, "note": "eliminated" });
        }

        let suspects = self.request(DecisionKind::Question).most_suspicious();
        let (Some(subject), Some(dispatcher)) = (suspects.first().cloned(), &self.dispatcher) else {
            return json!({ "asked": null, "suspects": suspects });
        };

        let mut request = self.request(DecisionKind::Question);
        request.subject = Some(subject.clone());
        let question = self
            .decide_text(request, || format!("{subject}, why did you say that?"))
            .await;

        let round = self.state().round;
        let mut envelope = Envelope::new(
            self.name.clone(),
            subject.clone(),
            Message::Question(ChatParams {
                from: self.name.clone(),
                text: question,
            }),
        );
        envelope.round = round;

        let verdict = match dispatcher.dispatch_one(&subject, envelope, self.chat_timeout).await {
            CallOutcome::Response(reply) => match serde_json::from_value::<ChatParams>(reply) {
                Ok(answer) => Some(self.hear(answer).await),
                Err(e) => {
                    tracing::debug!(peer = %self.name, subject = %subject, error = %e, "Unreadable answer");
                    None
                }
            },
            other => {
                tracing::debug!(peer = %self.name, subject = %subject, outcome = other.label(), "Question went unanswered");
                None
            }
        };

        json!({ "asked": subject.as_str(), "suspicious": verdict, "suspects": suspects })
    }

    async fn on_question(&self, params: ChatParams) -> serde_json::Value {
        let asker = params.from.clone();
        {
            let mut state = self.state();
            let round = state.round;
            state.dialogue.push(DialogueLine {
                from: params.from,
                text: params.text.clone(),
                round,
            });
        }

        let mut request = self.request(DecisionKind::Answer);
        request.subject = Some(asker);
        request.text = Some(params.text);
        let answer = self
            .decide_text(request, || "I have nothing to add.".to_string())
            .await;

        json!(ChatParams {
            from: self.name.clone(),
            text: answer,
        })
    }

    async fn on_vote_request(&self, params: VoteRequestParams) -> serde_json::Value {
        self.refresh_known(&params.candidates);
        let target = self
            .decide_target(self.request(DecisionKind::Vote))
            .await
            .unwrap_or_else(|| self.name.clone());
        self.state().votes_cast.push(target.clone());
        tracing::debug!(peer = %self.name, target = %target, "Vote cast");
        json!(VoteResponseParams {
            voter: self.name.clone(),
            target,
        })
    }

    async fn on_night_action_request(&self, params: NightActionRequestParams) -> serde_json::Value {
        let (alive, role) = {
            let state = self.state();
            (state.alive, state.role)
        };
        if !alive || role != Some(params.role) {
            tracing::debug!(
                peer = %self.name,
                asked_for = %params.role,
                "Not my night action, abstaining"
            );
            return json!("");
        }

        self.refresh_known(&params.candidates);
        match self.decide_target(self.request(DecisionKind::NightAction)).await {
            Some(target) => json!({ "target": target.as_str() }),
            None => json!(""),
        }
    }

    fn on_night_action_result(&self, params: InvestigationResultParams) -> serde_json::Value {
        let mut state = self.state();
        state.findings.insert(params.target.clone(), params.is_aggressor);
        if params.is_aggressor {
            *state.suspicion.entry(params.target.clone()).or_insert(0) += CONFIRMED_SUSPICION;
        }
        tracing::info!(
            peer = %self.name,
            target = %params.target,
            is_aggressor = params.is_aggressor,
            "Investigation result"
        );
        Self::ack(MessageType::NightActionResult)
    }

    fn on_game_result(&self, params: GameResultParams) -> serde_json::Value {
        tracing::info!(peer = %self.name, winner = %params.winner, rounds = params.rounds, "Game over");
        self.state().result = Some(params);
        self.shutdown.trigger();
        Self::ack(MessageType::GameResult)
    }

    /// Handle one inbound envelope and produce the reply payload.
    pub async fn respond(&self, envelope: Envelope) -> serde_json::Value {
        let kind = envelope.kind();
        if envelope.round.is_some() {
            self.state().round = envelope.round;
        }
        tracing::debug!(peer = %self.name, from = %envelope.from, kind = %kind, "Inbound message");

        match envelope.message {
            Message::RoleAssigned(params) => {
                tracing::info!(peer = %self.name, role = %params.role, "Role assigned");
                self.state().role = Some(params.role);
                json!(format!("Role set to {}", params.role))
            }
            Message::IntroductionRequest(params) => self.on_introduction_request(params).await,
            Message::IntroductionResponse(params) | Message::QuestionResponse(params) => {
                let suspicious = self.hear(params).await;
                json!({ "ack": kind.as_str(), "suspicious": suspicious })
            }
            Message::DiscussionRequest(params) => self.on_discussion_request(params).await,
            Message::Question(params) => self.on_question(params).await,
            Message::VoteRequest(params) => self.on_vote_request(params).await,
            Message::NightActionRequest(params) => self.on_night_action_request(params).await,
            Message::NightActionResult(params) => self.on_night_action_result(params),
            Message::EliminationResult(params) | Message::EliminationByNightAction(params) => {
                self.forget(&params.target);
                Self::ack(kind)
            }
            Message::GameResult(params) => self.on_game_result(params),
            Message::VoteResponse(_) => {
                tracing::debug!(peer = %self.name, from = %envelope.from, "Ignoring vote response");
                Self::ack(kind)
            }
        }
    }
}

impl MessageHandler for PeerAgent {
    fn handle<'a>(
        &'a self,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.respond(envelope).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::BaselinePolicy;

    fn agent(name: &str) -> PeerAgent {
        PeerAgent::new(
            name.into(),
            Arc::new(BaselinePolicy::new(Some(3))),
            ShutdownHandle::new(),
        )
    }

    fn envelope(to: &str, message: Message) -> Envelope {
        Envelope::new("coordinator".into(), to.into(), message)
    }

    #[tokio::test]
    async fn test_role_assignment_is_stored() {
        let alice = agent("alice");
        alice
            .respond(envelope(
                "alice",
                Message::RoleAssigned(RoleAssignedParams {
                    role: Role::Investigator,
                    briefing: Role::Investigator.briefing().into(),
                }),
            ))
            .await;
        assert_eq!(alice.snapshot().role, Some(Role::Investigator));
    }

    #[tokio::test]
    async fn test_elimination_of_self_marks_dead() {
        let alice = agent("alice").with_known_peers(&["alice".into(), "bob".into()]);
        alice
            .respond(envelope(
                "alice",
                Message::EliminationByNightAction(EliminationParams { target: "alice".into() }),
            ))
            .await;
        let state = alice.snapshot();
        assert!(!state.alive);
        assert_eq!(state.known_peers, vec![PeerName::from("bob")]);
    }

    #[tokio::test]
    async fn test_known_peers_exclude_self_and_coordinator() {
        let alice = agent("alice");
        alice
            .respond(envelope(
                "alice",
                Message::VoteRequest(VoteRequestParams {
                    candidates: vec!["alice".into(), "coordinator".into(), "bob".into()],
                }),
            ))
            .await;
        assert_eq!(alice.snapshot().known_peers, vec![PeerName::from("bob")]);
    }
}
