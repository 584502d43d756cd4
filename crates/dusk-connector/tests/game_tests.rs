use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use dusk_connector::*;
use dusk_network::{Dispatcher, HandlerError, LocalTransport, MessageHandler};
use dusk_protocol::*;
use dusk_state::{evaluate, StateError, Verdict};

/// Wraps a peer and remembers every message type it was sent.
struct Recorder {
    agent: Arc<PeerAgent>,
    shutdown: ShutdownHandle,
    seen: Mutex<Vec<MessageType>>,
}

impl Recorder {
    fn count(&self, kind: MessageType) -> usize {
        self.seen.lock().unwrap().iter().filter(|k| **k == kind).count()
    }

    fn total(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl MessageHandler for Recorder {
    fn handle<'a>(
        &'a self,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'a>> {
        self.seen.lock().unwrap().push(envelope.kind());
        self.agent.handle(envelope)
    }
}

struct Table {
    transport: Arc<LocalTransport>,
    names: Vec<PeerName>,
    peers: Vec<Arc<Recorder>>,
}

fn table(players: usize, seed: u64) -> Table {
    let transport = Arc::new(LocalTransport::new());
    let mut names = Vec::new();
    let mut peers = Vec::new();
    for i in 0..players {
        let name = PeerName::new(format!("p{i}"));
        let shutdown = ShutdownHandle::new();
        let agent = PeerAgent::new(
            name.clone(),
            Arc::new(BaselinePolicy::new(Some(seed + i as u64))),
            shutdown.clone(),
        )
        .with_dispatcher(Dispatcher::new(transport.clone()), Duration::from_millis(500));
        let recorder = Arc::new(Recorder {
            agent: Arc::new(agent),
            shutdown,
            seen: Mutex::new(Vec::new()),
        });
        transport.register(name.clone(), recorder.clone());
        names.push(name);
        peers.push(recorder);
    }
    Table {
        transport,
        names,
        peers,
    }
}

fn settings(seed: u64) -> SessionSettings {
    SessionSettings {
        call_timeout: Duration::from_secs(2),
        discussion_window: Duration::ZERO,
        seed: Some(seed),
    }
}

fn session(table: &Table, seed: u64) -> GameSession {
    GameSession::new(
        "coordinator".into(),
        table.names.clone(),
        Dispatcher::new(table.transport.clone()),
        settings(seed),
        ShutdownHandle::new(),
    )
}

#[tokio::test]
async fn test_five_player_game_runs_to_completion() {
    for seed in 0..5 {
        let table = table(5, seed * 100);
        let mut session = session(&table, seed);
        let completion = session.on_complete();

        let outcome = session.run().await.unwrap();

        assert_eq!(session.phase(), Phase::Terminal);
        assert_eq!(session.outcome(), Some(outcome));
        assert_eq!(completion.await.unwrap(), outcome);
        assert_eq!(evaluate(session.directory()), Verdict::Over(outcome.winner));

        assert!(matches!(
            session.events().first(),
            Some(SessionEvent::PhaseEntered { round: 1, phase: Phase::AssignRoles })
        ));
        assert!(session.events().contains(&SessionEvent::RolesAssigned {
            players: 5,
            aggressors: 1,
            investigators: 1,
            bystanders: 3,
        }));
        let game_overs = session
            .events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::GameOver { .. }))
            .count();
        assert_eq!(game_overs, 1);

        for peer in &table.peers {
            assert_eq!(peer.count(MessageType::RoleAssigned), 1);
            assert_eq!(peer.count(MessageType::GameResult), 1);
            let state = peer.agent.snapshot();
            assert_eq!(
                state.result,
                Some(GameResultParams {
                    winner: outcome.winner,
                    rounds: outcome.rounds,
                })
            );
            assert_eq!(state.role, session.directory().role_of(peer.agent.name()));
            assert!(peer.shutdown.is_triggered());
        }
    }
}

#[tokio::test]
async fn test_roles_are_delivered_privately() {
    let table = table(6, 7);
    let mut session = session(&table, 7);

    assert_eq!(session.step().await.unwrap(), Phase::Day);

    let directory = session.directory();
    assert_eq!(directory.len(), 6);
    assert_eq!(directory.count_alive(Role::Aggressor), 2);
    assert_eq!(directory.count_alive(Role::Investigator), 1);
    for peer in &table.peers {
        assert_eq!(peer.total(), 1);
        assert_eq!(
            peer.agent.snapshot().role,
            directory.role_of(peer.agent.name())
        );
    }
}

#[tokio::test]
async fn test_too_few_players_is_fatal_and_silent() {
    let table = table(2, 1);
    let mut session = session(&table, 1);

    let err = session.run().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::State(StateError::InsufficientPlayers { required: 3, actual: 2 })
    ));
    assert!(session.directory().is_empty());
    assert!(session.outcome().is_none());
    for peer in &table.peers {
        assert_eq!(peer.total(), 0);
    }
}

#[tokio::test]
async fn test_coordinator_name_is_not_a_player() {
    let table = table(3, 2);
    let mut names = table.names.clone();
    names.push("coordinator".into());
    let mut session = GameSession::new(
        "coordinator".into(),
        names,
        Dispatcher::new(table.transport.clone()),
        settings(2),
        ShutdownHandle::new(),
    );

    session.step().await.unwrap();
    assert_eq!(session.directory().len(), 3);
    assert!(!session.directory().contains(&"coordinator".into()));
}

#[tokio::test]
async fn test_unreachable_peer_does_not_stall_the_game() {
    let table = table(5, 11);
    table.transport.unregister(&table.names[4]);
    let mut session = session(&table, 11);

    let outcome = tokio::time::timeout(Duration::from_secs(30), session.run())
        .await
        .expect("game should finish")
        .unwrap();

    assert_eq!(evaluate(session.directory()), Verdict::Over(outcome.winner));
    for peer in &table.peers[..4] {
        assert_eq!(peer.count(MessageType::GameResult), 1);
    }
    assert_eq!(table.peers[4].total(), 0);
}

#[tokio::test]
async fn test_external_shutdown_cancels_game() {
    let table = table(5, 3);
    let shutdown = ShutdownHandle::new();
    let mut session = GameSession::new(
        "coordinator".into(),
        table.names.clone(),
        Dispatcher::new(table.transport.clone()),
        settings(3),
        shutdown.clone(),
    );
    shutdown.trigger();

    let err = session.run().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Cancelled { round: 1, phase: Phase::AssignRoles }
    ));
    for peer in &table.peers {
        assert_eq!(peer.total(), 0);
    }
}

#[tokio::test]
async fn test_every_elimination_is_broadcast_to_everyone() {
    let table = table(5, 21);
    let mut session = session(&table, 21);
    session.run().await.unwrap();

    let by_vote = session
        .events()
        .iter()
        .filter(|e| matches!(e, SessionEvent::Eliminated { cause: EliminationCause::Vote, .. }))
        .count();
    let by_night = session
        .events()
        .iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::Eliminated { cause: EliminationCause::NightAction, .. }
            )
        })
        .count();

    for peer in &table.peers {
        assert_eq!(peer.count(MessageType::EliminationResult), by_vote);
        assert_eq!(peer.count(MessageType::EliminationByNightAction), by_night);
    }
}

/// A peer whose decision replies are set by the test. `None` means the peer
/// never answers within any call timeout.
#[derive(Default)]
struct Scripted {
    vote: Mutex<Option<serde_json::Value>>,
    night: Mutex<Option<serde_json::Value>>,
    result_delay: Duration,
    results_answered: AtomicUsize,
    seen: Mutex<Vec<Envelope>>,
}

impl Scripted {
    fn slow_to_finish(delay: Duration) -> Self {
        Self {
            result_delay: delay,
            ..Self::default()
        }
    }

    fn script(&self, vote: Option<serde_json::Value>, night: Option<serde_json::Value>) {
        *self.vote.lock().unwrap() = vote;
        *self.night.lock().unwrap() = night;
    }

    fn received(&self, kind: MessageType) -> Vec<Envelope> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    fn count(&self, kind: MessageType) -> usize {
        self.received(kind).len()
    }
}

impl MessageHandler for Scripted {
    fn handle<'a>(
        &'a self,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            let kind = envelope.kind();
            self.seen.lock().unwrap().push(envelope);

            let scripted = match kind {
                MessageType::VoteRequest => {
                    let reply = self.vote.lock().unwrap().clone();
                    Some(reply)
                }
                MessageType::NightActionRequest => {
                    let reply = self.night.lock().unwrap().clone();
                    Some(reply)
                }
                MessageType::GameResult => {
                    tokio::time::sleep(self.result_delay).await;
                    self.results_answered.fetch_add(1, Ordering::SeqCst);
                    None
                }
                _ => None,
            };

            match scripted {
                Some(Some(reply)) => Ok(reply),
                Some(None) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(serde_json::Value::Null)
                }
                None => Ok(json!({ "ack": kind.as_str() })),
            }
        })
    }
}

struct ScriptedTable {
    transport: Arc<LocalTransport>,
    names: Vec<PeerName>,
    peers: HashMap<PeerName, Arc<Scripted>>,
}

impl ScriptedTable {
    fn new(players: usize, make: impl Fn() -> Scripted) -> Self {
        let transport = Arc::new(LocalTransport::new());
        let mut names = Vec::new();
        let mut peers = HashMap::new();
        for i in 0..players {
            let name = PeerName::new(format!("p{i}"));
            let peer = Arc::new(make());
            transport.register(name.clone(), peer.clone());
            names.push(name.clone());
            peers.insert(name, peer);
        }
        Self {
            transport,
            names,
            peers,
        }
    }

    fn session(&self, call_timeout: Duration, shutdown: ShutdownHandle) -> GameSession {
        GameSession::new(
            "coordinator".into(),
            self.names.clone(),
            Dispatcher::new(self.transport.clone()),
            SessionSettings {
                call_timeout,
                discussion_window: Duration::ZERO,
                seed: Some(5),
            },
            shutdown,
        )
    }
}

fn target(name: &PeerName) -> Option<serde_json::Value> {
    Some(json!({ "target": name.as_str() }))
}

#[tokio::test]
async fn test_night_contract_and_unreadable_ballots() {
    let table = ScriptedTable::new(6, Scripted::default);
    let mut session = table.session(Duration::from_millis(300), ShutdownHandle::new());

    assert_eq!(session.step().await.unwrap(), Phase::Day);
    let aggressors = session.directory().alive_peers(Some(Role::Aggressor));
    let investigators = session.directory().alive_peers(Some(Role::Investigator));
    let bystanders = session.directory().alive_peers(Some(Role::Bystander));
    assert_eq!((aggressors.len(), investigators.len(), bystanders.len()), (2, 1, 3));

    let investigator = investigators[0].clone();
    let voted_out = bystanders[0].clone();
    let killed = bystanders[1].clone();
    let checked = aggressors[0].clone();

    for aggressor in &aggressors {
        table.peers[aggressor].script(target(&voted_out), target(&killed));
    }
    table.peers[&investigator].script(Some(json!(voted_out.as_str())), Some(json!(checked.as_str())));
    // Silent, a bare number, and an object without `target`: none of them count.
    table.peers[&bystanders[0]].script(None, None);
    table.peers[&bystanders[1]].script(Some(json!(42)), target(&investigator));
    table.peers[&bystanders[2]].script(Some(json!({ "vote": voted_out.as_str() })), target(&investigator));

    assert_eq!(session.step().await.unwrap(), Phase::Vote);
    assert_eq!(session.step().await.unwrap(), Phase::Night);
    assert!(session.events().contains(&SessionEvent::Eliminated {
        round: 1,
        target: voted_out.clone(),
        cause: EliminationCause::Vote,
        votes: 3,
        ballots: 3,
    }));
    assert!(!session.directory().is_alive(&voted_out));

    assert_eq!(session.step().await.unwrap(), Phase::CheckEnd);
    assert!(session.events().contains(&SessionEvent::Eliminated {
        round: 1,
        target: killed.clone(),
        cause: EliminationCause::NightAction,
        votes: 2,
        ballots: 2,
    }));
    let is_aggressor = session.directory().role_of(&checked) == Some(Role::Aggressor);
    assert!(is_aggressor);
    assert!(session.events().contains(&SessionEvent::Investigated {
        round: 1,
        investigator: investigator.clone(),
        target: checked.clone(),
        is_aggressor,
    }));

    for bystander in &bystanders {
        assert_eq!(table.peers[bystander].count(MessageType::NightActionRequest), 0);
        assert_eq!(table.peers[bystander].count(MessageType::NightActionResult), 0);
    }
    for aggressor in &aggressors {
        assert_eq!(table.peers[aggressor].count(MessageType::NightActionRequest), 1);
        assert_eq!(table.peers[aggressor].count(MessageType::NightActionResult), 0);
    }
    let findings = table.peers[&investigator].received(MessageType::NightActionResult);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].to, investigator);
    assert_eq!(
        findings[0].message,
        Message::NightActionResult(InvestigationResultParams {
            target: checked.clone(),
            is_aggressor: true,
        })
    );

    // Two aggressors against the investigator and one bystander.
    assert_eq!(session.step().await.unwrap(), Phase::Terminal);
    assert_eq!(session.outcome().map(|o| o.winner), Some(Faction::Aggressor));
}

#[tokio::test]
async fn test_stop_during_final_broadcast_still_finishes_the_game() {
    let table = ScriptedTable::new(3, || Scripted::slow_to_finish(Duration::from_secs(1)));
    let shutdown = ShutdownHandle::new();
    let mut session = table.session(Duration::from_secs(3), shutdown.clone());
    let completion = session.on_complete();

    session.step().await.unwrap();
    let aggressor = session.directory().alive_peers(Some(Role::Aggressor))[0].clone();
    for peer in table.peers.values() {
        peer.script(Some(json!(aggressor.as_str())), Some(json!("")));
    }
    while session.phase() != Phase::CheckEnd {
        session.step().await.unwrap();
    }

    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stopper.trigger();
    });
    let outcome = session.run().await.unwrap();

    assert_eq!(outcome.winner, Faction::Bystander);
    assert_eq!(session.phase(), Phase::Terminal);
    assert_eq!(completion.await.unwrap(), outcome);
    for peer in table.peers.values() {
        assert_eq!(peer.results_answered.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_stop_mid_vote_lets_the_vote_finish() {
    let table = ScriptedTable::new(3, Scripted::default);
    let shutdown = ShutdownHandle::new();
    let mut session = table.session(Duration::from_secs(1), shutdown.clone());

    assert_eq!(session.step().await.unwrap(), Phase::Day);
    let bystander = session.directory().alive_peers(Some(Role::Bystander))[0].clone();
    for (name, peer) in &table.peers {
        if *name == bystander {
            peer.script(None, None);
        } else {
            peer.script(Some(json!(bystander.as_str())), Some(json!("")));
        }
    }
    assert_eq!(session.step().await.unwrap(), Phase::Vote);

    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stopper.trigger();
    });
    let err = session.run().await.unwrap_err();

    assert!(matches!(err, SessionError::Cancelled { round: 1, phase: Phase::Night }));
    assert!(!session.directory().is_alive(&bystander));
    for peer in table.peers.values() {
        assert_eq!(peer.count(MessageType::EliminationResult), 1);
        assert_eq!(peer.count(MessageType::NightActionRequest), 0);
    }
}
