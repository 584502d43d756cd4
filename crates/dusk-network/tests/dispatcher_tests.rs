use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dusk_network::*;
use dusk_protocol::*;

struct Answer(&'static str);

impl MessageHandler for Answer {
    fn handle<'a>(
        &'a self,
        _envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'a>> {
        Box::pin(async move { Ok(serde_json::json!({ "target": self.0 })) })
    }
}

struct Silent;

impl MessageHandler for Silent {
    fn handle<'a>(
        &'a self,
        _envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'a>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(serde_json::Value::Null)
        })
    }
}

struct Failing;

impl MessageHandler for Failing {
    fn handle<'a>(
        &'a self,
        _envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'a>> {
        Box::pin(async { Err(HandlerError::new("cannot decide")) })
    }
}

fn vote_request(candidates: &[&str]) -> Envelope {
    Envelope::new(
        "coordinator".into(),
        "coordinator".into(),
        Message::VoteRequest(VoteRequestParams {
            candidates: candidates.iter().map(|c| PeerName::from(*c)).collect(),
        }),
    )
    .with_round(1)
}

fn names(list: &[&str]) -> Vec<PeerName> {
    list.iter().map(|n| PeerName::from(*n)).collect()
}

#[tokio::test]
async fn test_silent_peer_times_out_without_delaying_others() {
    let transport = Arc::new(LocalTransport::new());
    transport.register("alice".into(), Arc::new(Answer("carol")));
    transport.register("bob".into(), Arc::new(Silent));
    transport.register("carol".into(), Arc::new(Answer("bob")));
    let dispatcher = Dispatcher::new(transport);

    let timeout = Duration::from_millis(200);
    let started = Instant::now();
    let results = dispatcher
        .dispatch(&names(&["alice", "bob", "carol"]), &vote_request(&["alice", "bob", "carol"]), timeout)
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= timeout);
    assert!(elapsed < timeout * 2, "fan-out took {elapsed:?}");

    assert_eq!(results.len(), 3);
    assert_eq!(results.get(&"bob".into()), Some(&CallOutcome::Timeout));
    assert_eq!(results.response_count(), 2);
    let targets: Vec<PeerName> = results
        .responses()
        .map(|(_, reply)| decode_target(reply).unwrap())
        .collect();
    assert_eq!(targets, names(&["carol", "bob"]));
}

#[tokio::test]
async fn test_unknown_peer_is_unreachable() {
    let transport = Arc::new(LocalTransport::new());
    transport.register("alice".into(), Arc::new(Answer("alice")));
    let dispatcher = Dispatcher::new(transport);

    let results = dispatcher
        .dispatch(&names(&["alice", "ghost"]), &vote_request(&[]), Duration::from_millis(200))
        .await;

    assert!(results.get(&"alice".into()).unwrap().is_response());
    assert!(matches!(
        results.get(&"ghost".into()),
        Some(CallOutcome::Unreachable(_))
    ));
}

#[tokio::test]
async fn test_handler_failure_is_error() {
    let transport = Arc::new(LocalTransport::new());
    transport.register("alice".into(), Arc::new(Failing));
    let dispatcher = Dispatcher::new(transport);

    let outcome = dispatcher
        .dispatch_one(&"alice".into(), vote_request(&[]), Duration::from_millis(200))
        .await;
    match outcome {
        CallOutcome::Error(reason) => assert!(reason.contains("cannot decide")),
        other => panic!("expected an error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dispatch_each_builds_per_target() {
    struct EchoRound;

    impl MessageHandler for EchoRound {
        fn handle<'a>(
            &'a self,
            envelope: Envelope,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'a>>
        {
            Box::pin(async move {
                Ok(serde_json::json!({ "to": envelope.to.as_str(), "round": envelope.round }))
            })
        }
    }

    let transport = Arc::new(LocalTransport::new());
    transport.register("alice".into(), Arc::new(EchoRound));
    transport.register("bob".into(), Arc::new(EchoRound));
    let dispatcher = Dispatcher::new(transport);

    let mut round = 0;
    let results = dispatcher
        .dispatch_each(
            &names(&["alice", "bob"]),
            |to| {
                round += 1;
                Envelope::new(
                    "coordinator".into(),
                    to.clone(),
                    Message::EliminationResult(EliminationParams { target: "carol".into() }),
                )
                .with_round(round)
            },
            Duration::from_millis(500),
        )
        .await;

    let alice = results.get(&"alice".into()).unwrap().response().unwrap();
    let bob = results.get(&"bob".into()).unwrap().response().unwrap();
    assert_eq!(alice["to"], "alice");
    assert_eq!(alice["round"], 1);
    assert_eq!(bob["to"], "bob");
    assert_eq!(bob["round"], 2);
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let server = RpcServer::bind("127.0.0.1:0", Arc::new(Answer("dave")), 8)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    let registry = Arc::new(PeerRegistry::new([PeerEntry::new("alice", addr.to_string())]));
    let dispatcher = Dispatcher::new(Arc::new(TcpTransport::new(registry)));

    let outcome = dispatcher
        .dispatch_one(&"alice".into(), vote_request(&["dave"]), Duration::from_secs(2))
        .await;
    let reply = outcome.response().expect("reply over tcp");
    assert_eq!(decode_target(reply).unwrap().as_str(), "dave");

    let _ = stop_tx.send(());
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_tcp_remote_error_is_error() {
    let server = RpcServer::bind("127.0.0.1:0", Arc::new(Failing), 8)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run(std::future::pending::<()>()));

    let registry = Arc::new(PeerRegistry::new([PeerEntry::new("alice", addr.to_string())]));
    let dispatcher = Dispatcher::new(Arc::new(TcpTransport::new(registry)));

    let outcome = dispatcher
        .dispatch_one(&"alice".into(), vote_request(&[]), Duration::from_secs(2))
        .await;
    match outcome {
        CallOutcome::Error(reason) => assert!(reason.contains("cannot decide")),
        other => panic!("expected an error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_tcp_closed_port_is_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry = Arc::new(PeerRegistry::new([PeerEntry::new("alice", addr.to_string())]));
    let dispatcher = Dispatcher::new(Arc::new(TcpTransport::new(registry)));

    let outcome = dispatcher
        .dispatch_one(&"alice".into(), vote_request(&[]), Duration::from_secs(2))
        .await;
    assert!(matches!(outcome, CallOutcome::Unreachable(_)));
}
