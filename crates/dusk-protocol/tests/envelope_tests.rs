use dusk_protocol::*;

fn wire(message: Message) -> serde_json::Value {
    let envelope = Envelope::new("coordinator".into(), "alice".into(), message).with_round(2);
    serde_json::to_value(&envelope).unwrap()
}

#[test]
fn test_payload_shapes() {
    let json = wire(Message::RoleAssigned(RoleAssignedParams {
        role: Role::Investigator,
        briefing: "b".into(),
    }));
    assert_eq!(json["type"], "RoleAssigned");
    assert_eq!(json["payload"]["role"], "investigator");
    assert_eq!(json["round"], 2);

    let json = wire(Message::NightActionResult(InvestigationResultParams {
        target: "bob".into(),
        is_aggressor: true,
    }));
    assert_eq!(json["type"], "NightActionResult");
    assert_eq!(json["payload"], serde_json::json!({ "target": "bob", "is_aggressor": true }));

    let json = wire(Message::GameResult(GameResultParams {
        winner: Faction::Aggressor,
        rounds: 4,
    }));
    assert_eq!(json["payload"], serde_json::json!({ "winner": "aggressor", "rounds": 4 }));

    let json = wire(Message::DiscussionRequest(DiscussionRequestParams {
        alive: vec!["alice".into(), "bob".into()],
        window_ms: 15_000,
    }));
    assert_eq!(json["payload"]["alive"], serde_json::json!(["alice", "bob"]));
    assert_eq!(json["payload"]["window_ms"], 15_000);
}

#[test]
fn test_envelope_from_foreign_json() {
    let raw = r#"{
        "id": "abc",
        "from": "coordinator",
        "to": "carol",
        "sent_at": "2024-05-01T12:00:00Z",
        "type": "VoteRequest",
        "payload": { "candidates": ["alice", "carol"] }
    }"#;
    let envelope: Envelope = serde_json::from_str(raw).unwrap();
    assert_eq!(envelope.round, None);
    assert_eq!(envelope.kind(), MessageType::VoteRequest);
    let Message::VoteRequest(params) = envelope.message else {
        panic!("expected a vote request");
    };
    assert_eq!(params.candidates.len(), 2);
}

#[test]
fn test_unknown_type_is_rejected() {
    let raw = r#"{
        "id": "abc", "from": "a", "to": "b", "sent_at": "2024-05-01T12:00:00Z",
        "type": "Dance", "payload": {}
    }"#;
    assert!(serde_json::from_str::<Envelope>(raw).is_err());
}

#[test]
fn test_every_method_name_is_prefixed() {
    for kind in MessageType::ALL {
        assert!(kind.as_str().starts_with("game."));
        assert_eq!(MessageType::from_str(kind.as_str()), Some(kind));
    }
    assert_eq!(MessageType::from_str("swarm.vote_request"), None);
}
