use serde::{Deserialize, Serialize};

use crate::constants::{JSONRPC_VERSION, METHOD_PREFIX};
use crate::types::*;
use crate::ProtocolError;

/// Addressed unit of communication between the coordinator and a peer.
///
/// Serializes as a flat JSON object:
/// `{ id, from, to, round?, sent_at, type, payload }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub from: PeerName,
    pub to: PeerName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    pub sent_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    pub fn new(from: PeerName, to: PeerName, message: Message) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from,
            to,
            round: None,
            sent_at: chrono::Utc::now(),
            message,
        }
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    /// Copy of this envelope addressed to `to`, with a fresh id.
    pub fn readdressed(&self, to: &PeerName) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            to: to.clone(),
            ..self.clone()
        }
    }

    pub fn kind(&self) -> MessageType {
        self.message.kind()
    }
}

/// The closed set of game messages, tagged by `type` with a `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    RoleAssigned(RoleAssignedParams),
    IntroductionRequest(IntroductionRequestParams),
    IntroductionResponse(ChatParams),
    DiscussionRequest(DiscussionRequestParams),
    VoteRequest(VoteRequestParams),
    VoteResponse(VoteResponseParams),
    EliminationResult(EliminationParams),
    NightActionRequest(NightActionRequestParams),
    /// Private investigation finding for the Investigator who asked.
    NightActionResult(InvestigationResultParams),
    EliminationByNightAction(EliminationParams),
    GameResult(GameResultParams),
    Question(ChatParams),
    QuestionResponse(ChatParams),
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Self::RoleAssigned(_) => MessageType::RoleAssigned,
            Self::IntroductionRequest(_) => MessageType::IntroductionRequest,
            Self::IntroductionResponse(_) => MessageType::IntroductionResponse,
            Self::DiscussionRequest(_) => MessageType::DiscussionRequest,
            Self::VoteRequest(_) => MessageType::VoteRequest,
            Self::VoteResponse(_) => MessageType::VoteResponse,
            Self::EliminationResult(_) => MessageType::EliminationResult,
            Self::NightActionRequest(_) => MessageType::NightActionRequest,
            Self::NightActionResult(_) => MessageType::NightActionResult,
            Self::EliminationByNightAction(_) => MessageType::EliminationByNightAction,
            Self::GameResult(_) => MessageType::GameResult,
            Self::Question(_) => MessageType::Question,
            Self::QuestionResponse(_) => MessageType::QuestionResponse,
        }
    }
}

// ── Specific Message Payloads ──

/// Private role notice sent once at game start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignedParams {
    pub role: Role,
    pub briefing: String,
}

/// Round-one request to introduce yourself to the other players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntroductionRequestParams {
    /// Players currently alive.
    pub peers: Vec<PeerName>,
}

/// Free-form text between peers (introductions, questions, answers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatParams {
    pub from: PeerName,
    pub text: String,
}

/// Opens the day discussion on rounds after the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionRequestParams {
    pub alive: Vec<PeerName>,
    pub window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRequestParams {
    pub candidates: Vec<PeerName>,
}

/// A ballot. Peers reply to a `VoteRequest` with this payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResponseParams {
    pub voter: PeerName,
    pub target: PeerName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationParams {
    pub target: PeerName,
}

/// Wakes one night actor; `role` is the role the coordinator is asking for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightActionRequestParams {
    pub role: Role,
    pub candidates: Vec<PeerName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResultParams {
    pub target: PeerName,
    pub is_aggressor: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResultParams {
    pub winner: Faction,
    pub rounds: u32,
}

/// Fieldless mirror of [`Message`] for logging and JSON-RPC method names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    RoleAssigned,
    IntroductionRequest,
    IntroductionResponse,
    DiscussionRequest,
    VoteRequest,
    VoteResponse,
    EliminationResult,
    NightActionRequest,
    NightActionResult,
    EliminationByNightAction,
    GameResult,
    Question,
    QuestionResponse,
}

impl MessageType {
    pub const ALL: [MessageType; 13] = [
        Self::RoleAssigned,
        Self::IntroductionRequest,
        Self::IntroductionResponse,
        Self::DiscussionRequest,
        Self::VoteRequest,
        Self::VoteResponse,
        Self::EliminationResult,
        Self::NightActionRequest,
        Self::NightActionResult,
        Self::EliminationByNightAction,
        Self::GameResult,
        Self::Question,
        Self::QuestionResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleAssigned => "game.role_assigned",
            Self::IntroductionRequest => "game.introduction_request",
            Self::IntroductionResponse => "game.introduction_response",
            Self::DiscussionRequest => "game.discussion_request",
            Self::VoteRequest => "game.vote_request",
            Self::VoteResponse => "game.vote_response",
            Self::EliminationResult => "game.elimination_result",
            Self::NightActionRequest => "game.night_action_request",
            Self::NightActionResult => "game.night_action_result",
            Self::EliminationByNightAction => "game.elimination_by_night_action",
            Self::GameResult => "game.game_result",
            Self::Question => "game.question",
            Self::QuestionResponse => "game.question_response",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        if !s.starts_with(METHOD_PREFIX) {
            return None;
        }
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpret a reply payload as a chosen target.
///
/// Accepts a non-empty JSON string or an object with a non-empty `target`
/// string (which covers [`VoteResponseParams`]).
pub fn decode_target(reply: &serde_json::Value) -> Result<PeerName, ProtocolError> {
    let raw = match reply {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(map) => match map.get("target") {
            Some(serde_json::Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(ProtocolError::MalformedResponse(format!(
                    "target is not a string: {other}"
                )))
            }
            None => {
                return Err(ProtocolError::MalformedResponse(
                    "reply object has no target field".into(),
                ))
            }
        },
        other => {
            return Err(ProtocolError::MalformedResponse(format!(
                "expected a target, got {other}"
            )))
        }
    };

    let target = raw.trim();
    if target.is_empty() {
        return Err(ProtocolError::MalformedResponse("empty target (abstained)".into()));
    }
    Ok(PeerName::new(target))
}

// ── JSON-RPC framing ──

/// JSON-RPC 2.0 request frame carrying one [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: envelope.kind().as_str().to_string(),
            id: Some(envelope.id.clone()),
            params: serde_json::to_value(envelope)?,
        })
    }

    /// Decode the carried envelope, checking it against the method name.
    pub fn envelope(&self) -> Result<Envelope, ProtocolError> {
        let kind = MessageType::from_str(&self.method)
            .ok_or_else(|| ProtocolError::UnknownMethod(self.method.clone()))?;
        let envelope: Envelope = serde_json::from_value(self.params.clone())?;
        if envelope.kind() != kind {
            return Err(ProtocolError::MalformedResponse(format!(
                "method {} carries a {} envelope",
                self.method,
                envelope.kind()
            )));
        }
        Ok(envelope)
    }
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<String>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message,
                data: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Standard JSON-RPC error codes.
pub mod rpc_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}
