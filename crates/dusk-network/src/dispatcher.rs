//! Concurrent fan-out with per-call timeouts.
//!
//! Every target gets its own task. Each call is bounded by the same timeout,
//! so a whole fan-out takes about as long as the slowest reply, capped at one
//! timeout. A silent peer shows up as [`CallOutcome::Timeout`] and never
//! holds up the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use dusk_protocol::{Envelope, PeerName};

use crate::transport::Transport;

/// What happened to one call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Response(serde_json::Value),
    Timeout,
    Unreachable(String),
    Error(String),
}

impl CallOutcome {
    pub fn response(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Response(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Response(_) => "response",
            Self::Timeout => "timeout",
            Self::Unreachable(_) => "unreachable",
            Self::Error(_) => "error",
        }
    }
}

/// One outcome per distinct target, in the order targets were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResults {
    outcomes: Vec<(PeerName, CallOutcome)>,
}

impl DispatchResults {
    pub fn get(&self, target: &PeerName) -> Option<&CallOutcome> {
        self.outcomes.iter().find(|(t, _)| t == target).map(|(_, o)| o)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerName, &CallOutcome)> {
        self.outcomes.iter().map(|(t, o)| (t, o))
    }

    /// Targets that replied, with their payloads.
    pub fn responses(&self) -> impl Iterator<Item = (&PeerName, &serde_json::Value)> {
        self.outcomes
            .iter()
            .filter_map(|(t, o)| o.response().map(|value| (t, value)))
    }

    pub fn response_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_response()).count()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn into_vec(self) -> Vec<(PeerName, CallOutcome)> {
        self.outcomes
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send a copy of `template` to every target, readdressed per target.
    pub async fn dispatch(
        &self,
        targets: &[PeerName],
        template: &Envelope,
        timeout: Duration,
    ) -> DispatchResults {
        self.dispatch_each(targets, |to| template.readdressed(to), timeout)
            .await
    }

    /// Send `build(target)` to every target concurrently.
    ///
    /// Duplicate targets are contacted once. Returns only after every call
    /// has produced an outcome.
    pub async fn dispatch_each<F>(
        &self,
        targets: &[PeerName],
        mut build: F,
        timeout: Duration,
    ) -> DispatchResults
    where
        F: FnMut(&PeerName) -> Envelope,
    {
        let mut seen = HashSet::new();
        let distinct: Vec<PeerName> = targets
            .iter()
            .filter(|t| seen.insert(*t))
            .cloned()
            .collect();

        let handles: Vec<_> = distinct
            .iter()
            .map(|target| {
                let envelope = build(target);
                tokio::spawn(call(
                    Arc::clone(&self.transport),
                    target.clone(),
                    envelope,
                    timeout,
                ))
            })
            .collect();

        let joined = join_all(handles).await;

        let outcomes: Vec<(PeerName, CallOutcome)> = distinct
            .into_iter()
            .zip(joined)
            .map(|(target, result)| {
                let outcome = result
                    .unwrap_or_else(|e| CallOutcome::Error(format!("call task failed: {e}")));
                (target, outcome)
            })
            .collect();

        tracing::debug!(
            targets = outcomes.len(),
            responses = outcomes.iter().filter(|(_, o)| o.is_response()).count(),
            "Fan-out complete"
        );

        DispatchResults { outcomes }
    }

    /// Send one envelope to one target.
    pub async fn dispatch_one(
        &self,
        target: &PeerName,
        envelope: Envelope,
        timeout: Duration,
    ) -> CallOutcome {
        tokio::spawn(call(
            Arc::clone(&self.transport),
            target.clone(),
            envelope,
            timeout,
        ))
        .await
        .unwrap_or_else(|e| CallOutcome::Error(format!("call task failed: {e}")))
    }
}

async fn call(
    transport: Arc<dyn Transport>,
    target: PeerName,
    envelope: Envelope,
    timeout: Duration,
) -> CallOutcome {
    let kind = envelope.kind();
    let outcome = match tokio::time::timeout(timeout, transport.send(&target, envelope)).await {
        Ok(Ok(value)) => CallOutcome::Response(value),
        Ok(Err(e)) if e.is_unreachable() => CallOutcome::Unreachable(e.to_string()),
        Ok(Err(e)) => CallOutcome::Error(e.to_string()),
        Err(_) => CallOutcome::Timeout,
    };

    match &outcome {
        CallOutcome::Response(_) => {
            tracing::trace!(peer = %target, kind = %kind, "Call answered");
        }
        CallOutcome::Timeout => {
            tracing::warn!(
                peer = %target,
                kind = %kind,
                timeout_ms = timeout.as_millis() as u64,
                "Call timed out"
            );
        }
        CallOutcome::Unreachable(reason) | CallOutcome::Error(reason) => {
            tracing::warn!(
                peer = %target,
                kind = %kind,
                outcome = outcome.label(),
                reason = %reason,
                "Call failed"
            );
        }
    }

    outcome
}
