use crate::domain::model::{Agent, AgentCredential, AssignmentEvent, Outcome, OutboundRequest};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Durable table of agents and their load counters.
///
/// Calls block on storage; async callers run them on the blocking pool.
pub trait AgentStore: Send + Sync {
    /// Returns `false` without touching the table when the handle exists.
    fn add(&self, handle: &str, session_handle: Option<&str>) -> Result<bool>;

    fn remove(&self, handle: &str) -> Result<bool>;

    /// Handles in insertion order.
    fn list(&self) -> Result<Vec<String>>;

    fn agents(&self) -> Result<Vec<Agent>>;

    /// Picks the least-loaded agent (oldest first on ties) and bumps its
    /// counter by one as a single atomic unit.
    fn pick_and_increment(&self) -> Result<Option<AssignmentEvent>>;

    /// Returns `false` when no agent with this handle exists.
    fn set_credential(&self, handle: &str, api_key: &str) -> Result<bool>;

    fn credential(&self, handle: &str) -> Result<Option<String>>;

    fn remove_credential(&self, handle: &str) -> Result<bool>;

    fn credentials(&self) -> Result<Vec<AgentCredential>>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Never fails: every fault is folded into `Outcome::Failure`.
    async fn call(&self, request: &OutboundRequest) -> Outcome;
}
