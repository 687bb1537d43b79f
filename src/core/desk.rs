use crate::core::assignment::{run_blocking, RoundRobin};
use crate::domain::model::{Agent, AgentCredential, Failure, Operation, Outcome, OutboundRequest};
use crate::domain::ports::{AgentStore, PaymentGateway};
use crate::utils::error::Result;
use crate::utils::validation::{normalize_handle, validate_amount};
use std::sync::Arc;

/// Entry point for the command layer: manager administration, routing and
/// deposit/withdrawal submission.
pub struct CashDesk<S, G> {
    store: Arc<S>,
    selector: RoundRobin<S>,
    gateway: G,
}

impl<S, G> CashDesk<S, G>
where
    S: AgentStore + 'static,
    G: PaymentGateway,
{
    pub fn new(store: Arc<S>, gateway: G) -> Self {
        Self {
            selector: RoundRobin::new(Arc::clone(&store)),
            store,
            gateway,
        }
    }

    pub fn with_contention_retries(mut self, retries: u32) -> Self {
        self.selector = self.selector.with_contention_retries(retries);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn add_agent(&self, handle: &str) -> Result<bool> {
        self.add_agent_with_session(handle, None).await
    }

    pub async fn add_agent_with_session(
        &self,
        handle: &str,
        session_handle: Option<&str>,
    ) -> Result<bool> {
        let handle = normalize_handle(handle)?;
        let session = session_handle.map(str::to_string);
        let added = {
            let handle = handle.clone();
            run_blocking(&self.store, move |store| {
                store.add(&handle, session.as_deref())
            })
            .await?
        };

        if added {
            tracing::info!("✅ Manager @{} added", handle);
        } else {
            tracing::info!("Manager @{} already registered", handle);
        }
        Ok(added)
    }

    pub async fn remove_agent(&self, handle: &str) -> Result<bool> {
        let handle = normalize_handle(handle)?;
        let removed = {
            let handle = handle.clone();
            run_blocking(&self.store, move |store| store.remove(&handle)).await?
        };

        if removed {
            tracing::info!("🗑️ Manager @{} removed", handle);
        }
        Ok(removed)
    }

    pub async fn list_agents(&self) -> Result<Vec<String>> {
        run_blocking(&self.store, |store| store.list()).await
    }

    pub async fn agents(&self) -> Result<Vec<Agent>> {
        run_blocking(&self.store, |store| store.agents()).await
    }

    /// The agent registered with this external session, if any.
    pub async fn agent_for_session(&self, session_handle: &str) -> Result<Option<Agent>> {
        let agents = self.agents().await?;
        Ok(agents
            .into_iter()
            .find(|agent| agent.session_handle.as_deref() == Some(session_handle)))
    }

    pub async fn assign_next(&self) -> Result<Option<String>> {
        Ok(self.selector.next().await?.map(|event| event.handle))
    }

    pub async fn set_agent_credential(&self, handle: &str, api_key: &str) -> Result<bool> {
        let handle = normalize_handle(handle)?;
        let api_key = api_key.trim().to_string();
        run_blocking(&self.store, move |store| {
            store.set_credential(&handle, &api_key)
        })
        .await
    }

    pub async fn remove_agent_credential(&self, handle: &str) -> Result<bool> {
        let handle = normalize_handle(handle)?;
        run_blocking(&self.store, move |store| store.remove_credential(&handle)).await
    }

    pub async fn agent_credentials(&self) -> Result<Vec<AgentCredential>> {
        run_blocking(&self.store, |store| store.credentials()).await
    }

    pub async fn submit_deposit(&self, user_id: i64, amount: f64) -> Outcome {
        self.submit(Operation::Deposit { user_id, amount }, None)
            .await
    }

    pub async fn submit_withdrawal(&self, user_id: i64, code: i64) -> Outcome {
        self.submit(Operation::Withdrawal { user_id, code }, None)
            .await
    }

    /// Like [`submit_deposit`](Self::submit_deposit) but signed with the
    /// agent's own API key when one is stored.
    pub async fn submit_deposit_as(&self, handle: &str, user_id: i64, amount: f64) -> Result<Outcome> {
        let credential = self.credential_for(handle).await?;
        Ok(self
            .submit(Operation::Deposit { user_id, amount }, credential)
            .await)
    }

    pub async fn submit_withdrawal_as(&self, handle: &str, user_id: i64, code: i64) -> Result<Outcome> {
        let credential = self.credential_for(handle).await?;
        Ok(self
            .submit(Operation::Withdrawal { user_id, code }, credential)
            .await)
    }

    async fn credential_for(&self, handle: &str) -> Result<Option<String>> {
        let handle = normalize_handle(handle)?;
        run_blocking(&self.store, move |store| store.credential(&handle)).await
    }

    async fn submit(&self, operation: Operation, credential: Option<String>) -> Outcome {
        if let Operation::Deposit { amount, .. } = &operation {
            if let Err(e) = validate_amount(*amount) {
                return Outcome::Failure(Failure::InvalidRequest {
                    reason: e.user_friendly_message(),
                });
            }
        }

        let kind = operation.kind();
        let request = OutboundRequest::new(operation).with_credential(credential);
        let outcome = self.gateway.call(&request).await;
        tracing::info!(
            "{:?} finished: {}",
            kind,
            if outcome.is_success() { "success" } else { "failure" }
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryAgentStore;
    use crate::domain::model::Receipt;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and answers every call with an empty receipt.
    #[derive(Default)]
    struct RecordingGateway {
        seen: Mutex<Vec<OutboundRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn call(&self, request: &OutboundRequest) -> Outcome {
            self.seen.lock().unwrap().push(request.clone());
            Outcome::Success(Receipt {
                id: None,
                amount: None,
                user_id: None,
                cash_id: None,
                extra: Default::default(),
            })
        }
    }

    fn desk() -> CashDesk<MemoryAgentStore, RecordingGateway> {
        CashDesk::new(Arc::new(MemoryAgentStore::new()), RecordingGateway::default())
    }

    #[tokio::test]
    async fn test_handles_are_normalized() {
        let desk = desk();
        assert!(desk.add_agent("@alice").await.unwrap());
        assert!(!desk.add_agent("alice").await.unwrap());
        assert_eq!(desk.list_agents().await.unwrap(), vec!["alice".to_string()]);
        assert!(desk.remove_agent(" @alice ").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_handle_is_rejected() {
        let desk = desk();
        assert!(desk.add_agent("@").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_amount_is_not_sent() {
        let desk = desk();
        let outcome = desk.submit_deposit(42, -10.0).await;

        assert!(matches!(
            outcome,
            Outcome::Failure(Failure::InvalidRequest { .. })
        ));
        assert!(desk.gateway.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agent_credential_is_threaded_into_request() {
        let desk = desk();
        desk.add_agent("alice").await.unwrap();
        desk.add_agent("bob").await.unwrap();
        desk.set_agent_credential("alice", "alice-key").await.unwrap();

        desk.submit_withdrawal_as("alice", 42, 1234).await.unwrap();
        desk.submit_deposit_as("bob", 42, 100.0).await.unwrap();

        let seen = desk.gateway.seen.lock().unwrap();
        assert_eq!(seen[0].credential.as_deref(), Some("alice-key"));
        assert_eq!(seen[1].credential, None);
    }

    #[tokio::test]
    async fn test_agent_for_session() {
        let desk = desk();
        desk.add_agent_with_session("alice", Some("1001"))
            .await
            .unwrap();

        let agent = desk.agent_for_session("1001").await.unwrap().unwrap();
        assert_eq!(agent.handle, "alice");
        assert!(desk.agent_for_session("2002").await.unwrap().is_none());
    }
}
