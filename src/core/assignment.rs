use crate::domain::model::AssignmentEvent;
use crate::domain::ports::AgentStore;
use crate::utils::error::Result;
use std::sync::Arc;

pub const DEFAULT_CONTENTION_RETRIES: u32 = 3;

/// Runs a blocking store call on tokio's blocking pool.
pub(crate) async fn run_blocking<S, T, F>(store: &Arc<S>, f: F) -> Result<T>
where
    S: AgentStore + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref())).await?
}

/// Least-loaded round robin. All state lives in the store, so routing
/// survives restarts and is shared by every instance using the same store.
pub struct RoundRobin<S> {
    store: Arc<S>,
    contention_retries: u32,
}

impl<S: AgentStore + 'static> RoundRobin<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            contention_retries: DEFAULT_CONTENTION_RETRIES,
        }
    }

    pub fn with_contention_retries(mut self, retries: u32) -> Self {
        self.contention_retries = retries;
        self
    }

    /// `Ok(None)` means nobody is registered.
    pub async fn next(&self) -> Result<Option<AssignmentEvent>> {
        let mut attempt = 0;
        loop {
            match run_blocking(&self.store, |store| store.pick_and_increment()).await {
                Err(e) if e.is_retryable() && attempt < self.contention_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Agent store busy, retrying selection ({}/{}): {}",
                        attempt,
                        self.contention_retries,
                        e
                    );
                }
                Ok(Some(event)) => {
                    tracing::info!(
                        "🎯 Routed to @{} (assignments: {})",
                        event.handle,
                        event.assignment_count
                    );
                    return Ok(Some(event));
                }
                Ok(None) => {
                    tracing::warn!("No managers registered, nothing to route to");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Agent, AgentCredential};
    use crate::utils::error::DeskError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports contention a fixed number of times before answering.
    struct FlakyStore {
        busy_left: AtomicU32,
    }

    impl AgentStore for FlakyStore {
        fn add(&self, _handle: &str, _session: Option<&str>) -> Result<bool> {
            Ok(true)
        }
        fn remove(&self, _handle: &str) -> Result<bool> {
            Ok(true)
        }
        fn list(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn agents(&self) -> Result<Vec<Agent>> {
            Ok(vec![])
        }
        fn pick_and_increment(&self) -> Result<Option<AssignmentEvent>> {
            if self.busy_left.load(Ordering::SeqCst) > 0 {
                self.busy_left.fetch_sub(1, Ordering::SeqCst);
                return Err(DeskError::ContentionError {
                    message: "database is locked".to_string(),
                });
            }
            Ok(Some(AssignmentEvent {
                handle: "a".to_string(),
                assignment_count: 1,
            }))
        }
        fn set_credential(&self, _handle: &str, _api_key: &str) -> Result<bool> {
            Ok(false)
        }
        fn credential(&self, _handle: &str) -> Result<Option<String>> {
            Ok(None)
        }
        fn remove_credential(&self, _handle: &str) -> Result<bool> {
            Ok(false)
        }
        fn credentials(&self) -> Result<Vec<AgentCredential>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_contention_is_retried() {
        let store = Arc::new(FlakyStore {
            busy_left: AtomicU32::new(2),
        });
        let selector = RoundRobin::new(store).with_contention_retries(3);

        let event = selector.next().await.unwrap().unwrap();
        assert_eq!(event.handle, "a");
    }

    #[tokio::test]
    async fn test_contention_surfaces_after_retries() {
        let store = Arc::new(FlakyStore {
            busy_left: AtomicU32::new(5),
        });
        let selector = RoundRobin::new(store).with_contention_retries(1);

        let err = selector.next().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
