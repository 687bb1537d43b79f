use crate::domain::model::{Agent, AgentCredential, AssignmentEvent};
use crate::domain::ports::AgentStore;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MemoryState {
    // Insertion order doubles as the tie-break key.
    agents: Vec<Agent>,
    credentials: HashMap<String, (String, DateTime<Utc>)>,
}

/// Process-local agent table, used for tests and for running without a
/// database file. One mutex guards the whole table so selection and
/// increment happen together.
#[derive(Default)]
pub struct MemoryAgentStore {
    state: Mutex<MemoryState>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AgentStore for MemoryAgentStore {
    fn add(&self, handle: &str, session_handle: Option<&str>) -> Result<bool> {
        let mut state = self.state();
        if state.agents.iter().any(|agent| agent.handle == handle) {
            return Ok(false);
        }
        state.agents.push(Agent {
            handle: handle.to_string(),
            session_handle: session_handle.map(str::to_string),
            assignment_count: 0,
        });
        Ok(true)
    }

    fn remove(&self, handle: &str) -> Result<bool> {
        let mut state = self.state();
        let before = state.agents.len();
        state.agents.retain(|agent| agent.handle != handle);
        let removed = state.agents.len() < before;
        if removed {
            state.credentials.remove(handle);
        }
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .state()
            .agents
            .iter()
            .map(|agent| agent.handle.clone())
            .collect())
    }

    fn agents(&self) -> Result<Vec<Agent>> {
        Ok(self.state().agents.clone())
    }

    fn pick_and_increment(&self) -> Result<Option<AssignmentEvent>> {
        let mut state = self.state();
        // min_by_key keeps the first of equal minimums: oldest wins.
        let picked = state
            .agents
            .iter_mut()
            .min_by_key(|agent| agent.assignment_count);

        Ok(picked.map(|agent| {
            agent.assignment_count += 1;
            AssignmentEvent {
                handle: agent.handle.clone(),
                assignment_count: agent.assignment_count,
            }
        }))
    }

    fn set_credential(&self, handle: &str, api_key: &str) -> Result<bool> {
        let mut state = self.state();
        if !state.agents.iter().any(|agent| agent.handle == handle) {
            return Ok(false);
        }
        state
            .credentials
            .insert(handle.to_string(), (api_key.to_string(), Utc::now()));
        Ok(true)
    }

    fn credential(&self, handle: &str) -> Result<Option<String>> {
        Ok(self
            .state()
            .credentials
            .get(handle)
            .map(|(api_key, _)| api_key.clone()))
    }

    fn remove_credential(&self, handle: &str) -> Result<bool> {
        Ok(self.state().credentials.remove(handle).is_some())
    }

    fn credentials(&self) -> Result<Vec<AgentCredential>> {
        let state = self.state();
        Ok(state
            .agents
            .iter()
            .filter_map(|agent| {
                state
                    .credentials
                    .get(&agent.handle)
                    .map(|(api_key, created_at)| AgentCredential {
                        handle: agent.handle.clone(),
                        api_key: api_key.clone(),
                        created_at: *created_at,
                    })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_break_by_insertion_order() {
        let store = MemoryAgentStore::new();
        store.add("a", None).unwrap();
        store.add("b", None).unwrap();

        assert_eq!(store.pick_and_increment().unwrap().unwrap().handle, "a");
        assert_eq!(store.pick_and_increment().unwrap().unwrap().handle, "b");
        assert_eq!(store.pick_and_increment().unwrap().unwrap().handle, "a");
    }

    #[test]
    fn test_remove_drops_credential() {
        let store = MemoryAgentStore::new();
        store.add("a", None).unwrap();
        assert!(store.set_credential("a", "secret").unwrap());

        assert!(store.remove("a").unwrap());
        assert!(store.credential("a").unwrap().is_none());
        assert!(!store.set_credential("a", "secret").unwrap());
    }
}
