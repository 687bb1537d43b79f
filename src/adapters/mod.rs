// Adapters layer: concrete storage backends behind `domain::ports::AgentStore`.

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryAgentStore;
pub use sqlite_store::{SqliteAgentStore, StoreOptions};
