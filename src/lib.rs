pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::DeskConfig;

pub use adapters::{MemoryAgentStore, SqliteAgentStore, StoreOptions};
pub use core::{
    assignment::RoundRobin, classifier::classify, client::PaymentClient,
    commands::CommandRouter, desk::CashDesk,
};
pub use utils::error::{DeskError, Result};
