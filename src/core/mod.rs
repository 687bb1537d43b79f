pub mod assignment;
pub mod classifier;
pub mod client;
pub mod commands;
pub mod desk;
pub mod dialog;
pub mod report;

pub use crate::domain::model::{
    Agent, AgentCredential, ApiErrorCategory, AssignmentEvent, Classification, Failure, Operation,
    OperationKind, OutboundRequest, Outcome, Receipt,
};
pub use crate::domain::ports::{AgentStore, PaymentGateway};
pub use crate::utils::error::Result;
