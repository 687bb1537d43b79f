use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A manager eligible for routed work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub handle: String,
    pub session_handle: Option<String>,
    pub assignment_count: u64,
}

/// Result of one selection: the chosen agent and its counter after the increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentEvent {
    pub handle: String,
    pub assignment_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCredential {
    pub handle: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Deposit,
    Withdrawal,
}

impl OperationKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Deposit { user_id: i64, amount: f64 },
    Withdrawal { user_id: i64, code: i64 },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Deposit { .. } => OperationKind::Deposit,
            Operation::Withdrawal { .. } => OperationKind::Withdrawal,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Operation::Deposit { user_id, amount } => json!({ "userId": user_id, "amount": amount }),
            Operation::Withdrawal { user_id, code } => json!({ "userId": user_id, "code": code }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub operation: Operation,
    /// Overrides the client's shared API key for this call.
    pub credential: Option<String>,
}

impl OutboundRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }
}

/// Success payload of a deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: Option<Value>,
    pub amount: Option<Value>,
    pub user_id: Option<Value>,
    pub cash_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCategory {
    AmountOutOfRange,
    DuplicateActiveDeposit,
    FeeTooHigh,
    WithdrawalInFlight,
    BadConfirmationCode,
    InsufficientCashBalance,
    InvalidCashDesk,
    GenericBadRequest,
    Forbidden,
    WithdrawalNotFound,
    UserNotFound,
    RateLimited,
    GenericRateLimited,
    UpstreamServerError,
    UnknownStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ApiErrorCategory,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Classified {
        status: u16,
        classification: Classification,
    },
    Unparseable {
        status: u16,
        body: String,
    },
    Timeout,
    Network {
        detail: String,
    },
    Unexpected {
        detail: String,
    },
    /// Rejected locally; nothing was sent.
    InvalidRequest {
        reason: String,
    },
}

impl Failure {
    /// Network trouble and timeouts are worth offering a "try again" to the user.
    pub fn is_transient(&self) -> bool {
        matches!(self, Failure::Timeout | Failure::Network { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Failure::Classified { status, .. } | Failure::Unparseable { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Receipt),
    Failure(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn category(&self) -> Option<ApiErrorCategory> {
        match self {
            Outcome::Failure(Failure::Classified { classification, .. }) => {
                Some(classification.category)
            }
            _ => None,
        }
    }
}
