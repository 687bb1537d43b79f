use crate::domain::model::{Failure, OperationKind, Outcome, Receipt};
use serde_json::Value;

fn display_value(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "n/a".to_string(),
        Some(other) => other.to_string(),
    }
}

impl Receipt {
    pub fn user_message(&self, kind: OperationKind) -> String {
        let (headline, noun) = match kind {
            OperationKind::Deposit => ("✅ Deposit created successfully!", "Deposit"),
            OperationKind::Withdrawal => ("✅ Withdrawal processed successfully!", "Withdrawal"),
        };
        format!(
            "{}\n\n🆔 {} ID: {}\n💰 Amount: {}\n👤 User ID: {}\n🏦 Cash desk ID: {}",
            headline,
            noun,
            display_value(&self.id),
            display_value(&self.amount),
            display_value(&self.user_id),
            display_value(&self.cash_id)
        )
    }
}

impl Failure {
    pub fn user_message(&self) -> String {
        match self {
            Failure::Classified { classification, .. } => classification.message.clone(),
            Failure::Unparseable { status, body } => format!(
                "❌ Unreadable response from the payment service (status {})\n\n\
                 Report this to the administrator.\n\nRaw response: {}",
                status, body
            ),
            Failure::Timeout => "⏳ The payment service did not answer in time.\n\n\
                 💡 Please try again in a minute."
                .to_string(),
            Failure::Network { detail } => format!(
                "📡 Could not reach the payment service.\n\n\
                 💡 Check the connection and try again.\n\nDetails: {}",
                detail
            ),
            Failure::Unexpected { detail } => format!(
                "❌ Unexpected error while contacting the payment service.\n\nDetails: {}",
                detail
            ),
            Failure::InvalidRequest { reason } => format!("⚠️ {}", reason),
        }
    }
}

impl Outcome {
    pub fn user_message(&self, kind: OperationKind) -> String {
        match self {
            Outcome::Success(receipt) => receipt.user_message(kind),
            Outcome::Failure(failure) => failure.user_message(),
        }
    }
}
