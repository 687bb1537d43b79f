//! Maps an HTTP status plus the API's `errorCode`/`errorMessage` pair onto
//! a closed set of categories, each with a fixed explanation for the
//! operator. Matching is driven by [`RULES`]; supporting a new API error is
//! a new row there.

use crate::domain::model::{ApiErrorCategory, Classification};

#[derive(Debug, Clone, Copy)]
enum Condition {
    Always,
    /// Any phrase occurs in the lowercased message.
    MessageContains(&'static [&'static str]),
    /// The code matches exactly (ignoring case) or any phrase occurs.
    CodeOrMessage {
        codes: &'static [&'static str],
        phrases: &'static [&'static str],
    },
}

impl Condition {
    fn matches(&self, code: &str, message_lower: &str) -> bool {
        match *self {
            Condition::Always => true,
            Condition::MessageContains(phrases) => contains_any(message_lower, phrases),
            Condition::CodeOrMessage { codes, phrases } => {
                codes.iter().any(|c| c.eq_ignore_ascii_case(code.trim()))
                    || contains_any(message_lower, phrases)
            }
        }
    }
}

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| haystack.contains(phrase))
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    status: u16,
    condition: Condition,
    category: ApiErrorCategory,
}

const fn rule(status: u16, condition: Condition, category: ApiErrorCategory) -> Rule {
    Rule {
        status,
        condition,
        category,
    }
}

/// Evaluated top to bottom; the first matching row wins. The cash balance
/// row sits above the generic amount row because its text also contains
/// "amount exceeds"; `test_cash_balance_row_precedes_amount_row` pins this.
const RULES: &[Rule] = &[
    rule(
        400,
        Condition::MessageContains(&["withdrawal amount exceeds available cash balance"]),
        ApiErrorCategory::InsufficientCashBalance,
    ),
    rule(
        400,
        Condition::MessageContains(&["amount exceeds", "limit"]),
        ApiErrorCategory::AmountOutOfRange,
    ),
    rule(
        400,
        Condition::MessageContains(&["deposit already created"]),
        ApiErrorCategory::DuplicateActiveDeposit,
    ),
    rule(
        400,
        Condition::MessageContains(&["fee is too high"]),
        ApiErrorCategory::FeeTooHigh,
    ),
    rule(
        400,
        Condition::MessageContains(&["withdrawal is being processed"]),
        ApiErrorCategory::WithdrawalInFlight,
    ),
    rule(
        400,
        Condition::MessageContains(&["incorrect code"]),
        ApiErrorCategory::BadConfirmationCode,
    ),
    rule(
        400,
        Condition::MessageContains(&["invalid cash desk identifier"]),
        ApiErrorCategory::InvalidCashDesk,
    ),
    rule(400, Condition::Always, ApiErrorCategory::GenericBadRequest),
    rule(403, Condition::Always, ApiErrorCategory::Forbidden),
    rule(
        404,
        Condition::CodeOrMessage {
            codes: &["CASH02"],
            phrases: &["withdrawal not found"],
        },
        ApiErrorCategory::WithdrawalNotFound,
    ),
    rule(404, Condition::Always, ApiErrorCategory::UserNotFound),
    rule(
        429,
        Condition::CodeOrMessage {
            codes: &["CASH06"],
            phrases: &["toomanyrequests", "too many requests"],
        },
        ApiErrorCategory::RateLimited,
    ),
    rule(429, Condition::Always, ApiErrorCategory::GenericRateLimited),
    rule(500, Condition::Always, ApiErrorCategory::UpstreamServerError),
];

pub fn categorize(status: u16, error_code: &str, error_message: &str) -> ApiErrorCategory {
    let message_lower = error_message.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.status == status && rule.condition.matches(error_code, &message_lower))
        .map(|rule| rule.category)
        .unwrap_or(ApiErrorCategory::UnknownStatus)
}

/// Total: every combination yields exactly one category and its message.
pub fn classify(status: u16, error_code: &str, error_message: &str) -> Classification {
    let category = categorize(status, error_code, error_message);
    Classification {
        category,
        message: render(category, status, error_message),
    }
}

struct Template {
    reference: &'static str,
    title: &'static str,
    explanation: &'static str,
    hints: &'static [&'static str],
}

impl ApiErrorCategory {
    fn template(&self) -> Template {
        match self {
            ApiErrorCategory::AmountOutOfRange => Template {
                reference: "400-01",
                title: "Deposit amount problem",
                explanation: "The amount is outside the limits allowed for this user.",
                hints: &[
                    "Try a different amount (for example between 100 and 50000)",
                    "Ask the user about their deposit limits",
                    "Contact the administrator if the problem repeats",
                ],
            },
            ApiErrorCategory::DuplicateActiveDeposit => Template {
                reference: "400-02",
                title: "Deposit already created",
                explanation: "This user already has an active deposit.",
                hints: &[
                    "Wait until the current deposit completes",
                    "Check the status of the user's deposit",
                    "Contact the administrator if the deposit is stuck",
                ],
            },
            ApiErrorCategory::FeeTooHigh => Template {
                reference: "400-03",
                title: "Fee too high",
                explanation: "The fee for this deposit exceeds the allowed bounds.",
                hints: &[
                    "Try a smaller amount",
                    "Ask the administrator to review the fee settings",
                ],
            },
            ApiErrorCategory::WithdrawalInFlight => Template {
                reference: "400-04",
                title: "Withdrawal already in progress",
                explanation: "This user already has an active withdrawal request.",
                hints: &[
                    "Wait until the current withdrawal completes",
                    "Check the status of the user's withdrawal",
                    "Contact the administrator if the withdrawal is stuck",
                ],
            },
            ApiErrorCategory::BadConfirmationCode => Template {
                reference: "400-05",
                title: "Wrong confirmation code",
                explanation: "The code the user provided does not match.",
                hints: &[
                    "Ask the user to check the code again",
                    "Make sure the code has not expired",
                    "Ask the user to request a new code",
                ],
            },
            ApiErrorCategory::InsufficientCashBalance => Template {
                reference: "400-06",
                title: "Not enough cash at the desk",
                explanation: "The cash desk balance cannot cover this payout.",
                hints: &[
                    "Ask the administrator to top up the cash desk",
                    "Offer the user a smaller withdrawal",
                    "Wait for the desk balance to be replenished",
                ],
            },
            ApiErrorCategory::InvalidCashDesk => Template {
                reference: "400-07",
                title: "Cash desk problem",
                explanation: "The cash desk identifier is invalid or the desk is unavailable.",
                hints: &[
                    "Contact the administrator",
                    "The cash desk may be temporarily out of service",
                ],
            },
            ApiErrorCategory::GenericBadRequest => Template {
                reference: "400-00",
                title: "Invalid request data",
                explanation: "Check the data you entered.",
                hints: &[
                    "User ID must be a number",
                    "Amount must be a number",
                    "Confirmation code is required for withdrawals",
                    "If the data is correct, contact the administrator",
                ],
            },
            ApiErrorCategory::Forbidden => Template {
                reference: "403",
                title: "Access denied",
                explanation: "The payment service rejected our credentials.",
                hints: &[
                    "Report the problem to the administrator",
                    "The API key may need to be renewed",
                ],
            },
            ApiErrorCategory::WithdrawalNotFound => Template {
                reference: "404-01",
                title: "Withdrawal request not found",
                explanation: "The user has no active withdrawal request.",
                hints: &[
                    "Ask the user to create a withdrawal request in the app first",
                    "Make sure the user received a confirmation code",
                    "Check the user ID",
                ],
            },
            ApiErrorCategory::UserNotFound => Template {
                reference: "404-02",
                title: "User not found",
                explanation: "No user with this ID exists in the payment system.",
                hints: &[
                    "Check the user ID",
                    "Ask the user for their correct ID",
                    "Make sure the user is registered",
                ],
            },
            ApiErrorCategory::RateLimited => Template {
                reference: "429-01",
                title: "Too many requests",
                explanation: "The payment service is temporarily throttling requests.",
                hints: &[
                    "Wait 1-2 minutes and try again",
                    "Avoid sending requests in quick succession",
                    "Contact the administrator if it does not clear up",
                ],
            },
            ApiErrorCategory::GenericRateLimited => Template {
                reference: "429-02",
                title: "Request limit exceeded",
                explanation: "Too many operations in a short period.",
                hints: &["Try again in a few minutes"],
            },
            ApiErrorCategory::UpstreamServerError => Template {
                reference: "500",
                title: "Payment service error",
                explanation: "The payment service failed on its side.",
                hints: &[
                    "Try again in a few minutes",
                    "Report it to the administrator if it repeats",
                ],
            },
            ApiErrorCategory::UnknownStatus => Template {
                reference: "",
                title: "Unknown error",
                explanation: "The payment service returned an unexpected error.",
                hints: &[
                    "Try again in a minute",
                    "Report this error to the administrator",
                ],
            },
        }
    }

    pub fn reference(&self, status: u16) -> String {
        match self.template().reference {
            "" => status.to_string(),
            reference => reference.to_string(),
        }
    }
}

fn render(category: ApiErrorCategory, status: u16, raw_message: &str) -> String {
    let template = category.template();
    let mut text = format!(
        "❌ Error #{}: {}\n\nℹ️ {}\n\n💡 What to do:\n",
        category.reference(status),
        template.title,
        template.explanation
    );
    for hint in template.hints {
        text.push_str(&format!("• {}\n", hint));
    }

    if category == ApiErrorCategory::UnknownStatus {
        let details = if raw_message.trim().is_empty() {
            "no details"
        } else {
            raw_message
        };
        text.push_str(&format!(
            "• Quote the error code: {}\n\nTechnical details: {}",
            status, details
        ));
    }

    text.trim_end().to_string()
}
