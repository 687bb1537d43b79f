//! Transport-agnostic command handling: one text message in, one reply out.
//! A chat adapter feeds every incoming message to [`CommandRouter::handle`]
//! together with the sender's id.

use crate::config::{DeskConfig, LinksConfig};
use crate::core::desk::CashDesk;
use crate::core::dialog::{AdminDialogs, DialogState, PendingAction};
use crate::domain::model::OperationKind;
use crate::domain::ports::{AgentStore, PaymentGateway};
use crate::utils::error::{DeskError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

pub const MENU_DEPOSIT: &str = "Top up balance";
pub const MENU_WITHDRAW: &str = "Withdraw";
pub const MENU_SUPPORT: &str = "Support 24/7";
pub const MENU_NEWS: &str = "News channel";

const NOT_ALLOWED: &str = "You are not allowed to run this command.";

pub struct CommandRouter<S, G> {
    desk: Arc<CashDesk<S, G>>,
    dialogs: AdminDialogs,
    admins: HashSet<i64>,
    links: LinksConfig,
}

impl<S, G> CommandRouter<S, G>
where
    S: AgentStore + 'static,
    G: PaymentGateway,
{
    pub fn new(desk: Arc<CashDesk<S, G>>, config: &DeskConfig) -> Self {
        Self {
            desk,
            dialogs: AdminDialogs::new(config.admin.dialog_timeout()),
            admins: config.admin.admin_ids.iter().copied().collect(),
            links: config.links.clone(),
        }
    }

    pub fn grant_admin(&mut self, session_id: i64) {
        self.admins.insert(session_id);
    }

    pub fn is_admin(&self, session_id: i64) -> bool {
        self.admins.contains(&session_id)
    }

    pub async fn handle(&self, session_id: i64, text: &str) -> String {
        self.handle_at(session_id, text, Utc::now()).await
    }

    /// Same as [`handle`](Self::handle) with an explicit clock for dialog expiry.
    pub async fn handle_at(&self, session_id: i64, text: &str, now: DateTime<Utc>) -> String {
        let purged = self.dialogs.purge_expired(now);
        if purged > 0 {
            tracing::debug!("Dropped {} expired admin prompt(s)", purged);
        }

        let reply = match self.dispatch(session_id, text.trim(), now).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    "Command from session {} failed: {} (category: {:?})",
                    session_id,
                    e,
                    e.category()
                );
                format!("⚠️ {}", e.user_friendly_message())
            }
        };
        tracing::debug!("Reply to session {}: {}", session_id, reply);
        reply
    }

    async fn dispatch(&self, session_id: i64, text: &str, now: DateTime<Utc>) -> Result<String> {
        if let Some(command_line) = text.strip_prefix('/') {
            let mut parts = command_line.split_whitespace();
            let command = parts.next().unwrap_or_default();
            // Chat clients append the bot name in groups: /start@desk_bot
            let command = command.split('@').next().unwrap_or_default();
            let args: Vec<&str> = parts.collect();
            return self.run_command(session_id, command, &args, now).await;
        }

        if self.is_admin(session_id) {
            if let Some(action) = self.dialogs.take(session_id, now) {
                return self.apply_pending(action, text).await;
            }
        }

        match text {
            MENU_DEPOSIT | MENU_WITHDRAW => self.route_to_manager().await,
            MENU_SUPPORT => Ok(format!(
                "For support, please contact us: {}",
                self.links.support_url
            )),
            MENU_NEWS => Ok(format!("📢 Our news channel: {}", self.links.news_url)),
            _ => Ok(format!(
                "Please use the menu: {}, {}, {} or {}.",
                MENU_DEPOSIT, MENU_WITHDRAW, MENU_SUPPORT, MENU_NEWS
            )),
        }
    }

    async fn run_command(
        &self,
        session_id: i64,
        command: &str,
        args: &[&str],
        now: DateTime<Utc>,
    ) -> Result<String> {
        match command {
            "start" => Ok(welcome_text()),
            "cancel" => match self.dialogs.state(session_id, now) {
                DialogState::Awaiting { action, .. } => {
                    self.dialogs.cancel(session_id);
                    Ok(match action {
                        PendingAction::AddAgent => "Cancelled adding a manager.",
                        PendingAction::RemoveAgent => "Cancelled removing a manager.",
                    }
                    .to_string())
                }
                DialogState::Idle => Ok("Nothing to cancel.".to_string()),
            },
            "addmanager" | "delmanager" | "listmanagers" if !self.is_admin(session_id) => {
                Ok(NOT_ALLOWED.to_string())
            }
            "addmanager" => match args.first() {
                Some(handle) => self.apply_pending(PendingAction::AddAgent, handle).await,
                None => {
                    self.dialogs.begin(session_id, PendingAction::AddAgent, now);
                    Ok("Send the manager's username (for example @newmanager). /cancel to abort."
                        .to_string())
                }
            },
            "delmanager" => match args.first() {
                Some(handle) => self.apply_pending(PendingAction::RemoveAgent, handle).await,
                None => {
                    self.dialogs
                        .begin(session_id, PendingAction::RemoveAgent, now);
                    Ok("Send the username of the manager to remove. /cancel to abort.".to_string())
                }
            },
            "listmanagers" => self.list_managers().await,
            "deposit" => {
                let Some(agent) = self.operator_handle(session_id).await? else {
                    return Ok(NOT_ALLOWED.to_string());
                };
                let (user_id, amount) = match args {
                    [user, amount] => (
                        parse_arg::<i64>(user, "user ID")?,
                        parse_arg::<f64>(amount, "amount")?,
                    ),
                    _ => return Ok("Usage: /deposit <user_id> <amount>".to_string()),
                };
                let outcome = match agent {
                    Some(handle) => self.desk.submit_deposit_as(&handle, user_id, amount).await?,
                    None => self.desk.submit_deposit(user_id, amount).await,
                };
                Ok(outcome.user_message(OperationKind::Deposit))
            }
            "withdrawal" => {
                let Some(agent) = self.operator_handle(session_id).await? else {
                    return Ok(NOT_ALLOWED.to_string());
                };
                let (user_id, code) = match args {
                    [user, code] => (
                        parse_arg::<i64>(user, "user ID")?,
                        parse_arg::<i64>(code, "confirmation code")?,
                    ),
                    _ => return Ok("Usage: /withdrawal <user_id> <code>".to_string()),
                };
                let outcome = match agent {
                    Some(handle) => self.desk.submit_withdrawal_as(&handle, user_id, code).await?,
                    None => self.desk.submit_withdrawal(user_id, code).await,
                };
                Ok(outcome.user_message(OperationKind::Withdrawal))
            }
            other => Ok(format!("Unknown command: /{}", other)),
        }
    }

    /// Who may submit payments: registered managers sign with their own
    /// key (`Some(Some(handle))`), admins with the shared key
    /// (`Some(None)`), everyone else is refused (`None`).
    async fn operator_handle(&self, session_id: i64) -> Result<Option<Option<String>>> {
        if let Some(agent) = self.desk.agent_for_session(&session_id.to_string()).await? {
            return Ok(Some(Some(agent.handle)));
        }
        if self.is_admin(session_id) {
            return Ok(Some(None));
        }
        Ok(None)
    }

    async fn apply_pending(&self, action: PendingAction, raw_handle: &str) -> Result<String> {
        let shown = raw_handle.trim().trim_start_matches('@');
        match action {
            PendingAction::AddAgent => Ok(if self.desk.add_agent(raw_handle).await? {
                format!("✅ Manager @{} added.", shown)
            } else {
                format!("⚠️ Manager @{} is already in the list.", shown)
            }),
            PendingAction::RemoveAgent => Ok(if self.desk.remove_agent(raw_handle).await? {
                format!("🗑️ Manager @{} removed.", shown)
            } else {
                format!("⚠️ Manager @{} is not in the list.", shown)
            }),
        }
    }

    async fn list_managers(&self) -> Result<String> {
        let agents = self.desk.agents().await?;
        if agents.is_empty() {
            return Ok("The manager list is empty.".to_string());
        }

        let lines: Vec<String> = agents
            .iter()
            .map(|agent| format!("• @{} ({} assigned)", agent.handle, agent.assignment_count))
            .collect();
        Ok(format!("Current managers:\n\n{}", lines.join("\n")))
    }

    async fn route_to_manager(&self) -> Result<String> {
        match self.desk.assign_next().await? {
            Some(handle) => Ok(format!(
                "Redirecting you to a manager: {}/{}",
                self.links.contact_base_url.trim_end_matches('/'),
                handle
            )),
            None => Ok(
                "Unfortunately no managers are available right now. Please try again later."
                    .to_string(),
            ),
        }
    }
}

fn parse_arg<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse().map_err(|_| DeskError::ValidationError {
        message: format!("The {} must be a number, got '{}'", what, raw),
    })
}

fn welcome_text() -> String {
    format!(
        "👋 Welcome to the cash desk!\n\n\
         Here you can:\n\
         ✅ Top up your game balance without delays\n\
         ✅ Withdraw funds quickly\n\
         ✅ Follow news and promotions\n\n\
         💬 We work 24/7.\n\n\
         Menu: {} | {} | {} | {}",
        MENU_DEPOSIT, MENU_WITHDRAW, MENU_SUPPORT, MENU_NEWS
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryAgentStore;
    use crate::config::ApiConfig;
    use crate::domain::model::{Failure, OutboundRequest, Outcome};
    use async_trait::async_trait;

    struct TimeoutGateway;

    #[async_trait]
    impl PaymentGateway for TimeoutGateway {
        async fn call(&self, _request: &OutboundRequest) -> Outcome {
            Outcome::Failure(Failure::Timeout)
        }
    }

    const ADMIN: i64 = 1;
    const USER: i64 = 2;

    fn router() -> CommandRouter<MemoryAgentStore, TimeoutGateway> {
        let config = DeskConfig {
            api: ApiConfig {
                base_url: "https://api.example.com".to_string(),
                api_key: "shared".to_string(),
                timeout_seconds: 30,
            },
            store: Default::default(),
            admin: crate::config::AdminConfig {
                admin_ids: vec![ADMIN],
                dialog_timeout_seconds: 600,
            },
            links: Default::default(),
        };
        let desk = CashDesk::new(Arc::new(MemoryAgentStore::new()), TimeoutGateway);
        CommandRouter::new(Arc::new(desk), &config)
    }

    #[tokio::test]
    async fn test_admin_dialog_adds_manager() {
        let router = router();

        let prompt = router.handle(ADMIN, "/addmanager").await;
        assert!(prompt.contains("Send the manager's username"));

        let reply = router.handle(ADMIN, "@alice").await;
        assert_eq!(reply, "✅ Manager @alice added.");

        let reply = router.handle(ADMIN, "/addmanager alice").await;
        assert!(reply.contains("already in the list"));
    }

    #[tokio::test]
    async fn test_expired_dialog_falls_through_to_menu() {
        let router = router();
        let now = Utc::now();
        router.handle_at(ADMIN, "/delmanager", now).await;

        let later = now + chrono::Duration::seconds(601);
        let reply = router.handle_at(ADMIN, "alice", later).await;
        assert!(reply.starts_with("Please use the menu"));
    }

    #[tokio::test]
    async fn test_non_admin_is_refused() {
        let router = router();
        assert_eq!(router.handle(USER, "/addmanager bob").await, NOT_ALLOWED);
        assert_eq!(router.handle(USER, "/deposit 42 100").await, NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_menu_routes_round_robin() {
        let router = router();
        router.handle(ADMIN, "/addmanager a").await;
        router.handle(ADMIN, "/addmanager b").await;

        let first = router.handle(USER, MENU_DEPOSIT).await;
        let second = router.handle(USER, MENU_WITHDRAW).await;
        assert!(first.ends_with("https://t.me/a"));
        assert!(second.ends_with("https://t.me/b"));

        let listing = router.handle(ADMIN, "/listmanagers").await;
        assert!(listing.contains("@a (1 assigned)"));
    }

    #[tokio::test]
    async fn test_no_managers_available() {
        let router = router();
        let reply = router.handle(USER, MENU_DEPOSIT).await;
        assert!(reply.contains("no managers are available"));
    }

    #[tokio::test]
    async fn test_registered_manager_can_submit() {
        let router = router();
        router
            .desk
            .add_agent_with_session("carol", Some("77"))
            .await
            .unwrap();

        let reply = router.handle(77, "/withdrawal 42 1234").await;
        assert!(reply.contains("did not answer in time"));

        let usage = router.handle(77, "/withdrawal 42").await;
        assert!(usage.starts_with("Usage"));

        let bad = router.handle(77, "/deposit abc 100").await;
        assert!(bad.contains("must be a number"));
    }

    #[tokio::test]
    async fn test_command_with_bot_suffix() {
        let router = router();
        assert!(router.handle(USER, "/start@cash_desk_bot").await.contains("Welcome"));
        assert_eq!(router.handle(USER, "/cancel").await, "Nothing to cancel.");
    }

    #[tokio::test]
    async fn test_cancel_names_the_pending_prompt() {
        let router = router();
        router.handle(ADMIN, "/delmanager").await;

        assert_eq!(router.handle(ADMIN, "/cancel").await, "Cancelled removing a manager.");
        assert!(router.handle(ADMIN, "alice").await.starts_with("Please use the menu"));
    }

    #[tokio::test]
    async fn test_expired_prompts_are_purged_by_any_message() {
        let router = router();
        let now = Utc::now();
        router.handle_at(ADMIN, "/addmanager", now).await;

        let later = now + chrono::Duration::seconds(601);
        router.handle_at(USER, "/start", later).await;
        assert!(!router.dialogs.cancel(ADMIN));
    }
}
