use crate::config::DeskConfig;
use crate::utils::error::Result;
use crate::utils::mask_secret;
use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "cash-desk")]
#[command(about = "Routes users to managers and relays deposits and withdrawals to the cash desk API")]
pub struct CliConfig {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(long, short)]
    pub config: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Manage the managers that receive routed users
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Manage per-manager API keys
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },
    /// Route one user to the least-loaded manager
    Assign,
    /// Create a deposit for a user
    Deposit {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        amount: f64,
        /// Sign the request with this manager's own API key
        #[arg(long)]
        as_agent: Option<String>,
    },
    /// Confirm a withdrawal with the user's code
    Withdraw {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        code: i64,
        #[arg(long)]
        as_agent: Option<String>,
    },
    /// Interactive session that reads chat commands from stdin
    Shell {
        #[arg(long, default_value = "0")]
        session: i64,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum AgentAction {
    Add {
        handle: String,
        /// External chat/session id of the manager
        #[arg(long)]
        session: Option<String>,
    },
    Remove {
        handle: String,
    },
    List,
}

#[derive(Clone, Subcommand)]
pub enum CredentialAction {
    Set { handle: String, api_key: String },
    Remove { handle: String },
    List,
}

// Verbose mode logs the parsed CLI, so the key is masked here.
impl std::fmt::Debug for CredentialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialAction::Set { handle, api_key } => f
                .debug_struct("Set")
                .field("handle", handle)
                .field("api_key", &mask_secret(api_key))
                .finish(),
            CredentialAction::Remove { handle } => {
                f.debug_struct("Remove").field("handle", handle).finish()
            }
            CredentialAction::List => f.write_str("List"),
        }
    }
}

impl CliConfig {
    pub fn load_desk_config(&self) -> Result<DeskConfig> {
        match &self.config {
            Some(path) => DeskConfig::from_file(path),
            None => DeskConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deposit_command() {
        let cli = CliConfig::parse_from([
            "cash-desk", "--config", "desk.toml", "deposit", "--user", "42", "--amount", "150.5",
        ]);

        assert_eq!(cli.config.as_deref(), Some("desk.toml"));
        match cli.command {
            Command::Deposit {
                user,
                amount,
                as_agent,
            } => {
                assert_eq!(user, 42);
                assert_eq!(amount, 150.5);
                assert!(as_agent.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_agent_add() {
        let cli = CliConfig::parse_from(["cash-desk", "agent", "add", "@alice", "--session", "1001"]);
        assert!(matches!(
            cli.command,
            Command::Agent {
                action: AgentAction::Add { ref handle, ref session }
            } if handle == "@alice" && session.as_deref() == Some("1001")
        ));
    }

    #[test]
    fn test_debug_output_masks_api_key() {
        let secret = "sk-live-TOPSECRET-9f3a";
        let cli = CliConfig::parse_from([
            "cash-desk", "--verbose", "credential", "set", "alice", secret,
        ]);

        let logged = format!("{:?}", cli);
        assert!(!logged.contains(secret));
        assert!(logged.contains("****9f3a"));
        assert!(logged.contains("alice"));
    }
}
