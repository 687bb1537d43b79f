use cash_desk::config::cli::{AgentAction, Command, CredentialAction};
use cash_desk::core::OperationKind;
use cash_desk::utils::error::{DeskError, ErrorSeverity};
use cash_desk::utils::{logger, mask_secret, validation::Validate};
use cash_desk::{CashDesk, CliConfig, CommandRouter, DeskConfig, PaymentClient, SqliteAgentStore};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

type Desk = CashDesk<SqliteAgentStore, PaymentClient>;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // Logging
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting cash-desk");
    if cli.verbose {
        // Credential keys are masked by CredentialAction's Debug.
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(&cli).await {
        // Detailed error for the log
        tracing::error!(
            "❌ cash-desk failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        // Short version for the operator
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        // Exit code follows severity
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,      // bad input, nothing broke
            ErrorSeverity::Medium => 2,   // store busy, retry later
            ErrorSeverity::High => 1,     // storage or I/O fault
            ErrorSeverity::Critical => 3, // configuration
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: &CliConfig) -> Result<(), DeskError> {
    // Configuration
    let config = cli.load_desk_config()?;
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        return Err(e);
    }

    // Store, API client and desk
    let desk = Arc::new(build_desk(&config)?);

    match &cli.command {
        Command::Agent { action } => run_agent_action(&desk, action).await?,
        Command::Credential { action } => run_credential_action(&desk, action).await?,
        Command::Assign => match desk.assign_next().await? {
            Some(handle) => println!("➡️  @{}", handle),
            None => println!("No managers registered."),
        },
        Command::Deposit {
            user,
            amount,
            as_agent,
        } => {
            let outcome = match as_agent {
                Some(handle) => desk.submit_deposit_as(handle, *user, *amount).await?,
                None => desk.submit_deposit(*user, *amount).await,
            };
            println!("{}", outcome.user_message(OperationKind::Deposit));
        }
        Command::Withdraw {
            user,
            code,
            as_agent,
        } => {
            let outcome = match as_agent {
                Some(handle) => desk.submit_withdrawal_as(handle, *user, *code).await?,
                None => desk.submit_withdrawal(*user, *code).await,
            };
            println!("{}", outcome.user_message(OperationKind::Withdrawal));
        }
        Command::Shell { session } => run_shell(desk, &config, *session).await?,
    }

    Ok(())
}

fn build_desk(config: &DeskConfig) -> Result<Desk, DeskError> {
    let store = SqliteAgentStore::open(&config.store.database_path, config.store.options())?;
    let client = PaymentClient::from_config(&config.api)?;
    tracing::info!(
        "🔗 Payment API at {} (key {})",
        client.base_url(),
        mask_secret(&config.api.api_key)
    );

    Ok(CashDesk::new(Arc::new(store), client)
        .with_contention_retries(config.store.contention_retries))
}

async fn run_agent_action(desk: &Desk, action: &AgentAction) -> Result<(), DeskError> {
    match action {
        AgentAction::Add { handle, session } => {
            if desk.add_agent_with_session(handle, session.as_deref()).await? {
                println!("✅ Manager {} added.", handle);
            } else {
                println!("⚠️ Manager {} already exists.", handle);
            }
        }
        AgentAction::Remove { handle } => {
            if desk.remove_agent(handle).await? {
                println!("🗑️ Manager {} removed.", handle);
            } else {
                println!("⚠️ Manager {} not found.", handle);
            }
        }
        AgentAction::List => {
            let agents = desk.agents().await?;
            if agents.is_empty() {
                println!("The manager list is empty.");
            }
            for agent in agents {
                println!(
                    "@{}\t{} assigned\tsession: {}",
                    agent.handle,
                    agent.assignment_count,
                    agent.session_handle.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

async fn run_credential_action(desk: &Desk, action: &CredentialAction) -> Result<(), DeskError> {
    match action {
        CredentialAction::Set { handle, api_key } => {
            if desk.set_agent_credential(handle, api_key).await? {
                println!("🔑 API key stored for {}.", handle);
            } else {
                println!("⚠️ Manager {} not found; add the manager first.", handle);
            }
        }
        CredentialAction::Remove { handle } => {
            if desk.remove_agent_credential(handle).await? {
                println!("🗑️ API key removed for {}.", handle);
            } else {
                println!("⚠️ No API key stored for {}.", handle);
            }
        }
        CredentialAction::List => {
            for credential in desk.agent_credentials().await? {
                println!(
                    "@{}\t{}\t{}",
                    credential.handle,
                    mask_secret(&credential.api_key),
                    credential.created_at.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}

/// Reads one chat message per line and prints the reply. The shell user
/// acts as an admin.
async fn run_shell(desk: Arc<Desk>, config: &DeskConfig, session: i64) -> Result<(), DeskError> {
    let mut router = CommandRouter::new(desk, config);
    router.grant_admin(session);

    println!("cash-desk shell (session {}). Type /start, Ctrl-D to quit.", session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        println!("{}\n", router.handle(session, &line).await);
    }

    Ok(())
}
