//! Wallet ledger CLI - user wallets and transfers in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wallet_core::LoggingService;

mod commands;
mod output;

use commands::{deposit, doctor, history, logs, register, status, transfer, wallet, AuthArgs};

/// Environment variable holding the tracing filter
const LOG_FILTER_ENV: &str = "WL_LOG";

/// wl - wallet ledger in your terminal
#[derive(Parser)]
#[command(name = "wl", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a user together with an empty wallet
    Register {
        /// Display name
        #[arg(long)]
        name: String,
        /// Email address used to sign in
        #[arg(long)]
        email: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "WL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show your wallet and balance
    Wallet {
        #[command(flatten)]
        auth: AuthArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deposit money into your wallet from outside the system
    Deposit {
        /// Amount in major units, e.g. 12.50
        amount: String,
        #[command(flatten)]
        auth: AuthArgs,
        /// Idempotency key; repeating it never deposits twice
        #[arg(long)]
        request_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transfer money from your wallet to another wallet
    Transfer {
        /// Destination wallet ID
        to: i64,
        /// Amount in major units, e.g. 12.50
        amount: String,
        #[command(flatten)]
        auth: AuthArgs,
        /// Idempotency key; repeating it never transfers twice
        #[arg(long)]
        request_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show your wallet's transaction history, oldest first
    History {
        #[command(flatten)]
        auth: AuthArgs,
        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output format (table, json, csv)
        #[arg(long, default_value = "table")]
        format: String,
        /// Write CSV to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output as JSON (shorthand for --format json)
        #[arg(long)]
        json: bool,
    },

    /// Show ledger totals
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run ledger health checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    /// Name recorded in the event log
    fn name(&self) -> &'static str {
        match self {
            Commands::Register { .. } => "register",
            Commands::Wallet { .. } => "wallet",
            Commands::Deposit { .. } => "deposit",
            Commands::Transfer { .. } => "transfer",
            Commands::History { .. } => "history",
            Commands::Status { .. } => "status",
            Commands::Doctor { .. } => "doctor",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let command = cli.command.name();
    let logger = commands::get_logger();
    commands::log_command(&logger, command);

    match run(cli, logger.as_ref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::log_failure(&logger, command, &e);
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, logger: Option<&LoggingService>) -> Result<()> {
    match cli.command {
        Commands::Register { name, email, password, json } => {
            register::run(&name, &email, password, json)
        }
        Commands::Wallet { auth, json } => wallet::run(&auth, json),
        Commands::Deposit { amount, auth, request_id, json } => {
            deposit::run(&amount, &auth, request_id, json)
        }
        Commands::Transfer { to, amount, auth, request_id, json } => {
            transfer::run(to, &amount, &auth, request_id, json)
        }
        Commands::History { auth, limit, format, output, json } => {
            let fmt = if json { "json".to_string() } else { format };
            history::run(&auth, limit, &fmt, output.as_deref())
        }
        Commands::Status { json } => status::run(json),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Logs { command } => logs::run(command, logger),
    }
}
