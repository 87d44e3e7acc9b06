//! CLI command implementations

pub mod deposit;
pub mod doctor;
pub mod history;
pub mod logs;
pub mod register;
pub mod status;
pub mod transfer;
pub mod wallet;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dialoguer::Password;
use wallet_core::domain::result::Result as CoreResult;
use wallet_core::{Claims, EntryPoint, LogEvent, LoggingService, WalletContext};

/// Environment variable pointing at the data directory
pub const DATA_DIR_ENV: &str = "WALLET_DIR";

/// Credentials for commands that act on the caller's wallet
#[derive(Args)]
pub struct AuthArgs {
    /// Email address of the wallet owner
    #[arg(long)]
    pub email: String,
    /// Password (prompted when omitted)
    #[arg(long, env = "WL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl AuthArgs {
    pub fn password(&self) -> Result<String> {
        read_password(self.password.clone(), false)
    }
}

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

pub fn log_command(logger: &Option<LoggingService>, command: &str) {
    log_event(logger, LogEvent::new("command_executed").with_command(command));
}

pub fn log_failure(logger: &Option<LoggingService>, command: &str, err: &anyhow::Error) {
    if let Some(l) = logger {
        let _ = l.log_failure(command, err);
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".wallet-ledger"))
        .context("Could not find home directory; set WALLET_DIR")
}

/// Open the wallet context in the data directory
pub fn get_context() -> Result<WalletContext> {
    let data_dir = get_data_dir()?;
    WalletContext::new(&data_dir).context("Failed to open wallet ledger")
}

/// Read a password from the flag/env value or prompt for it
pub fn read_password(given: Option<String>, confirm: bool) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    prompt.interact().context("Failed to read password")
}

/// Verify the caller's credentials and issue claims for their wallet
pub fn sign_in(ctx: &WalletContext, auth: &AuthArgs, password: &str) -> CoreResult<Claims> {
    ctx.registration_service.authenticate(&auth.email, password)
}
