//! Result and error types for the core library

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::amount::Amount;
use super::user::UserId;
use super::wallet::WalletId;

/// Core library error type
///
/// Every variant is recoverable from the caller's point of view: when an
/// operation returns an error, no balance or ledger row has changed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("Insufficient funds in wallet {wallet_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        wallet_id: WalletId,
        available: Amount,
        requested: Amount,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer from wallet {0} to itself")]
    SameWalletTransfer(WalletId),

    #[error("Wallet {wallet_id} is busy, gave up after {}ms", .waited.as_millis())]
    Busy { wallet_id: WalletId, waited: Duration },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Invalid email or password")]
    AuthenticationFailed,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Password hashing failed: {0}")]
    PasswordHashing(String),
}

impl Error {
    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Persistence(_))
    }

    /// Stable machine-readable tag for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WalletNotFound(_) => "wallet_not_found",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::SameWalletTransfer(_) => "same_wallet_transfer",
            Self::Busy { .. } => "busy",
            Self::Persistence(_) => "persistence_error",
            Self::Validation(_) => "validation_error",
            Self::DuplicateEmail(_) => "duplicate_email",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::UserNotFound(_) => "user_not_found",
            Self::Export(_) => "export_failed",
            Self::PasswordHashing(_) => "password_hash_failed",
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }

    /// Failed result carrying the error's kind and retry hint
    pub fn from_error(err: &Error) -> Self {
        let mut context = HashMap::new();
        context.insert("kind".to_string(), serde_json::Value::from(err.kind()));
        context.insert("retryable".to_string(), serde_json::Value::from(err.is_retryable()));
        Self::fail_with_context(err.to_string(), context)
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::from_error(&e),
        }
    }
}
