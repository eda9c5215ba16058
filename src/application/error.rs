use thiserror::Error;

use crate::domain::{MoneyError, Pence, PostingError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid account reference: {0}")]
    InvalidAccountReference(String),

    #[error("Insufficient funds in account {account}: balance {balance}p, required {required}p")]
    InsufficientFunds {
        account: String,
        balance: Pence,
        required: Pence,
    },

    #[error("Business '{business}' is sanctioned and cannot receive transactions")]
    SanctionedBusiness { business: String },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Business not found: {0}")]
    BusinessNotFound(String),

    #[error("Business already exists: {0}")]
    BusinessAlreadyExists(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<PostingError> for AppError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::Validation(msg) => AppError::Validation(msg),
            PostingError::InvalidAccountReference(msg) => AppError::InvalidAccountReference(msg),
            PostingError::InsufficientFunds {
                account,
                balance,
                required,
            } => AppError::InsufficientFunds {
                account,
                balance,
                required,
            },
            PostingError::SanctionedBusiness { business } => {
                AppError::SanctionedBusiness { business }
            }
        }
    }
}

impl From<MoneyError> for AppError {
    fn from(err: MoneyError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl AppError {
    /// Whether the request itself was refused, as opposed to a storage failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AppError::Database(_))
    }
}
