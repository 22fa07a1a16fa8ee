use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::types::{Address, Amount};

/// Every way a ledger mutation can be rejected. A rejected call leaves state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient Balance: {account} holds {available}, needs {required}")]
    InsufficientBalance { account: Address, available: Amount, required: Amount },
    #[error("Insufficient Allowance: {spender} may spend {available} of {owner}, needs {required}")]
    InsufficientAllowance { owner: Address, spender: Address, available: Amount, required: Amount },
    #[error("Invalid Recipient: {0}")]
    InvalidRecipient(Address),
    #[error("Invalid Spender: {0}")]
    InvalidSpender(Address),
    #[error("Arithmetic Overflow")]
    ArithmeticOverflow,
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientBalance { .. } => "ZKPAY-0x01",
            LedgerError::InsufficientAllowance { .. } => "ZKPAY-0x02",
            LedgerError::InvalidRecipient(_) => "ZKPAY-0x03",
            LedgerError::InvalidSpender(_) => "ZKPAY-0x04",
            LedgerError::ArithmeticOverflow => "ZKPAY-0x05",
        }
    }
}

#[derive(Error, Debug)]
pub enum ZkPayError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Unauthorized")]
    Unauthorized, // ZKPAY-0x40
    #[error("Validation Error: {0}")]
    Validation(String), // ZKPAY-0x20
    #[error("Unsupported: {0}")]
    Unsupported(String), // ZKPAY-0x21
    #[error("Config Error: {0}")]
    Config(String), // ZKPAY-0x22
    #[error("Ledger IO Error: {0}")]
    LedgerIo(String), // ZKPAY-0x30
    #[error("Serialization Error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("State Corruption: {0}")]
    State(String),
}

impl IntoResponse for ZkPayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ZkPayError::Ledger(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.code()),
            ZkPayError::Unauthorized => (StatusCode::UNAUTHORIZED, "ZKPAY-0x40"),
            ZkPayError::Validation(_) => (StatusCode::BAD_REQUEST, "ZKPAY-0x20"),
            ZkPayError::Unsupported(_) => (StatusCode::NOT_FOUND, "ZKPAY-0x21"),
            ZkPayError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ZKPAY-0x22"),
            ZkPayError::LedgerIo(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ZKPAY-0x30"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "ZKPAY-0x99"),
        };
        let body = Json(json!({ "error": self.to_string(), "code": code }));
        (status, body).into_response()
    }
}
