use thiserror::Error;

use crate::decode::DecodeError;
use crate::types::RegisterBank;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("register {}{index} has no backing storage", bank.short_name())]
    Resolve { bank: RegisterBank, index: u32 },

    #[error("failed to load {operand}: {reason}")]
    Load { operand: String, reason: String },

    #[error("unsupported: {what}")]
    Unsupported { what: String },

    #[error("invalid program metadata: {message}")]
    Metadata { message: String },
}

impl TranslateError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        TranslateError::Unsupported { what: what.into() }
    }

    pub fn metadata(message: impl Into<String>) -> Self {
        TranslateError::Metadata {
            message: message.into(),
        }
    }
}
