//! Unified CLI error type. `main` maps this to the exit codes in spec.md
//! §6: 0 success, 1 user/validation/not-found, 2 infra/critical.

use crate::client::ClientError;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{0}")]
    User(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn user(message: impl Into<String>) -> Self {
        CliError::User(message.into())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Client(e) => e.exit_code(),
            CliError::User(_) => 1,
            CliError::Other(_) => 2,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
