//! Application-wide error types.

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("llm error: {0}")]
    Llm(#[from] ProviderError),

    #[error("{0}")]
    Validation(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("log store error: {0}")]
    Store(String),

    #[error("pdf error: {0}")]
    Pdf(String),

    #[error("web error: {0}")]
    Web(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
