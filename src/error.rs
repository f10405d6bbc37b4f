use thiserror::Error;

use crate::jsonstat::DecodeError;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Failed to retrieve data from {url}. Error: {message}")]
    Http { url: String, message: String },
    #[error("Server responded {status} {status_text} for {url}")]
    Status { url: String, status: u16, status_text: String },
    #[error("Unexpected response structure from {url}: {message}")]
    Payload { url: String, message: String },
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
