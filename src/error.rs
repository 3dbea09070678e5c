use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AstroError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("{url} returned status {status}")]
    HttpStatus { status: u16, url: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("failed to parse catalog table: {0}")]
    CatalogParse(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse config: {0}")]
    ConfigParse(String),

    #[error("missing config key: {0}")]
    MissingConfigKey(&'static str),

    #[error("invalid config value for {key}: {message}")]
    InvalidConfig { key: &'static str, message: String },

    #[error("source directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to write audit table: {0}")]
    AuditWrite(String),

    #[error("failed to decode {file}: {reason}")]
    Decode { file: String, reason: String },
}
