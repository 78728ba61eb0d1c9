//!
//! src/errors.rs  Oct 16th, 2026
//!
//! Defines the error taxonomy of the client and the conversions into it.
//! Every network facing operation maps its failure into one of these and
//! the front end renders `user_message()`
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShazoomError {
    #[error("config error: {0}")]
    Config(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("file too large: {size} bytes (limit {limit})")]
    SizeLimit { size: u64, limit: u64 },
    #[error("upload error: {0}")]
    Upload(String),
    #[error("identification error: {0}")]
    Identification(String),
    #[error("example sample error: {0}")]
    ExampleSampleParse(String),
    #[error("attempt {attempt} was superseded by a newer selection")]
    Superseded { attempt: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl ShazoomError {
    /// Text shown to the user in place of the raw error
    pub fn user_message(&self) -> String {
        match self {
            ShazoomError::SizeLimit { limit, .. } => format!(
                "File is too large. Maximum size is {} MB.",
                limit / (1024 * 1024)
            ),
            ShazoomError::Upload(reason) =>
                format!("Upload failed: {reason}. Please try again."),
            ShazoomError::Identification(reason) =>
                format!("Could not identify the song: {reason}. Please try again."),
            ShazoomError::ExampleSampleParse(_) =>
                "That example sample could not be read.".to_string(),
            ShazoomError::Fetch(_) | ShazoomError::Parse(_) =>
                "Song database is unavailable.".to_string(),
            other => other.to_string()
        }
    }

    /// Size errors render next to the upload control, the rest as a banner
    pub fn is_inline(&self) -> bool {
        matches!(self, ShazoomError::SizeLimit { .. })
    }
}

impl From<reqwest::Error> for ShazoomError {
    fn from(e: reqwest::Error) -> Self { ShazoomError::Fetch(e.to_string()) }
}

impl From<serde_json::Error> for ShazoomError {
    fn from(e: serde_json::Error) -> Self { ShazoomError::Parse(e.to_string()) }
}
