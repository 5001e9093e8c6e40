use std::path::PathBuf;
use thiserror::Error;

use crate::{config::ConfigError, retry::ErrorClass};

#[derive(Error, Debug)]
pub enum QuizError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Captions folder not found: {path}")]
    CaptionsFolderMissing { path: PathBuf },

    #[error("Video folder not found for {video} in captions folder {captions_dir}")]
    VideoFolderMissing { video: String, captions_dir: PathBuf },

    #[error("No SRT files found in {path}")]
    NoCaptionFiles { path: PathBuf },

    #[error("Invalid caption data at line {line}: {reason}")]
    InvalidCaption { line: usize, reason: String },

    #[error("No transcript data found")]
    EmptyTranscript,

    #[error("Transcript is not sorted by start time (record {index})")]
    UnsortedTranscript { index: usize },

    #[error("Window size must be greater than zero")]
    InvalidWindowSize,

    #[error("Question {question_index} has no citations")]
    MissingCitation { question_index: usize },

    #[error(
        "Question {question_index} cites window {citation}, but only {corpus_len} windows exist"
    )]
    CitationOutOfRange {
        question_index: usize,
        citation: i64,
        corpus_len: usize,
    },

    #[error("Model output does not match the {schema} schema: {reason}")]
    StructuredOutput { schema: String, reason: String },

    #[error("Authentication rejected by {provider}: {message}")]
    Authentication { provider: String, message: String },

    #[error("Rate limit hit: {message}")]
    RateLimited { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<QuizError>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl QuizError {
    /// How a remote failure should be treated by the retry policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            QuizError::Authentication { .. } => ErrorClass::Authentication,
            QuizError::RateLimited { .. } => ErrorClass::RateLimited,
            QuizError::Timeout { .. } => ErrorClass::Timeout,
            QuizError::Transport { .. } => ErrorClass::Transport,
            _ => ErrorClass::Fatal,
        }
    }
}

impl From<reqwest::Error> for QuizError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QuizError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            QuizError::Transport {
                message: err.to_string(),
            }
        } else {
            QuizError::Api {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, QuizError>;
