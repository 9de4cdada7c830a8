use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error(
        "invalid {field} '{value}': must contain only letters, digits, dots, underscores and hyphens"
    )]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("file already exists: {0} (use --overwrite to replace)")]
    AlreadyExists(String),

    #[error("HTTP {status} for {url}: {message}")]
    ClientRejected {
        url: String,
        status: u16,
        message: String,
    },

    #[error("no expression data for gene '{gene}' in dataset '{dataset_id}' ({url})")]
    NotFound {
        url: String,
        dataset_id: String,
        gene: String,
    },

    #[error("request to {url} failed after {attempts} attempt(s){}: {message}", status_suffix(.status))]
    NetworkExhausted {
        url: String,
        attempts: u32,
        status: Option<u16>,
        message: String,
    },

    #[error("unexpected response format from {url}: {message}")]
    DecodeError { url: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidIdentifier { .. } => "invalid-identifier",
            FetchError::AlreadyExists(_) => "already-exists",
            FetchError::ClientRejected { .. } => "client-rejected",
            FetchError::NotFound { .. } => "not-found",
            FetchError::NetworkExhausted { .. } => "network-exhausted",
            FetchError::DecodeError { .. } => "decode-error",
            FetchError::Filesystem(_) => "filesystem",
            FetchError::ClientBuild(_) => "client-build",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::ClientRejected { status, .. } => Some(*status),
            FetchError::NotFound { .. } => Some(404),
            FetchError::NetworkExhausted { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" (last status {status})"))
        .unwrap_or_default()
}
