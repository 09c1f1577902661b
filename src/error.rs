use thiserror::Error;

/// Failure of a call to the REST backend.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(Box<reqwest::Error>),

    /// Non-success status; `message` is the backend's `detail` when present.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Invalid(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else {
            ApiError::Transport(Box::new(error))
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("Corrupt data in {path}: {source}")]
    Json { path: String, source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("You must be logged in to {0}")]
    NotSignedIn(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("Identity service is not configured (set LINGODECK_IDENTITY_URL and LINGODECK_IDENTITY_KEY)")]
    NotConfigured,

    #[error("{0}")]
    Service(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
