use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No backend URL configured. Pass --url or set KONNEKT_URL.")]
    MissingUrl,

    #[error("Not a konnekt workspace (or any parent of {}). Run 'konnekt init' first.", .0.display())]
    NotAWorkspace(PathBuf),

    #[error("could not determine the current directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the local draft table.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("draft storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("draft storage unavailable: {0}")]
    Unavailable(String),

    #[error("invalid draft: {0}")]
    InvalidDraft(String),

    #[error("draft storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the hosted backend.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("not a data: URL")]
    MissingScheme,

    #[error("data: URL has no payload separator")]
    MissingComma,

    #[error("only base64 data: URLs are supported")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("could not decode image: {0}")]
    Decode(image::ImageError),

    #[error("could not encode image: {0}")]
    Encode(image::ImageError),
}

/// Why a single draft did not sync. None of these abort a sync pass.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("no signed-in user")]
    Unauthenticated,

    #[error("could not resolve current user: {0}")]
    Identity(RemoteError),

    #[error("draft is not ready to submit: {0}")]
    InvalidDraft(String),

    #[error("attached image is unreadable: {0}")]
    Image(#[from] DataUrlError),

    #[error("image upload failed: {0}")]
    Upload(RemoteError),

    #[error("issue creation failed: {0}")]
    Create(RemoteError),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("issue was created but the local draft could not be removed: {0}")]
    LocalDelete(StoreError),
}
