use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Invalid proxy line: {0} (expected host:port:username:password)")]
    InvalidProxy(String),
}
