use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Internal(format!("Malformed registry response: {err}"))
        } else {
            Self::RegistryUnavailable(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
