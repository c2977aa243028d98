//! Error type for the shared coach library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value outside its accepted set (e.g. an unknown status string)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
