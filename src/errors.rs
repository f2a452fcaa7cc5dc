use std::{error, fmt};

/// An error from Tester.
pub struct TesterError(pub String);

impl TesterError {
    /// Construct an error from anything printable.
    pub fn msg<S: Into<String>>(msg: S) -> Self {
        TesterError(msg.into())
    }
}

impl fmt::Debug for TesterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TesterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl error::Error for TesterError {}

impl From<std::io::Error> for TesterError {
    fn from(err: std::io::Error) -> Self {
        TesterError(err.to_string())
    }
}

impl From<rusqlite::Error> for TesterError {
    fn from(err: rusqlite::Error) -> Self {
        TesterError(format!("storage: {}", err))
    }
}

impl From<toml::de::Error> for TesterError {
    fn from(err: toml::de::Error) -> Self {
        TesterError(err.to_string())
    }
}

impl From<regex::Error> for TesterError {
    fn from(err: regex::Error) -> Self {
        TesterError(err.to_string())
    }
}

impl From<glob::PatternError> for TesterError {
    fn from(err: glob::PatternError) -> Self {
        TesterError(format!("glob pattern: {}", err))
    }
}

impl From<glob::GlobError> for TesterError {
    fn from(err: glob::GlobError) -> Self {
        TesterError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for TesterError {
    fn from(err: tokio::task::JoinError) -> Self {
        TesterError(err.to_string())
    }
}

// Helper method to collapse nested Results
pub trait RichResult<T, E> {
    fn collapse(self) -> Result<T, E>;
}

impl<T, E> RichResult<T, E> for Result<Result<T, E>, E> {
    fn collapse(self) -> Result<T, E> {
        match self {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e),
        }
    }
}
