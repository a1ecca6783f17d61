use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),
    #[error("Symbol not found: {0}")]
    NotFound(String),
    #[error("Transient provider error: {0}")]
    Transient(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Csv error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Custom error: {0}")]
    CustomError(String),
}

impl Error {
    /// Retry is only worth it when the provider might succeed on a later
    /// attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited(_) | Error::Transient(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            return Error::Transient(error.to_string());
        }

        match error.status() {
            Some(status) if status.as_u16() == 429 => Error::RateLimited(error.to_string()),
            Some(status) if status.as_u16() == 404 => Error::NotFound(error.to_string()),
            Some(status) if status.is_server_error() => Error::Transient(error.to_string()),
            _ => Error::CustomError(error.to_string()),
        }
    }
}

#[macro_export]
macro_rules! error {
    ($variant:ident, $($arg:tt)*) => {
        Error::$variant(format!($($arg)*))
    };
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_macro() {
        let error = error!(CustomError, "Testing 123 : {}", 69);
        let x_error = Error::CustomError(format!("Testing 123 : {}", 69));

        // Test
        assert_eq!(error.to_string(), x_error.to_string());
    }

    #[test]
    fn test_retryable() {
        // Test
        assert!(Error::RateLimited("slow down".into()).is_retryable());
        assert!(Error::Transient("503".into()).is_retryable());
        assert!(!Error::NotFound("XYZ".into()).is_retryable());
        assert!(!Error::ParseError("bad row".into()).is_retryable());
    }
}
