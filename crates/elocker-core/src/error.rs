use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Validation error: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::other("port gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
