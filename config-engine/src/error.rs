use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    SourceNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    ParseError(Box<figment::Error>),

    #[error("Configuration validation failed: {}", .0.join("; "))]
    ValidationError(Vec<String>),

    #[error("Missing configuration section: {0}")]
    MissingSection(&'static str),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::ParseError(Box::new(error))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
