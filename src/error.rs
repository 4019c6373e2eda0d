
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Grammar error: {message}")]
    Grammar { message: String },
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Evaluation error for {id}: {message}")]
    Evaluation { id: String, message: String },
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Field error at {path}: {message}")]
    Field { path: String, message: String },
    #[error("Iteration error: {message}")]
    Iteration { message: String },
    #[error("Vocabulary error: {0}")]
    Vocabulary(String),
}

pub type Result<T> = std::result::Result<T, QuarryError>;

// Helper conversions
impl From<config::ConfigError> for QuarryError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
