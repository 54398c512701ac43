use thiserror::Error;

pub type Result<T> = std::result::Result<T, SheetCountError>;

#[derive(Error, Debug)]
pub enum SheetCountError {
    #[error("Invalid input image of shape {shape:?}: {reason}")]
    InvalidInput { shape: Vec<usize>, reason: String },

    #[error("Pipeline fault: {0}")]
    Pipeline(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl SheetCountError {
    pub(crate) fn invalid_input(shape: &[usize], reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            shape: shape.to_vec(),
            reason: reason.into(),
        }
    }
}
