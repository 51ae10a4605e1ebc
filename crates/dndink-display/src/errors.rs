//! Error types for rendering and display output.

use thiserror::Error;

/// Failure while composing a frame or pushing it to a panel.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Layout could not be drawn.
    #[error("draw error: {0}")]
    Draw(String),

    /// Filesystem error (simulated output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// PNG encoding error (simulated output).
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Bus, GPIO or controller error on the physical panel.
    #[error("hardware error: {0}")]
    Hardware(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RenderError>;
