use thiserror::Error;

use crate::style::FontVariant;

#[derive(Error, Debug)]
pub enum PdfEditError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBBox(String),

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("Color {0} is outside the 24-bit RGB range")]
    ColorOutOfRange(i64),

    #[error("No changes")]
    EmptyLedger,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(usize, usize),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for PdfEditError {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => PdfEditError::Io(e),
            _ => PdfEditError::OperationError(err.to_string()),
        }
    }
}

/// Failure to draw one piece of replacement text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrawError {
    #[error("Character {ch:?} cannot be rendered with {variant}")]
    UnsupportedCharacter { ch: char, variant: FontVariant },

    #[error("Draw failed: {0}")]
    Engine(String),
}
