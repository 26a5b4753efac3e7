//! Error types for deck loading, matching and export.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while working with a deck.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open, read or write a file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The configured source deck does not exist.
    #[error("No backend deck file found at '{0}'")]
    MissingDeck(String),

    /// The file format is not supported or could not be detected.
    #[error("Unsupported or unrecognized file format: {0}")]
    UnsupportedFormat(String),

    /// Invalid or corrupted file.
    #[error("Invalid or corrupted file: {0}")]
    CorruptedFile(String),

    /// ZIP archive error (for PPTX).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing error (for PPTX).
    #[error("XML parsing error: {0}")]
    XmlError(String),

    /// A 1-based slide position that does not exist in the deck.
    #[error("Slide {position} is out of range (deck has {count} slides)")]
    SlideOutOfRange { position: usize, count: usize },

    /// A cloned text frame does not have the paragraph/run layout of its source.
    #[error(
        "Run layout mismatch on slide {slide}, shape '{shape}': paragraph {paragraph}, run {run} missing in clone"
    )]
    RunLayoutMismatch {
        slide: usize,
        shape: String,
        paragraph: usize,
        run: usize,
    },

    /// The target deck has no layout to base new slides on.
    #[error("Deck has no slide layout")]
    NoLayout,

    /// A user-supplied value could not be understood.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failed to rasterize a slide preview.
    #[error("Render error: {0}")]
    RenderError(String),
}
