//! PPTX (Office Open XML) backend for slide decks.
//!
//! Reads .pptx files (ZIP archives of XML parts) into the deck model and
//! writes decks back out as complete packages.

pub mod package;
pub mod parser;
pub mod shapes;
pub mod store;
pub mod template;
pub mod writer;
pub mod xml;

pub use parser::PptxParser;
pub use store::{open_deck, strip_watermarks_file, strip_watermarks_file_with, PptxStore};
pub use writer::PptxWriter;
