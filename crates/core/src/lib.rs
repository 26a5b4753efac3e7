//! Core document model and the filter → select → export workflow for
//! slide decks.

pub mod error;
pub mod export;
pub mod matcher;
pub mod preview;
pub mod selection;
pub mod session;
pub mod types;
pub mod watermark;

pub use error::{Error, Result};
pub use export::{DeckStore, ExportedDeck, Exporter};
pub use matcher::{match_slides, matching_positions, FilterCriteria, FilterForm, Sentiment, SlideMatch};
pub use preview::{PreviewImage, Rasterizer};
pub use selection::SelectionState;
pub use session::{Event, Session, View};
pub use types::{
    Color, Deck, GenericShape, Geometry, Layout, LinkTarget, Paragraph, PictureShape,
    PresentationFormat, RunKind, RunProps, Shape, ShapeLink, Slide, SlideSize, TextFrame, TextRun,
    TextShape,
};
pub use watermark::{StripReport, WatermarkStripper};
