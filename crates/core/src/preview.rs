//! Slide preview images and the rasterizer seam.

use crate::error::Result;
use crate::types::Deck;
use serde::Serialize;

/// A raster snapshot of exactly one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewImage {
    /// 1-based number of the slide this image was rendered from.
    pub slide: usize,
    pub width: u32,
    pub height: u32,
    /// PNG-encoded pixels.
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// Renders one preview per slide.
///
/// Implementations must return exactly `deck.slide_count()` images, in slide
/// order, and must be deterministic for a given slide.
pub trait Rasterizer {
    fn rasterize(&self, deck: &Deck) -> Result<Vec<PreviewImage>>;
}

impl<R: Rasterizer + ?Sized> Rasterizer for &R {
    fn rasterize(&self, deck: &Deck) -> Result<Vec<PreviewImage>> {
        (**self).rasterize(deck)
    }
}
