//! Low-resolution slide previews.
//!
//! Slides are drawn at roughly one pixel per point onto a white page: solid
//! shape fills as rectangles, pictures scaled into their frames and text as
//! greeked bars, one per line.

use deck_core::types::EMU_PER_POINT;
use deck_core::{Color, Deck, Error, Geometry, PreviewImage, Rasterizer, Result, Shape, Slide, TextFrame};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Largest width or height of a preview, in pixels.
pub const MAX_DIMENSION: u32 = 2048;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const MISSING_MEDIA: Rgb<u8> = Rgb([192, 192, 192]);
const DEFAULT_TEXT: Rgb<u8> = Rgb([64, 64, 64]);

/// Tallest line a text bar may occupy, in pixels.
const MAX_LINE_HEIGHT: u32 = 24;

/// Renders greeked PNG thumbnails with the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailRasterizer {
    emu_per_pixel: i64,
    max_dimension: u32,
}

impl Default for ThumbnailRasterizer {
    fn default() -> Self {
        Self {
            emu_per_pixel: EMU_PER_POINT,
            max_dimension: MAX_DIMENSION,
        }
    }
}

impl ThumbnailRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the resolution. Non-positive values fall back to one pixel
    /// per point.
    pub fn with_emu_per_pixel(mut self, emu_per_pixel: i64) -> Self {
        self.emu_per_pixel = if emu_per_pixel > 0 {
            emu_per_pixel
        } else {
            EMU_PER_POINT
        };
        self
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    /// Pixels per EMU for a deck, shrunk so neither side exceeds the maximum.
    fn scale(&self, deck: &Deck) -> f64 {
        let width = deck.size.width.max(1) as f64;
        let height = deck.size.height.max(1) as f64;
        let max = self.max_dimension as f64;
        (1.0 / self.emu_per_pixel as f64)
            .min(max / width)
            .min(max / height)
    }

    /// Draw one slide.
    pub fn render_slide(&self, deck: &Deck, slide: &Slide) -> Result<PreviewImage> {
        let scale = self.scale(deck);
        let width = to_pixels(deck.size.width, scale).clamp(1, self.max_dimension);
        let height = to_pixels(deck.size.height, scale).clamp(1, self.max_dimension);

        let mut canvas = Canvas {
            image: RgbImage::from_pixel(width, height, BACKGROUND),
            scale,
        };
        for shape in &slide.shapes {
            canvas.draw_shape(shape);
        }

        Ok(PreviewImage {
            slide: slide.number,
            width,
            height,
            png: encode_png(canvas.image)?,
        })
    }
}

impl Rasterizer for ThumbnailRasterizer {
    fn rasterize(&self, deck: &Deck) -> Result<Vec<PreviewImage>> {
        let previews = deck
            .slides
            .iter()
            .map(|slide| self.render_slide(deck, slide))
            .collect::<Result<Vec<_>>>()?;
        log::debug!("Rasterized {} slide(s) of {}", previews.len(), deck.filename);
        Ok(previews)
    }
}

fn to_pixels(emu: i64, scale: f64) -> u32 {
    (emu.max(0) as f64 * scale).round() as u32
}

fn encode_png(image: RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| Error::RenderError(format!("Failed to encode preview: {}", e)))?;
    Ok(buffer.into_inner())
}

/// A shape's frame in canvas pixels, already clipped to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

struct Canvas {
    image: RgbImage,
    scale: f64,
}

impl Canvas {
    fn rect(&self, geometry: &Geometry) -> Option<PixelRect> {
        let left = (geometry.x as f64 * self.scale).round() as i64;
        let top = (geometry.y as f64 * self.scale).round() as i64;
        let right = left + to_pixels(geometry.cx, self.scale) as i64;
        let bottom = top + to_pixels(geometry.cy, self.scale) as i64;

        let left = left.clamp(0, self.image.width() as i64);
        let top = top.clamp(0, self.image.height() as i64);
        let right = right.clamp(0, self.image.width() as i64);
        let bottom = bottom.clamp(0, self.image.height() as i64);
        if right <= left || bottom <= top {
            return None;
        }
        Some(PixelRect {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }

    fn fill(&mut self, rect: PixelRect, color: Rgb<u8>) {
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                self.image.put_pixel(x, y, color);
            }
        }
    }

    fn draw_shape(&mut self, shape: &Shape) {
        let Some(rect) = shape.geometry().and_then(|g| self.rect(&g)) else {
            return;
        };
        match shape {
            Shape::Text(text) => {
                if let Some(color) = text.fill.as_ref().and_then(rgb) {
                    self.fill(rect, color);
                }
                self.draw_text(rect, &text.frame);
            }
            Shape::Picture(picture) => self.draw_picture(rect, &picture.media, &picture.name),
            Shape::Generic(generic) => {
                if let Some(color) = generic.fill.as_ref().and_then(rgb) {
                    self.fill(rect, color);
                }
            }
        }
    }

    fn draw_picture(&mut self, rect: PixelRect, media: &[u8], name: &str) {
        match image::load_from_memory(media) {
            Ok(decoded) => {
                let scaled = imageops::resize(
                    &decoded.to_rgb8(),
                    rect.width,
                    rect.height,
                    FilterType::Triangle,
                );
                imageops::overlay(&mut self.image, &scaled, rect.x as i64, rect.y as i64);
            }
            Err(e) => {
                log::debug!("Could not decode picture '{}': {}", name, e);
                self.fill(rect, MISSING_MEDIA);
            }
        }
    }

    /// One bar per line; a bar's length follows the line's character count.
    fn draw_text(&mut self, rect: PixelRect, frame: &TextFrame) {
        let lines: Vec<(usize, Rgb<u8>)> = frame
            .paragraphs
            .iter()
            .flat_map(|paragraph| {
                let color = paragraph
                    .runs
                    .iter()
                    .find_map(|run| run.props.fill.as_ref().and_then(rgb))
                    .unwrap_or(DEFAULT_TEXT);
                paragraph
                    .text()
                    .split(deck_core::types::LINE_BREAK)
                    .map(|line| (line.chars().count(), color))
                    .collect::<Vec<_>>()
            })
            .collect();
        if lines.is_empty() {
            return;
        }

        let line_height = (rect.height / lines.len() as u32).clamp(1, MAX_LINE_HEIGHT);
        let bar_height = (line_height * 3 / 5).max(1);
        let char_width = (line_height / 2).max(1);

        for (idx, (chars, color)) in lines.into_iter().enumerate() {
            let top = rect.y + idx as u32 * line_height;
            if chars == 0 || top + bar_height > rect.y + rect.height {
                continue;
            }
            let length = (chars as u32).saturating_mul(char_width).min(rect.width);
            self.fill(
                PixelRect {
                    x: rect.x,
                    y: top,
                    width: length,
                    height: bar_height,
                },
                color,
            );
        }
    }
}

fn rgb(color: &Color) -> Option<Rgb<u8>> {
    color.rgb().map(|(r, g, b)| Rgb([r, g, b]))
}
