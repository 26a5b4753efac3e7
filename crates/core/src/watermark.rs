//! Removal of evaluation watermarks from a deck.

use crate::types::Deck;

/// Phrases an evaluation-mode document library stamps into shape text.
pub const WATERMARK_PHRASES: &[&str] = &[
    "Evaluation only.",
    "Created with Aspose.Slides for Python via .NET 25.1.",
    "Copyright 2004-2025Aspose Pty Ltd.",
    "Copyright 2004-2025 Aspose Pty Ltd.",
];

/// What a strip pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StripReport {
    /// Text shapes whose text was rewritten.
    pub texts_rewritten: usize,
    /// Shapes removed because their name marks them as watermarks.
    pub shapes_removed: usize,
}

impl StripReport {
    pub fn is_noop(&self) -> bool {
        self.texts_rewritten == 0 && self.shapes_removed == 0
    }
}

/// Strips watermark text and watermark shapes from decks.
#[derive(Debug, Clone)]
pub struct WatermarkStripper {
    phrases: Vec<String>,
}

impl Default for WatermarkStripper {
    fn default() -> Self {
        Self {
            phrases: WATERMARK_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl WatermarkStripper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom phrase list instead of the built-in one.
    pub fn with_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases.into_iter().map(Into::into).collect(),
        }
    }

    /// Remove every known phrase from every text shape and drop shapes whose
    /// name contains "watermark".
    pub fn strip(&self, deck: &mut Deck) -> StripReport {
        let mut report = StripReport::default();

        for slide in &mut deck.slides {
            for shape in &mut slide.shapes {
                let Some(frame) = shape.text_frame_mut() else {
                    continue;
                };
                let mut text = frame.text();
                if text.is_empty() {
                    continue;
                }

                let mut changed = false;
                for phrase in &self.phrases {
                    if text.contains(phrase.as_str()) {
                        text = text.replace(phrase.as_str(), "").trim().to_string();
                        changed = true;
                    }
                }
                if changed {
                    frame.set_text(&text);
                    report.texts_rewritten += 1;
                }
            }

            let before = slide.shapes.len();
            slide.shapes.retain(|shape| !shape.is_watermark_container());
            let removed = before - slide.shapes.len();
            if removed > 0 {
                log::debug!(
                    "Removed {} watermark shape(s) from slide {}",
                    removed,
                    slide.number
                );
            }
            report.shapes_removed += removed;
        }

        report
    }
}

/// Strip the built-in watermark phrases from a deck.
pub fn strip(deck: &mut Deck) -> StripReport {
    WatermarkStripper::default().strip(deck)
}
