//! Building a new deck from a selection of slides.

use crate::error::{Error, Result};
use crate::types::{Deck, TextFrame};
use crate::watermark::WatermarkStripper;
use std::path::{Path, PathBuf};

/// Name of the intermediate file the assembled deck is saved to.
pub const TEMP_FILE_NAME: &str = "temp_selected_slides.pptx";

/// Name of the watermark-free file the download is read from.
pub const FINAL_FILE_NAME: &str = "Selected_Slides.pptx";

/// File name the exported bytes are offered under.
pub const DOWNLOAD_FILE_NAME: &str = "Final_Ppt.pptx";

/// MIME type of the exported bytes.
pub const PPTX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Loads and saves decks in some container format.
pub trait DeckStore {
    fn load(&self, path: &Path) -> Result<Deck>;
    fn save(&self, deck: &Deck, path: &Path) -> Result<()>;
}

/// Result of an export.
#[derive(Debug, Clone)]
pub struct ExportedDeck {
    pub bytes: Vec<u8>,
    pub slide_count: usize,
    /// Intermediate file, left in place.
    pub temp_path: PathBuf,
    /// Watermark-free file the bytes were read from, left in place.
    pub final_path: PathBuf,
}

impl ExportedDeck {
    pub fn file_name(&self) -> &'static str {
        DOWNLOAD_FILE_NAME
    }

    pub fn mime_type(&self) -> &'static str {
        PPTX_MIME_TYPE
    }
}

/// Assemble a deck holding clones of the given slides, in the given order.
///
/// The page size is copied verbatim and every run's solid fill is copied onto
/// the matching run of the clone.
pub fn assemble(source: &Deck, positions: &[usize]) -> Result<Deck> {
    let mut target = Deck::blank();
    target.filename = DOWNLOAD_FILE_NAME.to_string();
    target.size = source.size;

    while target.slide_count() > 0 {
        target.remove_slide_at(0)?;
    }

    let layout = target.first_layout()?;
    for &position in positions {
        let original = source.slide(position)?;
        let new_slide = target.add_empty_slide(layout)?;
        let new_number = new_slide.number;

        for shape in &original.shapes {
            let cloned = new_slide.add_clone(shape);
            if let (Some(src), Some(dst)) = (shape.text_frame(), cloned.text_frame_mut()) {
                copy_run_colors(src, dst).map_err(|(paragraph, run)| {
                    Error::RunLayoutMismatch {
                        slide: new_number,
                        shape: shape.name().to_string(),
                        paragraph,
                        run,
                    }
                })?;
            }
        }
        log::debug!(
            "Cloned slide {} as slide {} ({} shapes)",
            position,
            new_number,
            original.shapes.len()
        );
    }

    Ok(target)
}

/// Copy the solid fill of paragraph i, run j of `src` onto the same run of
/// `dst`. Returns the first (paragraph, run) missing from `dst`.
pub fn copy_run_colors(
    src: &TextFrame,
    dst: &mut TextFrame,
) -> std::result::Result<(), (usize, usize)> {
    for (p_idx, paragraph) in src.paragraphs.iter().enumerate() {
        for (r_idx, run) in paragraph.runs.iter().enumerate() {
            let target = dst
                .paragraphs
                .get_mut(p_idx)
                .and_then(|p| p.runs.get_mut(r_idx))
                .ok_or((p_idx, r_idx))?;
            target.props.fill = run.props.fill.clone();
        }
    }
    Ok(())
}

/// Runs the assemble → save → strip → read pipeline.
pub struct Exporter<S> {
    store: S,
    stripper: WatermarkStripper,
    out_dir: PathBuf,
}

impl<S: DeckStore> Exporter<S> {
    /// Create an exporter writing its files into `out_dir`.
    pub fn new(store: S, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            stripper: WatermarkStripper::default(),
            out_dir: out_dir.into(),
        }
    }

    pub fn with_stripper(mut self, stripper: WatermarkStripper) -> Self {
        self.stripper = stripper;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Export the selected slides of `source` and return the final bytes.
    pub fn export(&self, source: &Deck, positions: &[usize]) -> Result<ExportedDeck> {
        let target = assemble(source, positions)?;

        std::fs::create_dir_all(&self.out_dir)?;
        let temp_path = self.out_dir.join(TEMP_FILE_NAME);
        let final_path = self.out_dir.join(FINAL_FILE_NAME);

        self.store.save(&target, &temp_path)?;
        log::info!(
            "Saved {} slide(s) to {}",
            target.slide_count(),
            temp_path.display()
        );

        self.strip_file(&temp_path, &final_path)?;

        let bytes = std::fs::read(&final_path)?;
        Ok(ExportedDeck {
            bytes,
            slide_count: target.slide_count(),
            temp_path,
            final_path,
        })
    }

    /// Load `input`, strip watermarks and save the result to `output`.
    pub fn strip_file(&self, input: &Path, output: &Path) -> Result<()> {
        let mut deck = self.store.load(input)?;
        let report = self.stripper.strip(&mut deck);
        log::debug!(
            "Watermark strip of {}: {} text(s) rewritten, {} shape(s) removed",
            input.display(),
            report.texts_rewritten,
            report.shapes_removed
        );
        self.store.save(&deck, output)
    }
}
