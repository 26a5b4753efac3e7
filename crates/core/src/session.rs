//! Interactive filter/select/export session.
//!
//! Every user interaction is an [`Event`]. [`Session::dispatch`] applies the
//! state transition, runs a render pass over the visible rows and returns the
//! resulting [`View`]. Nothing here knows how the view is drawn.

use crate::error::{Error, Result};
use crate::export::{DeckStore, ExportedDeck, Exporter};
use crate::matcher::{match_slides, FilterForm, Sentiment, SlideMatch};
use crate::preview::Rasterizer;
use crate::selection::SelectionState;
use crate::types::Deck;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SetSentiment(Sentiment),
    SetRationale(Vec<String>),
    SetDrugs(Vec<String>),
    SetKeyword(String),
    Check(usize),
    Uncheck(usize),
    SelectAll(bool),
    Confirm,
    Download,
}

impl Event {
    fn changes_filter(&self) -> bool {
        matches!(
            self,
            Self::SetSentiment(_) | Self::SetRationale(_) | Self::SetDrugs(_) | Self::SetKeyword(_)
        )
    }
}

/// One matching slide as drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowView {
    pub position: usize,
    pub checked: bool,
}

/// The download offer shown after confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadView {
    pub file_name: String,
    pub mime_type: String,
    pub size: usize,
    pub slide_count: usize,
}

/// Everything a front end needs to draw the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    /// Persistent error, set when the source deck is missing.
    pub error: Option<String>,
    /// Path of the loaded deck.
    pub loaded: Option<String>,
    pub form: FilterForm,
    pub select_all: bool,
    pub rows: Vec<RowView>,
    /// Selected positions in export order.
    pub selected: Vec<usize>,
    /// Whether the confirm control is offered.
    pub can_confirm: bool,
    pub confirmed: bool,
    pub download: Option<DownloadView>,
}

/// State of one user's session against one source deck.
pub struct Session<R, S> {
    deck_path: PathBuf,
    deck: Option<Deck>,
    rasterizer: R,
    exporter: Exporter<S>,
    form: FilterForm,
    matches: Vec<SlideMatch>,
    selection: SelectionState,
    /// Latest export and the positions it was made from.
    last_export: Option<(Vec<usize>, ExportedDeck)>,
}

impl<R: Rasterizer, S: DeckStore> Session<R, S> {
    /// Open a session on the deck at `deck_path`.
    ///
    /// A missing file is not an error here: the session comes up with a
    /// persistent error message and ignores every event. An unreadable file
    /// is returned as an error.
    pub fn open(deck_path: impl Into<PathBuf>, rasterizer: R, exporter: Exporter<S>) -> Result<Self> {
        let deck_path = deck_path.into();
        let deck = if deck_path.exists() {
            Some(exporter.store().load(&deck_path)?)
        } else {
            log::error!("No backend deck file found at {}", deck_path.display());
            None
        };

        let mut session = Self {
            deck_path,
            deck,
            rasterizer,
            exporter,
            form: FilterForm::default(),
            matches: Vec::new(),
            selection: SelectionState::new(),
            last_export: None,
        };
        session.refresh()?;
        session.render_rows();
        Ok(session)
    }

    pub fn deck_path(&self) -> &Path {
        &self.deck_path
    }

    pub fn deck(&self) -> Option<&Deck> {
        self.deck.as_ref()
    }

    pub fn matches(&self) -> &[SlideMatch] {
        &self.matches
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// The most recent download, while it still matches the confirmed
    /// selection.
    pub fn last_export(&self) -> Option<&ExportedDeck> {
        if !self.selection.is_confirmed() {
            return None;
        }
        let positions = self.selection.positions();
        match &self.last_export {
            Some((exported_from, export)) if *exported_from == positions => Some(export),
            _ => None,
        }
    }

    /// Apply one event and return the re-rendered view.
    pub fn dispatch(&mut self, event: Event) -> Result<View> {
        if self.deck.is_none() {
            log::debug!("Ignoring {:?}: no deck loaded", event);
            return Ok(self.view());
        }

        let refilter = event.changes_filter();
        match event {
            Event::SetSentiment(sentiment) => self.form.sentiment = sentiment,
            Event::SetRationale(terms) => self.form.rationale = terms,
            Event::SetDrugs(drugs) => self.form.drugs = drugs,
            Event::SetKeyword(keyword) => self.form.keyword = keyword,
            Event::Check(position) => self.set_checked(position, true)?,
            Event::Uncheck(position) => self.set_checked(position, false)?,
            Event::SelectAll(on) => self.selection.set_select_all(on),
            Event::Confirm => {
                if self.selection.confirm() {
                    log::info!("Selection confirmed: {:?}", self.selection.positions());
                }
            }
            Event::Download => self.download()?,
        }

        if refilter {
            self.refresh()?;
        }
        self.render_rows();
        Ok(self.view())
    }

    /// Current view without applying an event.
    pub fn view(&self) -> View {
        let error = match self.deck {
            Some(_) => None,
            None => Some(Error::MissingDeck(self.deck_path.display().to_string()).to_string()),
        };
        let rows = self
            .matches
            .iter()
            .map(|m| RowView {
                position: m.position,
                checked: self.selection.contains(m.position),
            })
            .collect();
        let download = self.last_export().map(|export| DownloadView {
            file_name: export.file_name().to_string(),
            mime_type: export.mime_type().to_string(),
            size: export.bytes.len(),
            slide_count: export.slide_count,
        });

        View {
            error,
            loaded: self
                .deck
                .as_ref()
                .map(|_| self.deck_path.display().to_string()),
            form: self.form.clone(),
            select_all: self.selection.select_all(),
            rows,
            selected: self.selection.positions(),
            can_confirm: !self.selection.is_empty() && !self.selection.is_confirmed(),
            confirmed: self.selection.is_confirmed(),
            download,
        }
    }

    fn refresh(&mut self) -> Result<()> {
        let Some(deck) = &self.deck else {
            return Ok(());
        };
        self.matches = match_slides(deck, &self.form.criteria(), &self.rasterizer)?;
        let visible: Vec<usize> = self.matches.iter().map(|m| m.position).collect();
        self.selection.retain_visible(&visible);
        Ok(())
    }

    fn render_rows(&mut self) {
        for m in &self.matches {
            self.selection.render_row(m.position, &m.preview);
        }
    }

    fn set_checked(&mut self, position: usize, checked: bool) -> Result<()> {
        let m = self
            .matches
            .iter()
            .find(|m| m.position == position)
            .ok_or_else(|| {
                Error::InvalidInput(format!("slide {} is not among the matching slides", position))
            })?;
        self.selection.toggle(position, &m.preview, checked);
        Ok(())
    }

    fn download(&mut self) -> Result<()> {
        if !self.selection.is_confirmed() || self.selection.is_empty() {
            log::debug!("Download requested before a confirmed, non-empty selection");
            return Ok(());
        }
        let Some(deck) = &self.deck else {
            return Ok(());
        };
        let positions = self.selection.positions();
        let exported = self.exporter.export(deck, &positions)?;
        log::info!(
            "Exported {} slide(s), {} bytes",
            exported.slide_count,
            exported.bytes.len()
        );
        self.last_export = Some((positions, exported));
        Ok(())
    }
}
