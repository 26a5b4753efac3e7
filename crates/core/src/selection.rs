//! The user's picks for export.

use crate::preview::PreviewImage;
use std::collections::BTreeSet;

/// Session-scoped selection of slides plus the confirmation latch.
///
/// Entries keep the order in which they were first picked; that order is the
/// order slides are exported in.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    picks: Vec<(usize, PreviewImage)>,
    select_all: bool,
    rendered: BTreeSet<usize>,
    confirmed: bool,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, position: usize) -> bool {
        self.picks.iter().any(|(p, _)| *p == position)
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    /// Selected positions in pick order.
    pub fn positions(&self) -> Vec<usize> {
        self.picks.iter().map(|(p, _)| *p).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &PreviewImage)> {
        self.picks.iter().map(|(p, img)| (*p, img))
    }

    /// Apply a checkbox change. Checking an already picked slide keeps its
    /// original place in the order.
    pub fn toggle(&mut self, position: usize, preview: &PreviewImage, checked: bool) {
        self.rendered.insert(position);
        if checked {
            if !self.contains(position) {
                self.picks.push((position, preview.clone()));
            }
        } else {
            self.picks.retain(|(p, _)| *p != position);
        }
    }

    /// Drop picks that are no longer in the visible match set.
    pub fn retain_visible(&mut self, visible: &[usize]) {
        self.picks.retain(|(p, _)| visible.contains(p));
    }

    pub fn select_all(&self) -> bool {
        self.select_all
    }

    /// Set the default for rows that have not been rendered yet.
    pub fn set_select_all(&mut self, on: bool) {
        self.select_all = on;
    }

    /// Checkbox state a row is drawn with.
    pub fn checkbox_default(&self, position: usize) -> bool {
        if self.rendered.contains(&position) {
            self.contains(position)
        } else {
            self.contains(position) || self.select_all
        }
    }

    /// Record that a row has been drawn, adopting its default state.
    ///
    /// Only the first render of a row can pick it up from "Select All"; later
    /// renders leave the user's choice alone.
    pub fn render_row(&mut self, position: usize, preview: &PreviewImage) -> bool {
        let checked = self.checkbox_default(position);
        if !self.rendered.contains(&position) {
            self.toggle(position, preview, checked);
        }
        checked
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Latch the confirmation. An empty selection cannot be confirmed; once
    /// latched it stays set for the session.
    pub fn confirm(&mut self) -> bool {
        if !self.picks.is_empty() {
            self.confirmed = true;
        }
        self.confirmed
    }
}
