//! Slide filtering by rationale terms and free-text keyword.

use crate::error::{Error, Result};
use crate::preview::{PreviewImage, Rasterizer};
use crate::types::Deck;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rationale options offered by the filter form.
pub const RATIONALE_OPTIONS: &[&str] = &["Safety/Tolerability", "Efficacy"];

/// Drug options offered by the filter form.
pub const DRUG_OPTIONS: &[&str] = &["Mariposa", "Datatumumab", "Teclistamab"];

/// Terms a slide is matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub rationale: Vec<String>,
    pub keyword: Option<String>,
}

impl FilterCriteria {
    pub fn new<I, S>(rationale: I, keyword: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rationale: rationale.into_iter().map(Into::into).collect(),
            keyword: keyword.map(str::to_string),
        }
    }

    /// True when no term could ever match.
    pub fn is_empty(&self) -> bool {
        self.rationale.is_empty() && self.keyword().is_none()
    }

    fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref().filter(|k| !k.is_empty())
    }

    /// Does a lowercase slide text blob satisfy these criteria?
    ///
    /// Matching is by substring, so partial words count.
    pub fn matches(&self, blob: &str) -> bool {
        self.rationale
            .iter()
            .any(|term| blob.contains(&term.to_lowercase()))
            || self
                .keyword()
                .is_some_and(|keyword| blob.contains(&keyword.to_lowercase()))
    }
}

/// Overall tone a user is filtering for. Shown in the form, not used to filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    #[default]
    Critic,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Positive => "Positive",
            Self::Neutral => "Neutral",
            Self::Critic => "Critic",
        };
        f.write_str(name)
    }
}

impl FromStr for Sentiment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "critic" => Ok(Self::Critic),
            other => Err(Error::InvalidInput(format!("unknown sentiment '{}'", other))),
        }
    }
}

/// State of every filter control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterForm {
    pub sentiment: Sentiment,
    pub rationale: Vec<String>,
    /// Selected drugs. Kept for display; not part of the match predicate.
    pub drugs: Vec<String>,
    pub keyword: String,
}

impl Default for FilterForm {
    fn default() -> Self {
        Self {
            sentiment: Sentiment::default(),
            rationale: vec![RATIONALE_OPTIONS[0].to_string()],
            drugs: Vec::new(),
            keyword: String::new(),
        }
    }
}

impl FilterForm {
    /// Criteria the form currently describes.
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            rationale: self.rationale.clone(),
            keyword: Some(self.keyword.clone()).filter(|k| !k.is_empty()),
        }
    }
}

/// A slide that satisfied the filter, with its preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideMatch {
    /// 1-based slide position.
    pub position: usize,
    pub preview: PreviewImage,
}

/// Positions of every slide satisfying `criteria`, in slide order.
pub fn matching_positions(deck: &Deck, criteria: &FilterCriteria) -> Vec<usize> {
    if criteria.is_empty() {
        return Vec::new();
    }
    deck.slides
        .iter()
        .enumerate()
        .filter(|(_, slide)| criteria.matches(&slide.text_blob()))
        .map(|(idx, _)| idx + 1)
        .collect()
}

/// Rasterize the deck once and pair every matching slide with its preview.
pub fn match_slides<R: Rasterizer>(
    deck: &Deck,
    criteria: &FilterCriteria,
    rasterizer: &R,
) -> Result<Vec<SlideMatch>> {
    let images = rasterizer.rasterize(deck)?;
    if images.len() != deck.slide_count() {
        return Err(Error::RenderError(format!(
            "rasterizer produced {} images for {} slides",
            images.len(),
            deck.slide_count()
        )));
    }

    let positions = matching_positions(deck, criteria);
    log::debug!(
        "{} of {} slides match {:?}",
        positions.len(),
        deck.slide_count(),
        criteria
    );

    Ok(positions
        .into_iter()
        .map(|position| SlideMatch {
            position,
            preview: images[position - 1].clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{deck_of, StubRasterizer};

    #[test]
    fn test_empty_criteria_match_nothing() {
        let deck = deck_of(&["Efficacy", "Safety"]);
        let criteria = FilterCriteria::new(Vec::<String>::new(), Some(""));
        assert!(criteria.is_empty());
        assert!(match_slides(&deck, &criteria, &StubRasterizer)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rationale_is_case_insensitive() {
        let deck = deck_of(&["nothing here", "SAFETY/TOLERABILITY profile", "efficacy"]);
        let criteria = FilterCriteria::new(["Safety/Tolerability"], None);
        assert_eq!(matching_positions(&deck, &criteria), vec![2]);
    }

    #[test]
    fn test_keyword_matches_inside_words() {
        let deck = deck_of(&["Datatumumab results", "other"]);
        let criteria = FilterCriteria::new(Vec::<String>::new(), Some("data"));
        assert_eq!(matching_positions(&deck, &criteria), vec![1]);
    }

    #[test]
    fn test_rationale_or_keyword() {
        let deck = deck_of(&["Efficacy", "Mariposa", "Teclistamab", "efficacy of mariposa"]);
        let criteria = FilterCriteria::new(["Efficacy"], Some("MARIPOSA"));
        assert_eq!(matching_positions(&deck, &criteria), vec![1, 2, 4]);
    }

    #[test]
    fn test_matches_carry_their_own_preview() {
        let deck = deck_of(&["a", "efficacy", "b", "Efficacy"]);
        let criteria = FilterCriteria::new(["efficacy"], None);

        let matches = match_slides(&deck, &criteria, &StubRasterizer).unwrap();

        let pairs: Vec<(usize, usize)> = matches
            .iter()
            .map(|m| (m.position, m.preview.slide))
            .collect();
        assert_eq!(pairs, vec![(2, 2), (4, 4)]);
    }

    #[test]
    fn test_short_rasterizer_output_is_an_error() {
        struct Broken;
        impl Rasterizer for Broken {
            fn rasterize(&self, _deck: &Deck) -> Result<Vec<PreviewImage>> {
                Ok(Vec::new())
            }
        }
        let deck = deck_of(&["efficacy"]);
        let criteria = FilterCriteria::new(["efficacy"], None);
        assert!(matches!(
            match_slides(&deck, &criteria, &Broken),
            Err(Error::RenderError(_))
        ));
    }

    #[test]
    fn test_form_defaults_and_criteria() {
        let mut form = FilterForm::default();
        assert_eq!(form.sentiment, Sentiment::Critic);
        assert_eq!(form.rationale, vec!["Safety/Tolerability"]);
        assert_eq!(form.criteria().keyword, None);

        form.keyword = "data".to_string();
        form.drugs = vec!["Mariposa".to_string()];
        let criteria = form.criteria();
        assert_eq!(criteria.keyword.as_deref(), Some("data"));
        assert_eq!(criteria.rationale, vec!["Safety/Tolerability"]);
    }

    #[test]
    fn test_sentiment_parse() {
        assert_eq!("positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!(" Neutral ".parse::<Sentiment>().unwrap(), Sentiment::Neutral);
        assert!("angry".parse::<Sentiment>().is_err());
        assert_eq!(Sentiment::Critic.to_string(), "Critic");
    }
}
