//! Document model for slide decks.
//!
//! A [`Deck`] is an ordered list of [`Slide`]s. Each slide holds [`Shape`]s,
//! which are tagged by capability: text-bearing shapes carry a [`TextFrame`],
//! pictures carry their media, and everything else is kept as opaque markup.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// English Metric Units per typographic point.
pub const EMU_PER_POINT: i64 = 12_700;

/// English Metric Units per inch.
pub const EMU_PER_INCH: i64 = 914_400;

/// Character used inside run text to represent a soft line break.
pub const LINE_BREAK: char = '\u{000B}';

/// The format of a presentation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentationFormat {
    /// Modern PPTX (Office Open XML).
    Pptx,
    /// Legacy PPT (OLE/CFB binary). Detected so it can be rejected clearly.
    Ppt,
}

impl PresentationFormat {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pptx" => Some(Self::Pptx),
            "ppt" => Some(Self::Ppt),
            _ => None,
        }
    }

    /// Detect format from file magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }

        // PPTX is a ZIP file (PK\x03\x04)
        if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
            return Some(Self::Pptx);
        }

        // PPT is an OLE/CFB file (D0 CF 11 E0 A1 B1 1A E1)
        if bytes.len() >= 8
            && bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1])
        {
            return Some(Self::Ppt);
        }

        None
    }
}

/// Page size of a deck, in EMUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideSize {
    pub width: i64,
    pub height: i64,
}

impl SlideSize {
    pub fn new(width: i64, height: i64) -> Self {
        Self { width, height }
    }
}

impl Default for SlideSize {
    /// 13.333" x 7.5" (16:9).
    fn default() -> Self {
        Self {
            width: 12_192_000,
            height: 6_858_000,
        }
    }
}

/// A slide layout new slides can be based on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub name: String,
}

impl Layout {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An entire presentation document.
#[derive(Debug, Clone)]
pub struct Deck {
    /// Original filename (without path).
    pub filename: String,

    /// Page size shared by every slide.
    pub size: SlideSize,

    /// Layouts available to slides, first one is the default.
    pub layouts: Vec<Layout>,

    /// Slides in presentation order.
    pub slides: Vec<Slide>,
}

impl Deck {
    /// Create an empty deck with the default page size and no layouts.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            size: SlideSize::default(),
            layouts: Vec::new(),
            slides: Vec::new(),
        }
    }

    /// Create a fresh document the way an editor does: one blank layout and
    /// one empty default slide.
    pub fn blank() -> Self {
        let mut deck = Self::new("");
        deck.layouts.push(Layout::new("Blank"));
        deck.slides.push(Slide::new(1, 0));
        deck
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Get a slide by its 1-based position.
    pub fn slide(&self, position: usize) -> Result<&Slide> {
        position
            .checked_sub(1)
            .and_then(|idx| self.slides.get(idx))
            .ok_or(Error::SlideOutOfRange {
                position,
                count: self.slides.len(),
            })
    }

    /// Index of the first layout, used for new slides.
    pub fn first_layout(&self) -> Result<usize> {
        if self.layouts.is_empty() {
            Err(Error::NoLayout)
        } else {
            Ok(0)
        }
    }

    /// Append a new slide with no shapes, based on the given layout.
    pub fn add_empty_slide(&mut self, layout: usize) -> Result<&mut Slide> {
        if layout >= self.layouts.len() {
            return Err(Error::NoLayout);
        }
        let number = self.slides.len() + 1;
        self.slides.push(Slide::new(number, layout));
        let last = self.slides.len() - 1;
        Ok(&mut self.slides[last])
    }

    /// Append an already built slide, renumbering it to the end position.
    pub fn add_slide(&mut self, mut slide: Slide) {
        slide.number = self.slides.len() + 1;
        self.slides.push(slide);
    }

    /// Remove the slide at a 0-based index and renumber the rest.
    pub fn remove_slide_at(&mut self, index: usize) -> Result<Slide> {
        if index >= self.slides.len() {
            return Err(Error::SlideOutOfRange {
                position: index + 1,
                count: self.slides.len(),
            });
        }
        let removed = self.slides.remove(index);
        for (idx, slide) in self.slides.iter_mut().enumerate() {
            slide.number = idx + 1;
        }
        Ok(removed)
    }
}

/// A single slide.
#[derive(Debug, Clone)]
pub struct Slide {
    /// 1-based slide number.
    pub number: usize,

    /// Index into the owning deck's layouts.
    pub layout: usize,

    /// Shapes in z-order (back to front).
    pub shapes: Vec<Shape>,
}

impl Slide {
    pub fn new(number: usize, layout: usize) -> Self {
        Self {
            number,
            layout,
            shapes: Vec::new(),
        }
    }

    pub fn add_shape(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    /// Append a deep copy of `shape` and return the copy.
    pub fn add_clone(&mut self, shape: &Shape) -> &mut Shape {
        self.shapes.push(shape.clone());
        let last = self.shapes.len() - 1;
        &mut self.shapes[last]
    }

    /// Text of every text-bearing shape, in shape order.
    pub fn texts(&self) -> Vec<String> {
        self.shapes.iter().filter_map(Shape::text).collect()
    }

    /// Lowercase concatenation of all shape texts, joined with newlines.
    pub fn text_blob(&self) -> String {
        self.texts().join("\n").to_lowercase()
    }
}

/// Position and size of a shape, in EMUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
    /// Clockwise rotation in 60000ths of a degree.
    pub rot: i64,
    pub flip_h: bool,
    pub flip_v: bool,
}

impl Geometry {
    pub fn new(x: i64, y: i64, cx: i64, cy: i64) -> Self {
        Self {
            x,
            y,
            cx,
            cy,
            ..Self::default()
        }
    }
}

/// A color reference as found in DrawingML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Color {
    /// An explicit sRGB color.
    Rgb(u8, u8, u8),
    /// A theme color by name ("tx1", "accent2", ...).
    Scheme(String),
    /// Any other color element, kept verbatim.
    Other(String),
}

impl Color {
    /// Parse a six digit hex value such as `FF0000`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self::Rgb(r, g, b))
    }

    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        match self {
            Self::Rgb(r, g, b) => Some((*r, *g, *b)),
            _ => None,
        }
    }
}

/// An element placed on a slide.
#[derive(Debug, Clone)]
pub enum Shape {
    Text(TextShape),
    Picture(PictureShape),
    Generic(GenericShape),
}

impl Shape {
    pub fn name(&self) -> &str {
        match self {
            Self::Text(s) => &s.name,
            Self::Picture(s) => &s.name,
            Self::Generic(s) => &s.name,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::Text(s) => s.id,
            Self::Picture(s) => s.id,
            Self::Generic(s) => s.id,
        }
    }

    pub fn geometry(&self) -> Option<Geometry> {
        match self {
            Self::Text(s) => s.geometry,
            Self::Picture(s) => s.geometry,
            Self::Generic(s) => s.geometry,
        }
    }

    /// Text content, for shapes that can carry text.
    pub fn text(&self) -> Option<String> {
        self.text_frame().map(TextFrame::text)
    }

    pub fn text_frame(&self) -> Option<&TextFrame> {
        match self {
            Self::Text(s) => Some(&s.frame),
            _ => None,
        }
    }

    pub fn text_frame_mut(&mut self) -> Option<&mut TextFrame> {
        match self {
            Self::Text(s) => Some(&mut s.frame),
            _ => None,
        }
    }

    /// Resolved relationships the shape's markup refers to.
    pub fn links(&self) -> &[ShapeLink] {
        match self {
            Self::Text(s) => &s.links,
            Self::Picture(s) => &s.links,
            Self::Generic(s) => &s.links,
        }
    }

    /// Look up a link by the id the markup uses.
    pub fn link(&self, id: &str) -> Option<&LinkTarget> {
        self.links().iter().find(|l| l.id == id).map(|l| &l.target)
    }

    /// True when the shape's name marks it as a watermark container.
    pub fn is_watermark_container(&self) -> bool {
        self.name().to_lowercase().contains("watermark")
    }
}

/// A shape with a text body.
#[derive(Debug, Clone, Default)]
pub struct TextShape {
    pub id: u32,
    pub name: String,
    pub geometry: Option<Geometry>,
    /// Preset or custom geometry markup (`a:prstGeom` / `a:custGeom`).
    pub outline_geometry: Option<String>,
    /// Solid fill of the shape body, if any.
    pub fill: Option<Color>,
    /// Shape property markup following the fill (line, effects, ...).
    pub shape_props: String,
    /// Shape style markup (`p:style`), if any.
    pub style: Option<String>,
    /// Non-visual property markup (`p:nvSpPr`) without its placeholder
    /// binding. `id` and `name` override what it declares.
    pub non_visual: Option<String>,
    pub frame: TextFrame,
    pub links: Vec<ShapeLink>,
}

/// A picture with its embedded media.
#[derive(Debug, Clone)]
pub struct PictureShape {
    pub id: u32,
    pub name: String,
    pub geometry: Option<Geometry>,
    /// Raw bytes of the referenced media part.
    pub media: Vec<u8>,
    /// File extension of the media part ("png", "jpeg", ...).
    pub extension: String,
    /// The picture element markup.
    pub xml: String,
    /// Relationship id the markup uses to reference the media.
    pub embed_id: String,
    /// Other relationship ids in the markup (SVG variants, hyperlinks).
    pub links: Vec<ShapeLink>,
}

/// Any other element, kept as opaque markup.
#[derive(Debug, Clone, Default)]
pub struct GenericShape {
    pub id: u32,
    pub name: String,
    pub geometry: Option<Geometry>,
    /// Solid fill found in the markup; `xml` stays the source of truth.
    pub fill: Option<Color>,
    pub xml: String,
    pub links: Vec<ShapeLink>,
}

/// What a relationship id used inside shape markup resolved to when the
/// deck was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// An address outside the package, such as a hyperlink URL.
    External { rel_type: String, target: String },
    /// An image part, carried by value.
    Media { bytes: Vec<u8>, extension: String },
}

/// A relationship id referenced by a shape and its resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeLink {
    pub id: String,
    pub target: LinkTarget,
}

impl ShapeLink {
    pub fn external(id: &str, rel_type: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            target: LinkTarget::External {
                rel_type: rel_type.to_string(),
                target: target.to_string(),
            },
        }
    }
}

/// The text body of a shape.
#[derive(Debug, Clone, Default)]
pub struct TextFrame {
    /// Body property markup (`a:bodyPr`).
    pub body_props: Option<String>,
    /// List style markup (`a:lstStyle`).
    pub list_style: Option<String>,
    pub paragraphs: Vec<Paragraph>,
}

impl TextFrame {
    /// Create a frame holding plain text, one paragraph per line.
    pub fn from_text(text: &str) -> Self {
        let mut frame = Self::default();
        frame.set_text(text);
        frame
    }

    /// Paragraph texts joined with newlines.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace the text content.
    ///
    /// Lines become paragraphs; each new paragraph keeps the properties of the
    /// paragraph previously at its index (or of the last one) and the
    /// formatting of that paragraph's first run.
    pub fn set_text(&mut self, text: &str) {
        let templates = std::mem::take(&mut self.paragraphs);

        for (idx, line) in text.split('\n').enumerate() {
            let template = templates.get(idx).or_else(|| templates.last());
            let mut paragraph = Paragraph {
                props: template.and_then(|p| p.props.clone()),
                runs: Vec::new(),
                end_props: template.and_then(|p| p.end_props.clone()),
            };
            let run_props = template
                .and_then(|p| p.runs.iter().find(|r| r.kind != RunKind::Break))
                .map(|r| r.props.clone())
                .unwrap_or_default();

            for (seg_idx, segment) in line.split(LINE_BREAK).enumerate() {
                if seg_idx > 0 {
                    paragraph.runs.push(TextRun {
                        text: String::new(),
                        kind: RunKind::Break,
                        props: run_props.clone(),
                    });
                }
                if !segment.is_empty() {
                    paragraph.runs.push(TextRun {
                        text: segment.to_string(),
                        kind: RunKind::Text,
                        props: run_props.clone(),
                    });
                }
            }
            self.paragraphs.push(paragraph);
        }
    }
}

/// A paragraph of runs.
#[derive(Debug, Clone, Default)]
pub struct Paragraph {
    /// Paragraph property markup (`a:pPr`).
    pub props: Option<String>,
    pub runs: Vec<TextRun>,
    /// End-of-paragraph run property markup (`a:endParaRPr`).
    pub end_props: Option<String>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.runs.iter().map(TextRun::as_text).collect()
    }
}

/// What kind of run element this is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunKind {
    /// A regular text run (`a:r`).
    #[default]
    Text,
    /// A soft line break (`a:br`).
    Break,
    /// A field such as a slide number (`a:fld`).
    Field { id: String, field_type: Option<String> },
}

/// A run of uniformly formatted text.
#[derive(Debug, Clone, Default)]
pub struct TextRun {
    pub text: String,
    pub kind: RunKind,
    pub props: RunProps,
}

impl TextRun {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn as_text(&self) -> String {
        match self.kind {
            RunKind::Break => LINE_BREAK.to_string(),
            _ => self.text.clone(),
        }
    }
}

/// Character formatting of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunProps {
    /// Attributes of `a:rPr` (size, bold, language, ...), in source order.
    pub attributes: Vec<(String, String)>,
    /// Child markup that precedes the fill (the outline).
    pub before_fill: String,
    /// Solid fill color of the text.
    pub fill: Option<Color>,
    /// Any non-solid fill element, kept verbatim.
    pub other_fill: Option<String>,
    /// Child markup that follows the fill (effects, fonts, hyperlinks).
    pub after_fill: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_shape(name: &str, text: &str) -> Shape {
        Shape::Text(TextShape {
            name: name.to_string(),
            frame: TextFrame::from_text(text),
            ..TextShape::default()
        })
    }

    #[test]
    fn test_format_from_magic() {
        assert_eq!(
            PresentationFormat::from_magic(b"PK\x03\x04rest"),
            Some(PresentationFormat::Pptx)
        );
        assert_eq!(
            PresentationFormat::from_magic(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]),
            Some(PresentationFormat::Ppt)
        );
        assert_eq!(PresentationFormat::from_magic(b"abc"), None);
        assert_eq!(
            PresentationFormat::from_extension("PPTX"),
            Some(PresentationFormat::Pptx)
        );
    }

    #[test]
    fn test_slide_lookup_is_one_based() {
        let mut deck = Deck::blank();
        deck.add_slide(Slide::new(0, 0));
        assert_eq!(deck.slide(2).unwrap().number, 2);
        assert!(matches!(
            deck.slide(0),
            Err(Error::SlideOutOfRange { position: 0, count: 2 })
        ));
        assert!(matches!(
            deck.slide(3),
            Err(Error::SlideOutOfRange { position: 3, count: 2 })
        ));
    }

    #[test]
    fn test_blank_deck_has_default_slide_and_layout() {
        let mut deck = Deck::blank();
        assert_eq!(deck.slide_count(), 1);
        assert_eq!(deck.first_layout().unwrap(), 0);

        deck.remove_slide_at(0).unwrap();
        assert_eq!(deck.slide_count(), 0);

        let slide = deck.add_empty_slide(0).unwrap();
        assert_eq!(slide.number, 1);
        assert!(slide.shapes.is_empty());
    }

    #[test]
    fn test_add_empty_slide_requires_layout() {
        let mut deck = Deck::new("x.pptx");
        assert!(matches!(deck.first_layout(), Err(Error::NoLayout)));
        assert!(matches!(deck.add_empty_slide(0), Err(Error::NoLayout)));
    }

    #[test]
    fn test_remove_slide_renumbers() {
        let mut deck = Deck::new("x.pptx");
        deck.layouts.push(Layout::new("Blank"));
        for _ in 0..3 {
            deck.add_empty_slide(0).unwrap();
        }
        deck.remove_slide_at(0).unwrap();
        let numbers: Vec<usize> = deck.slides.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_text_blob_is_lowercase_and_joined() {
        let mut slide = Slide::new(1, 0);
        slide.add_shape(text_shape("Title", "Efficacy Data"));
        slide.add_shape(Shape::Generic(GenericShape::default()));
        slide.add_shape(text_shape("Body", "Line ONE\nLine two"));
        assert_eq!(slide.text_blob(), "efficacy data\nline one\nline two");
    }

    #[test]
    fn test_set_text_keeps_first_run_formatting() {
        let mut frame = TextFrame::default();
        frame.paragraphs.push(Paragraph {
            props: Some("<a:pPr algn=\"ctr\"/>".to_string()),
            runs: vec![
                TextRun {
                    text: "Evaluation only. ".to_string(),
                    kind: RunKind::Text,
                    props: RunProps {
                        fill: Some(Color::Rgb(255, 0, 0)),
                        ..RunProps::default()
                    },
                },
                TextRun::new("Hello"),
            ],
            end_props: None,
        });

        frame.set_text("Hello\nWorld");

        assert_eq!(frame.text(), "Hello\nWorld");
        assert_eq!(frame.paragraphs.len(), 2);
        for paragraph in &frame.paragraphs {
            assert_eq!(paragraph.props.as_deref(), Some("<a:pPr algn=\"ctr\"/>"));
            assert_eq!(paragraph.runs.len(), 1);
            assert_eq!(paragraph.runs[0].props.fill, Some(Color::Rgb(255, 0, 0)));
        }
    }

    #[test]
    fn test_set_text_line_breaks_become_break_runs() {
        let frame = TextFrame::from_text("a\u{000B}b");
        let kinds: Vec<RunKind> = frame.paragraphs[0]
            .runs
            .iter()
            .map(|r| r.kind.clone())
            .collect();
        assert_eq!(kinds, vec![RunKind::Text, RunKind::Break, RunKind::Text]);
        assert_eq!(frame.text(), "a\u{000B}b");
    }

    #[test]
    fn test_watermark_container_name_is_case_insensitive() {
        assert!(text_shape("Aspose WaterMark 1", "").is_watermark_container());
        assert!(!text_shape("Title 1", "").is_watermark_container());
    }

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("FF8000"), Some(Color::Rgb(255, 128, 0)));
        assert_eq!(Color::from_hex("FF80"), None);
        assert_eq!(Color::from_hex("GG0000"), None);
    }

    #[test]
    fn test_link_lookup() {
        let shape = Shape::Generic(GenericShape {
            links: vec![ShapeLink::external(
                "rId3",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink",
                "https://example.com/",
            )],
            ..GenericShape::default()
        });
        assert!(matches!(
            shape.link("rId3"),
            Some(LinkTarget::External { target, .. }) if target == "https://example.com/"
        ));
        assert!(shape.link("rId4").is_none());
    }
}
