//! File-backed deck storage.

use crate::parser::PptxParser;
use crate::writer::PptxWriter;
use deck_core::{Deck, DeckStore, Error, PresentationFormat, Result, StripReport, WatermarkStripper};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Loads and saves `.pptx` files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct PptxStore;

impl PptxStore {
    pub fn new() -> Self {
        Self
    }
}

impl DeckStore for PptxStore {
    fn load(&self, path: &Path) -> Result<Deck> {
        open_deck(path)
    }

    fn save(&self, deck: &Deck, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        PptxWriter::new().write(deck, &mut writer)?;
        writer.flush()?;
        log::debug!("Saved {} slide(s) to {}", deck.slide_count(), path.display());
        Ok(())
    }
}

/// Open a deck file, detecting its format from the header bytes and falling
/// back to the file extension.
pub fn open_deck(path: &Path) -> Result<Deck> {
    if !path.exists() {
        return Err(Error::MissingDeck(path.display().to_string()));
    }

    let mut magic = [0u8; 8];
    let read = File::open(path)?.read(&mut magic)?;

    let format = PresentationFormat::from_magic(&magic[..read])
        .or_else(|| {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(PresentationFormat::from_extension)
        })
        .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    match format {
        PresentationFormat::Pptx => {
            log::debug!("Parsing {} as PPTX", path.display());
            let reader = BufReader::new(File::open(path)?);
            PptxParser::new().parse(reader, filename)
        }
        PresentationFormat::Ppt => Err(Error::UnsupportedFormat(format!(
            "{} is a legacy binary PowerPoint file; save it as .pptx first",
            path.display()
        ))),
    }
}

/// Strip watermarks from the deck at `input` and save the result at
/// `output`. The input file is left untouched.
pub fn strip_watermarks_file(input: &Path, output: &Path) -> Result<StripReport> {
    strip_watermarks_file_with(&WatermarkStripper::default(), input, output)
}

/// Like [`strip_watermarks_file`] with a custom phrase list.
pub fn strip_watermarks_file_with(
    stripper: &WatermarkStripper,
    input: &Path,
    output: &Path,
) -> Result<StripReport> {
    let mut deck = open_deck(input)?;
    let report = stripper.strip(&mut deck);
    PptxStore.save(&deck, output)?;
    log::info!(
        "Stripped {}: {} text(s) rewritten, {} shape(s) removed",
        input.display(),
        report.texts_rewritten,
        report.shapes_removed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::export::assemble;
    use crate::package::{read_relationships, rel_types};
    use crate::parser::read_file_from_archive;
    use crate::shapes::relationship_ids;
    use crate::xml::XmlElement;
    use deck_core::{
        Color, Exporter, Geometry, Layout, LinkTarget, PictureShape, Shape, ShapeLink, Slide,
        SlideSize, TextFrame, TextShape,
    };

    fn text_slide(name: &str, text: &str) -> Slide {
        let mut slide = Slide::new(0, 0);
        slide.add_shape(Shape::Text(TextShape {
            id: 2,
            name: name.to_string(),
            geometry: Some(Geometry::new(457_200, 274_638, 8_229_600, 1_143_000)),
            frame: TextFrame::from_text(text),
            ..TextShape::default()
        }));
        slide
    }

    fn six_slide_deck() -> Deck {
        let mut deck = Deck::new("backend.pptx");
        deck.size = SlideSize::new(9_144_000, 6_858_000);
        deck.layouts.push(Layout::new("Title and Content"));
        for text in [
            "Intro",
            "Safety/Tolerability review",
            "Dosing",
            "Market access",
            "Evaluation only. Efficacy data",
            "Closing",
        ] {
            deck.add_slide(text_slide("Content", text));
        }
        deck
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");

        let mut deck = six_slide_deck();
        if let Shape::Text(shape) = &mut deck.slides[0].shapes[0] {
            shape.frame.paragraphs[0].runs[0].props.fill = Some(Color::Rgb(0xC0, 0x00, 0x00));
        }
        deck.slides[1].add_shape(Shape::Picture(PictureShape {
            id: 3,
            name: "Logo".to_string(),
            geometry: Some(Geometry::new(0, 0, 914_400, 914_400)),
            media: vec![1, 2, 3, 4],
            extension: "png".to_string(),
            xml: r#"<p:pic><p:nvPicPr><p:cNvPr id="3" name="Logo"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId9"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#.to_string(),
            embed_id: "rId9".to_string(),
            links: Vec::new(),
        }));

        PptxStore.save(&deck, &path).unwrap();
        let reopened = PptxStore.load(&path).unwrap();

        assert_eq!(reopened.size, deck.size);
        assert_eq!(reopened.slide_count(), 6);
        assert_eq!(reopened.layouts, vec![Layout::new("Title and Content")]);
        assert_eq!(reopened.slides[3].texts(), vec!["Market access"]);

        let frame = reopened.slides[0].shapes[0].text_frame().unwrap();
        assert_eq!(
            frame.paragraphs[0].runs[0].props.fill,
            Some(Color::Rgb(0xC0, 0x00, 0x00))
        );

        match &reopened.slides[1].shapes[1] {
            Shape::Picture(picture) => {
                assert_eq!(picture.media, vec![1, 2, 3, 4]);
                assert_eq!(picture.extension, "png");
                assert_eq!(picture.geometry, Some(Geometry::new(0, 0, 914_400, 914_400)));
            }
            other => panic!("expected a picture, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_deck() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_deck(&dir.path().join("nope.pptx"));
        assert!(matches!(result, Err(Error::MissingDeck(_))));
    }

    #[test]
    fn test_legacy_ppt_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.ppt");
        std::fs::write(&path, [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]).unwrap();
        assert!(matches!(open_deck(&path), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_strip_watermarks_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pptx");
        let output = dir.path().join("out.pptx");

        let mut deck = Deck::new("in.pptx");
        deck.layouts.push(Layout::new("Blank"));
        let mut slide = text_slide("Title 1", "Evaluation only. Drug: Mariposa shows Efficacy.");
        slide.add_shape(Shape::Text(TextShape {
            id: 5,
            name: "Watermark Box".to_string(),
            frame: TextFrame::from_text("DRAFT"),
            ..TextShape::default()
        }));
        deck.add_slide(slide);
        PptxStore.save(&deck, &input).unwrap();

        let report = strip_watermarks_file(&input, &output).unwrap();

        assert_eq!(report.texts_rewritten, 1);
        assert_eq!(report.shapes_removed, 1);
        let stripped = open_deck(&output).unwrap();
        assert_eq!(
            stripped.slides[0].texts(),
            vec!["Drug: Mariposa shows Efficacy."]
        );
        // input untouched
        let original = open_deck(&input).unwrap();
        assert_eq!(original.slides[0].shapes.len(), 2);
    }

    #[test]
    fn test_export_selected_slides() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("backend.pptx");
        PptxStore.save(&six_slide_deck(), &source_path).unwrap();
        let source = open_deck(&source_path).unwrap();

        let exporter = Exporter::new(PptxStore, dir.path().join("out"));
        let exported = exporter.export(&source, &[2, 5]).unwrap();

        assert_eq!(exported.slide_count, 2);
        assert_eq!(exported.file_name(), "Final_Ppt.pptx");
        assert!(exported.temp_path.exists());

        let result = PptxStore.load(&exported.final_path).unwrap();
        assert_eq!(result.size, SlideSize::new(9_144_000, 6_858_000));
        assert_eq!(result.slides[0].texts(), vec!["Safety/Tolerability review"]);
        assert_eq!(result.slides[1].texts(), vec!["Efficacy data"]);

        let from_bytes = PptxParser::new()
            .parse(std::io::Cursor::new(exported.bytes), "Final_Ppt.pptx")
            .unwrap();
        assert_eq!(from_bytes.slide_count(), 2);
    }

    #[test]
    fn test_assembled_deck_survives_write() {
        let source = six_slide_deck();
        let assembled = assemble(&source, &[6, 1]).unwrap();
        let bytes = PptxWriter::new().to_bytes(&assembled).unwrap();

        let reparsed = PptxParser::new()
            .parse(std::io::Cursor::new(bytes), "assembled.pptx")
            .unwrap();
        assert_eq!(reparsed.slides[0].texts(), vec!["Closing"]);
        assert_eq!(reparsed.slides[1].texts(), vec!["Intro"]);
    }

    #[test]
    fn test_export_keeps_links_resolvable() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("backend.pptx");

        let mut deck = six_slide_deck();
        if let Shape::Text(shape) = &mut deck.slides[4].shapes[0] {
            shape.frame.paragraphs[0].runs[0].props.after_fill =
                r#"<a:hlinkClick r:id="rId7"/>"#.to_string();
            shape.links.push(ShapeLink::external(
                "rId7",
                rel_types::HYPERLINK,
                "https://example.com/efficacy",
            ));
        }
        deck.slides[4].add_shape(Shape::Picture(PictureShape {
            id: 3,
            name: "Chart image".to_string(),
            geometry: Some(Geometry::new(0, 0, 914_400, 914_400)),
            media: vec![1, 2, 3, 4],
            extension: "png".to_string(),
            xml: r#"<p:pic><p:nvPicPr><p:cNvPr id="3" name="Chart image"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId7"/></p:blipFill><p:spPr/></p:pic>"#.to_string(),
            embed_id: "rId7".to_string(),
            links: Vec::new(),
        }));
        PptxStore.save(&deck, &source_path).unwrap();
        let source = open_deck(&source_path).unwrap();

        let links = source.slides[4].shapes[0].links();
        assert_eq!(links.len(), 1);
        assert!(matches!(
            &links[0].target,
            LinkTarget::External { target, .. } if target == "https://example.com/efficacy"
        ));

        let exporter = Exporter::new(PptxStore, dir.path().join("out"));
        let exported = exporter.export(&source, &[5]).unwrap();
        assert_eq!(exported.slide_count, 1);

        let mut archive = zip::ZipArchive::new(File::open(&exported.final_path).unwrap()).unwrap();
        let slide_part = "ppt/slides/slide1.xml";
        let slide = XmlElement::parse(&read_file_from_archive(&mut archive, slide_part).unwrap()).unwrap();
        let rels = read_relationships(&mut archive, slide_part).unwrap();

        let ids = relationship_ids(&slide);
        assert_eq!(ids.len(), 2);
        for id in &ids {
            assert!(rels.iter().any(|r| &r.id == id), "undeclared {}", id);
        }
        let link = rels.iter().find(|r| r.is_type("hyperlink")).unwrap();
        assert!(link.external);
        assert_eq!(link.target, "https://example.com/efficacy");
        assert!(rels.iter().any(|r| r.is_type("image")));
        assert!(slide.text().contains("Efficacy data"));
        assert!(!slide.text().contains("Evaluation only"));
    }
}
