//! PPTX package writer.
//!
//! Serializes a [`Deck`] into a complete OOXML package: content types,
//! package and part relationships, one master with the deck's layouts, a
//! theme, every slide and the media its pictures embed.

use crate::package::{
    content_types, rel_types, rels_path_for, Relationship, NS_CONTENT_TYPES, NS_PACKAGE_RELS,
    PRESENTATION_PART,
};
use crate::shapes::{relationship_ids, remap_relationships, shape_element};
use crate::template::{
    namespaces, slide_layout_xml, slide_master_xml, theme_xml, SHAPE_TREE_HEADER, XML_DECLARATION,
};
use deck_core::{Deck, Error, Layout, LinkTarget, Result, Shape, Slide};
use quick_xml::escape::escape;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as FmtWrite;
use std::io::{Cursor, Seek, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const MASTER_PART: &str = "ppt/slideMasters/slideMaster1.xml";
const THEME_PART: &str = "ppt/theme/theme1.xml";
const FIRST_SLIDE_ID: u32 = 256;
const MASTER_ID: u64 = 2_147_483_648;

/// Extra namespaces shapes copied verbatim from other decks commonly use.
const EXTENSION_NAMESPACES: &str = r#"xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" xmlns:a14="http://schemas.microsoft.com/office/drawing/2010/main" xmlns:p14="http://schemas.microsoft.com/office/powerpoint/2010/main" xmlns:a16="http://schemas.microsoft.com/office/drawing/2014/main""#;

/// A part waiting to be written into the archive.
struct Part {
    path: String,
    bytes: Vec<u8>,
}

/// Collects parts and their content types before zipping.
#[derive(Default)]
struct PackageBuilder {
    parts: Vec<Part>,
    overrides: Vec<(String, &'static str)>,
    media_extensions: BTreeSet<String>,
}

impl PackageBuilder {
    fn add_xml(&mut self, path: &str, content_type: &'static str, xml: String) {
        self.overrides.push((path.to_string(), content_type));
        self.parts.push(Part {
            path: path.to_string(),
            bytes: xml.into_bytes(),
        });
    }

    fn add_rels(&mut self, part: &str, rels: &[Relationship]) {
        self.parts.push(Part {
            path: rels_path_for(part),
            bytes: relationships_xml(rels).into_bytes(),
        });
    }

    fn add_media(&mut self, path: String, extension: &str, bytes: Vec<u8>) {
        self.media_extensions.insert(extension.to_string());
        self.parts.push(Part { path, bytes });
    }

    fn content_types_xml(&self) -> String {
        let mut xml = String::from(XML_DECLARATION);
        let _ = write!(xml, r#"<Types xmlns="{}">"#, NS_CONTENT_TYPES);
        let _ = write!(
            xml,
            r#"<Default Extension="rels" ContentType="{}"/><Default Extension="xml" ContentType="application/xml"/>"#,
            content_types::RELATIONSHIPS
        );
        for ext in &self.media_extensions {
            let _ = write!(
                xml,
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape(ext.as_str()),
                content_types::for_media(ext)
            );
        }
        for (path, content_type) in &self.overrides {
            let _ = write!(
                xml,
                r#"<Override PartName="/{}" ContentType="{}"/>"#,
                escape(path.as_str()),
                content_type
            );
        }
        xml.push_str("</Types>");
        xml
    }

    fn finish<W: Write + Seek>(self, writer: W) -> Result<()> {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(writer);

        zip.start_file("[Content_Types].xml", options)
            .map_err(zip_error)?;
        zip.write_all(self.content_types_xml().as_bytes())?;

        for part in &self.parts {
            zip.start_file(part.path.as_str(), options).map_err(zip_error)?;
            zip.write_all(&part.bytes)?;
        }

        zip.finish().map_err(zip_error)?;
        Ok(())
    }
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::ZipError(format!("Failed to write ZIP: {}", e))
}

fn relationships_xml(rels: &[Relationship]) -> String {
    let mut xml = String::from(XML_DECLARATION);
    let _ = write!(xml, r#"<Relationships xmlns="{}">"#, NS_PACKAGE_RELS);
    for rel in rels {
        let _ = write!(
            xml,
            r#"<Relationship Id="{}" Type="{}" Target="{}""#,
            escape(rel.id.as_str()),
            rel.rel_type,
            escape(rel.target.as_str())
        );
        if rel.external {
            xml.push_str(r#" TargetMode="External""#);
        }
        xml.push_str("/>");
    }
    xml.push_str("</Relationships>");
    xml
}

/// Writer for PPTX (Office Open XML) files.
pub struct PptxWriter;

impl PptxWriter {
    /// Create a new PPTX writer.
    pub fn new() -> Self {
        Self
    }

    /// Serialize `deck` into `writer`.
    pub fn write<W: Write + Seek>(&self, deck: &Deck, writer: W) -> Result<()> {
        let default_layouts = [Layout::new("Blank")];
        let layouts: &[Layout] = if deck.layouts.is_empty() {
            &default_layouts
        } else {
            &deck.layouts
        };

        let mut package = PackageBuilder::default();
        package.parts.push(Part {
            path: "_rels/.rels".to_string(),
            bytes: relationships_xml(&[Relationship::new(
                "rId1",
                rel_types::OFFICE_DOCUMENT,
                PRESENTATION_PART,
            )])
            .into_bytes(),
        });

        package.add_xml(
            PRESENTATION_PART,
            content_types::PRESENTATION,
            presentation_xml(deck),
        );
        let mut pres_rels = vec![Relationship::new(
            "rId1",
            rel_types::SLIDE_MASTER,
            "slideMasters/slideMaster1.xml",
        )];
        for idx in 0..deck.slide_count() {
            pres_rels.push(Relationship::new(
                &format!("rId{}", idx + 2),
                rel_types::SLIDE,
                &format!("slides/slide{}.xml", idx + 1),
            ));
        }
        pres_rels.push(Relationship::new(
            &format!("rId{}", deck.slide_count() + 2),
            rel_types::THEME,
            "theme/theme1.xml",
        ));
        package.add_rels(PRESENTATION_PART, &pres_rels);

        package.add_xml(
            MASTER_PART,
            content_types::SLIDE_MASTER,
            slide_master_xml(layouts.len()),
        );
        let mut master_rels: Vec<Relationship> = (0..layouts.len())
            .map(|idx| {
                Relationship::new(
                    &format!("rId{}", idx + 1),
                    rel_types::SLIDE_LAYOUT,
                    &format!("../slideLayouts/slideLayout{}.xml", idx + 1),
                )
            })
            .collect();
        master_rels.push(Relationship::new(
            &format!("rId{}", layouts.len() + 1),
            rel_types::THEME,
            "../theme/theme1.xml",
        ));
        package.add_rels(MASTER_PART, &master_rels);

        for (idx, layout) in layouts.iter().enumerate() {
            let path = format!("ppt/slideLayouts/slideLayout{}.xml", idx + 1);
            package.add_xml(&path, content_types::SLIDE_LAYOUT, slide_layout_xml(&layout.name));
            package.add_rels(
                &path,
                &[Relationship::new(
                    "rId1",
                    rel_types::SLIDE_MASTER,
                    "../slideMasters/slideMaster1.xml",
                )],
            );
        }

        package.add_xml(THEME_PART, content_types::THEME, theme_xml());

        let mut image_counter = 0;
        for (idx, slide) in deck.slides.iter().enumerate() {
            let layout = if slide.layout < layouts.len() {
                slide.layout
            } else {
                log::warn!(
                    "Slide {} references missing layout {}, using the first layout",
                    slide.number,
                    slide.layout
                );
                0
            };
            let path = format!("ppt/slides/slide{}.xml", idx + 1);
            let mut rels = vec![Relationship::new(
                "rId1",
                rel_types::SLIDE_LAYOUT,
                &format!("../slideLayouts/slideLayout{}.xml", layout + 1),
            )];

            let xml = slide_xml(slide, &mut rels, &mut package, &mut image_counter)?;
            package.add_xml(&path, content_types::SLIDE, xml);
            package.add_rels(&path, &rels);
        }

        package.finish(writer)?;
        log::debug!(
            "Wrote {} slides, {} layouts, {} images",
            deck.slide_count(),
            layouts.len(),
            image_counter
        );
        Ok(())
    }

    /// Serialize `deck` into an in-memory archive.
    pub fn to_bytes(&self, deck: &Deck) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(deck, &mut cursor)?;
        Ok(cursor.into_inner())
    }
}

impl Default for PptxWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn presentation_xml(deck: &Deck) -> String {
    let mut xml = String::from(XML_DECLARATION);
    let _ = write!(xml, r#"<p:presentation {} saveSubsetFonts="1">"#, namespaces());
    let _ = write!(
        xml,
        r#"<p:sldMasterIdLst><p:sldMasterId id="{}" r:id="rId1"/></p:sldMasterIdLst>"#,
        MASTER_ID
    );
    if deck.slide_count() > 0 {
        xml.push_str("<p:sldIdLst>");
        for idx in 0..deck.slide_count() {
            let _ = write!(
                xml,
                r#"<p:sldId id="{}" r:id="rId{}"/>"#,
                FIRST_SLIDE_ID + idx as u32,
                idx + 2
            );
        }
        xml.push_str("</p:sldIdLst>");
    }
    let _ = write!(
        xml,
        r#"<p:sldSz cx="{}" cy="{}"/><p:notesSz cx="6858000" cy="9144000"/><p:defaultTextStyle/></p:presentation>"#,
        deck.size.width, deck.size.height
    );
    xml
}

/// A relationship target a shape's markup uses, borrowed from the shape.
enum LinkRef<'a> {
    Media { bytes: &'a [u8], extension: &'a str },
    External { rel_type: &'a str, target: &'a str },
}

fn resolve_link<'a>(shape: &'a Shape, id: &str) -> Option<LinkRef<'a>> {
    if let Shape::Picture(picture) = shape {
        if picture.embed_id == id {
            return Some(LinkRef::Media {
                bytes: &picture.media,
                extension: &picture.extension,
            });
        }
    }
    Some(match shape.link(id)? {
        LinkTarget::Media { bytes, extension } => LinkRef::Media { bytes, extension },
        LinkTarget::External { rel_type, target } => LinkRef::External { rel_type, target },
    })
}

fn slide_xml(
    slide: &Slide,
    rels: &mut Vec<Relationship>,
    package: &mut PackageBuilder,
    image_counter: &mut usize,
) -> Result<String> {
    let mut xml = String::with_capacity(4096);
    xml.push_str(XML_DECLARATION);
    let _ = write!(
        xml,
        "<p:sld {} {}><p:cSld><p:spTree>{}",
        namespaces(),
        EXTENSION_NAMESPACES,
        SHAPE_TREE_HEADER
    );

    for shape in &slide.shapes {
        let mut element = shape_element(shape)?;

        let ids = relationship_ids(&element);
        if matches!(shape, Shape::Generic(_)) && ids.iter().any(|id| resolve_link(shape, id).is_none()) {
            log::warn!(
                "Skipping shape '{}' on slide {}: it references parts that are not copied",
                shape.name(),
                slide.number
            );
            continue;
        }

        let mut new_ids = HashMap::new();
        for id in ids {
            let new_id = format!("rId{}", rels.len() + 1);
            match resolve_link(shape, &id) {
                Some(LinkRef::Media { bytes, extension }) => {
                    *image_counter += 1;
                    let extension = if extension.is_empty() {
                        "bin".to_string()
                    } else {
                        extension.to_ascii_lowercase()
                    };
                    let file = format!("image{}.{}", image_counter, extension);
                    rels.push(Relationship::new(
                        &new_id,
                        rel_types::IMAGE,
                        &format!("../media/{}", file),
                    ));
                    package.add_media(format!("ppt/media/{}", file), &extension, bytes.to_vec());
                }
                Some(LinkRef::External { rel_type, target }) => {
                    rels.push(Relationship::external(&new_id, rel_type, target));
                }
                None => continue,
            }
            new_ids.insert(id, new_id);
        }

        for id in remap_relationships(&mut element, &new_ids) {
            log::warn!(
                "Dropped reference {} from shape '{}' on slide {}: its target is not copied",
                id,
                shape.name(),
                slide.number
            );
        }
        xml.push_str(&element.to_xml());
    }

    xml.push_str("</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>");
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::read_relationships;
    use crate::parser::read_file_from_archive;
    use crate::xml::XmlElement;
    use deck_core::{GenericShape, Geometry, PictureShape, ShapeLink, Slide, TextFrame, TextShape};
    use zip::ZipArchive;

    fn sample_deck() -> Deck {
        let mut deck = Deck::new("sample.pptx");
        deck.layouts.push(Layout::new("Blank"));
        for text in ["first", "second"] {
            let mut slide = Slide::new(0, 0);
            slide.add_shape(Shape::Text(TextShape {
                id: 2,
                name: "Body".to_string(),
                frame: TextFrame::from_text(text),
                ..TextShape::default()
            }));
            deck.add_slide(slide);
        }
        deck
    }

    fn archive_of(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(bytes)).unwrap()
    }

    /// Every relationship id in the slide must be declared in its rels.
    fn assert_references_resolve(
        archive: &mut ZipArchive<Cursor<Vec<u8>>>,
        slide_part: &str,
    ) -> Vec<Relationship> {
        let slide = XmlElement::parse(&read_file_from_archive(archive, slide_part).unwrap()).unwrap();
        let rels = read_relationships(archive, slide_part).unwrap();
        for id in relationship_ids(&slide) {
            assert!(rels.iter().any(|r| r.id == id), "{} references undeclared {}", slide_part, id);
        }
        rels
    }

    fn picture(embed_id: &str, extra: &str) -> PictureShape {
        PictureShape {
            id: 4,
            name: "Picture 3".to_string(),
            geometry: Some(Geometry::new(0, 0, 914_400, 914_400)),
            media: vec![0x89, b'P', b'N', b'G'],
            extension: "png".to_string(),
            xml: format!(
                r#"<p:pic><p:nvPicPr><p:cNvPr id="4" name="Picture 3"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{}">{}</a:blip><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr/></p:pic>"#,
                embed_id, extra
            ),
            embed_id: embed_id.to_string(),
            links: Vec::new(),
        }
    }

    #[test]
    fn test_writes_required_parts() {
        let bytes = PptxWriter::new().to_bytes(&sample_deck()).unwrap();
        let mut archive = archive_of(bytes);

        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "ppt/presentation.xml",
            "ppt/_rels/presentation.xml.rels",
            "ppt/slideMasters/slideMaster1.xml",
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            "ppt/slideLayouts/slideLayout1.xml",
            "ppt/theme/theme1.xml",
            "ppt/slides/slide1.xml",
            "ppt/slides/slide2.xml",
            "ppt/slides/_rels/slide2.xml.rels",
        ] {
            assert!(archive.by_name(part).is_ok(), "missing {}", part);
        }
    }

    #[test]
    fn test_presentation_lists_slides_in_order() {
        let bytes = PptxWriter::new().to_bytes(&sample_deck()).unwrap();
        let mut archive = archive_of(bytes);

        let xml = read_file_from_archive(&mut archive, PRESENTATION_PART).unwrap();
        let root = XmlElement::parse(&xml).unwrap();
        let ids: Vec<&str> = root
            .find("sldIdLst")
            .unwrap()
            .children_named("sldId")
            .filter_map(|e| e.attr("r:id"))
            .collect();
        assert_eq!(ids, vec!["rId2", "rId3"]);
        assert_eq!(root.find("sldSz").unwrap().attr_i64("cx"), Some(12_192_000));
    }

    #[test]
    fn test_content_types_cover_slides() {
        let bytes = PptxWriter::new().to_bytes(&sample_deck()).unwrap();
        let mut archive = archive_of(bytes);

        let xml = read_file_from_archive(&mut archive, "[Content_Types].xml").unwrap();
        assert!(xml.contains(r#"PartName="/ppt/slides/slide2.xml""#));
        assert!(xml.contains(content_types::SLIDE_MASTER));
    }

    #[test]
    fn test_empty_deck_gets_default_layout() {
        let deck = Deck::new("empty.pptx");
        let bytes = PptxWriter::new().to_bytes(&deck).unwrap();
        let mut archive = archive_of(bytes);

        let xml = read_file_from_archive(&mut archive, PRESENTATION_PART).unwrap();
        assert!(!xml.contains("sldIdLst"));
        assert!(archive.by_name("ppt/slideLayouts/slideLayout1.xml").is_ok());
    }

    #[test]
    fn test_skips_shapes_with_relationships() {
        let mut deck = sample_deck();
        deck.slides[0].add_shape(Shape::Generic(GenericShape {
            id: 9,
            name: "Chart 1".to_string(),
            xml: r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="9" name="Chart 1"/></p:nvGraphicFramePr><a:graphic><a:graphicData><c:chart r:id="rId4"/></a:graphicData></a:graphic></p:graphicFrame>"#.to_string(),
            ..GenericShape::default()
        }));

        let bytes = PptxWriter::new().to_bytes(&deck).unwrap();
        let mut archive = archive_of(bytes);

        let xml = read_file_from_archive(&mut archive, "ppt/slides/slide1.xml").unwrap();
        assert!(!xml.contains("Chart 1"));
        assert!(xml.contains("first"));
    }

    #[test]
    fn test_hyperlinked_run_gets_external_relationship() {
        let mut deck = sample_deck();
        if let Shape::Text(text) = &mut deck.slides[0].shapes[0] {
            let props = &mut text.frame.paragraphs[0].runs[0].props;
            props.after_fill = r#"<a:hlinkClick r:id="rId2"/><a:hlinkHover r:id="rId6" action="ppaction://hlinksldjump"/>"#.to_string();
            text.links.push(ShapeLink::external(
                "rId2",
                rel_types::HYPERLINK,
                "https://example.com/?a=1&b=2",
            ));
        }
        // The picture was read with the same id as the hyperlink.
        deck.slides[0].add_shape(Shape::Picture(picture("rId2", "")));

        let bytes = PptxWriter::new().to_bytes(&deck).unwrap();
        let mut archive = archive_of(bytes);

        let rels = assert_references_resolve(&mut archive, "ppt/slides/slide1.xml");
        let slide = XmlElement::parse(&read_file_from_archive(&mut archive, "ppt/slides/slide1.xml").unwrap()).unwrap();

        let link_id = slide.find("hlinkClick").unwrap().attr("r:id").unwrap();
        let link = rels.iter().find(|r| r.id == link_id).unwrap();
        assert!(link.external);
        assert_eq!(link.rel_type, rel_types::HYPERLINK);
        assert_eq!(link.target, "https://example.com/?a=1&b=2");

        let embed_id = slide.find("blip").unwrap().attr("r:embed").unwrap();
        assert_ne!(embed_id, link_id);
        let image = rels.iter().find(|r| r.id == embed_id).unwrap();
        assert!(image.is_type("image"));

        let hover = slide.find("hlinkHover").unwrap();
        assert_eq!(hover.attr("r:id"), None);
        assert_eq!(hover.attr("action"), Some("ppaction://hlinksldjump"));
    }

    #[test]
    fn test_svg_variant_and_picture_fill_are_copied() {
        let mut deck = sample_deck();
        let mut icon = picture(
            "rId3",
            r#"<a:extLst><a:ext uri="{96DAC541-7B7A-43D3-8B79-37D633B846F1}"><asvg:svgBlip xmlns:asvg="http://schemas.microsoft.com/office/drawing/2016/SVG/main" r:embed="rId4"/></a:ext></a:extLst>"#,
        );
        icon.links.push(ShapeLink {
            id: "rId4".to_string(),
            target: LinkTarget::Media {
                bytes: b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec(),
                extension: "svg".to_string(),
            },
        });
        deck.slides[1].add_shape(Shape::Picture(icon));
        if let Shape::Text(text) = &mut deck.slides[1].shapes[0] {
            text.shape_props =
                r#"<a:blipFill><a:blip r:embed="rId3"/><a:stretch><a:fillRect/></a:stretch></a:blipFill>"#.to_string();
            text.links.push(ShapeLink {
                id: "rId3".to_string(),
                target: LinkTarget::Media {
                    bytes: vec![0xFF, 0xD8, 0xFF],
                    extension: "jpeg".to_string(),
                },
            });
        }

        let bytes = PptxWriter::new().to_bytes(&deck).unwrap();
        let mut archive = archive_of(bytes);

        let rels = assert_references_resolve(&mut archive, "ppt/slides/slide2.xml");
        let images: Vec<&Relationship> = rels.iter().filter(|r| r.is_type("image")).collect();
        assert_eq!(images.len(), 3);
        for image in images {
            assert!(archive.by_name(&image.target).is_ok(), "missing {}", image.target);
        }
        let content_types = read_file_from_archive(&mut archive, "[Content_Types].xml").unwrap();
        assert!(content_types.contains(r#"Extension="svg" ContentType="image/svg+xml""#));
        assert!(content_types.contains(r#"Extension="jpeg""#));
    }

    #[test]
    fn test_unresolved_fill_reference_is_dropped() {
        let mut deck = sample_deck();
        if let Shape::Text(text) = &mut deck.slides[0].shapes[0] {
            text.shape_props = r#"<a:blipFill><a:blip r:embed="rId8"/></a:blipFill>"#.to_string();
        }

        let bytes = PptxWriter::new().to_bytes(&deck).unwrap();
        let mut archive = archive_of(bytes);

        let rels = assert_references_resolve(&mut archive, "ppt/slides/slide1.xml");
        assert_eq!(rels.len(), 1);
        let xml = read_file_from_archive(&mut archive, "ppt/slides/slide1.xml").unwrap();
        assert!(xml.contains("first"));
        assert!(!xml.contains("rId8"));
    }
}
