//! PPTX file parser implementation.

use crate::package::{read_relationships, Relationship, PRESENTATION_PART};
use crate::shapes::{parse_shape_tree, Media, PlaceholderMap, ShapeContext};
use crate::xml::XmlElement;
use deck_core::{Deck, Error, Layout, LinkTarget, Result, Slide, SlideSize};
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

/// Parser for PPTX (Office Open XML) files.
pub struct PptxParser;

/// A slide master and the placeholders it declares.
#[derive(Debug)]
struct MasterInfo {
    path: String,
    placeholders: PlaceholderMap,
}

/// A slide layout, its placeholders and the master it belongs to.
#[derive(Debug)]
struct LayoutInfo {
    path: String,
    name: String,
    placeholders: PlaceholderMap,
    master: Option<usize>,
}

/// Layouts and masters discovered while parsing.
#[derive(Debug, Default)]
struct Catalog {
    masters: Vec<MasterInfo>,
    layouts: Vec<LayoutInfo>,
}

impl PptxParser {
    /// Create a new PPTX parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse a PPTX file from a reader.
    pub fn parse<R: Read + Seek>(&self, reader: R, filename: &str) -> Result<Deck> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        let presentation = XmlElement::parse(&read_file_from_archive(&mut archive, PRESENTATION_PART)?)?;
        let rels = read_relationships(&mut archive, PRESENTATION_PART)?;

        let mut deck = Deck::new(filename);
        if let Some(size) = presentation.find("sldSz") {
            deck.size = SlideSize::new(
                size.attr_i64("cx").unwrap_or(deck.size.width),
                size.attr_i64("cy").unwrap_or(deck.size.height),
            );
        }

        let mut catalog = Catalog::default();
        if let Some(list) = presentation.find("sldMasterIdLst") {
            for entry in list.children_named("sldMasterId") {
                let Some(rel) = entry.attr("r:id").and_then(|id| find_rel(&rels, id)) else {
                    continue;
                };
                self.load_master(&mut archive, &mut catalog, &rel.target)?;
            }
        }

        // Get the slide order from presentation.xml and its relationships
        let slide_order = self.get_slide_order(&presentation, &rels);
        log::debug!("{} slides listed in {}", slide_order.len(), filename);

        for (idx, slide_path) in slide_order.iter().enumerate() {
            let slide = self.parse_slide(&mut archive, &mut catalog, slide_path, idx + 1)?;
            deck.add_slide(slide);
        }

        deck.layouts = catalog
            .layouts
            .iter()
            .map(|l| Layout::new(l.name.clone()))
            .collect();

        Ok(deck)
    }

    /// Get the ordered list of slide paths.
    ///
    /// `p:sldIdLst` defines the order; when it is absent the slide
    /// relationships are sorted by the number in their id or file name.
    fn get_slide_order(&self, presentation: &XmlElement, rels: &[Relationship]) -> Vec<String> {
        let listed: Vec<String> = presentation
            .find("sldIdLst")
            .map(|list| {
                list.children_named("sldId")
                    .filter_map(|entry| entry.attr("r:id"))
                    .filter_map(|id| find_rel(rels, id))
                    .map(|rel| rel.target.clone())
                    .collect()
            })
            .unwrap_or_default();
        if !listed.is_empty() {
            return listed;
        }

        let mut slides: Vec<(String, Option<usize>)> = rels
            .iter()
            .filter(|rel| rel.is_type("slide"))
            .map(|rel| {
                let order_num =
                    extract_slide_number(&rel.target).or_else(|| extract_slide_number(&rel.id));
                (rel.target.clone(), order_num)
            })
            .collect();

        // Sort slides by their number
        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });

        slides.into_iter().map(|(path, _)| path).collect()
    }

    fn load_master<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        catalog: &mut Catalog,
        path: &str,
    ) -> Result<usize> {
        if let Some(idx) = catalog.masters.iter().position(|m| m.path == path) {
            return Ok(idx);
        }

        let root = XmlElement::parse(&read_file_from_archive(archive, path)?)?;
        catalog.masters.push(MasterInfo {
            path: path.to_string(),
            placeholders: PlaceholderMap::from_part(&root),
        });
        let master_idx = catalog.masters.len() - 1;

        let rels = read_relationships(archive, path)?;
        if let Some(list) = root.find("sldLayoutIdLst") {
            for entry in list.children_named("sldLayoutId") {
                let Some(rel) = entry.attr("r:id").and_then(|id| find_rel(&rels, id)) else {
                    continue;
                };
                self.load_layout(archive, catalog, &rel.target, Some(master_idx))?;
            }
        }
        Ok(master_idx)
    }

    fn load_layout<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        catalog: &mut Catalog,
        path: &str,
        master: Option<usize>,
    ) -> Result<usize> {
        if let Some(idx) = catalog.layouts.iter().position(|l| l.path == path) {
            return Ok(idx);
        }

        let root = XmlElement::parse(&read_file_from_archive(archive, path)?)?;
        let name = root
            .find("cSld")
            .and_then(|c| c.attr("name"))
            .map(str::to_string)
            .unwrap_or_else(|| part_stem(path));

        // Layouts reached only through a slide still need their master.
        let master = match master {
            Some(idx) => Some(idx),
            None => {
                let rels = read_relationships(archive, path)?;
                match rels.iter().find(|r| r.is_type("slideMaster")) {
                    Some(rel) => Some(self.load_master(archive, catalog, &rel.target)?),
                    None => None,
                }
            }
        };

        if let Some(idx) = catalog.layouts.iter().position(|l| l.path == path) {
            // loading the master registered this layout already
            return Ok(idx);
        }
        catalog.layouts.push(LayoutInfo {
            path: path.to_string(),
            name,
            placeholders: PlaceholderMap::from_part(&root),
            master,
        });
        Ok(catalog.layouts.len() - 1)
    }

    /// Parse a single slide from the archive.
    fn parse_slide<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        catalog: &mut Catalog,
        slide_path: &str,
        slide_number: usize,
    ) -> Result<Slide> {
        let root = XmlElement::parse(&read_file_from_archive(archive, slide_path)?)?;
        let rels = read_relationships(archive, slide_path)?;

        let layout = match rels.iter().find(|r| r.is_type("slideLayout")) {
            Some(rel) => Some(self.load_layout(archive, catalog, &rel.target, None)?),
            None => {
                log::warn!("Slide {} has no layout relationship", slide_path);
                None
            }
        };

        let external = rels
            .iter()
            .filter(|r| r.external)
            .map(|r| {
                let target = LinkTarget::External {
                    rel_type: r.rel_type.clone(),
                    target: r.target.clone(),
                };
                (r.id.clone(), target)
            })
            .collect();

        let mut media = HashMap::new();
        for rel in rels.iter().filter(|r| r.is_type("image") && !r.external) {
            match read_bytes_from_archive(archive, &rel.target) {
                Ok(bytes) => {
                    media.insert(
                        rel.id.clone(),
                        Media {
                            bytes,
                            extension: part_extension(&rel.target),
                        },
                    );
                }
                Err(e) => log::warn!("Skipping media {}: {}", rel.target, e),
            }
        }

        let mut placeholders = Vec::new();
        if let Some(info) = layout.map(|idx| &catalog.layouts[idx]) {
            placeholders.push(&info.placeholders);
            if let Some(master) = info.master {
                placeholders.push(&catalog.masters[master].placeholders);
            }
        }
        let ctx = ShapeContext {
            placeholders,
            media,
            external,
        };

        let mut slide = Slide::new(slide_number, layout.unwrap_or(0));
        match root.find("spTree") {
            Some(tree) => slide.shapes = parse_shape_tree(tree, &ctx),
            None => log::warn!("Slide {} has no shape tree", slide_path),
        }
        Ok(slide)
    }
}

impl Default for PptxParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_rel<'a>(rels: &'a [Relationship], id: &str) -> Option<&'a Relationship> {
    rels.iter().find(|r| r.id == id)
}

/// Read a file from the ZIP archive.
pub(crate) fn read_file_from_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

    Ok(content)
}

/// Read a binary part from the ZIP archive.
pub(crate) fn read_bytes_from_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

    Ok(content)
}

fn part_stem(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.trim_end_matches(".xml").to_string()
}

fn part_extension(path: &str) -> String {
    path.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    // Remove common extensions first
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    // Try to find digits at the end
    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}
