//! OPC package plumbing: part names and relationships.

use crate::parser::read_file_from_archive;
use crate::xml::XmlElement;
use deck_core::Result;
use std::io::{Read, Seek};
use zip::ZipArchive;

pub const PRESENTATION_PART: &str = "ppt/presentation.xml";

pub const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
pub const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const NS_PACKAGE_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// Relationship type URIs.
pub mod rel_types {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const SLIDE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
    pub const SLIDE_LAYOUT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
    pub const SLIDE_MASTER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
    pub const THEME: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
    pub const IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub const HYPERLINK: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
}

/// Content types of the parts this crate writes.
pub mod content_types {
    pub const PRESENTATION: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
    pub const SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
    pub const SLIDE_LAYOUT: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
    pub const SLIDE_MASTER: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
    pub const THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";

    /// Content type for a media file extension.
    pub fn for_media(extension: &str) -> &'static str {
        match extension {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "emf" => "image/x-emf",
            "wmf" => "image/x-wmf",
            "svg" => "image/svg+xml",
            _ => "application/octet-stream",
        }
    }
}

/// A relationship from one part to another, with its target resolved to an
/// archive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    pub fn new(id: &str, rel_type: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external: false,
        }
    }

    /// A relationship to an address outside the package.
    pub fn external(id: &str, rel_type: &str, target: &str) -> Self {
        Self {
            external: true,
            ..Self::new(id, rel_type, target)
        }
    }

    /// Compare the last segment of the type URI ("slide", "image", ...).
    pub fn is_type(&self, short: &str) -> bool {
        self.rel_type.rsplit('/').next() == Some(short)
    }
}

/// Path of the relationships part that belongs to `part`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the part that declares it.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Read the relationships of `part`. A part without a relationships file has
/// no relationships.
pub fn read_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part: &str,
) -> Result<Vec<Relationship>> {
    let path = rels_path_for(part);
    if archive.by_name(&path).is_err() {
        return Ok(Vec::new());
    }
    let root = XmlElement::parse(&read_file_from_archive(archive, &path)?)?;
    Ok(parse_relationships(&root, part))
}

fn parse_relationships(root: &XmlElement, part: &str) -> Vec<Relationship> {
    root.children_named("Relationship")
        .filter_map(|rel| {
            let id = rel.attr("Id")?;
            let rel_type = rel.attr("Type")?;
            let target = rel.attr("Target")?;
            let external = rel.attr("TargetMode") == Some("External");
            Some(Relationship {
                id: id.to_string(),
                rel_type: rel_type.to_string(),
                target: if external {
                    target.to_string()
                } else {
                    resolve_target(part, target)
                },
                external,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rels_path_for() {
        assert_eq!(
            rels_path_for("ppt/slides/slide1.xml"),
            "ppt/slides/_rels/slide1.xml.rels"
        );
        assert_eq!(rels_path_for("ppt/presentation.xml"), "ppt/_rels/presentation.xml.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "../slideLayouts/slideLayout2.xml"),
            "ppt/slideLayouts/slideLayout2.xml"
        );
        assert_eq!(
            resolve_target("ppt/presentation.xml", "slides/slide1.xml"),
            "ppt/slides/slide1.xml"
        );
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "/ppt/media/image1.png"),
            "ppt/media/image1.png"
        );
    }

    #[test]
    fn test_parse_relationships() {
        let root = XmlElement::parse(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/></Relationships>"#,
        )
        .unwrap();

        let rels = parse_relationships(&root, "ppt/slides/slide1.xml");

        assert_eq!(rels.len(), 2);
        assert!(rels[0].is_type("slideLayout"));
        assert!(!rels[0].is_type("slide"));
        assert_eq!(rels[0].target, "ppt/slideLayouts/slideLayout1.xml");
        assert!(rels[1].external);
        assert_eq!(rels[1].target, "https://example.com");
    }
}
