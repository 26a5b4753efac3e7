//! Conversion between `p:spTree` children and [`Shape`]s.

use crate::xml::{XmlElement, XmlNode};
use deck_core::{
    Color, GenericShape, Geometry, LinkTarget, Paragraph, PictureShape, RunKind, RunProps, Shape,
    ShapeLink, TextFrame, TextRun, TextShape,
};
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

/// Elements of a shape tree that describe the tree itself, not a shape.
const TREE_PROPERTY_ELEMENTS: &[&str] = &["nvGrpSpPr", "grpSpPr", "extLst"];

/// Fill elements other than a solid fill.
const OTHER_FILL_ELEMENTS: &[&str] = &["noFill", "gradFill", "blipFill", "pattFill", "grpFill"];

/// Media part referenced from a slide.
#[derive(Debug, Clone)]
pub struct Media {
    pub bytes: Vec<u8>,
    pub extension: String,
}

/// Identifies a placeholder for geometry inheritance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderKey {
    kind: String,
    idx: Option<u32>,
}

impl PlaceholderKey {
    fn from_ph(ph: &XmlElement) -> Self {
        let kind = match ph.attr("type").unwrap_or("obj") {
            "obj" | "body" | "subTitle" => "body",
            "ctrTitle" | "title" => "title",
            other => other,
        };
        Self {
            kind: kind.to_string(),
            idx: ph.attr("idx").and_then(|v| v.parse().ok()),
        }
    }
}

/// Geometry of the placeholders declared on a layout or master.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderMap {
    entries: Vec<(PlaceholderKey, Geometry)>,
}

impl PlaceholderMap {
    /// Collect placeholder geometry from a part's root element.
    pub fn from_part(root: &XmlElement) -> Self {
        let mut map = Self::default();
        let Some(tree) = root.find("spTree") else {
            return map;
        };
        for element in tree.elements() {
            let (Some(ph), Some(geometry)) = (placeholder(element), own_geometry(element)) else {
                continue;
            };
            map.entries.push((PlaceholderKey::from_ph(ph), geometry));
        }
        map
    }

    fn lookup(&self, key: &PlaceholderKey) -> Option<Geometry> {
        if let Some(idx) = key.idx {
            let by_idx = self
                .entries
                .iter()
                .find(|(k, _)| k.idx == Some(idx))
                .map(|(_, g)| *g);
            if by_idx.is_some() {
                return by_idx;
            }
        }
        self.entries
            .iter()
            .find(|(k, _)| k.kind == key.kind)
            .map(|(_, g)| *g)
    }
}

/// What a slide's shapes can resolve against.
#[derive(Debug, Default)]
pub struct ShapeContext<'a> {
    /// Layout first, then master.
    pub placeholders: Vec<&'a PlaceholderMap>,
    /// Media by relationship id.
    pub media: HashMap<String, Media>,
    /// External targets (hyperlinks, linked images) by relationship id.
    pub external: HashMap<String, LinkTarget>,
}

impl ShapeContext<'_> {
    fn inherited_geometry(&self, ph: &XmlElement) -> Option<Geometry> {
        let key = PlaceholderKey::from_ph(ph);
        self.placeholders.iter().find_map(|map| map.lookup(&key))
    }

    fn resolve(&self, id: &str) -> Option<LinkTarget> {
        if let Some(media) = self.media.get(id) {
            return Some(LinkTarget::Media {
                bytes: media.bytes.clone(),
                extension: media.extension.clone(),
            });
        }
        self.external.get(id).cloned()
    }

    /// Resolve every relationship id used in `element`, except `skip`.
    /// Ids pointing at parts that are not carried are left out.
    fn links(&self, element: &XmlElement, skip: Option<&str>) -> Vec<ShapeLink> {
        relationship_ids(element)
            .into_iter()
            .filter(|id| Some(id.as_str()) != skip)
            .filter_map(|id| {
                let target = self.resolve(&id)?;
                Some(ShapeLink { id, target })
            })
            .collect()
    }
}

/// Parse every shape inside a slide's `p:spTree`.
pub fn parse_shape_tree(tree: &XmlElement, ctx: &ShapeContext<'_>) -> Vec<Shape> {
    tree.elements()
        .filter(|e| !TREE_PROPERTY_ELEMENTS.contains(&e.local_name()))
        .map(|e| parse_shape(e, ctx))
        .collect()
}

/// Parse a single shape element.
pub fn parse_shape(element: &XmlElement, ctx: &ShapeContext<'_>) -> Shape {
    let (id, name) = element
        .find("cNvPr")
        .map(|c| {
            (
                c.attr("id").and_then(|v| v.parse().ok()).unwrap_or(0),
                c.attr("name").unwrap_or_default().to_string(),
            )
        })
        .unwrap_or_default();
    let geometry = own_geometry(element)
        .or_else(|| placeholder(element).and_then(|ph| ctx.inherited_geometry(ph)));

    match element.local_name() {
        "sp" => match element.child("txBody") {
            Some(body) => Shape::Text(parse_text_shape(element, body, ctx, id, name, geometry)),
            None => generic(element, ctx, id, name, geometry),
        },
        "pic" => match parse_picture(element, ctx, id, &name, geometry) {
            Some(picture) => Shape::Picture(picture),
            None => {
                log::warn!("Picture '{}' has no resolvable media, keeping markup", name);
                generic(element, ctx, id, name, geometry)
            }
        },
        _ => generic(element, ctx, id, name, geometry),
    }
}

fn generic(
    element: &XmlElement,
    ctx: &ShapeContext<'_>,
    id: u32,
    name: String,
    geometry: Option<Geometry>,
) -> Shape {
    let fill = element
        .child("spPr")
        .and_then(|sp_pr| sp_pr.child("solidFill"))
        .and_then(parse_color);
    Shape::Generic(GenericShape {
        id,
        name,
        geometry,
        fill,
        xml: element.to_xml(),
        links: ctx.links(element, None),
    })
}

fn parse_text_shape(
    element: &XmlElement,
    body: &XmlElement,
    ctx: &ShapeContext<'_>,
    id: u32,
    name: String,
    geometry: Option<Geometry>,
) -> TextShape {
    let mut shape = TextShape {
        id,
        name,
        geometry,
        style: element.child("style").map(XmlElement::to_xml),
        non_visual: element.child("nvSpPr").map(without_placeholder),
        frame: parse_text_frame(body),
        links: ctx.links(element, None),
        ..TextShape::default()
    };

    if let Some(sp_pr) = element.child("spPr") {
        for child in sp_pr.elements() {
            match child.local_name() {
                "xfrm" => {}
                "prstGeom" | "custGeom" => shape.outline_geometry = Some(child.to_xml()),
                "solidFill" => shape.fill = parse_color(child),
                _ => shape.shape_props.push_str(&child.to_xml()),
            }
        }
    }
    shape
}

fn without_placeholder(nv_sp_pr: &XmlElement) -> String {
    let mut nv_sp_pr = nv_sp_pr.clone();
    if let Some(nv_pr) = nv_sp_pr.child_mut("nvPr") {
        nv_pr
            .children
            .retain(|c| !matches!(c, XmlNode::Element(e) if e.is("ph")));
    }
    nv_sp_pr.to_xml()
}

fn parse_picture(
    element: &XmlElement,
    ctx: &ShapeContext<'_>,
    id: u32,
    name: &str,
    geometry: Option<Geometry>,
) -> Option<PictureShape> {
    let embed_id = element.find("blip")?.attr("r:embed")?.to_string();
    let media = ctx.media.get(&embed_id)?;
    Some(PictureShape {
        id,
        name: name.to_string(),
        geometry,
        media: media.bytes.clone(),
        extension: media.extension.clone(),
        xml: element.to_xml(),
        links: ctx.links(element, Some(&embed_id)),
        embed_id,
    })
}

/// Parse a `a:txBody` element.
pub fn parse_text_frame(body: &XmlElement) -> TextFrame {
    let mut frame = TextFrame {
        body_props: body.child("bodyPr").map(XmlElement::to_xml),
        list_style: body.child("lstStyle").map(XmlElement::to_xml),
        paragraphs: Vec::new(),
    };

    for p in body.children_named("p") {
        let mut paragraph = Paragraph::default();
        for child in p.elements() {
            match child.local_name() {
                "pPr" => paragraph.props = Some(child.to_xml()),
                "endParaRPr" => paragraph.end_props = Some(child.to_xml()),
                "r" => paragraph.runs.push(TextRun {
                    text: child.child("t").map(XmlElement::text).unwrap_or_default(),
                    kind: RunKind::Text,
                    props: run_props(child),
                }),
                "br" => paragraph.runs.push(TextRun {
                    text: String::new(),
                    kind: RunKind::Break,
                    props: run_props(child),
                }),
                "fld" => paragraph.runs.push(TextRun {
                    text: child.child("t").map(XmlElement::text).unwrap_or_default(),
                    kind: RunKind::Field {
                        id: child.attr("id").unwrap_or_default().to_string(),
                        field_type: child.attr("type").map(str::to_string),
                    },
                    props: run_props(child),
                }),
                other => log::debug!("Skipping paragraph child <{}>", other),
            }
        }
        frame.paragraphs.push(paragraph);
    }

    frame
}

fn run_props(run: &XmlElement) -> RunProps {
    let Some(r_pr) = run.child("rPr") else {
        return RunProps::default();
    };
    let mut props = RunProps {
        attributes: r_pr.attributes.clone(),
        ..RunProps::default()
    };
    for child in r_pr.elements() {
        match child.local_name() {
            "ln" => props.before_fill.push_str(&child.to_xml()),
            "solidFill" => props.fill = parse_color(child),
            name if OTHER_FILL_ELEMENTS.contains(&name) => props.other_fill = Some(child.to_xml()),
            _ => props.after_fill.push_str(&child.to_xml()),
        }
    }
    props
}

/// Read the color out of a `a:solidFill` element.
pub fn parse_color(solid_fill: &XmlElement) -> Option<Color> {
    let color = solid_fill.elements().next()?;
    let plain = color.children.is_empty();
    match color.local_name() {
        "srgbClr" if plain => color.attr("val").and_then(Color::from_hex),
        "schemeClr" if plain => color.attr("val").map(|v| Color::Scheme(v.to_string())),
        _ => Some(Color::Other(color.to_xml())),
    }
}

fn placeholder(element: &XmlElement) -> Option<&XmlElement> {
    element
        .elements()
        .find(|e| e.local_name().starts_with("nv"))?
        .child("nvPr")?
        .child("ph")
}

/// Transform declared directly on a shape.
fn own_geometry(element: &XmlElement) -> Option<Geometry> {
    let xfrm = match element.local_name() {
        "graphicFrame" => element.child("xfrm"),
        "grpSp" => element.child("grpSpPr").and_then(|p| p.child("xfrm")),
        _ => element.child("spPr").and_then(|p| p.child("xfrm")),
    }?;
    let off = xfrm.child("off")?;
    let ext = xfrm.child("ext")?;
    Some(Geometry {
        x: off.attr_i64("x").unwrap_or(0),
        y: off.attr_i64("y").unwrap_or(0),
        cx: ext.attr_i64("cx").unwrap_or(0),
        cy: ext.attr_i64("cy").unwrap_or(0),
        rot: xfrm.attr_i64("rot").unwrap_or(0),
        flip_h: matches!(xfrm.attr("flipH"), Some("1" | "true")),
        flip_v: matches!(xfrm.attr("flipV"), Some("1" | "true")),
    })
}

/// Render a transform as `a:xfrm`.
pub fn xfrm_xml(geometry: &Geometry) -> String {
    let mut xml = String::from("<a:xfrm");
    if geometry.rot != 0 {
        let _ = write!(xml, " rot=\"{}\"", geometry.rot);
    }
    if geometry.flip_h {
        xml.push_str(" flipH=\"1\"");
    }
    if geometry.flip_v {
        xml.push_str(" flipV=\"1\"");
    }
    let _ = write!(
        xml,
        "><a:off x=\"{}\" y=\"{}\"/><a:ext cx=\"{}\" cy=\"{}\"/></a:xfrm>",
        geometry.x, geometry.y, geometry.cx, geometry.cy
    );
    xml
}

/// Render a color as the content of a fill element.
pub fn color_xml(color: &Color) -> String {
    match color {
        Color::Rgb(r, g, b) => format!("<a:srgbClr val=\"{:02X}{:02X}{:02X}\"/>", r, g, b),
        Color::Scheme(name) => format!("<a:schemeClr val=\"{}\"/>", escape(name.as_str())),
        Color::Other(xml) => xml.clone(),
    }
}

fn solid_fill_xml(color: &Color) -> String {
    format!("<a:solidFill>{}</a:solidFill>", color_xml(color))
}

/// Serialize a text shape as `p:sp`.
pub fn text_shape_xml(shape: &TextShape) -> deck_core::Result<String> {
    let mut xml = String::with_capacity(512);
    xml.push_str("<p:sp>");
    xml.push_str(&non_visual_xml(shape)?);
    xml.push_str("<p:spPr>");
    if let Some(geometry) = &shape.geometry {
        xml.push_str(&xfrm_xml(geometry));
    }
    xml.push_str(
        shape
            .outline_geometry
            .as_deref()
            .unwrap_or("<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom>"),
    );
    if let Some(fill) = &shape.fill {
        xml.push_str(&solid_fill_xml(fill));
    }
    xml.push_str(&shape.shape_props);
    xml.push_str("</p:spPr>");
    if let Some(style) = &shape.style {
        xml.push_str(style);
    }
    xml.push_str(&text_frame_xml(&shape.frame));
    xml.push_str("</p:sp>");
    Ok(xml)
}

fn non_visual_xml(shape: &TextShape) -> deck_core::Result<String> {
    let Some(markup) = &shape.non_visual else {
        return Ok(format!(
            "<p:nvSpPr><p:cNvPr id=\"{}\" name=\"{}\"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr>",
            shape.id,
            escape(shape.name.as_str())
        ));
    };
    let mut nv_sp_pr = XmlElement::parse(markup)?;
    if let Some(c_nv_pr) = nv_sp_pr.child_mut("cNvPr") {
        c_nv_pr.set_attr("id", &shape.id.to_string());
        c_nv_pr.set_attr("name", &shape.name);
    }
    Ok(nv_sp_pr.to_xml())
}

/// Serialize a text frame as `p:txBody`.
pub fn text_frame_xml(frame: &TextFrame) -> String {
    let mut xml = String::from("<p:txBody>");
    xml.push_str(frame.body_props.as_deref().unwrap_or("<a:bodyPr/>"));
    if let Some(list_style) = &frame.list_style {
        xml.push_str(list_style);
    }
    if frame.paragraphs.is_empty() {
        xml.push_str("<a:p/>");
    }
    for paragraph in &frame.paragraphs {
        xml.push_str("<a:p>");
        if let Some(props) = &paragraph.props {
            xml.push_str(props);
        }
        for run in &paragraph.runs {
            let r_pr = run_props_xml(&run.props);
            match &run.kind {
                RunKind::Text => {
                    let _ = write!(xml, "<a:r>{}<a:t>{}</a:t></a:r>", r_pr, escape(run.text.as_str()));
                }
                RunKind::Break => {
                    if r_pr.is_empty() {
                        xml.push_str("<a:br/>");
                    } else {
                        let _ = write!(xml, "<a:br>{}</a:br>", r_pr);
                    }
                }
                RunKind::Field { id, field_type } => {
                    let _ = write!(xml, "<a:fld id=\"{}\"", escape(id.as_str()));
                    if let Some(field_type) = field_type {
                        let _ = write!(xml, " type=\"{}\"", escape(field_type.as_str()));
                    }
                    let _ = write!(xml, ">{}<a:t>{}</a:t></a:fld>", r_pr, escape(run.text.as_str()));
                }
            }
        }
        if let Some(end) = &paragraph.end_props {
            xml.push_str(end);
        }
        xml.push_str("</a:p>");
    }
    xml.push_str("</p:txBody>");
    xml
}

fn run_props_xml(props: &RunProps) -> String {
    if *props == RunProps::default() {
        return String::new();
    }
    let mut xml = String::from("<a:rPr");
    for (key, value) in &props.attributes {
        let _ = write!(xml, " {}=\"{}\"", key, escape(value.as_str()));
    }
    let mut children = String::new();
    children.push_str(&props.before_fill);
    if let Some(fill) = &props.fill {
        children.push_str(&solid_fill_xml(fill));
    } else if let Some(other) = &props.other_fill {
        children.push_str(other);
    }
    children.push_str(&props.after_fill);

    if children.is_empty() {
        xml.push_str("/>");
    } else {
        let _ = write!(xml, ">{}</a:rPr>", children);
    }
    xml
}

/// Markup of any shape, ready for its relationship ids to be remapped.
pub fn shape_element(shape: &Shape) -> deck_core::Result<XmlElement> {
    let (markup, geometry) = match shape {
        Shape::Text(text) => return XmlElement::parse(&text_shape_xml(text)?),
        Shape::Picture(picture) => (&picture.xml, &picture.geometry),
        Shape::Generic(generic) => (&generic.xml, &generic.geometry),
    };
    let mut element = XmlElement::parse(markup)?;
    if let Some(geometry) = geometry {
        ensure_xfrm(&mut element, geometry)?;
    }
    Ok(element)
}

fn is_relationship_attr(key: &str) -> bool {
    key.starts_with("r:")
}

/// Relationship ids used by `r:` attributes anywhere in `element`, in
/// document order without repeats.
pub fn relationship_ids(element: &XmlElement) -> Vec<String> {
    fn visit(element: &XmlElement, ids: &mut Vec<String>) {
        for (key, value) in &element.attributes {
            if is_relationship_attr(key) && !value.is_empty() && !ids.contains(value) {
                ids.push(value.clone());
            }
        }
        for child in element.elements() {
            visit(child, ids);
        }
    }

    let mut ids = Vec::new();
    visit(element, &mut ids);
    ids
}

/// Rewrite every `r:` attribute through `ids`. Attributes whose id has no
/// entry are removed and their ids returned.
pub fn remap_relationships(element: &mut XmlElement, ids: &HashMap<String, String>) -> Vec<String> {
    fn visit(element: &mut XmlElement, ids: &HashMap<String, String>, dropped: &mut Vec<String>) {
        element.attributes.retain_mut(|(key, value)| {
            if !is_relationship_attr(key) || value.is_empty() {
                return true;
            }
            match ids.get(value.as_str()) {
                Some(new_id) => {
                    *value = new_id.clone();
                    true
                }
                None => {
                    if !dropped.contains(value) {
                        dropped.push(value.clone());
                    }
                    false
                }
            }
        });
        for child in &mut element.children {
            if let XmlNode::Element(e) = child {
                visit(e, ids, dropped);
            }
        }
    }

    let mut dropped = Vec::new();
    visit(element, ids, &mut dropped);
    dropped
}

fn ensure_xfrm(element: &mut XmlElement, geometry: &Geometry) -> deck_core::Result<()> {
    let Some(sp_pr) = element.child_mut("spPr") else {
        return Ok(());
    };
    if sp_pr.child("xfrm").is_some() {
        return Ok(());
    }
    let xfrm = XmlElement::parse(&xfrm_xml(geometry))?;
    sp_pr.children.insert(0, XmlNode::Element(xfrm));
    Ok(())
}
