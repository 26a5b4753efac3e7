//! Minimal master, layout and theme parts for newly written decks.
//!
//! A fresh deck gets one slide master holding blank layouts, and an
//! Office-style theme. These carry no placeholders, so cloned shapes keep
//! their own geometry and formatting.

use crate::package::{NS_A, NS_P, NS_R};
use quick_xml::escape::escape;
use std::fmt::Write as FmtWrite;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Empty shape tree header shared by masters, layouts and slides.
pub const SHAPE_TREE_HEADER: &str = r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#;

/// Namespace declarations for presentation parts.
pub fn namespaces() -> String {
    format!(
        r#"xmlns:a="{}" xmlns:r="{}" xmlns:p="{}""#,
        NS_A, NS_R, NS_P
    )
}

/// Slide master listing `layout_count` layouts with relationship ids
/// `rId1..=rIdN`.
pub fn slide_master_xml(layout_count: usize) -> String {
    let mut xml = String::with_capacity(2048);
    xml.push_str(XML_DECLARATION);
    let _ = write!(
        xml,
        r#"<p:sldMaster {}><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree>{}</p:spTree></p:cSld>"#,
        namespaces(),
        SHAPE_TREE_HEADER
    );
    xml.push_str(r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#);
    xml.push_str("<p:sldLayoutIdLst>");
    for idx in 0..layout_count {
        let _ = write!(
            xml,
            r#"<p:sldLayoutId id="{}" r:id="rId{}"/>"#,
            2_147_483_649u64 + idx as u64,
            idx + 1
        );
    }
    xml.push_str("</p:sldLayoutIdLst>");
    xml.push_str("<p:txStyles>");
    for (style, size) in [("titleStyle", 4400), ("bodyStyle", 2800), ("otherStyle", 1800)] {
        let font = if style == "titleStyle" { "+mj-lt" } else { "+mn-lt" };
        let _ = write!(
            xml,
            r#"<p:{style}><a:lvl1pPr><a:defRPr sz="{size}" kern="1200"><a:solidFill><a:schemeClr val="tx1"/></a:solidFill><a:latin typeface="{font}"/><a:ea typeface="+mn-ea"/><a:cs typeface="+mn-cs"/></a:defRPr></a:lvl1pPr></p:{style}>"#,
        );
    }
    xml.push_str("</p:txStyles></p:sldMaster>");
    xml
}

/// A blank slide layout.
pub fn slide_layout_xml(name: &str) -> String {
    format!(
        r#"{}<p:sldLayout {} type="blank" preserve="1"><p:cSld name="{}"><p:spTree>{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#,
        XML_DECLARATION,
        namespaces(),
        escape(name),
        SHAPE_TREE_HEADER
    )
}

/// The default Office theme.
pub fn theme_xml() -> String {
    let mut xml = String::with_capacity(4096);
    xml.push_str(XML_DECLARATION);
    let _ = write!(xml, r#"<a:theme xmlns:a="{}" name="Office Theme"><a:themeElements>"#, NS_A);

    xml.push_str(r#"<a:clrScheme name="Office">"#);
    xml.push_str(r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#);
    for (slot, hex) in [
        ("dk2", "44546A"),
        ("lt2", "E7E6E6"),
        ("accent1", "4472C4"),
        ("accent2", "ED7D31"),
        ("accent3", "A5A5A5"),
        ("accent4", "FFC000"),
        ("accent5", "5B9BD5"),
        ("accent6", "70AD47"),
        ("hlink", "0563C1"),
        ("folHlink", "954F72"),
    ] {
        let _ = write!(xml, r#"<a:{slot}><a:srgbClr val="{hex}"/></a:{slot}>"#);
    }
    xml.push_str("</a:clrScheme>");

    xml.push_str(r#"<a:fontScheme name="Office"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme>"#);

    xml.push_str(r#"<a:fmtScheme name="Office"><a:fillStyleLst>"#);
    for _ in 0..3 {
        xml.push_str(r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#);
    }
    xml.push_str("</a:fillStyleLst><a:lnStyleLst>");
    for width in [6350, 12700, 19050] {
        let _ = write!(
            xml,
            r#"<a:ln w="{width}" cap="flat" cmpd="sng" algn="ctr"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:prstDash val="solid"/><a:miter lim="800000"/></a:ln>"#
        );
    }
    xml.push_str("</a:lnStyleLst><a:effectStyleLst>");
    for _ in 0..3 {
        xml.push_str("<a:effectStyle><a:effectLst/></a:effectStyle>");
    }
    xml.push_str("</a:effectStyleLst><a:bgFillStyleLst>");
    for _ in 0..3 {
        xml.push_str(r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#);
    }
    xml.push_str("</a:bgFillStyleLst></a:fmtScheme>");

    xml.push_str("</a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>");
    xml
}
