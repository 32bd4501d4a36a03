//! Office Open XML presentation writer.
//!
//! Produces a minimal but complete `.pptx` package: one master, one blank
//! layout, one theme, and one slide part per deck slide. Zip entries carry a
//! fixed timestamp so identical input yields identical bytes.

use std::io::{Cursor, Write};

use time::OffsetDateTime;
use time::macros::format_description;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::application::render::layout::{
    Align, BULLET_INDENT, DeckLayout, Element, Rect, SLIDE_HEIGHT, SLIDE_WIDTH, SlideLayout,
    TextBox,
};
use crate::application::render::theme::{ResolvedStyle, Rgb};
use crate::application::render::types::RenderError;
use crate::domain::deck::Deck;

const EMU_PER_POINT: f32 = 12_700.0;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_PKG_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

fn emu(points: f32) -> i64 {
    (points * EMU_PER_POINT).round() as i64
}

/// Writes the presentation package and returns its bytes.
pub fn write_pptx(
    deck: &Deck,
    layout: &DeckLayout,
    style: &ResolvedStyle,
    generated_at: Option<OffsetDateTime>,
) -> Result<Vec<u8>, RenderError> {
    let slide_count = layout.slides.len();
    let mut parts: Vec<(String, String)> = vec![
        ("[Content_Types].xml".into(), content_types(slide_count)),
        ("_rels/.rels".into(), root_rels()),
        ("docProps/core.xml".into(), core_properties(deck, generated_at)?),
        ("docProps/app.xml".into(), app_properties(slide_count)),
        ("ppt/presentation.xml".into(), presentation(slide_count)),
        (
            "ppt/_rels/presentation.xml.rels".into(),
            presentation_rels(slide_count),
        ),
        ("ppt/presProps.xml".into(), presentation_props()),
        ("ppt/slideMasters/slideMaster1.xml".into(), slide_master()),
        (
            "ppt/slideMasters/_rels/slideMaster1.xml.rels".into(),
            slide_master_rels(),
        ),
        ("ppt/slideLayouts/slideLayout1.xml".into(), slide_layout()),
        (
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels".into(),
            slide_layout_rels(),
        ),
        ("ppt/theme/theme1.xml".into(), theme_part(style)),
    ];

    for (index, slide) in layout.slides.iter().enumerate() {
        let number = index + 1;
        parts.push((
            format!("ppt/slides/slide{number}.xml"),
            slide_part(slide, style, &deck.meta.language),
        ));
        parts.push((
            format!("ppt/slides/_rels/slide{number}.xml.rels"),
            slide_rels(slide, style),
        ));
    }

    package(parts)
}

fn package(parts: Vec<(String, String)>) -> Result<Vec<u8>, RenderError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, body) in parts {
        archive
            .start_file(name.as_str(), options)
            .map_err(|err| RenderError::archive(format!("{name}: {err}")))?;
        archive
            .write_all(body.as_bytes())
            .map_err(|err| RenderError::archive(format!("{name}: {err}")))?;
    }

    let cursor = archive
        .finish()
        .map_err(|err| RenderError::archive(err.to_string()))?;
    Ok(cursor.into_inner())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            // Control characters are not allowed in XML 1.0.
            ch if ch.is_control() && !matches!(ch, '\t' | '\n' | '\r') => {}
            ch => escaped.push(ch),
        }
    }
    escaped
}

fn content_types(slide_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/><Override PartName="/ppt/presProps.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presProps+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/><Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#
    );
    for number in 1..=slide_count {
        xml.push_str(&format!(
            r#"<Override PartName="/ppt/slides/slide{number}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn root_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{NS_PKG_RELS}"><Relationship Id="rId1" Type="{REL_BASE}/officeDocument" Target="ppt/presentation.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="{REL_BASE}/extended-properties" Target="docProps/app.xml"/></Relationships>"#
    )
}

/// The only part that may vary with the generation timestamp.
fn core_properties(deck: &Deck, generated_at: Option<OffsetDateTime>) -> Result<String, RenderError> {
    let mut xml = format!(
        r#"{XML_DECL}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{title}</dc:title><dc:language>{language}</dc:language><cp:lastModifiedBy>deckport</cp:lastModifiedBy>"#,
        title = escape(&deck.meta.title),
        language = escape(&deck.meta.language),
    );
    if let Some(generated_at) = generated_at {
        let stamp = generated_at
            .to_offset(time::UtcOffset::UTC)
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
            ))
            .map_err(|err| RenderError::document(err.to_string()))?;
        xml.push_str(&format!(
            r#"<dcterms:created xsi:type="dcterms:W3CDTF">{stamp}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{stamp}</dcterms:modified>"#
        ));
    }
    xml.push_str("</cp:coreProperties>");
    Ok(xml)
}

fn app_properties(slide_count: usize) -> String {
    format!(
        r#"{XML_DECL}<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>deckport</Application><Slides>{slide_count}</Slides><PresentationFormat>Custom</PresentationFormat></Properties>"#
    )
}

fn presentation(slide_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<p:presentation xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}" saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#
    );
    if slide_count > 0 {
        xml.push_str("<p:sldIdLst>");
        for index in 0..slide_count {
            xml.push_str(&format!(
                r#"<p:sldId id="{id}" r:id="rId{rel}"/>"#,
                id = 256 + index,
                rel = index + 3,
            ));
        }
        xml.push_str("</p:sldIdLst>");
    }
    xml.push_str(&format!(
        r#"<p:sldSz cx="{cx}" cy="{cy}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
        cx = emu(SLIDE_WIDTH),
        cy = emu(SLIDE_HEIGHT),
    ));
    xml
}

fn presentation_rels(slide_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<Relationships xmlns="{NS_PKG_RELS}"><Relationship Id="rId1" Type="{REL_BASE}/slideMaster" Target="slideMasters/slideMaster1.xml"/><Relationship Id="rId2" Type="{REL_BASE}/theme" Target="theme/theme1.xml"/>"#
    );
    for index in 0..slide_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{rel}" Type="{REL_BASE}/slide" Target="slides/slide{number}.xml"/>"#,
            rel = index + 3,
            number = index + 1,
        ));
    }
    xml.push_str(&format!(
        r#"<Relationship Id="rId{rel}" Type="{REL_BASE}/presProps" Target="presProps.xml"/></Relationships>"#,
        rel = slide_count + 3,
    ));
    xml
}

fn presentation_props() -> String {
    format!(r#"{XML_DECL}<p:presentationPr xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"/>"#)
}

fn empty_tree() -> &'static str {
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#
}

fn slide_master() -> String {
    format!(
        r#"{XML_DECL}<p:sldMaster xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:spTree>{tree}</p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#,
        tree = empty_tree(),
    )
}

fn slide_master_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{NS_PKG_RELS}"><Relationship Id="rId1" Type="{REL_BASE}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="{REL_BASE}/theme" Target="../theme/theme1.xml"/></Relationships>"#
    )
}

fn slide_layout() -> String {
    format!(
        r#"{XML_DECL}<p:sldLayout xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}" type="blank" preserve="1"><p:cSld name="Blank"><p:spTree>{tree}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#,
        tree = empty_tree(),
    )
}

fn slide_layout_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{NS_PKG_RELS}"><Relationship Id="rId1" Type="{REL_BASE}/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#
    )
}

fn theme_part(style: &ResolvedStyle) -> String {
    let theme = style.theme;
    let color = |slot: &str, rgb: Rgb| format!(r#"<a:{slot}><a:srgbClr val="{}"/></a:{slot}>"#, rgb.hex());
    let colors = [
        color("dk1", theme.text),
        color("lt1", theme.background),
        color("dk2", theme.text),
        color("lt2", theme.surface),
        color("accent1", style.primary),
        color("accent2", style.secondary),
        color("accent3", style.primary),
        color("accent4", style.secondary),
        color("accent5", style.primary),
        color("accent6", style.secondary),
        color("hlink", style.primary),
        color("folHlink", style.secondary),
    ]
    .concat();
    let fill = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#.repeat(3);
    let line = r#"<a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#
        .repeat(3);
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>".repeat(3);

    format!(
        r#"{XML_DECL}<a:theme xmlns:a="{NS_A}" name="{name}"><a:themeElements><a:clrScheme name="{name}">{colors}</a:clrScheme><a:fontScheme name="{name}"><a:majorFont><a:latin typeface="{heading}"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="{body}"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="{name}"><a:fillStyleLst>{fill}</a:fillStyleLst><a:lnStyleLst>{line}</a:lnStyleLst><a:effectStyleLst>{effect}</a:effectStyleLst><a:bgFillStyleLst>{fill}</a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#,
        name = escape(theme.name),
        heading = escape(theme.heading_font),
        body = escape(theme.body_font),
    )
}

fn slide_rels(slide: &SlideLayout, style: &ResolvedStyle) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<Relationships xmlns="{NS_PKG_RELS}"><Relationship Id="rId1" Type="{REL_BASE}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>"#
    );
    if let (Some(_), Some(url)) = (slide.logo, style.logo_url.as_deref()) {
        xml.push_str(&format!(
            r#"<Relationship Id="rId2" Type="{REL_BASE}/image" Target="{url}" TargetMode="External"/>"#,
            url = escape(url),
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

struct ShapeIds(u32);

impl ShapeIds {
    fn next(&mut self) -> u32 {
        self.0 += 1;
        self.0
    }
}

fn slide_part(slide: &SlideLayout, style: &ResolvedStyle, language: &str) -> String {
    let mut ids = ShapeIds(1);
    let mut shapes = String::new();

    for element in &slide.elements {
        match element {
            Element::Shape { rect, fill } => {
                shapes.push_str(&filled_rect(ids.next(), "Accent", rect, fill.color(style)));
            }
            Element::Text(text) => {
                shapes.push_str(&text_shape(ids.next(), text, style, language));
            }
            Element::Stat {
                cell,
                value,
                label,
                sublabel,
            } => {
                shapes.push_str(&filled_rect(ids.next(), "Stat", cell, style.theme.surface));
                shapes.push_str(&text_shape(ids.next(), value, style, language));
                shapes.push_str(&text_shape(ids.next(), label, style, language));
                if let Some(sublabel) = sublabel {
                    shapes.push_str(&text_shape(ids.next(), sublabel, style, language));
                }
            }
        }
    }

    if let (Some(rect), Some(_)) = (slide.logo, style.logo_url.as_deref()) {
        shapes.push_str(&format!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Logo"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:link="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
            id = ids.next(),
            xfrm = xfrm(&rect),
        ));
    }

    format!(
        r#"{XML_DECL}<p:sld xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:bg><p:bgPr><a:solidFill><a:srgbClr val="{background}"/></a:solidFill><a:effectLst/></p:bgPr></p:bg><p:spTree>{tree}{shapes}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        background = style.theme.background.hex(),
        tree = empty_tree(),
    )
}

fn xfrm(rect: &Rect) -> String {
    format!(
        r#"<a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
        x = emu(rect.x),
        y = emu(rect.y),
        cx = emu(rect.w),
        cy = emu(rect.h),
    )
}

fn filled_rect(id: u32, name: &str, rect: &Rect, color: Rgb) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name} {id}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:solidFill><a:srgbClr val="{color}"/></a:solidFill><a:ln><a:noFill/></a:ln></p:spPr></p:sp>"#,
        xfrm = xfrm(rect),
        color = color.hex(),
    )
}

fn text_shape(id: u32, text: &TextBox, style: &ResolvedStyle, language: &str) -> String {
    let align = match text.align {
        Align::Left => "l",
        Align::Center => "ctr",
    };
    let size = (text.font_size * 100.0).round() as i64;
    let bold = if text.role.is_bold() { r#" b="1""# } else { "" };
    let run_props = format!(
        r#"<a:rPr lang="{lang}" sz="{size}"{bold} dirty="0"><a:solidFill><a:srgbClr val="{color}"/></a:solidFill><a:latin typeface="{font}"/></a:rPr>"#,
        lang = escape(language),
        color = text.role.color(style).hex(),
        font = escape(text.role.font(style)),
    );

    let mut body = String::new();
    for paragraph in &text.paragraphs {
        if paragraph.bullet {
            body.push_str(&format!(
                r#"<a:p><a:pPr marL="{indent}" indent="-{indent}" algn="{align}"><a:buFont typeface="Arial"/><a:buChar char="•"/></a:pPr>"#,
                indent = emu(BULLET_INDENT),
            ));
        } else {
            body.push_str(&format!(r#"<a:p><a:pPr algn="{align}"><a:buNone/></a:pPr>"#));
        }
        for (index, line) in paragraph.lines.iter().enumerate() {
            if index > 0 {
                body.push_str(&format!("<a:br>{run_props}</a:br>"));
            }
            body.push_str(&format!(
                "<a:r>{run_props}<a:t>{line}</a:t></a:r>",
                line = escape(line),
            ));
        }
        body.push_str("</a:p>");
    }

    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Text {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="square" lIns="0" tIns="0" rIns="0" bIns="0" anchor="t"><a:noAutofit/></a:bodyPr><a:lstStyle/>{body}</p:txBody></p:sp>"#,
        xfrm = xfrm(&text.rect),
    )
}
