//! PDF writer built on `lopdf`.
//!
//! Uses the standard Helvetica faces with WinAnsi encoding so no font data
//! has to be embedded. Text outside WinAnsi fails the render instead of
//! being substituted. One page per slide, sized to the slide canvas.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat, dictionary};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::application::render::layout::{
    Align, BULLET_GAP, BULLET_INDENT, DeckLayout, Element, Rect, SLIDE_HEIGHT, SLIDE_WIDTH,
    SlideLayout, TextBox, text_width,
};
use crate::application::render::theme::{ResolvedStyle, Rgb};
use crate::application::render::types::RenderError;
use crate::domain::deck::Deck;

const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";
const BASELINE_RATIO: f32 = 0.9;
const WIN_ANSI_BULLET: u8 = 0x95;

/// Writes one page per slide and returns the serialised document.
pub fn write_pdf(
    deck: &Deck,
    layout: &DeckLayout,
    style: &ResolvedStyle,
    generated_at: Option<OffsetDateTime>,
) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(font("Helvetica"));
    let bold = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR_FONT => regular,
            BOLD_FONT => bold,
        },
    });

    let mut kids = Vec::with_capacity(layout.slides.len());
    for (index, slide) in layout.slides.iter().enumerate() {
        let operations = slide_operations(slide, style).map_err(|character| {
            RenderError::UnsupportedText {
                character,
                slide: index + 1,
            }
        })?;
        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|err| RenderError::document(err.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if let Some(annotation) = logo_annotation(slide, style) {
            let annotation_id = doc.add_object(annotation);
            page.set("Annots", vec![Object::Reference(annotation_id)]);
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), number(SLIDE_WIDTH), number(SLIDE_HEIGHT)],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(info_dictionary(deck, generated_at)?);
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|err| RenderError::document(err.to_string()))?;
    Ok(bytes)
}

fn font(base: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

/// The only object that may vary with the generation timestamp.
fn info_dictionary(
    deck: &Deck,
    generated_at: Option<OffsetDateTime>,
) -> Result<Dictionary, RenderError> {
    let mut info = dictionary! {
        "Title" => text_string(&deck.meta.title),
        "Producer" => Object::string_literal("deckport"),
    };
    if let Some(generated_at) = generated_at {
        let stamp = generated_at
            .to_offset(time::UtcOffset::UTC)
            .format(format_description!(
                "D:[year][month][day][hour][minute][second]Z"
            ))
            .map_err(|err| RenderError::document(err.to_string()))?;
        info.set("CreationDate", Object::string_literal(stamp.clone()));
        info.set("ModDate", Object::string_literal(stamp));
    }
    Ok(info)
}

/// PDF text string: literal for ASCII, UTF-16BE with a byte order mark otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Rounded to hundredths so output never depends on float noise.
fn number(value: f32) -> Object {
    Object::from((value * 100.0).round() / 100.0)
}

fn flip_y(top: f32, height: f32) -> f32 {
    SLIDE_HEIGHT - top - height
}

/// Fails with the first character WinAnsi cannot represent.
fn slide_operations(slide: &SlideLayout, style: &ResolvedStyle) -> Result<Vec<Operation>, char> {
    let mut ops = Vec::new();
    fill_rect(
        &mut ops,
        &Rect::new(0.0, 0.0, SLIDE_WIDTH, SLIDE_HEIGHT),
        style.theme.background,
    );

    for element in &slide.elements {
        match element {
            Element::Shape { rect, fill } => fill_rect(&mut ops, rect, fill.color(style)),
            Element::Text(text) => draw_text(&mut ops, text, style)?,
            Element::Stat {
                cell,
                value,
                label,
                sublabel,
            } => {
                fill_rect(&mut ops, cell, style.theme.surface);
                draw_text(&mut ops, value, style)?;
                draw_text(&mut ops, label, style)?;
                if let Some(sublabel) = sublabel {
                    draw_text(&mut ops, sublabel, style)?;
                }
            }
        }
    }

    if let (Some(rect), Some(_)) = (slide.logo, style.logo_url.as_deref()) {
        let [r, g, b] = style.secondary.unit();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("RG", vec![r.into(), g.into(), b.into()]));
        ops.push(Operation::new("w", vec![number(1.0)]));
        ops.push(Operation::new(
            "re",
            vec![
                number(rect.x),
                number(flip_y(rect.y, rect.h)),
                number(rect.w),
                number(rect.h),
            ],
        ));
        ops.push(Operation::new("S", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }

    Ok(ops)
}

fn fill_rect(ops: &mut Vec<Operation>, rect: &Rect, color: Rgb) {
    let [r, g, b] = color.unit();
    ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
    ops.push(Operation::new(
        "re",
        vec![
            number(rect.x),
            number(flip_y(rect.y, rect.h)),
            number(rect.w),
            number(rect.h),
        ],
    ));
    ops.push(Operation::new("f", vec![]));
}

fn draw_text(ops: &mut Vec<Operation>, text: &TextBox, style: &ResolvedStyle) -> Result<(), char> {
    let font = if text.role.is_bold() {
        BOLD_FONT
    } else {
        REGULAR_FONT
    };
    let [r, g, b] = text.role.color(style).unit();
    let size = text.font_size;
    let line_height = text.line_height();

    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), number(size)]));
    ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));

    let mut top = text.rect.y;
    for paragraph in &text.paragraphs {
        let indent = if paragraph.bullet { BULLET_INDENT } else { 0.0 };
        for (index, line) in paragraph.lines.iter().enumerate() {
            let baseline = SLIDE_HEIGHT - (top + size * BASELINE_RATIO);
            let available = text.rect.w - indent;
            let x = match text.align {
                Align::Left => text.rect.x + indent,
                Align::Center => {
                    text.rect.x + indent + ((available - text_width(line, size)) / 2.0).max(0.0)
                }
            };

            if paragraph.bullet && index == 0 {
                show_text(ops, x - indent, baseline, vec![WIN_ANSI_BULLET]);
            }
            show_text(ops, x, baseline, win_ansi(line)?);
            top += line_height;
        }
        if paragraph.bullet {
            top += BULLET_GAP;
        }
    }

    ops.push(Operation::new("ET", vec![]));
    Ok(())
}

/// Positions with an absolute text matrix so each line is independent.
fn show_text(ops: &mut Vec<Operation>, x: f32, baseline: f32, bytes: Vec<u8>) {
    ops.push(Operation::new(
        "Tm",
        vec![
            1.into(),
            0.into(),
            0.into(),
            1.into(),
            number(x),
            number(baseline),
        ],
    ));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(bytes, StringFormat::Literal)],
    ));
}

/// Maps text onto WinAnsiEncoding, returning the first character it lacks.
fn win_ansi(text: &str) -> Result<Vec<u8>, char> {
    text.chars()
        .map(|ch| match ch {
            '\u{20}'..='\u{7E}' => Ok(ch as u8),
            '\u{A0}'..='\u{FF}' => Ok(ch as u32 as u8),
            '€' => Ok(0x80),
            '…' => Ok(0x85),
            '•' => Ok(WIN_ANSI_BULLET),
            '–' => Ok(0x96),
            '—' => Ok(0x97),
            '‘' => Ok(0x91),
            '’' => Ok(0x92),
            '“' => Ok(0x93),
            '”' => Ok(0x94),
            '™' => Ok(0x99),
            other => Err(other),
        })
        .collect()
}

fn logo_annotation(slide: &SlideLayout, style: &ResolvedStyle) -> Option<Dictionary> {
    let rect = slide.logo?;
    let url = style.logo_url.as_deref()?;
    let bottom = flip_y(rect.y, rect.h);
    Some(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => vec![
            number(rect.x),
            number(bottom),
            number(rect.right()),
            number(bottom + rect.h),
        ],
        "Border" => vec![0.into(), 0.into(), 0.into()],
        "A" => dictionary! {
            "Type" => "Action",
            "S" => "URI",
            "URI" => Object::string_literal(url),
        },
    })
}
