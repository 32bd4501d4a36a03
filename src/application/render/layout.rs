//! Slide geometry shared by the PPTX and PDF writers.
//!
//! Everything is measured in points on a 960×540 canvas with the origin at
//! the top-left corner. Writers convert to their own units.

use tracing::warn;

use crate::application::render::theme::{ResolvedStyle, Rgb, Theme};
use crate::application::render::types::RenderError;
use crate::domain::deck::{Block, Deck, Slide, StatBlock};

pub const SLIDE_WIDTH: f32 = 960.0;
pub const SLIDE_HEIGHT: f32 = 540.0;

const MARGIN_X: f32 = 64.0;
const MARGIN_TOP: f32 = 56.0;
const BLOCK_GAP: f32 = 18.0;
const LINE_SPACING: f32 = 1.2;
const ACCENT_BAR_HEIGHT: f32 = 6.0;
pub const BULLET_INDENT: f32 = 24.0;
pub const BULLET_GAP: f32 = 6.0;

const STAT_COLUMNS: usize = 4;
const STAT_GAP: f32 = 16.0;
const STAT_PADDING: f32 = 14.0;

const LOGO_WIDTH: f32 = 120.0;
const LOGO_HEIGHT: f32 = 36.0;

/// Helvetica-like average advance width as a fraction of the font size.
const AVERAGE_GLYPH_WIDTH: f32 = 0.52;
/// Bold capitals and digits run wider than the average; single-line stat
/// text is fitted against this so the real glyphs never wrap.
const FIT_GLYPH_WIDTH: f32 = 0.62;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// Shared edges do not count as overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

/// Styling slot a text box draws from. Writers map it onto theme colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    Title,
    CoverTitle,
    Body,
    Bullet,
    StatValue,
    StatLabel,
    StatSublabel,
}

impl TextRole {
    pub fn font_size(self, theme: &Theme) -> f32 {
        match self {
            TextRole::Title => theme.title_size,
            TextRole::CoverTitle => theme.cover_title_size,
            TextRole::Body | TextRole::Bullet => theme.body_size,
            TextRole::StatValue => theme.stat_value_size,
            TextRole::StatLabel => theme.stat_label_size,
            TextRole::StatSublabel => theme.stat_sublabel_size,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(
            self,
            TextRole::Title | TextRole::CoverTitle | TextRole::StatValue
        )
    }

    pub fn is_heading(self) -> bool {
        matches!(self, TextRole::Title | TextRole::CoverTitle)
    }

    pub fn color(self, style: &ResolvedStyle) -> Rgb {
        match self {
            TextRole::CoverTitle | TextRole::StatValue => style.primary,
            TextRole::StatSublabel => style.secondary,
            TextRole::Title | TextRole::Body | TextRole::Bullet | TextRole::StatLabel => {
                style.theme.text
            }
        }
    }

    pub fn font(self, style: &ResolvedStyle) -> &'static str {
        if self.is_heading() {
            style.theme.heading_font
        } else {
            style.theme.body_font
        }
    }
}

/// One text frame. Each paragraph is pre-wrapped into `lines` so both writers
/// break text at the same places.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub rect: Rect,
    pub role: TextRole,
    pub align: Align,
    pub font_size: f32,
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub text: String,
    pub lines: Vec<String>,
    pub bullet: bool,
}

impl TextBox {
    pub fn line_height(&self) -> f32 {
        self.font_size * LINE_SPACING
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    Primary,
    Surface,
}

impl Fill {
    pub fn color(self, style: &ResolvedStyle) -> Rgb {
        match self {
            Fill::Primary => style.primary,
            Fill::Surface => style.theme.surface,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Shape { rect: Rect, fill: Fill },
    Text(TextBox),
    /// One stat block: the cell plus its stacked texts, all inside `cell`.
    Stat {
        cell: Rect,
        value: TextBox,
        label: TextBox,
        sublabel: Option<TextBox>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlideLayout {
    pub elements: Vec<Element>,
    pub logo: Option<Rect>,
    /// Content runs past the bottom margin.
    pub overflows: bool,
}

impl SlideLayout {
    pub fn stat_cells(&self) -> impl Iterator<Item = &Rect> {
        self.elements.iter().filter_map(|element| match element {
            Element::Stat { cell, .. } => Some(cell),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckLayout {
    pub slides: Vec<SlideLayout>,
}

/// Lays out every slide. Fails on the first block whose kind is unknown,
/// reporting 1-based slide and block positions.
pub fn layout_deck(deck: &Deck, theme: &Theme, with_logo: bool) -> Result<DeckLayout, RenderError> {
    let slides = deck
        .slides
        .iter()
        .enumerate()
        .map(|(index, slide)| layout_slide(slide, index + 1, theme, with_logo))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DeckLayout { slides })
}

fn layout_slide(
    slide: &Slide,
    slide_number: usize,
    theme: &Theme,
    with_logo: bool,
) -> Result<SlideLayout, RenderError> {
    let content_width = SLIDE_WIDTH - 2.0 * MARGIN_X;
    let align = if slide.is_cover() || slide.is_centered() {
        Align::Center
    } else {
        Align::Left
    };

    let mut flow = Vec::new();
    let mut cursor = 0.0_f32;

    for (index, block) in slide.blocks.iter().enumerate() {
        let element = match block {
            Block::Title { text } => {
                let role = if slide.is_cover() {
                    TextRole::CoverTitle
                } else {
                    TextRole::Title
                };
                text_box(text, role, align, MARGIN_X, cursor, content_width, theme)
                    .map(|text| vec![Element::Text(text)])
            }
            Block::Text { text } => {
                text_box(text, TextRole::Body, align, MARGIN_X, cursor, content_width, theme)
                    .map(|text| vec![Element::Text(text)])
            }
            Block::Bullets { items } => {
                bullet_box(items, align, MARGIN_X, cursor, content_width, theme)
                    .map(|text| vec![Element::Text(text)])
            }
            // Consecutive stats share one band, placed at the first of the run.
            Block::StatBlock(_)
                if index > 0 && matches!(slide.blocks[index - 1], Block::StatBlock(_)) =>
            {
                None
            }
            Block::StatBlock(_) => {
                let run: Vec<&StatBlock> = slide.blocks[index..]
                    .iter()
                    .map_while(|block| match block {
                        Block::StatBlock(stat) => Some(stat),
                        _ => None,
                    })
                    .collect();
                Some(stat_band(&run, MARGIN_X, cursor, content_width, theme))
            }
            Block::Unknown(unknown) => {
                return Err(RenderError::UnknownBlockKind {
                    kind: unknown.kind.clone(),
                    slide: slide_number,
                    block: index + 1,
                });
            }
        };

        if let Some(elements) = element {
            let bottom = elements
                .iter()
                .map(element_bottom)
                .fold(cursor, f32::max);
            cursor = bottom + BLOCK_GAP;
            flow.extend(elements);
        }
    }

    let used = (cursor - BLOCK_GAP).max(0.0);
    let offset = if slide.is_cover() {
        ((SLIDE_HEIGHT - used) / 2.0).max(MARGIN_TOP)
    } else {
        MARGIN_TOP
    };

    let bottom = offset + used;
    let overflows = bottom > SLIDE_HEIGHT - MARGIN_TOP;
    if overflows {
        warn!(
            target = "deckport::render",
            slide = slide_number,
            bottom,
            limit = SLIDE_HEIGHT - MARGIN_TOP,
            "slide content runs past the bottom margin"
        );
    }

    let mut elements = vec![Element::Shape {
        rect: Rect::new(0.0, 0.0, SLIDE_WIDTH, ACCENT_BAR_HEIGHT),
        fill: Fill::Primary,
    }];
    elements.extend(flow.into_iter().map(|element| shift(element, offset)));

    let logo = with_logo.then(|| {
        Rect::new(
            SLIDE_WIDTH - MARGIN_X / 2.0 - LOGO_WIDTH,
            ACCENT_BAR_HEIGHT + 10.0,
            LOGO_WIDTH,
            LOGO_HEIGHT,
        )
    });

    Ok(SlideLayout {
        elements,
        logo,
        overflows,
    })
}

fn text_box(
    text: &str,
    role: TextRole,
    align: Align,
    x: f32,
    y: f32,
    width: f32,
    theme: &Theme,
) -> Option<TextBox> {
    let font_size = role.font_size(theme);
    let lines = wrap_text(text, font_size, width);
    if lines.is_empty() {
        return None;
    }
    let height = lines.len() as f32 * font_size * LINE_SPACING;
    Some(TextBox {
        rect: Rect::new(x, y, width, height),
        role,
        align,
        font_size,
        paragraphs: vec![Paragraph {
            text: text.trim().to_string(),
            lines,
            bullet: false,
        }],
    })
}

fn bullet_box(
    items: &[String],
    align: Align,
    x: f32,
    y: f32,
    width: f32,
    theme: &Theme,
) -> Option<TextBox> {
    let font_size = TextRole::Bullet.font_size(theme);
    let paragraphs: Vec<Paragraph> = items
        .iter()
        .map(|item| Paragraph {
            text: item.trim().to_string(),
            lines: wrap_text(item, font_size, width - BULLET_INDENT),
            bullet: true,
        })
        .filter(|paragraph| !paragraph.lines.is_empty())
        .collect();
    if paragraphs.is_empty() {
        return None;
    }

    let line_count: usize = paragraphs.iter().map(|paragraph| paragraph.lines.len()).sum();
    let height = line_count as f32 * font_size * LINE_SPACING
        + (paragraphs.len() - 1) as f32 * BULLET_GAP;
    Some(TextBox {
        rect: Rect::new(x, y, width, height),
        role: TextRole::Bullet,
        align,
        font_size,
        paragraphs,
    })
}

/// Splits `count` stat blocks into rows of at most four equal cells across
/// `width`. A short final row keeps the same cell width and is centred.
pub fn stat_grid(count: usize, x: f32, y: f32, width: f32, cell_height: f32) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let columns = count.min(STAT_COLUMNS);
    let cell_width = (width - STAT_GAP * (columns - 1) as f32) / columns as f32;

    (0..count)
        .map(|index| {
            let row = index / columns;
            let column = index % columns;
            let in_row = (count - row * columns).min(columns);
            let row_width = in_row as f32 * cell_width + (in_row - 1) as f32 * STAT_GAP;
            let row_x = x + (width - row_width) / 2.0;
            Rect::new(
                row_x + column as f32 * (cell_width + STAT_GAP),
                y + row as f32 * (cell_height + STAT_GAP),
                cell_width,
                cell_height,
            )
        })
        .collect()
}

fn stat_band(stats: &[&StatBlock], x: f32, y: f32, width: f32, theme: &Theme) -> Vec<Element> {
    let value_height = theme.stat_value_size * LINE_SPACING;
    let label_height = theme.stat_label_size * LINE_SPACING;
    let sublabel_height = theme.stat_sublabel_size * LINE_SPACING;
    let cell_height = 2.0 * STAT_PADDING + value_height + label_height + sublabel_height;

    stat_grid(stats.len(), x, y, width, cell_height)
        .into_iter()
        .zip(stats)
        .map(|(cell, stat)| {
            let inner_width = cell.w - 2.0 * STAT_PADDING;
            let inner_x = cell.x + STAT_PADDING;
            let mut top = cell.y + STAT_PADDING;

            let value = fitted_line(&stat.value, TextRole::StatValue, inner_x, top, inner_width, theme);
            top += value_height;
            let label = fitted_line(&stat.label, TextRole::StatLabel, inner_x, top, inner_width, theme);
            top += label_height;
            let sublabel = stat.sublabel().map(|sublabel| {
                fitted_line(sublabel, TextRole::StatSublabel, inner_x, top, inner_width, theme)
            });

            Element::Stat {
                cell,
                value,
                label,
                sublabel,
            }
        })
        .collect()
}

/// Single-line text box for stat cells. Text wider than the cell is set in
/// a smaller size so every character survives and the cell height stays fixed.
fn fitted_line(text: &str, role: TextRole, x: f32, y: f32, width: f32, theme: &Theme) -> TextBox {
    let line = text.trim().to_string();
    let nominal = role.font_size(theme);
    let font_size = fit_font_size(&line, nominal, width);
    TextBox {
        rect: Rect::new(x, y, width, nominal * LINE_SPACING),
        role,
        align: Align::Center,
        font_size,
        paragraphs: vec![Paragraph {
            text: line.clone(),
            lines: vec![line],
            bullet: false,
        }],
    }
}

/// Largest size up to `nominal` at which `text` fits `width` on one line,
/// rounded down to a quarter point.
fn fit_font_size(text: &str, nominal: f32, width: f32) -> f32 {
    let chars = text.chars().count() as f32;
    if chars == 0.0 {
        return nominal;
    }
    let fitting = width / (chars * FIT_GLYPH_WIDTH);
    nominal.min((fitting * 4.0).floor() / 4.0)
}

pub fn text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * AVERAGE_GLYPH_WIDTH
}

fn max_chars(font_size: f32, width: f32) -> usize {
    ((width / (font_size * AVERAGE_GLYPH_WIDTH)).floor() as usize).max(1)
}

/// Greedy word wrap using the average glyph width. Explicit newlines start a
/// new line; words longer than a line are split.
pub fn wrap_text(text: &str, font_size: f32, width: f32) -> Vec<String> {
    let limit = max_chars(font_size, width);
    let mut lines = Vec::new();

    for raw_line in text.trim().lines() {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > limit {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(limit);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let current_len = current.chars().count();
            let needed = if current.is_empty() {
                word.len()
            } else {
                current_len + 1 + word.len()
            };
            if needed > limit && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

fn element_bottom(element: &Element) -> f32 {
    match element {
        Element::Shape { rect, .. } => rect.bottom(),
        Element::Text(text) => text.rect.bottom(),
        Element::Stat { cell, .. } => cell.bottom(),
    }
}

fn shift(element: Element, dy: f32) -> Element {
    let move_rect = |rect: Rect| Rect::new(rect.x, rect.y + dy, rect.w, rect.h);
    let move_text = |mut text: TextBox| {
        text.rect = move_rect(text.rect);
        text
    };
    match element {
        Element::Shape { rect, fill } => Element::Shape {
            rect: move_rect(rect),
            fill,
        },
        Element::Text(text) => Element::Text(move_text(text)),
        Element::Stat {
            cell,
            value,
            label,
            sublabel,
        } => Element::Stat {
            cell: move_rect(cell),
            value: move_text(value),
            label: move_text(label),
            sublabel: sublabel.map(move_text),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::render::theme::{DEFAULT_THEME_ID, theme_or_fallback};

    fn theme() -> &'static Theme {
        theme_or_fallback(DEFAULT_THEME_ID, DEFAULT_THEME_ID)
    }

    fn deck_with_stats(count: usize) -> Deck {
        let blocks: Vec<_> = (0..count)
            .map(|idx| json!({ "kind": "stat_block", "value": format!("{idx}0%"), "label": "Metric" }))
            .collect();
        serde_json::from_value(json!({
            "meta": { "title": "Stats" },
            "slides": [{ "type": "stats", "blocks": blocks }]
        }))
        .unwrap()
    }

    #[test]
    fn stat_cells_never_overlap() {
        for count in 1..=9 {
            let deck = deck_with_stats(count);
            let layout = layout_deck(&deck, theme(), false).unwrap();
            let cells: Vec<_> = layout.slides[0].stat_cells().copied().collect();
            assert_eq!(cells.len(), count);

            let body = Rect::new(
                MARGIN_X - 0.01,
                0.0,
                SLIDE_WIDTH - 2.0 * MARGIN_X + 0.02,
                SLIDE_HEIGHT * 2.0,
            );
            for (i, a) in cells.iter().enumerate() {
                assert!(body.contains(a), "cell {i} escapes the body for n={count}");
                for b in &cells[i + 1..] {
                    assert!(!a.overlaps(b), "overlap for n={count}: {a:?} vs {b:?}");
                }
            }
        }
    }

    #[test]
    fn grid_wraps_after_four_with_equal_cells() {
        let cells = stat_grid(6, 0.0, 0.0, 832.0, 100.0);
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|cell| (cell.w - cells[0].w).abs() < f32::EPSILON));
        assert_eq!(cells[3].y, cells[0].y);
        assert!(cells[4].y > cells[0].y);
        assert!(cells[4].x > cells[0].x, "short row is centred");
    }

    #[test]
    fn stat_text_stays_inside_its_cell() {
        let deck: Deck = serde_json::from_value(json!({
            "meta": { "title": "Stats" },
            "slides": [{ "type": "stats", "blocks": [
                { "kind": "stat_block", "value": "1,234,567,890,123", "label": "Very long label for a small cell", "sublabel": "since launch" }
            ]}]
        }))
        .unwrap();
        let layout = layout_deck(&deck, theme(), false).unwrap();
        let Some(Element::Stat { cell, value, label, sublabel }) = layout.slides[0]
            .elements
            .iter()
            .find(|element| matches!(element, Element::Stat { .. }))
        else {
            panic!("expected stat element");
        };
        for text in [value, label, sublabel.as_ref().unwrap()] {
            assert!(cell.contains(&text.rect));
        }
    }

    fn stats_slide(blocks: serde_json::Value) -> SlideLayout {
        let deck: Deck = serde_json::from_value(json!({
            "meta": { "title": "Stats" },
            "slides": [{ "type": "stats", "blocks": blocks }]
        }))
        .unwrap();
        layout_deck(&deck, theme(), false).unwrap().slides.remove(0)
    }

    #[test]
    fn wide_stat_values_shrink_instead_of_losing_characters() {
        let values = ["1,200,000", "$12.5M ARR", "3", "4"];
        let blocks: Vec<_> = values
            .iter()
            .map(|value| json!({ "kind": "stat_block", "value": value, "label": "Metric" }))
            .collect();
        let slide = stats_slide(json!(blocks));

        let fitted: Vec<&TextBox> = slide
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Stat { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(fitted.len(), 4);

        for (text, expected) in fitted.iter().zip(values) {
            assert_eq!(text.paragraphs[0].lines, vec![expected.to_string()]);
            assert!(text.font_size <= theme().stat_value_size);
            assert!(
                expected.chars().count() as f32 * text.font_size * FIT_GLYPH_WIDTH <= text.rect.w,
                "{expected} is wider than its cell"
            );
        }
        assert!(fitted[0].font_size < theme().stat_value_size);
        assert_eq!(fitted[2].font_size, theme().stat_value_size);
    }

    #[test]
    fn stats_split_by_other_blocks_keep_document_order() {
        let slide = stats_slide(json!([
            { "kind": "stat_block", "value": "1", "label": "First" },
            { "kind": "bullets", "items": ["Between"] },
            { "kind": "stat_block", "value": "2", "label": "Second" }
        ]));

        let tops: Vec<(String, f32)> = slide
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Stat { cell, label, .. } => Some((label.paragraphs[0].text.clone(), cell.y)),
                Element::Text(text) => Some((text.paragraphs[0].text.clone(), text.rect.y)),
                Element::Shape { .. } => None,
            })
            .collect();
        let labels: Vec<&str> = tops.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, ["First", "Between", "Second"]);
        assert!(tops.windows(2).all(|pair| pair[0].1 < pair[1].1));
    }

    #[test]
    fn consecutive_stats_share_one_row() {
        let slide = stats_slide(json!([
            { "kind": "stat_block", "value": "1", "label": "A" },
            { "kind": "stat_block", "value": "2", "label": "B" }
        ]));
        let cells: Vec<_> = slide.stat_cells().collect();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].y, cells[1].y);
    }

    #[test]
    fn tall_slides_are_flagged_as_overflowing() {
        let mut blocks: Vec<_> = (0..9)
            .map(|idx| json!({ "kind": "stat_block", "value": format!("{idx}"), "label": "Metric" }))
            .collect();
        blocks.push(json!({ "kind": "bullets", "items": ["one", "two", "three", "four"] }));
        assert!(stats_slide(json!(blocks)).overflows);

        let short = stats_slide(json!([{ "kind": "stat_block", "value": "1", "label": "A" }]));
        assert!(!short.overflows);
    }

    #[test]
    fn empty_bullets_render_nothing() {
        let deck: Deck = serde_json::from_value(json!({
            "meta": { "title": "Deck" },
            "slides": [{ "type": "bullets", "blocks": [{ "kind": "bullets", "items": [] }] }]
        }))
        .unwrap();
        let layout = layout_deck(&deck, theme(), false).unwrap();
        assert!(
            layout.slides[0]
                .elements
                .iter()
                .all(|element| !matches!(element, Element::Text(_)))
        );
    }

    #[test]
    fn unknown_block_reports_position() {
        let deck: Deck = serde_json::from_value(json!({
            "meta": { "title": "Deck" },
            "slides": [
                { "type": "cover", "blocks": [{ "kind": "title", "text": "Hi" }] },
                { "type": "bullets", "blocks": [
                    { "kind": "text", "text": "ok" },
                    { "kind": "chart", "series": [] }
                ]}
            ]
        }))
        .unwrap();
        let err = layout_deck(&deck, theme(), false).unwrap_err();
        match err {
            RenderError::UnknownBlockKind { kind, slide, block } => {
                assert_eq!((kind.as_str(), slide, block), ("chart", 2, 2));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        let lines = wrap_text("alpha beta gamma delta", 10.0, 60.0);
        let limit = max_chars(10.0, 60.0);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.chars().count() <= limit));

        let lines = wrap_text(&"x".repeat(30), 10.0, 52.0);
        assert_eq!(lines.concat(), "x".repeat(30));
        assert!(wrap_text("   ", 10.0, 100.0).is_empty());
    }
}
