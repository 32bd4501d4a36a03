mod support;

use std::io::{Cursor, Read};

use serde_json::json;
use time::macros::datetime;

use deckport::application::render::{
    DocumentRenderService, Element, RenderError, RenderRequest, RenderService, find_theme,
    layout_deck,
};
use deckport::domain::deck::Deck;
use deckport::domain::exports::{BrandKit, ExportFormat};

use support::example_deck;

fn pptx_part(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut part = archive.by_name(name).unwrap();
    let mut xml = String::new();
    part.read_to_string(&mut xml).unwrap();
    xml
}

#[test]
fn example_deck_renders_to_pptx() {
    let artifact = DocumentRenderService::default()
        .render(&RenderRequest::new(example_deck(), ExportFormat::Pptx, "default"))
        .unwrap();

    assert!(!artifact.bytes.is_empty());
    assert_eq!(artifact.slide_count, 3);
    assert_eq!(
        artifact.content_type(),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation"
    );

    let stats = pptx_part(&artifact.bytes, "ppt/slides/slide2.xml");
    for text in ["42%", "Growth", "1.2M", "99.9%", "Hiring on plan"] {
        assert!(stats.contains(text), "slide 2 is missing {text}");
    }
    assert!(pptx_part(&artifact.bytes, "ppt/slides/slide3.xml").contains("$4M"));
}

#[test]
fn example_deck_renders_to_pdf() {
    let artifact = DocumentRenderService::default()
        .render(&RenderRequest::new(example_deck(), ExportFormat::Pdf, "default"))
        .unwrap();

    assert!(artifact.bytes.starts_with(b"%PDF-"));
    let document = lopdf::Document::load_mem(&artifact.bytes).unwrap();
    assert_eq!(document.get_pages().len(), 3);
}

#[test]
fn identical_input_renders_identical_bytes() {
    let service = DocumentRenderService::default();
    let brand = BrandKit {
        primary_color: Some("#1F6FEB".into()),
        secondary_color: None,
        logo_url: Some("https://cdn.example/logo.png".into()),
    };

    for format in [ExportFormat::Pptx, ExportFormat::Pdf] {
        let request = RenderRequest::new(example_deck(), format, "midnight")
            .with_brand(Some(brand.clone()))
            .with_generated_at(datetime!(2026-10-19 08:30 UTC));

        let first = service.render(&request).unwrap();
        let second = service.render(&request).unwrap();
        assert_eq!(first.bytes, second.bytes, "{format} output drifted");
    }
}

#[test]
fn stat_regions_never_overlap_for_one_to_six_stats() {
    let theme = find_theme("default").unwrap();

    for count in 1..=6 {
        let blocks: Vec<_> = (0..count)
            .map(|i| json!({ "kind": "stat_block", "value": format!("{i}"), "label": "Metric" }))
            .collect();
        let deck: Deck = serde_json::from_value(json!({
            "meta": { "title": "Stats" },
            "slides": [{ "type": "stats", "blocks": blocks }]
        }))
        .unwrap();

        let layout = layout_deck(&deck, theme, false).unwrap();
        let cells: Vec<_> = layout.slides[0]
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Stat { cell, .. } => Some(*cell),
                _ => None,
            })
            .collect();

        assert_eq!(cells.len(), count);
        for (i, a) in cells.iter().enumerate() {
            for b in &cells[i + 1..] {
                assert!(!a.overlaps(b), "{count} stats: {a:?} overlaps {b:?}");
            }
        }
    }
}

fn stats_deck(values: &[&str]) -> Deck {
    let blocks: Vec<_> = values
        .iter()
        .map(|value| json!({ "kind": "stat_block", "value": value, "label": "Metric" }))
        .collect();
    serde_json::from_value(json!({
        "meta": { "title": "Stats" },
        "slides": [{ "type": "stats", "blocks": blocks }]
    }))
    .unwrap()
}

#[test]
fn wide_stat_values_reach_the_document_intact() {
    let deck = stats_deck(&["1,200,000", "$12.5M ARR", "3", "4"]);
    let artifact = DocumentRenderService::default()
        .render(&RenderRequest::new(deck.clone(), ExportFormat::Pptx, "default"))
        .unwrap();

    let slide = pptx_part(&artifact.bytes, "ppt/slides/slide1.xml");
    assert!(slide.contains(">1,200,000<"), "{slide}");
    assert!(slide.contains(">$12.5M ARR<"), "{slide}");
    assert!(!slide.contains('…'));

    let artifact = DocumentRenderService::default()
        .render(&RenderRequest::new(deck, ExportFormat::Pdf, "default"))
        .unwrap();
    let document = lopdf::Document::load_mem(&artifact.bytes).unwrap();
    let page = *document.get_pages().values().next().unwrap();
    let content = String::from_utf8_lossy(&document.get_page_content(page).unwrap()).into_owned();
    assert!(content.contains("(1,200,000) Tj"), "{content}");
    assert!(content.contains("($12.5M ARR) Tj"), "{content}");
}

#[test]
fn non_latin_text_fails_pdf_but_renders_in_pptx() {
    let deck: Deck = serde_json::from_value(json!({
        "meta": { "title": "四半期レビュー", "language": "ja" },
        "slides": [{ "type": "cover", "blocks": [{ "kind": "title", "text": "四半期レビュー" }] }]
    }))
    .unwrap();
    let service = DocumentRenderService::default();

    let err = service
        .render(&RenderRequest::new(deck.clone(), ExportFormat::Pdf, "default"))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::UnsupportedText {
            character: '四',
            slide: 1
        }
    ));

    let artifact = service
        .render(&RenderRequest::new(deck, ExportFormat::Pptx, "default"))
        .unwrap();
    assert!(pptx_part(&artifact.bytes, "ppt/slides/slide1.xml").contains("四半期レビュー"));
}
