//! Integration tests for the luminaire schedule extractor's page flow.

use image::RgbImage;
use zumen_ocr::config::{LineAssistConfig, LineAssistMode};
use zumen_ocr::extract::luminaire::{
    build_output_rows, extract_page_candidates, is_header_row, propagate_symbols,
};
use zumen_ocr::geometry::Rect;
use zumen_ocr::layout::WordBox;
use zumen_ocr::lines::{NoVectorLines, NoopLineDetector};

fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> WordBox {
    WordBox::new(text, Rect::new(x0, y0, x1, y1))
}

fn header_words(y: f32) -> Vec<WordBox> {
    vec![
        word("器具記号", 20.0, y, 120.0, y + 20.0),
        word("名称", 200.0, y, 250.0, y + 20.0),
        word("相当型番", 500.0, y, 600.0, y + 20.0),
    ]
}

fn off_config() -> LineAssistConfig {
    LineAssistConfig {
        mode: LineAssistMode::Off,
        ..LineAssistConfig::default()
    }
}

#[test]
fn test_header_row_text_from_words() {
    let words = header_words(40.0);
    let clusters = zumen_ocr::layout::cluster_by_y(&words, 18.0);
    assert_eq!(clusters.len(), 1);
    assert!(is_header_row(&clusters[0].row_text()));
}

#[test]
fn test_single_section_with_continuation() {
    let mut words = header_words(40.0);
    // Data row: coded fixture with a colon pair.
    words.push(word("CT1", 20.0, 100.0, 70.0, 120.0));
    words.push(word("DAIKO:LZD-93039", 500.0, 100.0, 700.0, 120.0));
    // Continuation row 40px below: colon pair, no code of its own.
    words.push(word("DAIKO", 500.0, 140.0, 560.0, 160.0));
    words.push(word(":", 562.0, 140.0, 566.0, 160.0));
    words.push(word("LZA-93039", 570.0, 140.0, 680.0, 160.0));

    let mut outcomes = vec![];
    let candidates = extract_page_candidates(
        &words,
        1,
        &RgbImage::new(1200, 800),
        18.0,
        &NoVectorLines,
        &NoopLineDetector,
        &off_config(),
        &mut outcomes,
    );
    assert_eq!(candidates.len(), 2);
    // The continuation row inherited the symbol.
    assert!(candidates.iter().all(|c| c.symbol.as_deref() == Some("CT1")));

    let rows = build_output_rows(&candidates);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].symbol, "CT1");
    assert_eq!(rows[0].manufacturer, "DAIKO");
    assert_eq!(rows[0].model, "LZD-93039");
    assert_eq!(rows[1].model, "LZA-93039");
}

#[test]
fn test_multiple_sections_bounded_by_headers() {
    let mut words = header_words(40.0);
    words.push(word("CT1", 20.0, 100.0, 70.0, 120.0));
    words.push(word("DAIKO:LZD-1000", 500.0, 100.0, 700.0, 120.0));
    // Second schedule of the same type further down the page.
    words.extend(header_words(400.0));
    words.push(word("TP2", 20.0, 460.0, 70.0, 480.0));
    words.push(word("KOIZUMI:AD-2000", 500.0, 460.0, 700.0, 480.0));

    let mut outcomes = vec![];
    let candidates = extract_page_candidates(
        &words,
        3,
        &RgbImage::new(1200, 800),
        18.0,
        &NoVectorLines,
        &NoopLineDetector,
        &off_config(),
        &mut outcomes,
    );
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].section_index, 0);
    assert_eq!(candidates[1].section_index, 1);
    assert!(candidates.iter().all(|c| c.page == 3));
}

#[test]
fn test_page_without_header_yields_nothing() {
    let words = vec![
        word("CT1", 20.0, 100.0, 70.0, 120.0),
        word("DAIKO:LZD-1000", 500.0, 100.0, 700.0, 120.0),
    ];
    let mut outcomes = vec![];
    let candidates = extract_page_candidates(
        &words,
        1,
        &RgbImage::new(1200, 800),
        18.0,
        &NoVectorLines,
        &NoopLineDetector,
        &off_config(),
        &mut outcomes,
    );
    assert!(candidates.is_empty());
}

#[test]
fn test_output_order_is_total_and_stable() {
    let mut words = header_words(40.0);
    // Two side-by-side blocks, interleaved vertically.
    words.push(word("CT1", 20.0, 100.0, 70.0, 120.0));
    words.push(word("DAIKO:LZD-1", 90.0, 100.0, 250.0, 120.0));
    words.push(word("TP1", 700.0, 100.0, 750.0, 120.0));
    words.push(word("DAIKO:LZD-2", 770.0, 100.0, 930.0, 120.0));
    words.push(word("CT2", 20.0, 150.0, 70.0, 170.0));
    words.push(word("DAIKO:LZD-3", 90.0, 150.0, 250.0, 170.0));

    let mut outcomes = vec![];
    let candidates = extract_page_candidates(
        &words,
        1,
        &RgbImage::new(1200, 800),
        18.0,
        &NoVectorLines,
        &NoopLineDetector,
        &off_config(),
        &mut outcomes,
    );
    assert_eq!(candidates.len(), 3);

    let forward = build_output_rows(&candidates);
    let mut reversed = candidates.clone();
    reversed.reverse();
    let backward = build_output_rows(&reversed);
    assert_eq!(forward, backward);
    // Left block (CT1, CT2) sorts before the right block (TP1).
    assert_eq!(forward[0].symbol, "CT1");
    assert_eq!(forward[1].symbol, "CT2");
    assert_eq!(forward[2].symbol, "TP1");
}

#[test]
fn test_propagation_is_pure_for_gate_reruns() {
    let mut words = header_words(40.0);
    words.push(word("CT1", 20.0, 100.0, 70.0, 120.0));
    words.push(word("DAIKO:LZD-1", 90.0, 100.0, 250.0, 120.0));
    words.push(word("DAIKO", 90.0, 140.0, 150.0, 160.0));
    words.push(word(":", 152.0, 140.0, 156.0, 160.0));
    words.push(word("LZA-2", 160.0, 140.0, 230.0, 160.0));

    let mut outcomes = vec![];
    let candidates = extract_page_candidates(
        &words,
        1,
        &RgbImage::new(1200, 800),
        18.0,
        &NoVectorLines,
        &NoopLineDetector,
        &off_config(),
        &mut outcomes,
    );
    // Rerunning propagation on already-propagated rows changes nothing.
    let once = propagate_symbols(&candidates);
    let twice = propagate_symbols(&once);
    assert_eq!(once, twice);
}
