//! Integration tests for the spec-frame extractor: words → segments →
//! frame rows.

use zumen_ocr::extract::frame::{build_frame_rows_from_segments, build_segments_from_words};
use zumen_ocr::geometry::Rect;
use zumen_ocr::layout::WordBox;

fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> WordBox {
    WordBox::new(text, Rect::new(x0, y0, x1, y1))
}

#[test]
fn test_segments_split_on_wide_gaps_only() {
    let words = vec![
        word("電源電圧", 10.0, 100.0, 90.0, 120.0),
        word("DC24V", 100.0, 100.0, 160.0, 120.0),
        // Far right on the same row: a separate frame's label.
        word("消費電流", 600.0, 102.0, 680.0, 122.0),
    ];
    let segments = build_segments_from_words(&words, 1, 12.0, 70.0);
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].text_compact, "電源電圧DC24V");
    assert_eq!(segments[1].text_compact, "消費電流");
}

#[test]
fn test_words_to_frame_rows_end_to_end() {
    let mut words = vec![
        // Title above the frame.
        word("ロビーインターホン", 40.0, 40.0, 260.0, 64.0),
        // Code line.
        word("GX-8DK", 60.0, 90.0, 160.0, 114.0),
        // Label/value rows.
        word("電源電圧", 20.0, 150.0, 100.0, 174.0),
        word("DC24V", 110.0, 150.0, 170.0, 174.0),
        word("消費電流", 20.0, 190.0, 100.0, 214.0),
        word("10mA", 110.0, 190.0, 160.0, 214.0),
    ];
    // A second frame far to the right.
    words.push(word("カメラユニット", 640.0, 40.0, 820.0, 64.0));
    words.push(word("GX-2C", 660.0, 90.0, 740.0, 114.0));
    words.push(word("電源電圧", 620.0, 150.0, 700.0, 174.0));
    words.push(word("DC12V", 710.0, 150.0, 770.0, 174.0));

    let segments = build_segments_from_words(&words, 1, 12.0, 70.0);
    let title_segments = build_segments_from_words(&words, 1, 12.0, 40.0);
    let rows = build_frame_rows_from_segments(&segments, Some(&title_segments));

    assert_eq!(rows.len(), 2);
    // Reading order: left frame first.
    assert_eq!(rows[0].title, "ロビーインターホン");
    assert_eq!(rows[0].code, "GX-8DK");
    assert_eq!(rows[0].pairs.len(), 2);
    assert_eq!(rows[1].title, "カメラユニット");
    assert_eq!(rows[1].code, "GX-2C");

    let values = rows[0].values();
    assert_eq!(
        values,
        vec![
            "ロビーインターホン".to_string(),
            "GX-8DK".to_string(),
            "電源電圧".to_string(),
            "DC24V".to_string(),
            "消費電流".to_string(),
            "10mA".to_string(),
        ]
    );
}

#[test]
fn test_duplicate_frames_dedupe_by_signature() {
    // The same frame OCRed twice at nearly identical positions produces
    // identical value signatures; only one row survives.
    let words = vec![
        word("ロビーインターホン", 40.0, 40.0, 260.0, 64.0),
        word("GX-8DK", 60.0, 90.0, 160.0, 114.0),
        word("電源電圧", 20.0, 150.0, 100.0, 174.0),
        word("DC24V", 110.0, 150.0, 170.0, 174.0),
    ];
    let segments = build_segments_from_words(&words, 1, 12.0, 70.0);
    let mut doubled = segments.clone();
    doubled.extend(segments.clone());
    let rows = build_frame_rows_from_segments(&doubled, None);
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_pages_with_no_label_segments_yield_nothing_without_titles() {
    let words = vec![
        word("1234", 40.0, 40.0, 100.0, 64.0),
        word("5678", 40.0, 90.0, 100.0, 114.0),
    ];
    let segments = build_segments_from_words(&words, 1, 12.0, 70.0);
    let rows = build_frame_rows_from_segments(&segments, None);
    assert!(rows.is_empty());
}
