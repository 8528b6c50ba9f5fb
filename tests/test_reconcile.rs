//! Integration test: grid CSV output feeding the reconciliation step.

use std::fs;
use zumen_ocr::extract::grid::OUTPUT_COLUMNS as GRID_COLUMNS;
use zumen_ocr::output::write_delimited;
use zumen_ocr::reconcile::{
    read_panel_csv, reconcile, write_reconciled_csv, EquipmentRecord, Judgment,
};

#[test]
fn test_grid_csv_roundtrip_into_reconciliation() {
    let dir = tempfile::tempdir().unwrap();
    let panel_csv = dir.path().join("panel.csv");
    write_delimited(
        &panel_csv,
        &GRID_COLUMNS,
        vec![
            vec![
                "EF-B2-2".to_string(),
                "排風機".to_string(),
                "200".to_string(),
                "0.75".to_string(),
                "D-201".to_string(),
            ],
            vec![
                "EF-B2-2".to_string(),
                "排風機".to_string(),
                "200".to_string(),
                "0.75".to_string(),
                "D-201".to_string(),
            ],
            vec![
                "SF-1".to_string(),
                "送風機".to_string(),
                "200".to_string(),
                "2.2".to_string(),
                "D-201".to_string(),
            ],
        ],
        false,
    )
    .unwrap();

    let panel = read_panel_csv(&panel_csv).unwrap();
    assert_eq!(panel.len(), 3);
    assert_eq!(panel[0].id, "EF-B2-2");
    assert_eq!(panel[0].capacity_kw, Some(0.75));

    let equipment = vec![
        EquipmentRecord {
            id: "EF-B2-2".to_string(),
            name: "排風機".to_string(),
            quantity: Some(2.0),
            capacity_kw: Some(0.75),
            drawing_number: "E-101".to_string(),
        },
        EquipmentRecord {
            id: "SF-1".to_string(),
            name: "送風機".to_string(),
            quantity: Some(1.0),
            capacity_kw: Some(3.7),
            drawing_number: "E-101".to_string(),
        },
    ];

    let rows = reconcile(&equipment, &panel);
    assert_eq!(rows.len(), 2);

    // Duplicate panel rows count as quantity; physical duplicates are valid.
    assert_eq!(rows[0].overall, Judgment::Match);
    assert_eq!(rows[0].panel_quantity, "2");

    // 3.7 vs 2.2 exceeds the 0.1 kW tolerance.
    assert_eq!(rows[1].capacity, Judgment::Mismatch);
    assert_eq!(rows[1].overall, Judgment::Mismatch);

    let out_csv = dir.path().join("reconciled.csv");
    write_reconciled_csv(&rows, &out_csv).unwrap();
    let bytes = fs::read(&out_csv).unwrap();
    // BOM for spreadsheet consumers.
    assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    assert!(text.starts_with("総合判定,"));
    assert!(text.contains('◯'));
    assert!(text.contains('✗'));
}

#[test]
fn test_read_panel_csv_with_bom() {
    let dir = tempfile::tempdir().unwrap();
    let panel_csv = dir.path().join("panel_bom.csv");
    write_delimited(
        &panel_csv,
        &GRID_COLUMNS,
        vec![vec![
            "EF-1".to_string(),
            "排風機".to_string(),
            "200".to_string(),
            "0.4".to_string(),
            "D-1".to_string(),
        ]],
        true,
    )
    .unwrap();
    let panel = read_panel_csv(&panel_csv).unwrap();
    assert_eq!(panel.len(), 1);
    assert_eq!(panel[0].id, "EF-1");
    assert_eq!(panel[0].drawing_number, "D-1");
}
