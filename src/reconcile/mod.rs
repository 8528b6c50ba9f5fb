//! Reconciliation of the two extracted schedules.
//!
//! Consumes the equipment schedule and the panel schedule, joins them by
//! normalized equipment id, and annotates each id with per-field judgments
//! (quantity, capacity, name) plus an aggregate verdict and a
//! human-readable reason. Unresolved fields become 要確認 (review) for a
//! human, never a silent mismatch — an empty cell from the extractors means
//! "could not be read", not "zero".
//!
//! Duplicate physical rows are aggregated per id (quantity counting), not
//! dropped.

use crate::error::Result;
use crate::output::write_delimited;
use crate::text::{compact_text, normalize_text};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Output column order of the reconciliation CSV.
pub const OUTPUT_COLUMNS: [&str; 14] = [
    "総合判定",
    "台数判定",
    "容量判定",
    "名称判定",
    "判定理由",
    "機器ID",
    "機器表 記載名",
    "盤表 記載名",
    "機器表 台数",
    "盤表 台数",
    "機器表 容量(kW)",
    "盤表 容量(kW)",
    "機器表 図面番号",
    "盤表 図面番号",
];

/// Capacity comparison tolerance in kW.
const EPS_KW: f64 = 0.1;

const BLANK_TOKENS: [&str; 4] = ["", "-", "－", "—"];

/// Per-field and aggregate judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Judgment {
    /// Fields agree
    Match,
    /// Fields disagree
    Mismatch,
    /// One side is unreadable or missing; a human must check
    Review,
}

impl Judgment {
    /// Display mark used in the output CSV.
    pub fn mark(self) -> &'static str {
        match self {
            Judgment::Match => "◯",
            Judgment::Mismatch => "✗",
            Judgment::Review => "要確認",
        }
    }
}

/// One row of the equipment schedule, as read from the vector/table side.
#[derive(Debug, Clone, Default)]
pub struct EquipmentRecord {
    /// Equipment id (機器番号)
    pub id: String,
    /// Equipment name
    pub name: String,
    /// Unit count; `None` when unreadable
    pub quantity: Option<f64>,
    /// Consumed power per unit in kW; `None` when unreadable
    pub capacity_kw: Option<f64>,
    /// Drawing number of the source sheet
    pub drawing_number: String,
}

/// One row of the panel schedule, as produced by the grid extractor.
#[derive(Debug, Clone, Default)]
pub struct PanelRecord {
    /// Equipment id (機器番号)
    pub id: String,
    /// Equipment name
    pub name: String,
    /// Capacity in kW; `None` when unreadable
    pub capacity_kw: Option<f64>,
    /// Drawing number of the source sheet
    pub drawing_number: String,
}

/// One reconciled output row.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledRow {
    /// Aggregate verdict
    pub overall: Judgment,
    /// Quantity verdict
    pub quantity: Judgment,
    /// Capacity verdict
    pub capacity: Judgment,
    /// Name verdict
    pub name: Judgment,
    /// Human-readable reason
    pub reason: String,
    /// Normalized equipment id
    pub id: String,
    /// Equipment-side name
    pub equipment_name: String,
    /// Panel-side name
    pub panel_name: String,
    /// Equipment-side quantity
    pub equipment_quantity: String,
    /// Panel-side row count
    pub panel_quantity: String,
    /// Equipment-side capacity
    pub equipment_capacity: String,
    /// Panel-side capacity
    pub panel_capacity: String,
    /// Equipment-side drawing number
    pub equipment_drawing: String,
    /// Panel-side drawing number
    pub panel_drawing: String,
}

/// Normalize an equipment id for joining: NFKC, no spaces, uppercase.
pub fn normalize_key(text: &str) -> String {
    compact_text(text.trim()).to_uppercase()
}

/// Parse a numeric cell; blank markers and unparsable text are `None`.
pub fn parse_number(value: &str) -> Option<f64> {
    let text = normalize_text(value.trim());
    if BLANK_TOKENS.contains(&text.as_str()) {
        return None;
    }
    text.replace(',', "").parse::<f64>().ok()
}

fn format_number(value: Option<f64>) -> String {
    match value {
        Some(v) => {
            let formatted = format!("{v}");
            formatted
        }
        None => String::new(),
    }
}

fn normalize_name_for_compare(text: &str) -> String {
    compact_text(text).to_lowercase()
}

fn evaluate_quantity(equipment: Option<f64>, panel: usize) -> Judgment {
    let Some(equipment) = equipment else {
        return Judgment::Review;
    };
    if (equipment - panel as f64).abs() < f64::EPSILON {
        Judgment::Match
    } else {
        Judgment::Mismatch
    }
}

fn evaluate_capacity(equipment: Option<f64>, panel: Option<f64>) -> Judgment {
    match (equipment, panel) {
        (Some(a), Some(b)) => {
            if (a - b).abs() <= EPS_KW {
                Judgment::Match
            } else {
                Judgment::Mismatch
            }
        }
        _ => Judgment::Review,
    }
}

fn evaluate_name(equipment: &str, panel: &str) -> Judgment {
    let a = normalize_name_for_compare(equipment);
    let b = normalize_name_for_compare(panel);
    if a.is_empty() && b.is_empty() {
        return Judgment::Review;
    }
    if a.is_empty() || b.is_empty() {
        return Judgment::Review;
    }
    if a == b || a.contains(&b) || b.contains(&a) {
        Judgment::Match
    } else {
        Judgment::Mismatch
    }
}

fn aggregate(codes: &[Judgment]) -> Judgment {
    if codes.contains(&Judgment::Mismatch) {
        Judgment::Mismatch
    } else if codes.contains(&Judgment::Review) {
        Judgment::Review
    } else {
        Judgment::Match
    }
}

fn build_reason(quantity: Judgment, capacity: Judgment, name: Judgment) -> String {
    let mut reasons: Vec<&str> = vec![];
    match quantity {
        Judgment::Mismatch => reasons.push("台数不一致"),
        Judgment::Review => reasons.push("台数要確認"),
        Judgment::Match => {}
    }
    match capacity {
        Judgment::Mismatch => reasons.push("容量不一致"),
        Judgment::Review => reasons.push("容量要確認"),
        Judgment::Match => {}
    }
    match name {
        Judgment::Mismatch => reasons.push("名称不一致"),
        Judgment::Review => reasons.push("名称要確認"),
        Judgment::Match => {}
    }
    if reasons.is_empty() {
        "全項目一致".to_string()
    } else {
        reasons.join("・")
    }
}

/// Join the two schedules by normalized id and judge each field.
///
/// Panel rows aggregate by id: the row count becomes the panel-side
/// quantity, and the first non-blank name/capacity/drawing represent the
/// group. Ids present on only one side are emitted as review rows.
pub fn reconcile(
    equipment: &[EquipmentRecord],
    panel: &[PanelRecord],
) -> Vec<ReconciledRow> {
    let mut panel_groups: BTreeMap<String, Vec<&PanelRecord>> = BTreeMap::new();
    for record in panel {
        let key = normalize_key(&record.id);
        if key.is_empty() {
            continue;
        }
        panel_groups.entry(key).or_default().push(record);
    }

    let mut rows: Vec<ReconciledRow> = vec![];
    let mut seen_panel_keys: Vec<String> = vec![];

    for record in equipment {
        let key = normalize_key(&record.id);
        if key.is_empty() {
            continue;
        }
        let group = panel_groups.get(&key);
        let panel_count = group.map(|g| g.len()).unwrap_or(0);
        let panel_name = group
            .and_then(|g| g.iter().find(|r| !r.name.trim().is_empty()))
            .map(|r| r.name.clone())
            .unwrap_or_default();
        let panel_capacity = group.and_then(|g| g.iter().find_map(|r| r.capacity_kw));
        let panel_drawing = group
            .and_then(|g| g.iter().find(|r| !r.drawing_number.trim().is_empty()))
            .map(|r| r.drawing_number.clone())
            .unwrap_or_default();

        let (quantity, capacity, name) = if group.is_some() {
            seen_panel_keys.push(key.clone());
            (
                evaluate_quantity(record.quantity, panel_count),
                evaluate_capacity(record.capacity_kw, panel_capacity),
                evaluate_name(&record.name, &panel_name),
            )
        } else {
            (Judgment::Review, Judgment::Review, Judgment::Review)
        };
        let overall = aggregate(&[quantity, capacity, name]);
        let reason = if group.is_some() {
            build_reason(quantity, capacity, name)
        } else {
            "盤表に該当なし".to_string()
        };

        rows.push(ReconciledRow {
            overall,
            quantity,
            capacity,
            name,
            reason,
            id: key,
            equipment_name: record.name.clone(),
            panel_name,
            equipment_quantity: format_number(record.quantity),
            panel_quantity: if group.is_some() {
                panel_count.to_string()
            } else {
                String::new()
            },
            equipment_capacity: format_number(record.capacity_kw),
            panel_capacity: format_number(panel_capacity),
            equipment_drawing: record.drawing_number.clone(),
            panel_drawing,
        });
    }

    // Panel-only ids still need human review.
    for (key, group) in &panel_groups {
        if seen_panel_keys.contains(key) {
            continue;
        }
        let panel_name = group
            .iter()
            .find(|r| !r.name.trim().is_empty())
            .map(|r| r.name.clone())
            .unwrap_or_default();
        let panel_capacity = group.iter().find_map(|r| r.capacity_kw);
        let panel_drawing = group
            .iter()
            .find(|r| !r.drawing_number.trim().is_empty())
            .map(|r| r.drawing_number.clone())
            .unwrap_or_default();
        rows.push(ReconciledRow {
            overall: Judgment::Review,
            quantity: Judgment::Review,
            capacity: Judgment::Review,
            name: Judgment::Review,
            reason: "機器表に該当なし".to_string(),
            id: key.clone(),
            equipment_name: String::new(),
            panel_name,
            equipment_quantity: String::new(),
            panel_quantity: group.len().to_string(),
            equipment_capacity: String::new(),
            panel_capacity: format_number(panel_capacity),
            equipment_drawing: String::new(),
            panel_drawing,
        });
    }

    rows
}

/// Write reconciled rows as CSV with the fixed column contract.
pub fn write_reconciled_csv(rows: &[ReconciledRow], out_csv: &Path) -> Result<()> {
    write_delimited(
        out_csv,
        &OUTPUT_COLUMNS,
        rows.iter().map(|row| {
            vec![
                row.overall.mark().to_string(),
                row.quantity.mark().to_string(),
                row.capacity.mark().to_string(),
                row.name.mark().to_string(),
                row.reason.clone(),
                row.id.clone(),
                row.equipment_name.clone(),
                row.panel_name.clone(),
                row.equipment_quantity.clone(),
                row.panel_quantity.clone(),
                row.equipment_capacity.clone(),
                row.panel_capacity.clone(),
                row.equipment_drawing.clone(),
                row.panel_drawing.clone(),
            ]
        }),
        true,
    )
}

/// Read panel rows from the grid extractor's CSV output.
pub fn read_panel_csv(path: &Path) -> Result<Vec<PanelRecord>> {
    let data = fs::read(path)?;
    // Strip the optional BOM before header parsing.
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&data).to_vec();
    let mut reader = csv::Reader::from_reader(data.as_slice());
    let headers = reader.headers()?.clone();
    let find = |name: &str| headers.iter().position(|h| compact_text(h) == name);
    let id_idx = find("機器番号");
    let name_idx = find("機器名称").or_else(|| find("名称"));
    let capacity_idx = find("容量(kW)").or_else(|| find("容量(KW)"));
    let drawing_idx = find("図面番号");

    let mut records: Vec<PanelRecord> = vec![];
    for result in reader.records() {
        let record = result.map_err(crate::error::Error::Csv)?;
        let get = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string()
        };
        records.push(PanelRecord {
            id: get(id_idx),
            name: get(name_idx),
            capacity_kw: parse_number(&get(capacity_idx)),
            drawing_number: get(drawing_idx),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equipment(id: &str, name: &str, quantity: f64, capacity: f64) -> EquipmentRecord {
        EquipmentRecord {
            id: id.to_string(),
            name: name.to_string(),
            quantity: Some(quantity),
            capacity_kw: Some(capacity),
            drawing_number: "E-101".to_string(),
        }
    }

    fn panel(id: &str, name: &str, capacity: Option<f64>) -> PanelRecord {
        PanelRecord {
            id: id.to_string(),
            name: name.to_string(),
            capacity_kw: capacity,
            drawing_number: "D-201".to_string(),
        }
    }

    #[test]
    fn test_match_all_fields() {
        let rows = reconcile(
            &[equipment("EF-B2-2", "排風機", 1.0, 0.75)],
            &[panel("EF-B2-2", "排風機", Some(0.75))],
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].overall, Judgment::Match);
        assert_eq!(rows[0].reason, "全項目一致");
    }

    #[test]
    fn test_capacity_within_tolerance() {
        let rows = reconcile(
            &[equipment("EF-1", "排風機", 1.0, 0.75)],
            &[panel("EF-1", "排風機", Some(0.8))],
        );
        assert_eq!(rows[0].capacity, Judgment::Match);
    }

    #[test]
    fn test_capacity_mismatch() {
        let rows = reconcile(
            &[equipment("EF-1", "排風機", 1.0, 0.75)],
            &[panel("EF-1", "排風機", Some(2.2))],
        );
        assert_eq!(rows[0].capacity, Judgment::Mismatch);
        assert_eq!(rows[0].overall, Judgment::Mismatch);
        assert!(rows[0].reason.contains("容量不一致"));
    }

    #[test]
    fn test_blank_capacity_is_review_not_mismatch() {
        let rows = reconcile(
            &[equipment("EF-1", "排風機", 1.0, 0.75)],
            &[panel("EF-1", "排風機", None)],
        );
        assert_eq!(rows[0].capacity, Judgment::Review);
        assert_eq!(rows[0].overall, Judgment::Review);
    }

    #[test]
    fn test_duplicate_panel_rows_counted_as_quantity() {
        let rows = reconcile(
            &[equipment("EF-1", "排風機", 2.0, 0.75)],
            &[
                panel("EF-1", "排風機", Some(0.75)),
                panel("EF-1", "排風機", Some(0.75)),
            ],
        );
        assert_eq!(rows[0].quantity, Judgment::Match);
        assert_eq!(rows[0].panel_quantity, "2");
    }

    #[test]
    fn test_panel_only_id_is_review() {
        let rows = reconcile(&[], &[panel("SF-9", "送風機", Some(2.2))]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].overall, Judgment::Review);
        assert_eq!(rows[0].reason, "機器表に該当なし");
    }

    #[test]
    fn test_name_containment_matches() {
        let rows = reconcile(
            &[equipment("EF-1", "排風機", 1.0, 0.75)],
            &[panel("EF-1", "排風機(B2階)", Some(0.75))],
        );
        assert_eq!(rows[0].name, Judgment::Match);
    }

    #[test]
    fn test_id_normalization_joins_fullwidth() {
        let rows = reconcile(
            &[equipment("ＥＦ－１", "排風機", 1.0, 0.75)],
            &[panel("EF-1", "排風機", Some(0.75))],
        );
        // Fullwidth id normalizes onto the same key.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].overall, Judgment::Match);
    }

    #[test]
    fn test_parse_number_blank_tokens() {
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("1,500"), Some(1500.0));
        assert_eq!(parse_number("0.75"), Some(0.75));
    }

    #[test]
    fn test_judgment_marks() {
        assert_eq!(Judgment::Match.mark(), "◯");
        assert_eq!(Judgment::Mismatch.mark(), "✗");
        assert_eq!(Judgment::Review.mark(), "要確認");
    }
}
