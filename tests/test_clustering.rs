//! Integration tests for the layout clustering primitives.

use proptest::prelude::*;
use zumen_ocr::geometry::Rect;
use zumen_ocr::layout::{cluster_by_y, cluster_x_positions, split_by_x_gap, RowCluster, WordBox};

fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> WordBox {
    WordBox::new(text, Rect::new(x0, y0, x1, y1))
}

#[test]
fn test_rows_form_in_y_order() {
    let words = vec![
        word("bottom", 0.0, 200.0, 40.0, 220.0),
        word("top", 0.0, 10.0, 40.0, 30.0),
        word("middle", 0.0, 100.0, 40.0, 120.0),
    ];
    let clusters = cluster_by_y(&words, 15.0);
    assert_eq!(clusters.len(), 3);
    assert!(clusters[0].row_y < clusters[1].row_y);
    assert!(clusters[1].row_y < clusters[2].row_y);
    assert_eq!(clusters[0].words[0].text, "top");
}

#[test]
fn test_mixed_row_and_gap_splitting() {
    // Two schedule sections sharing a nominal row, far apart horizontally.
    let words = vec![
        word("CT1", 0.0, 100.0, 50.0, 120.0),
        word("LZD-1", 60.0, 100.0, 140.0, 120.0),
        word("TP2", 700.0, 102.0, 750.0, 122.0),
        word("LZD-2", 760.0, 102.0, 840.0, 122.0),
    ];
    let clusters = cluster_by_y(&words, 15.0);
    assert_eq!(clusters.len(), 1);
    let groups = split_by_x_gap(&clusters[0], 100.0);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].words.len(), 2);
    assert_eq!(groups[1].words.len(), 2);
}

#[test]
fn test_x_position_clustering_block_centers() {
    // Three columns of schedule entries at repeating x offsets.
    let xs = [100.0, 98.0, 105.0, 650.0, 648.0, 1200.0, 1210.0];
    let centers = cluster_x_positions(&xs, 220.0);
    assert_eq!(centers.len(), 3);
}

proptest! {
    /// Clustering is a pure function of (words, threshold): any input
    /// permutation produces identical clusters.
    #[test]
    fn prop_cluster_by_y_order_independent(
        mut ys in proptest::collection::vec(0.0f32..2000.0, 1..40),
        threshold in 1.0f32..40.0,
    ) {
        let words: Vec<WordBox> = ys
            .iter()
            .enumerate()
            .map(|(i, &y)| word("w", (i as f32) * 10.0, y, (i as f32) * 10.0 + 8.0, y + 10.0))
            .collect();
        let baseline = cluster_by_y(&words, threshold);

        ys.reverse();
        let mut shuffled = words.clone();
        shuffled.reverse();
        let reversed = cluster_by_y(&shuffled, threshold);

        prop_assert_eq!(baseline.len(), reversed.len());
        for (a, b) in baseline.iter().zip(reversed.iter()) {
            prop_assert_eq!(a.row_y.to_bits(), b.row_y.to_bits());
            prop_assert_eq!(a.words.len(), b.words.len());
        }
    }

    /// Every cluster's reference y stays within its members' cy range.
    #[test]
    fn prop_row_y_within_member_range(
        ys in proptest::collection::vec(0.0f32..2000.0, 1..40),
        threshold in 1.0f32..40.0,
    ) {
        let words: Vec<WordBox> = ys
            .iter()
            .map(|&y| word("w", 0.0, y, 8.0, y + 10.0))
            .collect();
        for cluster in cluster_by_y(&words, threshold) {
            let min_cy = cluster.words.iter().map(|w| w.cy).fold(f32::MAX, f32::min);
            let max_cy = cluster.words.iter().map(|w| w.cy).fold(f32::MIN, f32::max);
            prop_assert!(cluster.row_y >= min_cy - 1e-3);
            prop_assert!(cluster.row_y <= max_cy + 1e-3);
        }
    }

    /// No word is lost or duplicated by clustering.
    #[test]
    fn prop_clustering_preserves_word_count(
        ys in proptest::collection::vec(0.0f32..2000.0, 0..60),
        threshold in 1.0f32..40.0,
    ) {
        let words: Vec<WordBox> = ys
            .iter()
            .map(|&y| word("w", 0.0, y, 8.0, y + 10.0))
            .collect();
        let clusters = cluster_by_y(&words, threshold);
        let total: usize = clusters.iter().map(|c| c.words.len()).sum();
        prop_assert_eq!(total, words.len());
    }
}

#[test]
fn test_split_by_x_gap_single_group_when_tight() {
    let mut cluster = RowCluster::seed(word("a", 0.0, 0.0, 30.0, 10.0));
    cluster.push(word("b", 35.0, 0.0, 60.0, 10.0));
    cluster.push(word("c", 66.0, 0.0, 90.0, 10.0));
    let groups = split_by_x_gap(&cluster, 44.0);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].words.len(), 3);
}
