//! Row and block clustering over scattered OCR word boxes.
//!
//! Scanned schedule tables carry no reliable grid, so table structure is
//! reconstructed from word positions alone: a greedy vertical sweep groups
//! words into rows, horizontal gap splitting separates independent segments
//! that OCR merged into one nominal row, and 1-D x-position clustering
//! recovers the repeating column offsets ("blocks") of schedules without a
//! visible header.

use crate::layout::word_box::{RowCluster, WordBox};

/// Group words into visual rows by vertical proximity.
///
/// Words are sorted by center y and swept once, top to bottom. A word joins
/// the current cluster when `|word.cy - cluster.row_y| <= threshold`, where
/// `row_y` is the cluster's running mean; otherwise it starts a new cluster.
///
/// This is deliberately a greedy single pass: a row is never split
/// retroactively even if a later word would have fit a different grouping
/// better. The result depends only on `(words, threshold)`, not on input
/// order.
///
/// # Arguments
///
/// * `words` - unordered word boxes from one page or crop
/// * `threshold` - max vertical distance (px) for two words to share a row
///
/// # Examples
///
/// ```
/// use zumen_ocr::geometry::Rect;
/// use zumen_ocr::layout::{cluster_by_y, WordBox};
///
/// let words = vec![
///     WordBox::new("A", Rect::new(0.0, 0.0, 10.0, 10.0)),
///     WordBox::new("B", Rect::new(20.0, 2.0, 30.0, 12.0)),
///     WordBox::new("C", Rect::new(0.0, 50.0, 10.0, 60.0)),
/// ];
/// let rows = cluster_by_y(&words, 8.0);
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0].words.len(), 2);
/// ```
pub fn cluster_by_y(words: &[WordBox], threshold: f32) -> Vec<RowCluster> {
    if words.is_empty() {
        return vec![];
    }
    let mut sorted: Vec<WordBox> = words.to_vec();
    sorted.sort_by(|a, b| a.cy.total_cmp(&b.cy));

    let mut iter = sorted.into_iter();
    let first = iter.next().expect("non-empty after guard");
    let mut clusters = vec![RowCluster::seed(first)];
    for word in iter {
        let last = clusters.last_mut().expect("at least one cluster");
        if (word.cy - last.row_y).abs() <= threshold {
            last.push(word);
        } else {
            clusters.push(RowCluster::seed(word));
        }
    }
    clusters
}

/// Split one row cluster into sub-groups by horizontal gap.
///
/// Members are sorted by center x; a new group starts whenever the gap
/// between the right edge of one word and the left edge of the next exceeds
/// `max_gap`. Each group's `row_y` is the plain mean of member centers.
///
/// Used both to separate side-by-side table sections that OCR merged into
/// one nominal row, and to separate a label from its value on the same row.
pub fn split_by_x_gap(cluster: &RowCluster, max_gap: f32) -> Vec<RowCluster> {
    let words = cluster.words_by_x();
    if words.is_empty() {
        return vec![];
    }

    let mut groups: Vec<Vec<WordBox>> = vec![vec![words[0].clone()]];
    let mut prev = words[0];
    for word in &words[1..] {
        let gap = word.bbox.x0 - prev.bbox.x1;
        if gap > max_gap {
            groups.push(vec![(*word).clone()]);
        } else {
            groups.last_mut().expect("seeded").push((*word).clone());
        }
        prev = word;
    }

    groups
        .into_iter()
        .map(|group| {
            let row_y = group.iter().map(|w| w.cy).sum::<f32>() / group.len() as f32;
            RowCluster { row_y, words: group }
        })
        .collect()
}

/// Cluster scalar x positions with a fixed tolerance, returning cluster
/// means.
///
/// Greedy 1-D chain clustering: values are sorted and a value joins the
/// current cluster when it lies within `tolerance` of the cluster's most
/// recent member. The means are the inferred block centers of a schedule
/// whose only column signal is that entries repeat at consistent x offsets
/// down the page.
pub fn cluster_x_positions(values: &[f32], tolerance: f32) -> Vec<f32> {
    if values.is_empty() {
        return vec![];
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(f32::total_cmp);

    let mut clusters: Vec<Vec<f32>> = vec![vec![sorted[0]]];
    for &value in &sorted[1..] {
        let last = clusters.last_mut().expect("seeded");
        if (value - *last.last().expect("non-empty")).abs() <= tolerance {
            last.push(value);
        } else {
            clusters.push(vec![value]);
        }
    }
    clusters
        .iter()
        .map(|cluster| cluster.iter().sum::<f32>() / cluster.len() as f32)
        .collect()
}

/// Index of the center nearest to `x`, or `None` when `centers` is empty.
pub fn nearest_center_index(x: f32, centers: &[f32]) -> Option<usize> {
    centers
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (x - **a).abs().total_cmp(&(x - **b).abs()))
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> WordBox {
        WordBox::new(text, Rect::new(x0, y0, x1, y1))
    }

    #[test]
    fn test_cluster_by_y_empty() {
        assert!(cluster_by_y(&[], 10.0).is_empty());
    }

    #[test]
    fn test_cluster_by_y_single_word() {
        let words = vec![word("A", 0.0, 0.0, 10.0, 10.0)];
        let clusters = cluster_by_y(&words, 10.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].words.len(), 1);
    }

    #[test]
    fn test_cluster_by_y_input_order_irrelevant() {
        let a = word("a", 0.0, 0.0, 10.0, 10.0);
        let b = word("b", 20.0, 4.0, 30.0, 14.0);
        let c = word("c", 0.0, 60.0, 10.0, 70.0);

        let forward = cluster_by_y(&[a.clone(), b.clone(), c.clone()], 10.0);
        let backward = cluster_by_y(&[c, b, a], 10.0);
        assert_eq!(forward.len(), backward.len());
        for (f, r) in forward.iter().zip(backward.iter()) {
            assert_eq!(f.row_y, r.row_y);
            assert_eq!(f.words.len(), r.words.len());
        }
    }

    #[test]
    fn test_row_y_within_member_range() {
        let words = vec![
            word("a", 0.0, 0.0, 10.0, 10.0),   // cy=5
            word("b", 20.0, 6.0, 30.0, 16.0),  // cy=11
            word("c", 40.0, 10.0, 50.0, 20.0), // cy=15
        ];
        let clusters = cluster_by_y(&words, 12.0);
        for cluster in &clusters {
            let min_cy = cluster.words.iter().map(|w| w.cy).fold(f32::MAX, f32::min);
            let max_cy = cluster.words.iter().map(|w| w.cy).fold(f32::MIN, f32::max);
            assert!(cluster.row_y >= min_cy && cluster.row_y <= max_cy);
        }
    }

    #[test]
    fn test_running_mean_keeps_drifting_row_together() {
        // Five words whose cy creeps upward by 6px each; a fixed reference at
        // the first word's cy would reject the fifth, the running mean keeps
        // them in one row.
        let words: Vec<WordBox> = (0..5)
            .map(|i| {
                let y0 = (i as f32) * 6.0;
                word("w", i as f32 * 20.0, y0, i as f32 * 20.0 + 10.0, y0 + 10.0)
            })
            .collect();
        let clusters = cluster_by_y(&words, 10.0);
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_split_by_x_gap() {
        let mut cluster = RowCluster::seed(word("a", 0.0, 0.0, 30.0, 10.0));
        cluster.push(word("b", 34.0, 0.0, 60.0, 10.0)); // gap 4
        cluster.push(word("c", 200.0, 0.0, 230.0, 10.0)); // gap 140
        let groups = split_by_x_gap(&cluster, 44.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].words.len(), 2);
        assert_eq!(groups[1].words.len(), 1);
    }

    #[test]
    fn test_cluster_x_positions_means() {
        let centers = cluster_x_positions(&[100.0, 110.0, 105.0, 500.0, 510.0], 50.0);
        assert_eq!(centers.len(), 2);
        assert!((centers[0] - 105.0).abs() < 0.01);
        assert!((centers[1] - 505.0).abs() < 0.01);
    }

    #[test]
    fn test_cluster_x_positions_empty() {
        assert!(cluster_x_positions(&[], 10.0).is_empty());
    }

    #[test]
    fn test_nearest_center_index() {
        let centers = [100.0, 400.0, 800.0];
        assert_eq!(nearest_center_index(120.0, &centers), Some(0));
        assert_eq!(nearest_center_index(390.0, &centers), Some(1));
        assert_eq!(nearest_center_index(0.0, &[]), None);
    }
}
