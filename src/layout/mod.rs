//! Layout analysis primitives for OCR word boxes.
//!
//! - Word boxes and row clusters (the atomic units)
//! - Greedy y-sweep row clustering with running-mean reference
//! - Horizontal gap splitting and 1-D x-position block clustering

pub mod clustering;
pub mod word_box;

pub use clustering::{cluster_by_y, cluster_x_positions, nearest_center_index, split_by_x_gap};
pub use word_box::{RowCluster, WordBox};
