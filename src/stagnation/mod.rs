//! Stagnation detection.
//!
//! This module recognizes when recent loop outputs have become repetitive:
//!
//! - [`similarity`] - Jaccard similarity over word-token sets
//! - [`detector`] - Bounded summary history and trailing-run detection

pub mod detector;
pub mod similarity;

pub use detector::StagnationDetector;
pub use similarity::{jaccard, similarity, tokenize};
