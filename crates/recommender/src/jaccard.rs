//! Jaccard distance between book sets.

use std::collections::HashSet;

use bookstore_catalog::Book;

/// Jaccard distance: `1 - |A ∩ B| / |A ∪ B|`.
///
/// Two empty sets have no overlap evidence at all, so their distance is
/// defined as `1.0` (maximally dissimilar) rather than dividing by zero.
pub fn jaccard_distance(a: &HashSet<Book>, b: &HashSet<Book>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 1.0;
    }
    1.0 - (intersection as f64) / (union as f64)
}
