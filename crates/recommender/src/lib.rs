//! `bookstore-recommender`
//!
//! **Responsibility:** peer-similarity book suggestions.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It must not depend on the cart/inventory aggregates.
//! - It must not mutate domain state.
//! - It consumes book-set **snapshots** and emits suggestions, nothing else.
//!
//! The batch strategy recomputes all pairwise distances per call, which is
//! fine at storefront scale; the [`SimilarityRecommender`] trait is the seam
//! for swapping in an indexed or approximate strategy later.

pub mod jaccard;
pub mod recommend;
pub mod snapshot;

pub use jaccard::jaccard_distance;
pub use recommend::{JaccardRecommender, SimilarityRecommender};
pub use snapshot::{BookSetSource, UserBookSet};
