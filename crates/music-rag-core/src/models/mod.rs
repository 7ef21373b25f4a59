//! Data Model
//!
//! Music items, retrieval queries and ranked results.

mod item;
mod query;

pub use item::{MusicItem, MusicMetadata};
pub use query::{
    QueryResult, RetrievalQuery, RetrievalType, DEFAULT_SEMANTIC_WEIGHT, DEFAULT_TOP_K, MAX_TOP_K,
};
