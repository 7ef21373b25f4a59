//! End-to-end test support for Music RAG
//!
//! - `harness`: isolated catalog + store instances wired into an engine
//! - `mocks`: deterministic embedders, a keyword reranker and item fixtures

pub mod harness;
pub mod mocks;
