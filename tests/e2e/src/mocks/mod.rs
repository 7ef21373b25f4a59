mod embedders;
mod fixtures;

pub use embedders::{KeywordAudioEmbedder, KeywordReranker, KeywordTextEmbedder, VOCABULARY};
pub use fixtures::{ScenarioItems, TestDataFactory};
