//! Music Item
//!
//! A track or performance in the catalogue together with its descriptive
//! metadata and, once indexed, its cached embeddings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::{MetadataRecord, MetadataValue};

// ============================================================================
// METADATA
// ============================================================================

/// Descriptive metadata. Every field is optional; missing fields never match
/// a filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicMetadata {
    pub genre: Option<String>,
    pub subgenre: Option<String>,
    pub cultural_origin: Option<String>,
    /// Beats per minute
    pub tempo: Option<f32>,
    pub key: Option<String>,
    pub time_signature: Option<String>,
    pub instrumentation: Vec<String>,
    pub mood: Vec<String>,
    pub era: Option<String>,
    /// Length in seconds
    pub duration: Option<f32>,
    pub is_live_performance: bool,
    pub venue: Option<String>,
    pub audience_response: Option<String>,
    pub lyrics: Option<String>,
}

impl MusicMetadata {
    /// Flatten into the record kept by the vector store.
    ///
    /// Absent optional fields and empty lists are omitted rather than stored
    /// as null.
    pub fn to_record(&self) -> MetadataRecord {
        let mut record = MetadataRecord::new();

        let texts = [
            ("genre", &self.genre),
            ("subgenre", &self.subgenre),
            ("cultural_origin", &self.cultural_origin),
            ("key", &self.key),
            ("time_signature", &self.time_signature),
            ("era", &self.era),
            ("venue", &self.venue),
            ("audience_response", &self.audience_response),
            ("lyrics", &self.lyrics),
        ];
        for (field, value) in texts {
            if let Some(v) = value {
                record.insert(field.to_string(), MetadataValue::Text(v.clone()));
            }
        }

        if let Some(tempo) = self.tempo {
            record.insert("tempo".to_string(), MetadataValue::Number(tempo as f64));
        }
        if let Some(duration) = self.duration {
            record.insert("duration".to_string(), MetadataValue::Number(duration as f64));
        }

        if !self.instrumentation.is_empty() {
            record.insert(
                "instrumentation".to_string(),
                MetadataValue::List(self.instrumentation.clone()),
            );
        }
        if !self.mood.is_empty() {
            record.insert("mood".to_string(), MetadataValue::List(self.mood.clone()));
        }

        record.insert(
            "is_live_performance".to_string(),
            MetadataValue::Bool(self.is_live_performance),
        );

        record
    }
}

// ============================================================================
// MUSIC ITEM
// ============================================================================

/// A catalogue entry. Re-indexing replaces an item; it is never mutated in
/// place once embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicItem {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
    #[serde(default)]
    pub metadata: MusicMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_embedding: Option<Vec<f32>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl MusicItem {
    /// Create an item with empty metadata
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            description: None,
            audio_path: None,
            metadata: MusicMetadata::default(),
            text_embedding: None,
            audio_embedding: None,
            created_at: Utc::now(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the audio file path
    pub fn with_audio_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_path = Some(path.into());
        self
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: MusicMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_omits_absent_fields() {
        let meta = MusicMetadata {
            genre: Some("Jazz".to_string()),
            mood: vec!["calm".to_string()],
            ..Default::default()
        };
        let record = meta.to_record();

        assert_eq!(record.get("genre"), Some(&MetadataValue::Text("Jazz".into())));
        assert_eq!(
            record.get("mood"),
            Some(&MetadataValue::List(vec!["calm".to_string()]))
        );
        assert!(!record.contains_key("subgenre"));
        assert!(!record.contains_key("instrumentation"));
        assert!(!record.contains_key("tempo"));
        assert_eq!(
            record.get("is_live_performance"),
            Some(&MetadataValue::Bool(false))
        );
    }

    #[test]
    fn test_item_deserializes_with_defaults() {
        let json = r#"{"id": "a", "title": "So What", "artist": "Miles Davis",
                       "metadata": {"genre": "Jazz", "tempo": 136}}"#;
        let item: MusicItem = serde_json::from_str(json).unwrap();

        assert_eq!(item.id, "a");
        assert!(item.description.is_none());
        assert_eq!(item.metadata.genre.as_deref(), Some("Jazz"));
        assert_eq!(item.metadata.tempo, Some(136.0));
        assert!(!item.metadata.is_live_performance);
        assert!(item.metadata.mood.is_empty());
    }

    #[test]
    fn test_builder() {
        let item = MusicItem::new("x", "Title", "Artist")
            .with_description("desc")
            .with_audio_path("/tmp/x.wav");
        assert_eq!(item.description.as_deref(), Some("desc"));
        assert_eq!(item.audio_path, Some(PathBuf::from("/tmp/x.wav")));
    }
}
