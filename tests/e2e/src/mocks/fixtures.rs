//! Test Data Factory
//!
//! Music items with metadata chosen so the keyword embedders produce
//! predictable neighbourhoods:
//! - a jazz cluster (piano, calm)
//! - a rock cluster (guitar, energetic)
//! - a few outliers in other genres

use music_rag_core::{MusicItem, MusicMetadata};

/// Factory for creating test items
pub struct TestDataFactory;

/// Items used by the pass-interaction scenarios
#[derive(Debug, Clone)]
pub struct ScenarioItems {
    /// Matches both the query text and the filter
    pub both: MusicItem,
    /// Matches the query text but not the filter
    pub text_only: MusicItem,
    /// Matches the filter but barely the query text
    pub filter_only: MusicItem,
}

impl TestDataFactory {
    /// Build an item with the fields retrieval cares about
    pub fn item(
        id: &str,
        title: &str,
        artist: &str,
        genre: &str,
        moods: &[&str],
        origin: Option<&str>,
        tempo: Option<f32>,
    ) -> MusicItem {
        MusicItem::new(id, title, artist).with_metadata(MusicMetadata {
            genre: Some(genre.to_string()),
            mood: moods.iter().map(|m| m.to_string()).collect(),
            cultural_origin: origin.map(str::to_string),
            tempo,
            ..Default::default()
        })
    }

    /// A small, diverse catalog of ten items
    pub fn catalog() -> Vec<MusicItem> {
        vec![
            Self::item("jazz-1", "Piano Nocturne", "Trio Lumen", "Jazz", &["calm"], Some("American"), Some(72.0))
                .with_description("Slow piano jazz ballad")
                .with_audio_path("audio/piano_jazz_calm.wav"),
            Self::item("jazz-2", "Blue Hour", "Trio Lumen", "Jazz", &["calm", "melancholic"], Some("American"), Some(64.0))
                .with_description("Brushed drums and piano"),
            Self::item("jazz-3", "Late Set", "Marta Quinn", "Jazz", &["energetic"], Some("French"), Some(140.0))
                .with_description("Uptempo jazz with piano solos"),
            Self::item("rock-1", "Overdrive", "Static Kings", "Rock", &["energetic"], Some("British"), Some(150.0))
                .with_description("Distorted guitar and drums")
                .with_audio_path("audio/guitar_rock_energetic.wav"),
            Self::item("rock-2", "Slow Burn", "Static Kings", "Rock", &["melancholic"], Some("British"), Some(80.0))
                .with_description("Guitar ballad"),
            Self::item("blues-1", "Delta Morning", "R. Holloway", "Blues", &["melancholic"], Some("American"), Some(90.0))
                .with_description("Acoustic guitar blues"),
            Self::item("folk-1", "River Song", "Anna Vell", "Folk", &["calm"], Some("Irish"), Some(96.0))
                .with_description("Fingerpicked guitar folk"),
            Self::item("elec-1", "Neon Grid", "Pulse Unit", "Electronic", &["energetic"], Some("German"), Some(128.0))
                .with_description("Synth and drums")
                .with_audio_path("audio/synth_electronic_energetic.wav"),
            Self::item("elec-2", "Soft Circuit", "Pulse Unit", "Electronic", &["calm"], Some("German"), Some(100.0))
                .with_description("Ambient synth pads"),
            Self::item("mixed-1", "Crossroads", "Various", "Folk", &["calm"], Some("American"), None)
                .with_description("Piano and guitar duet"),
        ]
    }

    /// Three items that isolate how the broad and targeted passes interact
    /// for the query "calm piano jazz" filtered to genre Blues
    pub fn pass_scenario() -> ScenarioItems {
        ScenarioItems {
            both: Self::item("both", "Calm Piano Jazz Blues", "A", "Blues", &["calm"], None, None)
                .with_description("calm piano jazz"),
            text_only: Self::item("text-only", "Calm Piano Jazz", "B", "Jazz", &["calm"], None, None)
                .with_description("calm piano jazz"),
            filter_only: Self::item("filter-only", "Delta", "C", "Blues", &[], None, None)
                .with_description("drums"),
        }
    }

    /// `count` items cycling through the fixture genres
    pub fn batch(count: usize) -> Vec<MusicItem> {
        const GENRES: [(&str, &str); 5] = [
            ("Jazz", "piano"),
            ("Rock", "guitar"),
            ("Blues", "guitar"),
            ("Folk", "guitar"),
            ("Electronic", "synth"),
        ];
        (0..count)
            .map(|i| {
                let (genre, instrument) = GENRES[i % GENRES.len()];
                let mood = if i % 2 == 0 { "calm" } else { "energetic" };
                Self::item(
                    &format!("batch-{i:04}"),
                    &format!("Track {i}"),
                    &format!("Artist {}", i % 7),
                    genre,
                    &[mood],
                    None,
                    Some(60.0 + (i % 100) as f32),
                )
                .with_description(format!("{} {}", instrument, genre.to_lowercase()))
            })
            .collect()
    }
}
