//! Catalog entities

use super::Relationship;

/// Entity type tags used by the MusicBrainz server
pub mod entity_type {
    pub const ARTIST: &str = "artist";
    pub const RECORDING: &str = "recording";
    pub const RELEASE: &str = "release";
    pub const URL: &str = "url";
}

/// An entity in the database along with its relationships
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    /// MusicBrainz ID (empty for entities that don't exist yet)
    pub mbid: String,
    /// Entity type tag, e.g. "url"
    pub entity_type: String,
    /// Display name, or the URL itself for URL entities
    pub name: String,
    pub relationships: Vec<Relationship>,
}

impl Entity {
    /// A URL entity that hasn't been created on the server yet
    pub fn new_url(url: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type::URL.to_string(),
            name: url.into(),
            ..Default::default()
        }
    }

    pub fn is_url(&self) -> bool {
        self.entity_type == entity_type::URL
    }
}
