//! Relationships between a catalog entity and other entities

use super::PartialDate;

/// A typed, dated, directional link from one entity to another.
///
/// Equality is structural; the rewrite rules rely on it to tell whether a
/// transform actually changed anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationship {
    /// Database ID of the link itself (0 if not created yet)
    pub id: u64,
    /// Database ID of the link type, e.g. 978 for an artist streaming page
    pub link_type_id: u32,
    /// Display phrase, e.g. "has a fan page at"
    pub link_phrase: String,
    pub begin_date: PartialDate,
    pub end_date: PartialDate,
    pub ended: bool,
    /// True if the owning entity is the target of the link rather than its source
    pub backward: bool,
    pub target_mbid: String,
    pub target_name: String,
    /// Entity type of the target, e.g. "artist", "release", "recording"
    pub target_type: String,
}

impl Relationship {
    /// True if this relationship doesn't exist on the server yet
    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    /// Describe the relationship as seen from the entity named `owner`,
    /// e.g. "https://example.org/ has an official homepage at[287] Some Artist".
    pub fn describe(&self, owner: &str) -> String {
        let target = if self.target_name.is_empty() {
            self.target_mbid.as_str()
        } else {
            self.target_name.as_str()
        };
        let phrase = format!("{}[{}]", self.link_phrase, self.link_type_id);

        let mut s = if self.backward {
            format!("{} {} {}", target, phrase, owner)
        } else {
            format!("{} {} {}", owner, phrase, target)
        };
        if !self.begin_date.is_empty() {
            s.push_str(&format!(" from {}", self.begin_date));
        }
        if self.ended {
            s.push_str(&format!(" until {}", self.end_date));
        }
        s
    }
}

/// Relationships whose target is of `entity_type`, e.g. "artist".
pub fn filter_by_target_type<'a>(
    rels: &'a [Relationship],
    entity_type: &'a str,
) -> impl Iterator<Item = &'a Relationship> + 'a {
    rels.iter().filter(move |rel| rel.target_type == entity_type)
}

/// True if any relationship targets an entity of `entity_type`.
pub fn has_target_type(rels: &[Relationship], entity_type: &str) -> bool {
    filter_by_target_type(rels, entity_type).next().is_some()
}
