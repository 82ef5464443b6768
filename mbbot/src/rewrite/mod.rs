//! URL rewrite engine
//!
//! A [`RuleTable`] is an ordered list of [`Rule`]s. The first rule whose
//! pattern matches an entity's URL is evaluated and nothing else is tried,
//! so rules must be mutually exclusive by hostname and path shape.
//!
//! Rules never mutate the entity they're given. Every relationship a rule
//! wants to change is reported as a [`RelationshipUpdate`] carrying both the
//! stored and the desired state, which is what the reconciler diffs.

pub mod rules;

pub use rules::{Disambiguation, Rule, Transform};

use crate::models::{Entity, Relationship};
use tracing::debug;

/// A relationship as stored on the server and as a rule wants it to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipUpdate {
    pub original: Relationship,
    pub desired: Relationship,
}

/// Changes a rule wants to make to one entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteResult {
    /// New name (URL) for the entity; equal to the old one if unchanged
    pub rewritten: String,
    /// Existing relationships to edit (others are left alone)
    pub updated: Vec<RelationshipUpdate>,
    /// Entities to create, each carrying relationships with ID 0
    pub new_entities: Vec<Entity>,
    /// https://musicbrainz.org/doc/Edit_Note
    pub edit_note: String,
}

impl RewriteResult {
    /// True if the result would rename an entity currently called `name`
    pub fn renames(&self, name: &str) -> bool {
        !self.rewritten.is_empty() && self.rewritten != name
    }

    fn is_noop(&self, name: &str) -> bool {
        !self.renames(name) && self.updated.is_empty() && self.new_entities.is_empty()
    }
}

/// Ordered registry of rewrite rules
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Rules for the URL maintenance tasks the bot knows about
    pub fn standard() -> Result<Self, regex::Error> {
        Ok(Self::new(rules::standard_rules()?))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First rule whose pattern matches `url`
    pub fn find(&self, url: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.pattern().is_match(url))
    }

    /// Run the first matching rule against `entity`.
    ///
    /// Returns `None` if no rule matches, if the matching rule declines, or
    /// if the rule's result wouldn't change anything.
    pub fn apply(&self, entity: &Entity) -> Option<RewriteResult> {
        let rule = self.find(&entity.name)?;
        let caps = rule.pattern().captures(&entity.name)?;
        debug!(rule = rule.name(), url = %entity.name, "Matched rewrite rule");

        let res = rule.evaluate(&caps, entity)?;
        if res.is_noop(&entity.name) {
            return None;
        }
        Some(res)
    }
}
