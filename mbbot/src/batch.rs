//! Edit request builders and response interpretation
//!
//! Two request shapes exist: a single-entity edit page (`/<type>/<mbid>/edit`)
//! taking `edit-<type>.*` fields, and the relationship editor, which takes any
//! number of relationship operations keyed by ordinal index.

use crate::error::{EditError, EditResult};
use crate::models::Entity;
use crate::reconcile::{bool_param, FieldUpdateSet};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Form-encoded request body
pub type FormFields = BTreeMap<String, String>;

pub const RELATIONSHIP_EDITOR_PATH: &str = "/relationship-editor";

/// `response` value the relationship editor reports for a successful operation
const RESPONSE_OK: i64 = 1;

/// Edit of an entity's own fields via its edit page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    entity_type: String,
    mbid: String,
    fields: FormFields,
}

impl FieldEdit {
    pub fn new(entity_type: impl Into<String>, mbid: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            mbid: mbid.into(),
            fields: FormFields::new(),
        }
    }

    /// Rename `entity`. URLs are renamed through their `url` field.
    pub fn rename(entity: &Entity, new_name: &str) -> Self {
        let field = if entity.is_url() { "url" } else { "name" };
        let mut edit = Self::new(entity.entity_type.clone(), entity.mbid.clone());
        edit.set(field, new_name);
        edit
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) -> &mut Self {
        let key = self.key(field);
        self.fields.insert(key, value.into());
        self
    }

    pub fn path(&self) -> String {
        format!("/{}/{}/edit", self.entity_type, self.mbid)
    }

    /// Finish the request body with the shared edit options.
    pub fn into_form(mut self, edit_note: &str, make_votable: bool) -> FormFields {
        let note_key = self.key("edit_note");
        self.fields.insert(note_key, edit_note.to_string());
        if make_votable {
            let key = self.key("make_votable");
            self.fields.insert(key, bool_param(true).to_string());
        }
        self.fields
    }

    fn key(&self, field: &str) -> String {
        format!("edit-{}.{}", self.entity_type, field)
    }
}

/// Operations for a single relationship editor submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipBatch {
    fields: FormFields,
    len: usize,
}

impl RelationshipBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `update` at the next index.
    pub fn push(&mut self, update: &FieldUpdateSet) {
        update.render_into(self.len, &mut self.fields);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_form(mut self, edit_note: &str, make_votable: bool) -> FormFields {
        self.fields
            .insert("rel-editor.edit_note".to_string(), edit_note.to_string());
        if make_votable {
            self.fields.insert(
                "rel-editor.make_votable".to_string(),
                bool_param(true).to_string(),
            );
        }
        self.fields
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    edits: Vec<BatchOutcome>,
}

#[derive(Debug, Deserialize)]
struct BatchOutcome {
    #[serde(default)]
    edit_type: i64,
    #[serde(default)]
    response: i64,
    /// ID of a created relationship; 0 for edits of existing ones
    #[serde(default)]
    relationship_id: u64,
}

/// Interpret a relationship editor response.
///
/// Returns one relationship ID per operation. The response doesn't include
/// edit IDs, and edits of existing relationships report 0.
pub fn parse_batch_response(body: &str) -> EditResult<Vec<u64>> {
    let resp: BatchResponse = serde_json::from_str(body)
        .map_err(|e| EditError::Scrape(format!("relationship editor response: {}", e)))?;

    let mut completed = Vec::with_capacity(resp.edits.len());
    for (index, outcome) in resp.edits.into_iter().enumerate() {
        if outcome.response != RESPONSE_OK {
            return Err(EditError::PartialBatchFailure {
                index,
                edit_type: outcome.edit_type,
                code: outcome.response,
                completed,
            });
        }
        completed.push(outcome.relationship_id);
    }
    Ok(completed)
}

/// Matches `<server>/edit/<id>` links in edit page responses
pub fn edit_id_regex(server_url: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"{}/edit/(\d+)\b", regex::escape(server_url)))
}

/// First edit ID linked from `body`
pub fn find_edit_id(re: &Regex, body: &str) -> Option<u64> {
    re.captures(body)?.get(1)?.as_str().parse().ok()
}
