//! Relationship reconciler
//!
//! Diffs a stored relationship against the state a rewrite rule wants and
//! produces the smallest set of relationship-editor fields that gets there.
//! The field names and value encodings are those accepted by the server's
//! `/relationship-editor` endpoint.

use crate::batch::FormFields;
use crate::error::ReconcileError;
use crate::models::{entity_type, Entity, PartialDate, Relationship};

/// Whether a relationship is created or edited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Add,
    /// `link_type` is the relationship's resulting link type, which the
    /// server wants on every edit even when it isn't changing.
    Edit { id: u64, link_type: u32 },
}

/// How a relationship endpoint is identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Gid(String),
    Url(String),
}

/// One end of a new relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySlot {
    pub entity_type: String,
    pub entity: EntityRef,
}

/// Minimal field-level delta between two relationship states.
///
/// `None` means the field is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdateSet {
    pub mode: EditMode,
    pub link_type: Option<u32>,
    pub begin_date: Option<PartialDate>,
    pub end_date: Option<PartialDate>,
    pub ended: Option<bool>,
    /// Endpoints in server order; only set when adding
    pub entities: Option<[EntitySlot; 2]>,
}

/// Compute the update that turns `original` into `desired`, where both
/// belong to `owner`. A missing `original` means `desired` is to be created.
pub fn diff(
    owner: &Entity,
    original: Option<&Relationship>,
    desired: &Relationship,
) -> Result<FieldUpdateSet, ReconcileError> {
    match original {
        None => diff_new(owner, desired),
        Some(orig) => diff_existing(orig, desired),
    }
}

fn diff_new(owner: &Entity, desired: &Relationship) -> Result<FieldUpdateSet, ReconcileError> {
    if !desired.is_new() {
        return Err(ReconcileError::InvalidState(desired.id));
    }

    // The server orders a relationship's endpoints by type name, so e.g. an
    // artist-url link is [artist, url] but a url-work link is [url, work].
    let owner_type = owner.entity_type.as_str();
    let target_type = desired.target_type.as_str();
    if (desired.backward && target_type > owner_type)
        || (!desired.backward && target_type < owner_type)
    {
        return Err(ReconcileError::Direction(desired.describe(&owner.name)));
    }

    let owner_slot = EntitySlot {
        entity_type: owner.entity_type.clone(),
        entity: if owner.is_url() {
            EntityRef::Url(owner.name.clone())
        } else {
            EntityRef::Gid(owner.mbid.clone())
        },
    };
    let target_slot = EntitySlot {
        entity_type: desired.target_type.clone(),
        entity: EntityRef::Gid(desired.target_mbid.clone()),
    };
    let entities = if desired.backward {
        [target_slot, owner_slot]
    } else {
        [owner_slot, target_slot]
    };

    Ok(FieldUpdateSet {
        mode: EditMode::Add,
        link_type: Some(desired.link_type_id),
        begin_date: Some(desired.begin_date).filter(|d| !d.is_empty()),
        end_date: Some(desired.end_date).filter(|d| !d.is_empty()),
        ended: desired.ended.then_some(true),
        entities: Some(entities),
    })
}

fn diff_existing(
    orig: &Relationship,
    desired: &Relationship,
) -> Result<FieldUpdateSet, ReconcileError> {
    if orig == desired {
        return Err(ReconcileError::NoChange(orig.id));
    }
    let unsupported = |reason: &str| ReconcileError::Unsupported {
        id: orig.id,
        reason: reason.to_string(),
    };

    if desired.id != orig.id {
        return Err(unsupported("relationship ID changed"));
    }
    if desired.target_mbid != orig.target_mbid
        || desired.target_type != orig.target_type
        || desired.backward != orig.backward
    {
        return Err(unsupported("endpoints can't be changed"));
    }
    if (desired.begin_date.is_empty() && !orig.begin_date.is_empty())
        || (desired.end_date.is_empty() && !orig.end_date.is_empty())
    {
        return Err(unsupported("dates can't be cleared"));
    }

    let changed = |date: PartialDate, old: PartialDate| {
        Some(date).filter(|d| !d.is_empty() && *d != old)
    };
    let update = FieldUpdateSet {
        mode: EditMode::Edit {
            id: orig.id,
            link_type: desired.link_type_id,
        },
        link_type: Some(desired.link_type_id).filter(|lt| *lt != orig.link_type_id),
        begin_date: changed(desired.begin_date, orig.begin_date),
        end_date: changed(desired.end_date, orig.end_date),
        ended: Some(desired.ended).filter(|e| *e != orig.ended),
        entities: None,
    };
    if update.is_empty() {
        return Err(unsupported("no editable field differs"));
    }
    Ok(update)
}

impl FieldUpdateSet {
    /// True if no relationship field would be sent
    pub fn is_empty(&self) -> bool {
        self.link_type.is_none()
            && self.begin_date.is_none()
            && self.end_date.is_none()
            && self.ended.is_none()
            && self.entities.is_none()
    }

    /// Replay the update on top of `base`.
    ///
    /// For edits `base` should be the original relationship. For additions
    /// the target endpoint and direction are filled in as well, so applying
    /// to `Relationship::default()` yields the relationship that the server
    /// creates (minus display-only fields).
    pub fn apply(&self, base: &Relationship) -> Relationship {
        let mut rel = base.clone();
        if let EditMode::Edit { id, link_type } = self.mode {
            rel.id = id;
            rel.link_type_id = link_type;
        }
        if let Some(lt) = self.link_type {
            rel.link_type_id = lt;
        }
        if let Some(d) = self.begin_date {
            rel.begin_date = d;
        }
        if let Some(d) = self.end_date {
            rel.end_date = d;
        }
        if let Some(ended) = self.ended {
            rel.ended = ended;
        }
        if let Some([first, second]) = &self.entities {
            // The target is whichever endpoint isn't a URL (or the second one
            // for URL-URL links).
            let (target, backward) = if first.entity_type == entity_type::URL {
                (second, false)
            } else {
                (first, true)
            };
            rel.backward = backward;
            rel.target_type = target.entity_type.clone();
            if let EntityRef::Gid(gid) = &target.entity {
                rel.target_mbid = gid.clone();
            }
        }
        rel
    }

    /// Add this update's `rel-editor.rels.<index>.*` fields to `form`.
    pub fn render_into(&self, index: usize, form: &mut FormFields) {
        let prefix = format!("rel-editor.rels.{}.", index);
        let mut set = |key: &str, value: String| {
            form.insert(format!("{}{}", prefix, key), value);
        };

        match self.mode {
            EditMode::Add => set("action", "add".to_string()),
            EditMode::Edit { id, link_type } => {
                set("action", "edit".to_string());
                set("id", id.to_string());
                set("link_type", link_type.to_string());
            }
        }
        if let Some(lt) = self.link_type {
            set("link_type", lt.to_string());
        }
        for (name, date) in [("begin_date", self.begin_date), ("end_date", self.end_date)] {
            if let Some(d) = date {
                set(&format!("period.{}.year", name), non_zero(d.year.into()));
                set(&format!("period.{}.month", name), non_zero(d.month.into()));
                set(&format!("period.{}.day", name), non_zero(d.day.into()));
            }
        }
        if let Some(ended) = self.ended {
            set("period.ended", bool_param(ended).to_string());
        }
        if let Some(slots) = &self.entities {
            for (i, slot) in slots.iter().enumerate() {
                let (key, value) = match &slot.entity {
                    EntityRef::Gid(gid) => ("gid", gid.clone()),
                    EntityRef::Url(url) => ("url", url.clone()),
                };
                set(&format!("entity.{}.{}", i, key), value);
                set(&format!("entity.{}.type", i), slot.entity_type.clone());
            }
        }
    }
}

/// Unknown date components are sent as empty strings.
fn non_zero(v: u32) -> String {
    if v == 0 {
        String::new()
    } else {
        v.to_string()
    }
}

/// The server parses booleans with Perl truthiness, so send "1"/"0".
pub fn bool_param(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}
