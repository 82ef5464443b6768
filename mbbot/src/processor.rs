//! Per-identifier URL processing pipeline
//!
//! fetch entity -> rewrite rules -> reconcile -> build requests -> submit
//!
//! All requests for an identifier are built (and every relationship diff
//! validated) before the first one is submitted, so a reconciler error never
//! leaves a URL half-edited. A submission failure after that point stops the
//! identifier and is returned along with what the server already accepted;
//! nothing is retried.

use crate::batch::{FieldEdit, RelationshipBatch};
use crate::error::{EditError, EditResult};
use crate::models::{entity_type, Entity};
use crate::reconcile::diff;
use crate::rewrite::RuleTable;
use crate::session::{CatalogClient, EditSubmitter};
use thiserror::Error;
use tracing::info;

/// Options shared by every edit the processor enters
#[derive(Debug, Clone, Default)]
pub struct EditOptions {
    /// Overrides the matched rule's note when set
    pub edit_note: Option<String>,
    pub make_votable: bool,
}

/// What was submitted for one identifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// IDs of edits entered through entity edit pages
    pub edit_ids: Vec<u64>,
    /// Number of existing relationships edited
    pub edited_relationships: usize,
    /// IDs of relationships created for new entities
    pub created_relationships: Vec<u64>,
}

impl ProcessReport {
    pub fn is_empty(&self) -> bool {
        self.edit_ids.is_empty()
            && self.edited_relationships == 0
            && self.created_relationships.is_empty()
    }
}

/// Processing failure for one identifier
///
/// `report` holds the edits the server accepted before `source` occurred.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ProcessError {
    pub report: ProcessReport,
    #[source]
    pub source: EditError,
}

impl ProcessError {
    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }
}

impl From<EditError> for ProcessError {
    fn from(source: EditError) -> Self {
        Self {
            report: ProcessReport::default(),
            source,
        }
    }
}

/// Requests for one identifier, in submission order
struct Plan {
    rename: Option<FieldEdit>,
    edits: RelationshipBatch,
    additions: Vec<RelationshipBatch>,
    edit_note: String,
}

pub struct Processor<'a, S> {
    session: &'a S,
    rules: &'a RuleTable,
    options: EditOptions,
}

impl<'a, S> Processor<'a, S>
where
    S: CatalogClient + EditSubmitter,
{
    pub fn new(session: &'a S, rules: &'a RuleTable, options: EditOptions) -> Self {
        Self {
            session,
            rules,
            options,
        }
    }

    /// Process the URL entity identified by `mbid`.
    ///
    /// Returns an empty report if no rule has anything to change.
    pub async fn process(&self, mbid: &str) -> Result<ProcessReport, ProcessError> {
        let entity = self.session.fetch_entity(mbid, entity_type::URL).await?;
        let Some(plan) = self.plan(&entity)? else {
            info!(mbid = %mbid, url = %entity.name, "No rewrites found");
            return Ok(ProcessReport::default());
        };

        let mut report = ProcessReport::default();
        match self.submit(mbid, plan, &mut report).await {
            Ok(()) => Ok(report),
            Err(source) => Err(ProcessError { report, source }),
        }
    }

    async fn submit(&self, mbid: &str, plan: Plan, report: &mut ProcessReport) -> EditResult<()> {
        let note = plan.edit_note.as_str();
        let votable = self.options.make_votable;

        if let Some(rename) = plan.rename {
            let path = rename.path();
            let edit_id = self
                .session
                .submit_field_edit(&path, &rename.into_form(note, votable))
                .await?;
            info!(mbid = %mbid, edit_id, "Created edit");
            report.edit_ids.push(edit_id);
        }

        if !plan.edits.is_empty() {
            let ids = match self
                .session
                .submit_relationship_batch(&plan.edits.into_form(note, votable))
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    report.edited_relationships += e.completed().len();
                    return Err(e);
                }
            };
            info!(mbid = %mbid, count = ids.len(), "Edited relationships");
            report.edited_relationships += ids.len();
        }

        for batch in plan.additions {
            let ids = match self
                .session
                .submit_relationship_batch(&batch.into_form(note, votable))
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    report.created_relationships.extend_from_slice(e.completed());
                    return Err(e);
                }
            };
            for id in &ids {
                info!(mbid = %mbid, relationship_id = id, "Added relationship");
            }
            report.created_relationships.extend(ids);
        }

        Ok(())
    }

    fn plan(&self, entity: &Entity) -> EditResult<Option<Plan>> {
        let Some(res) = self.rules.apply(entity) else {
            return Ok(None);
        };
        let mbid = entity.mbid.as_str();

        let rename = if res.renames(&entity.name) {
            info!(mbid = %mbid, from = %entity.name, to = %res.rewritten, "Rewriting URL");
            Some(FieldEdit::rename(entity, &res.rewritten))
        } else {
            None
        };

        let mut edits = RelationshipBatch::new();
        for update in &res.updated {
            info!(
                mbid = %mbid,
                relationship_id = update.original.id,
                desc = %update.desired.describe(&entity.name),
                "Editing relationship"
            );
            edits.push(&diff(entity, Some(&update.original), &update.desired)?);
        }

        let mut additions = Vec::new();
        for new_entity in &res.new_entities {
            let mut batch = RelationshipBatch::new();
            for rel in &new_entity.relationships {
                info!(mbid = %mbid, desc = %rel.describe(&new_entity.name), "Adding relationship");
                batch.push(&diff(new_entity, None, rel)?);
            }
            if !batch.is_empty() {
                additions.push(batch);
            }
        }

        let edit_note = self.options.edit_note.clone().unwrap_or(res.edit_note);
        Ok(Some(Plan {
            rename,
            edits,
            additions,
            edit_note,
        }))
    }
}

/// Cancel the edit with `edit_id`.
pub async fn cancel_edit<S: EditSubmitter>(session: &S, edit_id: u64, edit_note: &str) -> EditResult<()> {
    info!(edit_id, "Cancelling edit");
    session.cancel_edit(edit_id, edit_note).await
}
