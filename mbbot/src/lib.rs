//! mbbot library interface
//!
//! URL maintenance for MusicBrainz: rewrite rules decide what a URL and its
//! relationships should look like, the reconciler turns that into
//! relationship-editor fields, and the session submits the edits.

pub mod batch;
pub mod error;
pub mod models;
pub mod processor;
pub mod reconcile;
pub mod rewrite;
pub mod scrape;
pub mod session;

pub use crate::error::{EditError, EditResult, ReconcileError};
pub use crate::processor::{EditOptions, ProcessError, ProcessReport, Processor};
pub use crate::rewrite::RuleTable;
pub use crate::session::{CatalogClient, EditSubmitter, Session, SessionOptions};
