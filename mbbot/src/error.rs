//! Error types for mbbot
//!
//! `ReconcileError` covers invariant violations inside the relationship
//! reconciler. `EditError` covers everything that can go wrong while
//! processing one identifier against the server; it never aborts the run
//! as a whole.

use thiserror::Error;

/// Relationship reconciliation errors
///
/// These indicate a bug in a rewrite rule (or in the caller) rather than a
/// problem with the server, and are fatal for the identifier being processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The desired relationship is identical to the stored one
    #[error("no changes for relationship {0}")]
    NoChange(u64),

    /// A creation request referenced an existing relationship
    #[error("relationship {0} already exists and can't be added")]
    InvalidState(u64),

    /// Entity ordering for a new relationship contradicts the type order
    #[error("incorrect direction for relationship {0:?}")]
    Direction(String),

    /// The relationships differ only in ways the editor can't express
    #[error("unsupported update for relationship {id}: {reason}")]
    Unsupported { id: u64, reason: String },
}

/// Errors from fetching entities and submitting edits
#[derive(Debug, Error)]
pub enum EditError {
    /// Identifier has no corresponding entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure or server-side (5xx) error; worth retrying later
    #[error("Transient error: {0}")]
    Transient(String),

    /// Server rejected the request (4xx other than 404)
    #[error("HTTP {status} for {path}: {body}")]
    Http {
        status: u16,
        path: String,
        body: String,
    },

    /// Login failed
    #[error("Login failed: {0}")]
    Login(String),

    /// Response page didn't have the expected shape
    #[error("Malformed response: {0}")]
    Scrape(String),

    /// Edit page response didn't mention the created edit
    #[error("didn't find edit ID in response")]
    MissingEditId,

    /// Some relationship operations in a batch succeeded before one failed
    #[error(
        "relationship edit {index} with type {edit_type} failed: {code} \
         ({} earlier edit(s) completed)", .completed.len()
    )]
    PartialBatchFailure {
        index: usize,
        edit_type: i64,
        code: i64,
        /// Relationship IDs reported for the edits before `index`
        completed: Vec<u64>,
    },

    /// Caller cancelled while waiting for the rate limiter
    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Common error: {0}")]
    Common(#[from] mbbot_common::Error),
}

impl EditError {
    /// True if re-running the identifier later might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EditError::Transient(_))
    }

    /// Relationship IDs the server accepted before the failure
    pub fn completed(&self) -> &[u64] {
        match self {
            EditError::PartialBatchFailure { completed, .. } => completed,
            _ => &[],
        }
    }
}

impl From<reqwest::Error> for EditError {
    fn from(err: reqwest::Error) -> Self {
        EditError::Transient(err.to_string())
    }
}

/// Result type for operations against the server
pub type EditResult<T> = Result<T, EditError>;
