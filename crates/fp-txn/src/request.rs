//! Requests: the atomic, replayable unit of document mutation.
//!
//! A request *body* implements [`Request`] (commit / undo / redo). The
//! [`RequestHandle`] envelope gives it an id and a type tag and enforces the
//! lifecycle:
//!
//! ```text
//! Pending ──commit──> Committed ──undo──> Undone ──redo──> Redone
//!    │                                      ▲                │
//!    └──commit fails──> Failed              └─────undo───────┘
//! ```

use crate::error::{CommitError, ReplayError};
use async_trait::async_trait;
use fp_core::{FieldKey, FieldName, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req_{}", self.0)
    }
}

// ─── Type tags ────────────────────────────────────────────────────────────

/// Tag identifying which request implementation a mutation maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestType {
    Composite,
    CompositeState,
    Data,
    ChangeFlag,
    Batch,
    /// A domain-specific leaf type registered by plugin code.
    Custom(String),
}

impl RequestType {
    /// Map a registry tag to its type. Unknown tags become `Custom`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Composite" => RequestType::Composite,
            "CompositeState" => RequestType::CompositeState,
            "Data" => RequestType::Data,
            "ChangeFlag" => RequestType::ChangeFlag,
            "Batch" => RequestType::Batch,
            other => RequestType::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RequestType::Composite => "Composite",
            RequestType::CompositeState => "CompositeState",
            RequestType::Data => "Data",
            RequestType::ChangeFlag => "ChangeFlag",
            RequestType::Batch => "Batch",
            RequestType::Custom(tag) => tag,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, RequestType::Custom(_))
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Status ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Committed,
    Undone,
    Redone,
    /// Commit failed; the request can never be committed again.
    Failed,
}

impl RequestStatus {
    /// The request's effect is currently applied to the document.
    pub fn is_applied(&self) -> bool {
        matches!(self, RequestStatus::Committed | RequestStatus::Redone)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "PENDING"),
            RequestStatus::Committed => write!(f, "COMMITTED"),
            RequestStatus::Undone => write!(f, "UNDONE"),
            RequestStatus::Redone => write!(f, "REDONE"),
            RequestStatus::Failed => write!(f, "FAILED"),
        }
    }
}

// ─── Capability trait ─────────────────────────────────────────────────────

/// The `{commit, undo, redo}` capability set, over a document context `C`.
///
/// `commit` may suspend (geometry rebuilds, network round-trips). `undo` and
/// `redo` are synchronous replays of state captured during commit; they must
/// not recompute the mutation.
///
/// A body whose commit fails after partially mutating `ctx` must restore
/// what it touched before returning the error.
#[async_trait]
pub trait Request<C>: Send {
    async fn commit(&mut self, ctx: &mut C) -> Result<Value, CommitError>;

    fn undo(&mut self, ctx: &mut C) -> Result<(), ReplayError>;

    fn redo(&mut self, ctx: &mut C) -> Result<(), ReplayError>;

    /// Whether this request reports fine-grained ownership of `field`.
    fn can_transact_field(&self, _field: FieldName) -> bool {
        false
    }

    /// The `(target, field)` pairs this request intends to touch.
    fn field_keys(&self) -> Vec<FieldKey> {
        Vec::new()
    }

    /// Default history label, used when the handle is not given one.
    fn describe(&self) -> Option<String> {
        None
    }
}

// ─── Handle ───────────────────────────────────────────────────────────────

/// A request body plus its identity and lifecycle status.
pub struct RequestHandle<C> {
    id: RequestId,
    request_type: RequestType,
    status: RequestStatus,
    description: Option<String>,
    body: Box<dyn Request<C>>,
}

impl<C> fmt::Debug for RequestHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("request_type", &self.request_type)
            .field("status", &self.status)
            .field("description", &self.description)
            .finish()
    }
}

impl<C> RequestHandle<C> {
    pub fn new(request_type: RequestType, body: impl Request<C> + 'static) -> Self {
        Self::from_boxed(request_type, Box::new(body))
    }

    pub fn from_boxed(request_type: RequestType, body: Box<dyn Request<C>>) -> Self {
        Self {
            id: RequestId::next(),
            request_type,
            status: RequestStatus::Pending,
            description: body.describe(),
            body,
        }
    }

    /// Wrap a body whose effect is already applied (session grouping).
    pub(crate) fn committed(request_type: RequestType, body: Box<dyn Request<C>>) -> Self {
        let mut handle = Self::from_boxed(request_type, body);
        handle.status = RequestStatus::Committed;
        handle
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn request_type(&self) -> &RequestType {
        &self.request_type
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Human-readable label for history UIs; falls back to the type tag.
    pub fn description(&self) -> &str {
        self.description
            .as_deref()
            .unwrap_or_else(|| self.request_type.as_str())
    }

    pub fn can_transact_field(&self, field: FieldName) -> bool {
        self.body.can_transact_field(field)
    }

    pub fn field_keys(&self) -> Vec<FieldKey> {
        self.body.field_keys()
    }

    /// Commit once. Re-committing is a usage error.
    pub async fn commit(&mut self, ctx: &mut C) -> Result<Value, CommitError> {
        if self.status != RequestStatus::Pending {
            return Err(CommitError::AlreadyCommitted {
                request: self.id,
                status: self.status,
            });
        }
        match self.body.commit(ctx).await {
            Ok(value) => {
                self.status = RequestStatus::Committed;
                log::trace!("COMMIT {} {}", self.id, self.request_type);
                Ok(value)
            }
            Err(e) => {
                self.status = RequestStatus::Failed;
                Err(e)
            }
        }
    }

    pub fn undo(&mut self, ctx: &mut C) -> Result<(), ReplayError> {
        if !self.status.is_applied() {
            return Err(self.invalid_status("undo"));
        }
        self.body.undo(ctx)?;
        self.status = RequestStatus::Undone;
        log::trace!("UNDO {} {}", self.id, self.request_type);
        Ok(())
    }

    pub fn redo(&mut self, ctx: &mut C) -> Result<(), ReplayError> {
        if self.status != RequestStatus::Undone {
            return Err(self.invalid_status("redo"));
        }
        self.body.redo(ctx)?;
        self.status = RequestStatus::Redone;
        log::trace!("REDO {} {}", self.id, self.request_type);
        Ok(())
    }

    fn invalid_status(&self, action: &'static str) -> ReplayError {
        ReplayError::InvalidStatus {
            request: self.id,
            status: self.status,
            action,
        }
    }
}
