use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ValidationError / ValidationErrors
// ---------------------------------------------------------------------------

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub expected: String,
    pub received: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"Validation failed at "{}": expected {}, received {}"#,
            self.path, self.expected, self.received
        )
    }
}

impl std::error::Error for ValidationError {}

/// One or more `ValidationError`s collected from a single payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed:")?;
        for e in &self.0 {
            write!(f, "\n  - {}: expected {}, received {}", e.path, e.expected, e.received)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ---------------------------------------------------------------------------
// StoreError: raw failure reported by a RemoteStore
// ---------------------------------------------------------------------------

/// Classification of remote store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Connectivity or service outage.
    Unavailable,
    /// The client is not allowed to read or write the target.
    PermissionDenied,
    /// The addressed record does not exist.
    NotFound,
    /// The store refused the payload.
    Rejected,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unavailable => "unavailable",
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "not found",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::PermissionDenied, message)
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::new(StoreErrorKind::NotFound, format!("{collection}/{id}"))
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Rejected, message)
    }
}

// ---------------------------------------------------------------------------
// SubscriptionError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Could not subscribe to {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: StoreError,
    },

    #[error("Subscription to {target} dropped: {source}")]
    Dropped {
        target: String,
        #[source]
        source: StoreError,
    },
}

impl SubscriptionError {
    /// The selector description (`"notes"` or `"plans/p1"`) the error refers to.
    pub fn target(&self) -> &str {
        match self {
            Self::Open { target, .. } | Self::Dropped { target, .. } => target,
        }
    }
}

// ---------------------------------------------------------------------------
// MutationError
// ---------------------------------------------------------------------------

/// Which gateway operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("{op} on {collection} failed: {source}")]
    Store {
        op: MutationOp,
        collection: String,
        id: Option<String>,
        #[source]
        source: StoreError,
    },

    #[error("{op} on {collection} has an invalid payload: {source}")]
    Invalid {
        op: MutationOp,
        collection: String,
        #[source]
        source: ValidationErrors,
    },

    #[error("{op} on {collection} was dropped before it completed")]
    Abandoned { op: MutationOp, collection: String },

    #[error("{op} on {collection} was not issued: no tokio runtime is running")]
    NoRuntime { op: MutationOp, collection: String },
}

impl MutationError {
    pub fn op(&self) -> MutationOp {
        match self {
            Self::Store { op, .. }
            | Self::Invalid { op, .. }
            | Self::Abandoned { op, .. }
            | Self::NoRuntime { op, .. } => *op,
        }
    }
}

// ---------------------------------------------------------------------------
// NotFoundError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Record not found: {collection}/{id}")]
pub struct NotFoundError {
    pub collection: String,
    pub id: String,
}

// ---------------------------------------------------------------------------
// IntentError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("Another action is already in progress")]
    Busy,

    #[error("No draft is open")]
    NotComposing,

    #[error("No delete is awaiting confirmation")]
    NotConfirming,

    #[error("\"{field}\" must not be blank")]
    BlankPrimary { field: String },

    #[error("Unknown field \"{field}\" for collection \"{collection}\"")]
    UnknownField { collection: String, field: String },

    #[error("Record {id} is not in the current view")]
    UnknownRecord { id: String },

    #[error("View is not mounted")]
    NotMounted,

    #[error("Document is not loaded")]
    NotReady,
}

// ---------------------------------------------------------------------------
// LiveDocError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum LiveDocError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error("Record {collection}/{id} could not be decoded: {message}")]
    Decode {
        collection: String,
        id: String,
        message: String,
    },
}

/// Convenience alias; the default error type is `LiveDocError`.
pub type Result<T, E = LiveDocError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
