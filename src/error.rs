//! Error types for the DbCluster Restore Operator

use thiserror::Error;

use crate::crd::UNSAFE_PITR_ANNOTATION;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Referenced resource is absent
    #[error("{0} not found")]
    NotFound(String),

    /// Backup exists but has not reached the succeeded state
    #[error("backup {name} didn't finish yet, current state: {state}")]
    NotReady { name: String, state: String },

    /// Another restore for the same cluster is still active
    #[error("unable to continue, concurrent restore job {0} running now")]
    Conflict(String),

    /// PITR readiness gate tripped without the override annotation
    #[error(
        "Backup doesn't guarantee consistent recovery with PITR. Annotate DbClusterRestore with {} to force it.",
        UNSAFE_PITR_ANNOTATION
    )]
    UnsafePitr,

    /// Bounded wait exceeded its poll limit
    #[error("exceeded wait limit: {0}")]
    Timeout(String),

    /// External operation reported a failure
    #[error("{0}")]
    Collaborator(String),

    /// Error annotated with the stage that produced it
    #[error("{stage}: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a collaborator error
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Error::Collaborator(msg.into())
    }

    /// Wrap this error with the name of the stage that produced it
    pub fn stage(self, stage: impl Into<String>) -> Self {
        Error::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping stage annotations
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stable label for metrics and requeue decisions
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Error::Kube(_) => "kube",
            Error::NotFound(_) => "not_found",
            Error::NotReady { .. } => "not_ready",
            Error::Conflict(_) => "conflict",
            Error::UnsafePitr => "unsafe",
            Error::Timeout(_) => "timeout",
            Error::Collaborator(_) => "collaborator",
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
            Error::Serialization(_) => "serialization",
            Error::Stage { .. } => "stage",
        }
    }
}

/// Adds stage context to fallible results
pub trait ResultExt<T> {
    fn stage(self, stage: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn stage(self, stage: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.stage(stage))
    }
}
