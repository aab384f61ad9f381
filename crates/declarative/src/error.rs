//! Error types for declarative provisioning
//!
//! Every error aborts the current run. Graph errors surface before any
//! provisioner call; provisioning errors carry the failing descriptor id.

use thiserror::Error;

/// Boxed cause reported by a provisioner
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while declaring, ordering or realizing resources
#[derive(Debug, Error)]
pub enum Error {
    /// A descriptor violates the constraints of its kind
    #[error("invalid {kind} '{id}': {message}")]
    Validation {
        /// Id of the offending descriptor
        id: String,
        /// Kind name of the offending descriptor
        kind: String,
        /// What constraint was violated
        message: String,
    },

    /// A descriptor with the same id is already in the graph
    #[error("duplicate resource id: {0}")]
    DuplicateId(String),

    /// A descriptor references an id that is not in the graph
    #[error("'{from}' references unknown resource '{to}'")]
    UnknownReference {
        /// Descriptor holding the reference
        from: String,
        /// Id that did not resolve
        to: String,
    },

    /// The references form a cycle
    #[error("dependency cycle detected among: {}", .members.join(" -> "))]
    Cycle {
        /// Ids on the cycle, in traversal order
        members: Vec<String>,
    },

    /// The provisioner failed to create a resource
    #[error("failed to provision '{descriptor_id}': {source}")]
    Provision {
        /// Id of the descriptor being realized
        descriptor_id: String,
        /// Cause reported by the provisioner
        #[source]
        source: BoxError,
    },

    /// A realized resource does not expose a referenced attribute
    #[error("resource '{resource}' has no attribute '{attribute}'")]
    MissingAttribute {
        /// Realized resource id
        resource: String,
        /// Requested attribute
        attribute: String,
    },

    /// An output references a resource that was never realized
    #[error("output '{output}' references unrealized resource '{resource}'")]
    UnresolvedOutput {
        /// Output name
        output: String,
        /// Referenced resource id
        resource: String,
    },

    /// Two outputs share a name
    #[error("duplicate output name: {0}")]
    DuplicateOutput(String),

    /// Failed to build the worker pool for concurrent realization
    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Build a validation error for a descriptor
    pub fn validation(id: &str, kind: impl ToString, message: impl Into<String>) -> Self {
        Self::Validation {
            id: id.to_string(),
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Wrap a provisioner failure
    pub fn provision(descriptor_id: &str, source: impl Into<BoxError>) -> Self {
        Self::Provision {
            descriptor_id: descriptor_id.to_string(),
            source: source.into(),
        }
    }

    /// Id of the descriptor the error is attributed to, when there is one
    pub fn descriptor_id(&self) -> Option<&str> {
        match self {
            Self::Validation { id, .. } | Self::DuplicateId(id) => Some(id),
            Self::UnknownReference { from, .. } => Some(from),
            Self::Provision { descriptor_id, .. } => Some(descriptor_id),
            _ => None,
        }
    }
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
