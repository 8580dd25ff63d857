//! Error types for the Tessera core.

use thiserror::Error;

/// Boxed error returned by user-supplied factories, providers and callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the plugin registry and the service container.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A query named neither a contract name nor a contract type.
    #[error("invalid query: {0}")]
    InvalidQuery(&'static str),

    /// Strict single resolution found more than one candidate.
    #[error("ambiguous lookup for {target}: {count} candidates matched, expected exactly one")]
    Ambiguous {
        /// Human-readable description of what was requested.
        target: String,
        /// Number of matching candidates.
        count: usize,
    },

    /// Strict single resolution found no candidate.
    #[error("no capability matched {0}")]
    NotFound(String),

    /// A factory, selector, key function, provider or callback failed.
    #[error("target invocation failed: {context}")]
    Invocation {
        /// What was being computed when the failure happened.
        context: String,
        /// The original cause.
        #[source]
        source: BoxError,
    },

    /// A callable could not be bound to the requested function type.
    #[error("cannot adapt '{plugin}' to {requested}: {reason}")]
    InvalidDelegate {
        /// Contract name of the callable plugin.
        plugin: String,
        /// Identity of the requested function type.
        requested: &'static str,
        /// Why the adaptation is malformed.
        reason: &'static str,
    },

    /// The operation is not allowed on this item.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// A dependent subscription would close a notification cycle.
    #[error("subscribing {child} to {parent} would create a notification cycle")]
    Cycle {
        /// Capability type of the would-be parent.
        parent: &'static str,
        /// Capability type of the would-be dependent.
        child: &'static str,
    },

    /// A catalog could not enumerate its descriptors.
    #[error("catalog '{catalog}' failed to load")]
    Discovery {
        /// Name of the failing catalog.
        catalog: String,
        /// The original cause.
        #[source]
        source: BoxError,
    },
}

impl RegistryError {
    /// Wraps a failure raised while computing `context`.
    pub fn invocation(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Invocation {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Creates a "not supported" error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }
}

/// Result type for registry and container operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
