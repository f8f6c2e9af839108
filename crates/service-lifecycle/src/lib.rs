//! # service-lifecycle
//!
//! The service lifecycle orchestrator: drives each declared service through
//! the restore → build → package → publish → deploy pipeline.
//!
//! The [`ServiceManager`] resolves one framework plug-in (per source
//! language) and one target plug-in (per deployment host) for each service,
//! dispatches pre/post lifecycle events around every phase, memoises phase
//! results in a process-wide single-flight cache, streams plug-in progress
//! to the caller, and threads a typed artifact collection between phases.
//!
//! ## Example
//!
//! ```rust,no_run
//! use deploy_model::{ProjectConfig, progress_channel};
//! use service_lifecycle::{EnvironmentManager, ServiceManager};
//! use std::sync::Arc;
//! use toolchain_exec::{CancelToken, LocalRunner};
//!
//! # async fn example(project: ProjectConfig, providers: service_lifecycle::ProviderClients)
//! # -> service_lifecycle::Result<()> {
//! let environment = EnvironmentManager::ephemeral("dev");
//! let manager = ServiceManager::new(project, environment, Arc::new(LocalRunner), providers);
//!
//! let config = manager.service("api")?;
//! let (progress, _updates) = progress_channel();
//! let cancel = CancelToken::none();
//!
//! let restored = manager.restore(&config, &progress, &cancel).await?;
//! let built = manager.build(&config, Some(restored.as_ref()), &progress, &cancel).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod container;
mod context;
mod environment;
mod events;
pub mod frameworks;
mod manager;
mod packaging;
mod provider;
pub mod targets;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{CacheKey, OperationCache, input_hash};
pub use container::{image_reference_registry, sanitize_env_service_name};
pub use context::OperationContext;
pub use environment::{EnvUpdate, EnvUpdateHandler, EnvironmentManager};
pub use events::dispatch_event;
pub use frameworks::{FrameworkHandle, FrameworkRegistry, FrameworkService, InnerSlot};
pub use manager::ServiceManager;
pub use packaging::{copy_package_dir, create_deployable_zip, package_files};
pub use provider::{
    ContainerAppClient, DeploymentsClient, InfraCompiler, ModelRegistryClient, ModelVersion,
    ProviderClients, ResourceClient, SiteClient, SpringClient, StaticSiteClient,
};
pub use targets::{PublishOptions, TargetRegistry, TargetService};

use deploy_model::Phase;
use std::sync::Arc;

/// Error types for lifecycle orchestration
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration error: unknown language or host, unresolved reference,
    /// ambiguous project files
    #[error("configuration error: {0}")]
    Config(String),

    /// A required external tool is missing
    #[error("required tool missing: {tool}")]
    Tool {
        /// The missing tool's binary name
        tool: String,
        /// Where to get the tool, if known
        hint: Option<String>,
    },

    /// Toolchain subprocess failure (non-zero exit carries captured stderr)
    #[error(transparent)]
    Toolchain(toolchain_exec::Error),

    /// Cloud provider call failed
    #[error("provider error: {0}")]
    Provider(String),

    /// Target resource type does not match the host's expected type
    #[error("target resource type mismatch: expected {expected}, found {actual}")]
    ResourceMismatch {
        /// The type string the target expects
        expected: String,
        /// The type string the resource carries
        actual: String,
    },

    /// An external plug-in violated the message contract
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Error reported by an out-of-process extension, surfaced verbatim
    #[error("{0}")]
    Extension(String),

    /// A lifecycle event handler failed
    #[error("event handler '{event}' failed: {message}")]
    EventHandler {
        /// The event edge whose handler failed
        event: String,
        /// The handler's error message
        message: String,
    },

    /// Packaging (zip/copy) failure
    #[error("packaging error: {0}")]
    Package(String),

    /// Model validation or wire mapping failure
    #[error(transparent)]
    Model(#[from] deploy_model::Error),

    /// The caller's context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A phase failed; wraps the underlying error with the phase name
    #[error("{phase} failed: {source}")]
    Phase {
        /// The failing phase
        phase: Phase,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },

    /// An error shared with concurrent callers of the same in-flight
    /// computation
    #[error("{0}")]
    Shared(Arc<Error>),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Wrap an error with the phase it occurred in.
    ///
    /// Cancellation is never wrapped: callers match on it directly.
    pub fn in_phase(phase: Phase, error: Error) -> Self {
        match error {
            Error::Cancelled => Error::Cancelled,
            other => Error::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }
}

impl From<toolchain_exec::Error> for Error {
    fn from(error: toolchain_exec::Error) -> Self {
        match error {
            toolchain_exec::Error::Cancelled => Error::Cancelled,
            other => Error::Toolchain(other),
        }
    }
}

impl From<extension_bridge::BridgeError> for Error {
    fn from(error: extension_bridge::BridgeError) -> Self {
        use extension_bridge::BridgeError;
        match error {
            BridgeError::Cancelled => Error::Cancelled,
            BridgeError::Extension { message, .. } => Error::Extension(message),
            other => Error::Protocol(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
