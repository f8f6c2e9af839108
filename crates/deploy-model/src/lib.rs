//! # deploy-model
//!
//! Shared data model for the service lifecycle pipeline.
//!
//! This crate defines the typed artifact bag threaded between pipeline
//! phases, the project and service configuration types the orchestrator
//! consumes, the per-phase result records, lifecycle event plumbing, and the
//! wire-level representation exchanged with out-of-process extensions.

mod artifact;
mod config;
mod context;
mod events;
mod expand;
mod phase;
mod progress;
mod resource;
mod results;
pub mod wire;

pub use artifact::{Artifact, ArtifactCollection, ArtifactKind, LocationKind, kind_eq};
pub use config::{
    DockerOptions, InfraConfig, ProjectConfig, ServiceConfig, ServiceHost, ServiceLanguage,
    SpringOptions,
};
pub use context::ServiceContext;
pub use events::{
    EventHandler, EventHandlerError, EventHandlerTable, ServiceEventKind,
    ServiceLifecycleEventArgs,
};
pub use expand::Expandable;
pub use phase::Phase;
pub use progress::{ProgressMessage, ProgressSink, progress_channel, report};
pub use resource::TargetResource;
pub use results::{
    BuildResult, DeployResult, FrameworkRequirements, PackageRequirements, PackageResult,
    PhaseResult, PublishResult, RestoreResult, ToolRef, dedupe_tools,
};

/// Error types for model validation and mapping
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An artifact of a location-bearing kind carried an empty location
    #[error("artifact location is empty for kind {kind}")]
    EmptyArtifactLocation {
        /// The offending artifact kind
        kind: ArtifactKind,
    },

    /// A remote artifact location was not a URI with a scheme
    #[error("remote artifact location is not a URI with a scheme: {location}")]
    InvalidRemoteLocation {
        /// The offending location
        location: String,
    },

    /// A `${VAR}` reference could not be resolved
    #[error("unresolved variable reference: {name}")]
    UnresolvedVariable {
        /// The variable that was not found
        name: String,
    },

    /// An artifact kind has no wire representation
    #[error("artifact kind {kind} is not representable on the wire")]
    UnmappableKind {
        /// The offending artifact kind
        kind: ArtifactKind,
    },

    /// A wire message carried an unknown enum tag
    #[error("protocol error: unknown wire tag {tag}")]
    UnknownWireTag {
        /// The offending tag
        tag: String,
    },

    /// A handler registration arrived after the table was sealed
    #[error("event handlers are sealed for {name}")]
    HandlersSealed {
        /// The config whose handlers were sealed
        name: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
