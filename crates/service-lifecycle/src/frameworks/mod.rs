//! Framework plug-ins: language-specific restore/build/package
//!
//! One framework per source language family, resolved through a keyed
//! factory registry. A framework may be composite: it delegates to an
//! `inner` framework injected by the registry after construction.

mod composite;
mod docker;
mod dotnet;
mod maven;
mod node;
mod noop;
mod python;

pub use composite::DotnetContainerFramework;
pub use docker::DockerFramework;
pub use dotnet::DotnetFramework;
pub use maven::MavenFramework;
pub use node::NodeFramework;
pub use noop::NoneFramework;
pub use python::PythonFramework;

use crate::{Error, OperationContext, Result};
use async_trait::async_trait;
use deploy_model::{
    BuildResult, FrameworkRequirements, PackageResult, ProgressSink, ProjectConfig,
    RestoreResult, ServiceConfig, ServiceContext, ServiceHost, ServiceLanguage, ToolRef,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

impl std::fmt::Debug for dyn FrameworkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn FrameworkService")
    }
}

/// Language-side plug-in owning restore, build, and the framework half of
/// package
#[async_trait]
pub trait FrameworkService: Send + Sync {
    /// What this framework needs from earlier phases
    fn requirements(&self) -> FrameworkRequirements;

    /// External tools this framework invokes for the given service
    fn required_tools(&self, project: &ProjectConfig, config: &ServiceConfig) -> Vec<ToolRef>;

    /// One-time setup; may register lifecycle event handlers on the service
    /// or project config
    async fn initialize(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
    ) -> Result<()>;

    /// Idempotent dependency fetch
    async fn restore(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<RestoreResult>;

    /// Produce build artifacts
    async fn build(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<BuildResult>;

    /// Produce the canonical package the target wraps
    async fn package(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<PackageResult>;
}

/// Shared slot a composite framework reads its inner framework from
pub type InnerSlot = Arc<Mutex<Option<Arc<dyn FrameworkService>>>>;

/// Create an empty inner slot
pub fn inner_slot() -> InnerSlot {
    Arc::new(Mutex::new(None))
}

/// Fetch the injected inner framework.
///
/// Calling any phase of a composite before the registry injects the inner
/// framework is a programming error.
pub(crate) fn require_inner(slot: &InnerSlot) -> Arc<dyn FrameworkService> {
    slot.lock()
        .unwrap()
        .clone()
        .expect("composite framework used before set_inner")
}

/// A constructed framework plus its composite wiring point, if any
pub struct FrameworkHandle {
    service: Arc<dyn FrameworkService>,
    inner_slot: Option<InnerSlot>,
}

impl FrameworkHandle {
    /// A self-contained framework
    pub fn simple(service: Arc<dyn FrameworkService>) -> Self {
        Self {
            service,
            inner_slot: None,
        }
    }

    /// A composite framework awaiting its inner framework
    pub fn composite(service: Arc<dyn FrameworkService>, slot: InnerSlot) -> Self {
        Self {
            service,
            inner_slot: Some(slot),
        }
    }

    /// Whether this framework still needs an inner framework injected
    pub fn requires_inner(&self) -> bool {
        self.inner_slot.is_some()
    }

    /// Inject the inner framework (second phase of the builder)
    pub fn set_inner(&self, inner: Arc<dyn FrameworkService>) {
        if let Some(slot) = &self.inner_slot {
            *slot.lock().unwrap() = Some(inner);
        }
    }

    /// The framework service itself
    pub fn service(&self) -> Arc<dyn FrameworkService> {
        self.service.clone()
    }
}

type FrameworkFactory = Arc<dyn Fn() -> FrameworkHandle + Send + Sync>;

/// Keyed factory registry for framework plug-ins
pub struct FrameworkRegistry {
    factories: HashMap<String, FrameworkFactory>,
}

impl FrameworkRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with every built-in framework registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("dotnet", || {
            FrameworkHandle::simple(Arc::new(DotnetFramework::new()))
        });
        registry.register("node", || {
            FrameworkHandle::simple(Arc::new(NodeFramework::new()))
        });
        registry.register("python", || {
            FrameworkHandle::simple(Arc::new(PythonFramework::new()))
        });
        registry.register("maven", || {
            FrameworkHandle::simple(Arc::new(MavenFramework::new()))
        });
        registry.register("none", || {
            FrameworkHandle::simple(Arc::new(NoneFramework::new()))
        });
        registry.register("docker", || {
            let slot = inner_slot();
            FrameworkHandle::composite(Arc::new(DockerFramework::new(slot.clone())), slot)
        });
        registry.register("dotnet-container", || {
            let slot = inner_slot();
            FrameworkHandle::composite(
                Arc::new(DotnetContainerFramework::new(slot.clone())),
                slot,
            )
        });
        registry
    }

    /// Register a framework factory under the given key
    pub fn register(
        &mut self,
        key: impl Into<String>,
        factory: impl Fn() -> FrameworkHandle + Send + Sync + 'static,
    ) {
        self.factories.insert(key.into(), Arc::new(factory));
    }

    /// Construct the framework registered under `key`
    pub fn resolve_key(&self, key: &str) -> Result<FrameworkHandle> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| Error::config(format!("no framework registered for '{}'", key)))?;
        Ok(factory())
    }

    /// Resolve the framework for a service, wiring composites.
    ///
    /// `language: none` with an image resolves the `docker` sentinel;
    /// without an image it is a configuration error. A Dockerfile-bearing
    /// service composes `docker` over its language framework, and a
    /// container-hosted dotnet service without a Dockerfile composes the
    /// container-publish wrapper over `dotnet`.
    pub fn resolve(&self, config: &ServiceConfig) -> Result<Arc<dyn FrameworkService>> {
        let (key, inner_key) = framework_keys_for(config)?;
        debug!(
            "Resolved framework '{}' (inner: {:?}) for service '{}'",
            key, inner_key, config.name
        );

        let handle = self.resolve_key(key)?;
        if let Some(inner_key) = inner_key {
            let inner = self.resolve_key(inner_key)?;
            handle.set_inner(inner.service());
        }
        Ok(handle.service())
    }
}

impl Default for FrameworkRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn is_container_host(host: &ServiceHost) -> bool {
    matches!(
        host,
        ServiceHost::ContainerApp | ServiceHost::Aks | ServiceHost::ContainerRegistry
    )
}

fn framework_keys_for(config: &ServiceConfig) -> Result<(&'static str, Option<&'static str>)> {
    match config.language {
        ServiceLanguage::None => {
            if config.image.is_some() {
                Ok(("docker", Some("none")))
            } else {
                Err(Error::config(format!(
                    "cannot resolve framework for service '{}': language is none and no image is configured",
                    config.name
                )))
            }
        }
        ServiceLanguage::Docker => Ok(("docker", Some("none"))),
        language if config.docker.is_some() => Ok(("docker", Some(language.framework_key()))),
        ServiceLanguage::Dotnet | ServiceLanguage::CSharp | ServiceLanguage::FSharp
            if is_container_host(&config.host) =>
        {
            Ok(("dotnet-container", Some("dotnet")))
        }
        language => Ok((language.framework_key(), None)),
    }
}
