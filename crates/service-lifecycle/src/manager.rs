//! Service manager: drives the five-phase pipeline per service

use crate::{
    Error, OperationContext, Result,
    cache::{CacheKey, OperationCache, input_hash},
    environment::EnvironmentManager,
    events::dispatch_event,
    frameworks::FrameworkRegistry,
    provider::{ProviderClients, ResourceClient},
    targets::{PublishOptions, TargetRegistry, TargetService},
};
use deploy_model::{
    PackageResult, Phase, PhaseResult, ProgressSink, ProjectConfig, ServiceConfig,
    ServiceContext, ServiceEventKind, TargetResource, ToolRef, dedupe_tools,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use toolchain_exec::{CancelToken, ToolRunner};
use tracing::{debug, info};

/// Drives one project's services through restore → build → package →
/// publish → deploy.
///
/// Each phase emits `pre`/`post` lifecycle events, memoises its result in
/// the operation cache, forwards plug-in progress to the caller's sink, and
/// appends its artifacts to the service's accumulated context. The cache
/// lookup happens before the `pre` event fires: a cache hit re-dispatches no
/// events and returns the identical result instance, so handlers observe
/// only the first execution.
pub struct ServiceManager {
    project: Arc<ProjectConfig>,
    environment: EnvironmentManager,
    runner: Arc<dyn ToolRunner>,
    frameworks: Arc<FrameworkRegistry>,
    targets: Arc<TargetRegistry>,
    resources: Arc<dyn ResourceClient>,
    cache: OperationCache,
    contexts: Arc<Mutex<HashMap<String, ServiceContext>>>,
    initialized: Arc<Mutex<HashSet<String>>>,
}

impl ServiceManager {
    /// Create a manager with the default plug-in registries and a fresh
    /// operation cache
    pub fn new(
        project: ProjectConfig,
        environment: EnvironmentManager,
        runner: Arc<dyn ToolRunner>,
        providers: ProviderClients,
    ) -> Self {
        let resources = providers.resources.clone();
        Self::with_parts(
            project,
            environment,
            runner,
            FrameworkRegistry::with_defaults(),
            TargetRegistry::with_defaults(&providers),
            resources,
            OperationCache::new(),
        )
    }

    /// Create a manager sharing an existing operation cache, so phases run
    /// by an earlier command in the process are not repeated
    pub fn with_cache(
        project: ProjectConfig,
        environment: EnvironmentManager,
        runner: Arc<dyn ToolRunner>,
        providers: ProviderClients,
        cache: OperationCache,
    ) -> Self {
        let resources = providers.resources.clone();
        Self::with_parts(
            project,
            environment,
            runner,
            FrameworkRegistry::with_defaults(),
            TargetRegistry::with_defaults(&providers),
            resources,
            cache,
        )
    }

    /// Create a manager from explicit registries (custom plug-ins, tests)
    pub fn with_parts(
        project: ProjectConfig,
        environment: EnvironmentManager,
        runner: Arc<dyn ToolRunner>,
        frameworks: FrameworkRegistry,
        targets: TargetRegistry,
        resources: Arc<dyn ResourceClient>,
        cache: OperationCache,
    ) -> Self {
        info!("Initializing service manager for project '{}'", project.name);
        Self {
            project: Arc::new(project),
            environment,
            runner,
            frameworks: Arc::new(frameworks),
            targets: Arc::new(targets),
            resources,
            cache,
            contexts: Arc::new(Mutex::new(HashMap::new())),
            initialized: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The project this manager drives
    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// The shared operation cache
    pub fn cache(&self) -> OperationCache {
        self.cache.clone()
    }

    /// Look up a declared service's configuration by name
    pub fn service(&self, name: &str) -> Result<ServiceConfig> {
        self.project
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("unknown service '{}'", name)))
    }

    /// Snapshot of the accumulated artifacts for a service's pipeline
    pub fn context_snapshot(&self, service: &str) -> ServiceContext {
        self.contexts
            .lock()
            .unwrap()
            .get(service)
            .cloned()
            .unwrap_or_default()
    }

    /// Discard a service's pipeline context, returning its final state
    pub fn end_pipeline(&self, service: &str) -> Option<ServiceContext> {
        self.initialized.lock().unwrap().remove(service);
        self.contexts.lock().unwrap().remove(service)
    }

    /// Union of the tools the resolved framework and target need,
    /// deduplicated by name
    pub fn required_tools(&self, config: &ServiceConfig) -> Result<Vec<ToolRef>> {
        let framework = self.frameworks.resolve(config)?;
        let target = self.targets.resolve(config)?;

        let mut tools = framework.required_tools(&self.project, config);
        tools.extend(target.required_tools(&self.project, config));
        Ok(dedupe_tools(tools))
    }

    /// Fail with the first required tool missing from the runner's PATH
    pub fn verify_tools(&self, config: &ServiceConfig) -> Result<()> {
        for tool in self.required_tools(config)? {
            if !self.runner.has_tool(&tool.name) {
                return Err(Error::Tool {
                    tool: tool.name,
                    hint: tool.install_hint,
                });
            }
        }
        Ok(())
    }

    /// Resolve both plug-ins and run their one-time setup.
    ///
    /// Plug-ins may register lifecycle handlers during initialization; the
    /// service's handler table is sealed afterwards, so no registrations
    /// land once the pipeline is running.
    pub async fn initialize(&self, config: &ServiceConfig, cancel: &CancelToken) -> Result<()> {
        if self.initialized.lock().unwrap().contains(&config.name) {
            return Ok(());
        }

        info!("Initializing service '{}'", config.name);
        let framework = self.frameworks.resolve(config)?;
        let target = self.targets.resolve(config)?;
        let ctx = self.operation_context(cancel);

        framework.initialize(&ctx, &self.project, config).await?;
        target.initialize(&ctx, &self.project, config).await?;

        config.handlers.seal();
        self.contexts
            .lock()
            .unwrap()
            .entry(config.name.clone())
            .or_default();
        self.initialized
            .lock()
            .unwrap()
            .insert(config.name.clone());
        Ok(())
    }

    /// Run the restore phase (framework only)
    pub async fn restore(
        &self,
        config: &ServiceConfig,
        progress: &ProgressSink,
        cancel: &CancelToken,
    ) -> Result<Arc<PhaseResult>> {
        self.initialize(config, cancel).await?;
        let framework = self.frameworks.resolve(config)?;
        let ctx = self.operation_context(cancel);
        let project = self.project.clone();

        self.run_phase(config, Phase::Restore, None, cancel, |snapshot| async move {
            framework
                .restore(&ctx, &project, config, &snapshot, progress)
                .await
                .map(PhaseResult::Restore)
        })
        .await
    }

    /// Run the build phase (framework only)
    pub async fn build(
        &self,
        config: &ServiceConfig,
        restore_result: Option<&PhaseResult>,
        progress: &ProgressSink,
        cancel: &CancelToken,
    ) -> Result<Arc<PhaseResult>> {
        self.initialize(config, cancel).await?;
        let framework = self.frameworks.resolve(config)?;
        let ctx = self.operation_context(cancel);
        let project = self.project.clone();

        self.run_phase(
            config,
            Phase::Build,
            restore_result,
            cancel,
            |snapshot| async move {
                framework
                    .build(&ctx, &project, config, &snapshot, progress)
                    .await
                    .map(PhaseResult::Build)
            },
        )
        .await
    }

    /// Run the package phase: framework first, then the target wraps its
    /// output
    pub async fn package(
        &self,
        config: &ServiceConfig,
        build_result: Option<&PhaseResult>,
        progress: &ProgressSink,
        options: Option<&PublishOptions>,
        cancel: &CancelToken,
    ) -> Result<Arc<PhaseResult>> {
        self.initialize(config, cancel).await?;
        let framework = self.frameworks.resolve(config)?;
        let target = self.targets.resolve(config)?;
        let ctx = self.operation_context(cancel);
        let project = self.project.clone();

        self.run_phase(
            config,
            Phase::Package,
            build_result,
            cancel,
            |snapshot| async move {
                let requirements = framework.requirements();
                let framework_result = if requirements.package.skip_package {
                    PackageResult::default()
                } else {
                    framework
                        .package(&ctx, &project, config, &snapshot, progress)
                        .await?
                };

                target
                    .package(
                        &ctx,
                        &project,
                        config,
                        &snapshot,
                        &framework_result,
                        options,
                        progress,
                    )
                    .await
                    .map(PhaseResult::Package)
            },
        )
        .await
    }

    /// Run the publish phase (target only)
    pub async fn publish(
        &self,
        config: &ServiceConfig,
        package_result: Option<&PhaseResult>,
        progress: &ProgressSink,
        options: Option<&PublishOptions>,
        cancel: &CancelToken,
    ) -> Result<Arc<PhaseResult>> {
        self.initialize(config, cancel).await?;
        let target = self.targets.resolve(config)?;
        let ctx = self.operation_context(cancel);
        let project = self.project.clone();
        let manager = self;

        self.run_phase(
            config,
            Phase::Publish,
            package_result,
            cancel,
            |snapshot| async move {
                let resource = manager.resolve_target_resource(&ctx, config, &target).await?;
                target
                    .publish(&ctx, &project, config, &snapshot, &resource, options, progress)
                    .await
                    .map(PhaseResult::Publish)
            },
        )
        .await
    }

    /// Run the deploy phase (target only)
    pub async fn deploy(
        &self,
        config: &ServiceConfig,
        publish_result: Option<&PhaseResult>,
        progress: &ProgressSink,
        cancel: &CancelToken,
    ) -> Result<Arc<PhaseResult>> {
        self.initialize(config, cancel).await?;
        let target = self.targets.resolve(config)?;
        let ctx = self.operation_context(cancel);
        let project = self.project.clone();
        let manager = self;

        self.run_phase(
            config,
            Phase::Deploy,
            publish_result,
            cancel,
            |snapshot| async move {
                let resource = manager.resolve_target_resource(&ctx, config, &target).await?;
                target
                    .deploy(&ctx, &project, config, &snapshot, &resource, progress)
                    .await
                    .map(PhaseResult::Deploy)
            },
        )
        .await
    }

    /// Resolve, refine, and validate the target resource for a service
    pub async fn resolve_target_resource(
        &self,
        ctx: &OperationContext,
        config: &ServiceConfig,
        target: &Arc<dyn TargetService>,
    ) -> Result<TargetResource> {
        let subscription = ctx.environment.subscription_id().ok_or_else(|| {
            Error::config("no subscription id configured in the environment")
        })?;

        let resource_group = if self.project.resource_group.template().is_empty() {
            ctx.environment.resource_group().ok_or_else(|| {
                Error::config("no resource group configured for the project or environment")
            })?
        } else {
            self.project.resource_group.resolve(ctx.resolver())?
        };

        let fallback = self
            .resources
            .find_service_resource(&subscription, &resource_group, &config.name, &ctx.cancel)
            .await;

        let resolved = target
            .resolve_target_resource(ctx, &subscription, config, fallback)
            .await?;
        target.validate_target_resource(&resolved)?;
        Ok(resolved)
    }

    fn operation_context(&self, cancel: &CancelToken) -> OperationContext {
        OperationContext::new(
            self.runner.clone(),
            self.environment.clone(),
            cancel.clone(),
        )
    }

    fn record_context(&self, service: &str, phase: Phase, result: &PhaseResult) {
        let mut contexts = self.contexts.lock().unwrap();
        contexts
            .entry(service.to_string())
            .or_default()
            .record(phase, result.artifacts());
    }

    /// Shared phase machinery: cache lookup (before any event), single-flight
    /// execution with `pre` event, cache store, `post` event, then context
    /// append. Plug-in and handler errors come back wrapped with the phase
    /// name; cancellation is surfaced unwrapped.
    async fn run_phase<F, Fut>(
        &self,
        config: &ServiceConfig,
        phase: Phase,
        inputs: Option<&PhaseResult>,
        cancel: &CancelToken,
        invoke: F,
    ) -> Result<Arc<PhaseResult>>
    where
        F: FnOnce(ServiceContext) -> Fut,
        Fut: Future<Output = Result<PhaseResult>>,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let key = CacheKey::new(
            phase,
            &config.name,
            inputs.map(|result| input_hash(result.artifacts())),
        );

        let executed = AtomicBool::new(false);
        let snapshot = self.context_snapshot(&config.name);
        let handlers = config.handlers.clone();
        let service_name = config.name.clone();

        let result = self
            .cache
            .get_or_compute(key, || {
                executed.store(true, Ordering::SeqCst);
                let pre_event = ServiceEventKind::pre(phase).name();
                async move {
                    debug!("Running {} for service '{}'", phase, service_name);
                    dispatch_event(&handlers, &pre_event, &service_name, &snapshot).await?;
                    invoke(snapshot).await
                }
            })
            .await
            .map_err(|e| Error::in_phase(phase, e))?;

        if executed.load(Ordering::SeqCst) {
            // The result is already cached when post fires; a failing post
            // handler fails this call but not a later cache hit.
            let post_event = ServiceEventKind::post(phase).name();
            let post_snapshot = self.context_snapshot(&config.name);
            dispatch_event(&config.handlers, &post_event, &config.name, &post_snapshot)
                .await
                .map_err(|e| Error::in_phase(phase, e))?;
        }

        self.record_context(&config.name, phase, &result);
        Ok(result)
    }
}
