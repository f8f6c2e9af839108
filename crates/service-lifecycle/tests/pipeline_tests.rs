//! End-to-end pipeline behaviour through the service manager

use deploy_model::{
    EventHandler, Phase, ProjectConfig, ServiceConfig, ServiceHost, ServiceLanguage,
    progress_channel,
};
use service_lifecycle::testing::{FakeProviders, SpyFramework, SpyTarget};
use service_lifecycle::{
    CacheKey, EnvironmentManager, Error, FrameworkHandle, FrameworkRegistry, OperationCache,
    ServiceManager, TargetRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use toolchain_exec::CancelToken;
use toolchain_exec::testing::RecordingRunner;

fn project() -> ProjectConfig {
    let mut project = ProjectConfig::new("store", "/work/store");
    project.add_service(ServiceConfig::new(
        "api",
        "src/api",
        ServiceLanguage::TypeScript,
        ServiceHost::AppService,
    ));
    project
}

struct Fixture {
    framework: Arc<SpyFramework>,
    target: Arc<SpyTarget>,
    cache: OperationCache,
}

impl Fixture {
    fn new() -> Self {
        Self {
            framework: Arc::new(SpyFramework::new()),
            target: Arc::new(SpyTarget::new()),
            cache: OperationCache::new(),
        }
    }

    fn manager(&self) -> ServiceManager {
        let mut frameworks = FrameworkRegistry::new();
        let framework = self.framework.clone();
        frameworks.register("node", move || FrameworkHandle::simple(framework.clone()));

        let mut targets = TargetRegistry::new();
        let target: Arc<dyn service_lifecycle::TargetService> = self.target.clone();
        targets.register("appservice", move || target.clone());

        let providers = FakeProviders::new();
        let environment = EnvironmentManager::ephemeral("dev");
        environment.set("AZURE_SUBSCRIPTION_ID", "sub-1").unwrap();
        environment.set("AZURE_RESOURCE_GROUP", "rg-app").unwrap();

        let mut project = project();
        project.resource_group = deploy_model::Expandable::new("");

        ServiceManager::with_parts(
            project,
            environment,
            Arc::new(RecordingRunner::new()),
            frameworks,
            targets,
            providers.resources.clone(),
            self.cache.clone(),
        )
    }
}

fn recording_handler(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> EventHandler {
    Arc::new(move |args| {
        let log = log.clone();
        let tag = tag.to_string();
        Box::pin(async move {
            log.lock().unwrap().push(format!("{}:{}", tag, args.service_name));
            Ok(())
        })
    })
}

#[smol_potat::test]
async fn test_running_a_phase_twice_executes_the_plugin_once() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let config = manager.service("api").unwrap();
    let (progress, _rx) = progress_channel();
    let cancel = CancelToken::none();

    let first = manager.restore(&config, &progress, &cancel).await.unwrap();
    let second = manager.restore(&config, &progress, &cancel).await.unwrap();

    assert_eq!(fixture.framework.restores.load(Ordering::SeqCst), 1);
    // Identity, not just equality
    assert!(Arc::ptr_eq(&first, &second));
}

#[smol_potat::test]
async fn test_cache_hit_does_not_redispatch_events() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let config = manager.service("api").unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    config
        .handlers
        .register("prerestore", recording_handler(log.clone(), "pre"))
        .unwrap();
    config
        .handlers
        .register("postrestore", recording_handler(log.clone(), "post"))
        .unwrap();

    let (progress, _rx) = progress_channel();
    let cancel = CancelToken::none();

    manager.restore(&config, &progress, &cancel).await.unwrap();
    manager.restore(&config, &progress, &cancel).await.unwrap();

    // Handlers observed only the first execution
    assert_eq!(*log.lock().unwrap(), vec!["pre:api", "post:api"]);
}

#[smol_potat::test]
async fn test_failing_pre_handler_aborts_without_running_the_plugin() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let config = manager.service("api").unwrap();
    let post_fired = Arc::new(AtomicUsize::new(0));

    config
        .handlers
        .register(
            "prebuild",
            Arc::new(|_args| Box::pin(async { Err("policy says no".into()) })),
        )
        .unwrap();
    {
        let post_fired = post_fired.clone();
        config
            .handlers
            .register(
                "postbuild",
                Arc::new(move |_args| {
                    let post_fired = post_fired.clone();
                    Box::pin(async move {
                        post_fired.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .unwrap();
    }

    let (progress, _rx) = progress_channel();
    let cancel = CancelToken::none();

    let err = manager
        .build(&config, None, &progress, &cancel)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("build failed"));
    assert_eq!(fixture.framework.builds.load(Ordering::SeqCst), 0);
    assert_eq!(post_fired.load(Ordering::SeqCst), 0);
    // Nothing was cached
    assert!(
        fixture
            .cache
            .get(&CacheKey::new(Phase::Build, "api", None))
            .is_none()
    );
}

#[smol_potat::test]
async fn test_failing_plugin_fires_no_post_event_and_caches_nothing() {
    let fixture = Fixture::new();
    fixture.framework.fail_in(Phase::Restore);
    let manager = fixture.manager();
    let config = manager.service("api").unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    config
        .handlers
        .register("prerestore", recording_handler(log.clone(), "pre"))
        .unwrap();
    config
        .handlers
        .register("postrestore", recording_handler(log.clone(), "post"))
        .unwrap();

    let (progress, _rx) = progress_channel();
    let cancel = CancelToken::none();

    let err = manager.restore(&config, &progress, &cancel).await.unwrap_err();
    assert!(err.to_string().contains("restore failed"));

    // The pre event had already fired; post never did
    assert_eq!(*log.lock().unwrap(), vec!["pre:api"]);
    assert!(
        fixture
            .cache
            .get(&CacheKey::new(Phase::Restore, "api", None))
            .is_none()
    );
    // The context was not mutated for the failed phase
    assert!(manager.context_snapshot("api").restore.is_empty());
}

#[smol_potat::test]
async fn test_cache_is_shared_across_manager_instances() {
    let fixture = Fixture::new();
    let first_manager = fixture.manager();
    let second_manager = fixture.manager();
    let config = first_manager.service("api").unwrap();

    let (progress, _rx) = progress_channel();
    let cancel = CancelToken::none();

    let first = first_manager
        .package(&config, None, &progress, None, &cancel)
        .await
        .unwrap();

    let config = second_manager.service("api").unwrap();
    let second = second_manager
        .package(&config, None, &progress, None, &cancel)
        .await
        .unwrap();

    assert_eq!(fixture.framework.packages.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.target.packages.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[smol_potat::test]
async fn test_full_pipeline_threads_artifacts_through_the_context() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let config = manager.service("api").unwrap();
    let (progress, _rx) = progress_channel();
    let cancel = CancelToken::none();

    let restored = manager.restore(&config, &progress, &cancel).await.unwrap();
    let built = manager
        .build(&config, Some(restored.as_ref()), &progress, &cancel)
        .await
        .unwrap();
    let packaged = manager
        .package(&config, Some(built.as_ref()), &progress, None, &cancel)
        .await
        .unwrap();
    let published = manager
        .publish(&config, Some(packaged.as_ref()), &progress, None, &cancel)
        .await
        .unwrap();
    let deployed = manager
        .deploy(&config, Some(published.as_ref()), &progress, &cancel)
        .await
        .unwrap();

    // Each successful phase populated its collection
    let context = manager.context_snapshot("api");
    assert!(!context.build.is_empty());
    assert!(!context.package.is_empty());
    assert!(!context.deploy.is_empty());

    match deployed.as_ref() {
        deploy_model::PhaseResult::Deploy(result) => {
            assert_eq!(result.endpoints, vec!["https://spy.example.com"]);
            assert_eq!(result.kind, "appservice");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert_eq!(fixture.target.publishes.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.target.deploys.load(Ordering::SeqCst), 1);

    // Ending the pipeline discards the context
    assert!(manager.end_pipeline("api").is_some());
    assert!(manager.context_snapshot("api").build.is_empty());
}

#[smol_potat::test]
async fn test_progress_items_preserve_emission_order() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let config = manager.service("api").unwrap();
    let (progress, rx) = progress_channel();
    let cancel = CancelToken::none();

    let restored = manager.restore(&config, &progress, &cancel).await.unwrap();
    manager
        .build(&config, Some(restored.as_ref()), &progress, &cancel)
        .await
        .unwrap();
    drop(progress);

    let mut messages = Vec::new();
    while let Ok(item) = rx.recv().await {
        messages.push(item.message);
    }
    assert_eq!(messages, vec!["spy restoring", "spy building"]);
}

#[smol_potat::test]
async fn test_cancellation_aborts_before_the_plugin_runs() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let config = manager.service("api").unwrap();
    let (progress, _rx) = progress_channel();

    let (source, cancel) = toolchain_exec::cancel_pair();
    source.cancel();

    let err = manager.restore(&config, &progress, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(fixture.framework.restores.load(Ordering::SeqCst), 0);
}

#[smol_potat::test]
async fn test_handler_registration_is_sealed_after_initialize() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let config = manager.service("api").unwrap();

    manager
        .initialize(&config, &CancelToken::none())
        .await
        .unwrap();

    let err = config
        .handlers
        .register(
            "predeploy",
            Arc::new(|_args| Box::pin(async { Ok(()) })),
        )
        .unwrap_err();
    assert!(matches!(err, deploy_model::Error::HandlersSealed { .. }));
}
