//! Extension-backed target: phases proxied over the bridge

use super::{PublishOptions, TargetService};
use crate::{Error, OperationContext, Result};
use async_trait::async_trait;
use deploy_model::wire::{WireServiceConfig, WireTargetResource, artifacts_to_wire};
use deploy_model::{
    DeployResult, PackageResult, ProgressSink, ProjectConfig, PublishResult, ServiceConfig,
    ServiceContext, TargetResource,
};
use extension_bridge::{ConsoleBridge, ExtensionBridge, ExtensionMessage, MessageBody};
use futures::FutureExt;
use futures::future::BoxFuture;
use toolchain_exec::ToolEvent;
use tracing::debug;

/// Target whose phases run in an out-of-process extension.
///
/// Each call becomes a request on the extension stream; progress messages
/// for the request are forwarded to the caller's progress sink, and the
/// matching response is mapped back through the wire layer.
pub struct ExternalTarget {
    name: String,
    bridge: ExtensionBridge,
}

impl ExternalTarget {
    /// Create a target proxying to the named extension over the bridge
    pub fn new(name: impl Into<String>, bridge: ExtensionBridge) -> Self {
        Self {
            name: name.into(),
            bridge,
        }
    }

    /// Create a target whose extension stdout/stderr are tee'd into the
    /// host console while bridge calls are outstanding.
    ///
    /// `output` carries the extension process's output events as produced
    /// by the tool runner that spawned it. Returns the console handle and
    /// the forwarding driver; the caller spawns the driver next to the
    /// bridge driver and the tee is restored (silenced) whenever no call is
    /// in flight.
    pub fn with_console(
        name: impl Into<String>,
        bridge: ExtensionBridge,
        output: async_channel::Receiver<ToolEvent>,
    ) -> (Self, ConsoleBridge, BoxFuture<'static, ()>) {
        let console = ConsoleBridge::new();
        let driver = console.clone().drive(output).boxed();
        let target = Self::new(name, bridge.with_console(console.clone()));
        (target, console, driver)
    }

    /// The extension name this target proxies to
    pub fn extension_name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl TargetService for ExternalTarget {
    async fn initialize(
        &self,
        ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
    ) -> Result<()> {
        debug!(
            "Initializing extension '{}' for service '{}'",
            self.name, config.name
        );
        self.bridge
            .call(
                MessageBody::InitializeRequest {
                    service: WireServiceConfig::from_config(config),
                },
                |message: &ExtensionMessage| {
                    matches!(message.body, MessageBody::InitializeResponse {})
                },
                None,
                &ctx.cancel,
            )
            .await?;
        Ok(())
    }

    async fn package(
        &self,
        ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        framework: &PackageResult,
        _options: Option<&PublishOptions>,
        progress: &ProgressSink,
    ) -> Result<PackageResult> {
        let response = self
            .bridge
            .call(
                MessageBody::PackageRequest {
                    service: WireServiceConfig::from_config(config),
                    framework_package: artifacts_to_wire(&framework.artifacts)?,
                },
                |message: &ExtensionMessage| {
                    matches!(message.body, MessageBody::PackageResponse { .. })
                },
                Some(progress),
                &ctx.cancel,
            )
            .await?;

        match response.body {
            MessageBody::PackageResponse { result } => Ok(result.into_result()?),
            _ => Err(Error::protocol("package response had no package body")),
        }
    }

    async fn publish(
        &self,
        ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        target: &TargetResource,
        _options: Option<&PublishOptions>,
        progress: &ProgressSink,
    ) -> Result<PublishResult> {
        let response = self
            .bridge
            .call(
                MessageBody::PublishRequest {
                    service: WireServiceConfig::from_config(config),
                    service_package: artifacts_to_wire(&service_ctx.package)?,
                    target_resource: WireTargetResource::from_resource(target),
                },
                |message: &ExtensionMessage| {
                    matches!(message.body, MessageBody::PublishResponse { .. })
                },
                Some(progress),
                &ctx.cancel,
            )
            .await?;

        match response.body {
            MessageBody::PublishResponse { result } => Ok(result.into_result()?),
            _ => Err(Error::protocol("publish response had no publish body")),
        }
    }

    async fn deploy(
        &self,
        ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        target: &TargetResource,
        progress: &ProgressSink,
    ) -> Result<DeployResult> {
        let response = self
            .bridge
            .call(
                MessageBody::DeployRequest {
                    service: WireServiceConfig::from_config(config),
                    service_publish: artifacts_to_wire(&service_ctx.publish)?,
                    target_resource: WireTargetResource::from_resource(target),
                },
                |message: &ExtensionMessage| {
                    matches!(message.body, MessageBody::DeployResponse { .. })
                },
                Some(progress),
                &ctx.cancel,
            )
            .await?;

        match response.body {
            MessageBody::DeployResponse { result } => Ok(result.into_result()?),
            _ => Err(Error::protocol("deploy response had no deploy body")),
        }
    }

    async fn endpoints(
        &self,
        ctx: &OperationContext,
        config: &ServiceConfig,
        target: &TargetResource,
    ) -> Result<Vec<String>> {
        let response = self
            .bridge
            .call(
                MessageBody::EndpointsRequest {
                    service: WireServiceConfig::from_config(config),
                    target_resource: WireTargetResource::from_resource(target),
                },
                |message: &ExtensionMessage| {
                    matches!(message.body, MessageBody::EndpointsResponse { .. })
                },
                None,
                &ctx.cancel,
            )
            .await?;

        match response.body {
            MessageBody::EndpointsResponse { endpoints } => Ok(endpoints),
            _ => Err(Error::protocol("endpoints response had no endpoints body")),
        }
    }

    async fn resolve_target_resource(
        &self,
        ctx: &OperationContext,
        _subscription_id: &str,
        config: &ServiceConfig,
        fallback: Result<TargetResource>,
    ) -> Result<TargetResource> {
        // The extension decides how to merge the locally computed default
        // with its own resolution.
        let (default_resource, default_error) = match fallback {
            Ok(resource) => (Some(WireTargetResource::from_resource(&resource)), None),
            Err(error) => (None, Some(error.to_string())),
        };

        let response = self
            .bridge
            .call(
                MessageBody::GetTargetResourceRequest {
                    service: WireServiceConfig::from_config(config),
                    default_resource,
                    default_error,
                },
                |message: &ExtensionMessage| {
                    matches!(message.body, MessageBody::GetTargetResourceResponse { .. })
                },
                None,
                &ctx.cancel,
            )
            .await?;

        match response.body {
            MessageBody::GetTargetResourceResponse { resource } => Ok(resource.into_resource()),
            _ => Err(Error::protocol(
                "get-target-resource response had no resource body",
            )),
        }
    }
}
