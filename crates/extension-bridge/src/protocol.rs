//! Extension wire protocol messages

use deploy_model::wire::{
    WireArtifact, WireDeployResult, WirePackageResult, WirePublishResult, WireServiceConfig,
    WireTargetResource,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error information attached to a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error message
    pub message: String,
    /// Optional machine-readable code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// One message on the extension stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMessage {
    /// Correlation id, generated by the requesting side
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// Error information; a non-empty message fails the request verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// The message body
    #[serde(flatten)]
    pub body: MessageBody,
}

impl ExtensionMessage {
    /// Create a request with a fresh request id
    pub fn request(body: MessageBody) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            error: None,
            body,
        }
    }

    /// Create a response correlated to an existing request
    pub fn response(request_id: impl Into<String>, body: MessageBody) -> Self {
        Self {
            request_id: request_id.into(),
            error: None,
            body,
        }
    }

    /// Create a progress message for an in-flight request
    pub fn progress(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            error: None,
            body: MessageBody::Progress {
                message: message.into(),
            },
        }
    }

    /// Attach error information
    pub fn with_error(mut self, message: impl Into<String>, code: Option<String>) -> Self {
        self.error = Some(ErrorInfo {
            message: message.into(),
            code,
        });
        self
    }

    /// Whether this is a progress message
    pub fn is_progress(&self) -> bool {
        matches!(self.body, MessageBody::Progress { .. })
    }
}

/// The oneof payload of an extension message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    /// Initialize the extension for a service
    InitializeRequest {
        /// The service being initialized
        service: WireServiceConfig,
    },
    /// Initialization acknowledged
    InitializeResponse {},

    /// Wrap the framework's package for this host
    PackageRequest {
        /// The service being packaged
        service: WireServiceConfig,
        /// Artifacts produced by the framework's package step
        framework_package: Vec<WireArtifact>,
    },
    /// Package step finished
    PackageResponse {
        /// The resulting package
        result: WirePackageResult,
    },

    /// Push the package to the host's intermediate store
    PublishRequest {
        /// The service being published
        service: WireServiceConfig,
        /// The package to publish
        service_package: Vec<WireArtifact>,
        /// The resolved target resource
        target_resource: WireTargetResource,
    },
    /// Publish step finished
    PublishResponse {
        /// The publish outcome
        result: WirePublishResult,
    },

    /// Activate the published artifact on the target resource
    DeployRequest {
        /// The service being deployed
        service: WireServiceConfig,
        /// Artifacts produced by publish
        service_publish: Vec<WireArtifact>,
        /// The resolved target resource
        target_resource: WireTargetResource,
    },
    /// Deploy step finished
    DeployResponse {
        /// The deploy outcome
        result: WireDeployResult,
    },

    /// Discover service endpoints
    EndpointsRequest {
        /// The service to inspect
        service: WireServiceConfig,
        /// The resolved target resource
        target_resource: WireTargetResource,
    },
    /// Endpoint discovery finished
    EndpointsResponse {
        /// Discovered URLs, in order
        endpoints: Vec<String>,
    },

    /// Resolve the target resource, merging with the host-computed default
    GetTargetResourceRequest {
        /// The service to resolve for
        service: WireServiceConfig,
        /// Default resolution computed locally, if it succeeded
        default_resource: Option<WireTargetResource>,
        /// Error from the default resolution, if it failed
        default_error: Option<String>,
    },
    /// Target resource resolution finished
    GetTargetResourceResponse {
        /// The resolved target resource
        resource: WireTargetResource,
    },

    /// Progress for an in-flight request; never satisfies a response wait
    Progress {
        /// Progress text
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_round_trips_through_json() {
        let message = ExtensionMessage::request(MessageBody::EndpointsResponse {
            endpoints: vec!["https://api.example.com".to_string()],
        });

        let json = serde_json::to_string(&message).unwrap();
        let parsed: ExtensionMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_unknown_body_tag_fails_parsing() {
        let json = r#"{"requestId":"r1","type":"mystery_request"}"#;
        assert!(serde_json::from_str::<ExtensionMessage>(json).is_err());
    }

    #[test]
    fn test_progress_detection() {
        let progress = ExtensionMessage::progress("r1", "pushing image");
        assert!(progress.is_progress());
        assert_eq!(progress.request_id, "r1");

        let response = ExtensionMessage::response("r1", MessageBody::InitializeResponse {});
        assert!(!response.is_progress());
    }

    #[test]
    fn test_error_info_attaches() {
        let message = ExtensionMessage::response("r1", MessageBody::InitializeResponse {})
            .with_error("registry unavailable", Some("E_REGISTRY".to_string()));
        let error = message.error.unwrap();
        assert_eq!(error.message, "registry unavailable");
        assert_eq!(error.code.as_deref(), Some("E_REGISTRY"));
    }
}
