//! Wire-level representation exchanged with out-of-process extensions
//!
//! Kind and location-kind travel as enumerated wire tags with explicit
//! conversion tables in both directions. `Unspecified` is the protocol-error
//! marker: locally rich kinds with no wire representation map to it on the
//! way out, and it is rejected on the way in.

use crate::{
    Artifact, ArtifactKind, DeployResult, Error, LocationKind, PackageResult, PublishResult,
    Result, ServiceConfig, TargetResource,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Artifact kind as it travels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireArtifactKind {
    /// Protocol-error marker
    Unspecified,
    /// Directory tree
    Directory,
    /// Configuration values
    Config,
    /// Archive file
    Archive,
    /// Container image reference
    Container,
    /// Service URL
    Endpoint,
    /// Provider deployment record
    Deployment,
    /// Cloud resource
    Resource,
}

/// Location kind as it travels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireLocationKind {
    /// Protocol-error marker
    Unspecified,
    /// Local filesystem path
    Local,
    /// Remote URI
    Remote,
}

/// Map a local artifact kind onto its wire tag.
///
/// Kinds the wire enum cannot express map to the `Unspecified` marker.
pub fn kind_to_wire(kind: ArtifactKind) -> WireArtifactKind {
    match kind {
        ArtifactKind::Directory => WireArtifactKind::Directory,
        ArtifactKind::Config => WireArtifactKind::Config,
        ArtifactKind::Archive => WireArtifactKind::Archive,
        ArtifactKind::ContainerImage => WireArtifactKind::Container,
        ArtifactKind::Endpoint => WireArtifactKind::Endpoint,
        ArtifactKind::Deployment => WireArtifactKind::Deployment,
        ArtifactKind::Resource => WireArtifactKind::Resource,
        ArtifactKind::File
        | ArtifactKind::Executable
        | ArtifactKind::Library
        | ArtifactKind::HelmChart
        | ArtifactKind::Blob => WireArtifactKind::Unspecified,
    }
}

/// Map a wire tag back onto the local artifact kind
pub fn kind_from_wire(kind: WireArtifactKind) -> Result<ArtifactKind> {
    match kind {
        WireArtifactKind::Directory => Ok(ArtifactKind::Directory),
        WireArtifactKind::Config => Ok(ArtifactKind::Config),
        WireArtifactKind::Archive => Ok(ArtifactKind::Archive),
        WireArtifactKind::Container => Ok(ArtifactKind::ContainerImage),
        WireArtifactKind::Endpoint => Ok(ArtifactKind::Endpoint),
        WireArtifactKind::Deployment => Ok(ArtifactKind::Deployment),
        WireArtifactKind::Resource => Ok(ArtifactKind::Resource),
        WireArtifactKind::Unspecified => Err(Error::UnknownWireTag {
            tag: "ARTIFACT_KIND_UNSPECIFIED".to_string(),
        }),
    }
}

/// Map a location kind onto its wire tag
pub fn location_kind_to_wire(kind: LocationKind) -> WireLocationKind {
    match kind {
        LocationKind::Local => WireLocationKind::Local,
        LocationKind::Remote => WireLocationKind::Remote,
    }
}

/// Map a wire tag back onto the local location kind
pub fn location_kind_from_wire(kind: WireLocationKind) -> Result<LocationKind> {
    match kind {
        WireLocationKind::Local => Ok(LocationKind::Local),
        WireLocationKind::Remote => Ok(LocationKind::Remote),
        WireLocationKind::Unspecified => Err(Error::UnknownWireTag {
            tag: "LOCATION_KIND_UNSPECIFIED".to_string(),
        }),
    }
}

/// An artifact as it travels on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireArtifact {
    /// Wire kind tag
    pub kind: WireArtifactKind,
    /// Local path or remote URI
    pub location: String,
    /// Wire location-kind tag
    pub location_kind: WireLocationKind,
    /// String metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WireArtifact {
    /// Convert a local artifact to its wire form.
    ///
    /// Fails for kinds with no wire representation: sending one to an
    /// extension would be a protocol violation on our side.
    pub fn from_artifact(artifact: &Artifact) -> Result<Self> {
        let kind = kind_to_wire(artifact.kind);
        if kind == WireArtifactKind::Unspecified {
            return Err(Error::UnmappableKind {
                kind: artifact.kind,
            });
        }
        Ok(Self {
            kind,
            location: artifact.location.clone(),
            location_kind: location_kind_to_wire(artifact.location_kind),
            metadata: artifact.metadata.clone(),
        })
    }

    /// Convert a wire artifact back to the local representation
    pub fn into_artifact(self) -> Result<Artifact> {
        Ok(Artifact {
            kind: kind_from_wire(self.kind)?,
            location: self.location,
            location_kind: location_kind_from_wire(self.location_kind)?,
            metadata: self.metadata,
        })
    }
}

/// Convert a whole collection to wire artifacts
pub fn artifacts_to_wire(artifacts: &crate::ArtifactCollection) -> Result<Vec<WireArtifact>> {
    artifacts.iter().map(WireArtifact::from_artifact).collect()
}

/// Convert wire artifacts back to a collection
pub fn artifacts_from_wire(
    artifacts: Vec<WireArtifact>,
) -> Result<crate::ArtifactCollection> {
    artifacts
        .into_iter()
        .map(WireArtifact::into_artifact)
        .collect()
}

/// Service configuration projection sent to extensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireServiceConfig {
    /// Service name
    pub name: String,
    /// Relative source path
    pub relative_path: String,
    /// Language kind string
    pub language: String,
    /// Host kind string
    pub host: String,
    /// Optional output path
    pub output_path: Option<String>,
    /// Per-service configuration values
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl WireServiceConfig {
    /// Project a local service config onto its wire form
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            name: config.name.clone(),
            relative_path: config.relative_path.to_string_lossy().into_owned(),
            language: config.language.framework_key().to_string(),
            host: config.host.key().to_string(),
            output_path: config
                .output_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            config: config.config.clone(),
        }
    }
}

/// Target resource identity as it travels on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTargetResource {
    /// Subscription id
    pub subscription_id: String,
    /// Resource group name
    pub resource_group: String,
    /// Resource name
    pub resource_name: String,
    /// Provider type string
    pub resource_type: String,
}

impl WireTargetResource {
    /// Convert a local target resource to its wire form
    pub fn from_resource(resource: &TargetResource) -> Self {
        Self {
            subscription_id: resource.subscription_id.clone(),
            resource_group: resource.resource_group.clone(),
            resource_name: resource.name.clone(),
            resource_type: resource.kind.clone(),
        }
    }

    /// Convert back to the local representation
    pub fn into_resource(self) -> TargetResource {
        TargetResource {
            subscription_id: self.subscription_id,
            resource_group: self.resource_group,
            name: self.resource_name,
            kind: self.resource_type,
        }
    }
}

/// Package result as it travels on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePackageResult {
    /// Packaged artifacts
    #[serde(default)]
    pub artifacts: Vec<WireArtifact>,
}

impl WirePackageResult {
    /// Convert back to the local result type
    pub fn into_result(self) -> Result<PackageResult> {
        Ok(PackageResult {
            artifacts: artifacts_from_wire(self.artifacts)?,
        })
    }
}

/// Publish result as it travels on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePublishResult {
    /// Published artifacts
    #[serde(default)]
    pub artifacts: Vec<WireArtifact>,
}

impl WirePublishResult {
    /// Convert back to the local result type
    pub fn into_result(self) -> Result<PublishResult> {
        Ok(PublishResult {
            artifacts: artifacts_from_wire(self.artifacts)?,
        })
    }
}

/// Deploy result as it travels on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireDeployResult {
    /// Resource id of the deployed target
    pub target_resource_id: String,
    /// Host kind string
    pub kind: String,
    /// Discovered endpoint URLs
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Provider-specific detail payload
    pub details: Option<serde_json::Value>,
}

impl WireDeployResult {
    /// Convert back to the local result type, materialising one endpoint
    /// artifact per discovered URL
    pub fn into_result(self) -> Result<DeployResult> {
        let mut artifacts = crate::ArtifactCollection::new();
        for endpoint in &self.endpoints {
            artifacts.push(Artifact::remote(ArtifactKind::Endpoint, endpoint.clone())?);
        }
        Ok(DeployResult {
            artifacts,
            target_resource_id: self.target_resource_id,
            kind: self.kind,
            endpoints: self.endpoints,
            details: self.details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ServiceHost, ServiceLanguage};

    const WIRE_KINDS: [WireArtifactKind; 7] = [
        WireArtifactKind::Directory,
        WireArtifactKind::Config,
        WireArtifactKind::Archive,
        WireArtifactKind::Container,
        WireArtifactKind::Endpoint,
        WireArtifactKind::Deployment,
        WireArtifactKind::Resource,
    ];

    #[test]
    fn test_round_trip_for_every_wire_kind() {
        for wire_kind in WIRE_KINDS {
            let kind = kind_from_wire(wire_kind).unwrap();
            assert_eq!(kind_to_wire(kind), wire_kind);
        }
    }

    #[test]
    fn test_artifact_round_trip() {
        for wire_kind in WIRE_KINDS {
            let kind = kind_from_wire(wire_kind).unwrap();
            let artifact = Artifact {
                kind,
                location: "/some/location".to_string(),
                location_kind: LocationKind::Local,
                metadata: HashMap::from([("key".to_string(), "value".to_string())]),
            };

            let restored = WireArtifact::from_artifact(&artifact)
                .unwrap()
                .into_artifact()
                .unwrap();
            assert_eq!(restored, artifact);
        }
    }

    #[test]
    fn test_unmappable_kind_is_the_marker() {
        assert_eq!(
            kind_to_wire(ArtifactKind::HelmChart),
            WireArtifactKind::Unspecified
        );
        assert_eq!(
            kind_to_wire(ArtifactKind::Blob),
            WireArtifactKind::Unspecified
        );

        let artifact = Artifact::local(ArtifactKind::HelmChart, "/charts/app.tgz").unwrap();
        assert!(matches!(
            WireArtifact::from_artifact(&artifact),
            Err(Error::UnmappableKind { .. })
        ));
    }

    #[test]
    fn test_unspecified_tags_are_protocol_errors() {
        assert!(kind_from_wire(WireArtifactKind::Unspecified).is_err());
        assert!(location_kind_from_wire(WireLocationKind::Unspecified).is_err());
    }

    #[test]
    fn test_wire_kind_serialises_screaming_snake() {
        let json = serde_json::to_string(&WireArtifactKind::Container).unwrap();
        assert_eq!(json, "\"CONTAINER\"");
        let json = serde_json::to_string(&WireLocationKind::Remote).unwrap();
        assert_eq!(json, "\"REMOTE\"");
    }

    #[test]
    fn test_service_config_projection() {
        let config = ServiceConfig::new(
            "api",
            "src/api",
            ServiceLanguage::TypeScript,
            ServiceHost::AppService,
        );
        let wire = WireServiceConfig::from_config(&config);
        assert_eq!(wire.name, "api");
        assert_eq!(wire.language, "node");
        assert_eq!(wire.host, "appservice");
    }

    #[test]
    fn test_deploy_result_materialises_endpoints() {
        let wire = WireDeployResult {
            target_resource_id: "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Web/sites/api"
                .to_string(),
            kind: "appservice".to_string(),
            endpoints: vec!["https://api.example.com".to_string()],
            details: None,
        };

        let result = wire.into_result().unwrap();
        assert_eq!(result.endpoints.len(), 1);
        assert_eq!(
            result
                .artifacts
                .primary_location_by_kind(ArtifactKind::Endpoint),
            Some("https://api.example.com")
        );
    }
}
