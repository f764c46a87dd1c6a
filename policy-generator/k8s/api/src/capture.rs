//! The capture metadata document.
//!
//! A capture run records one packet capture per pod alongside a snapshot of
//! the namespace's services, pods, replica sets and deployments, as returned
//! by `kubectl get -o json`. Only the fields used to resolve traffic are
//! modeled here; everything else in the cluster objects is ignored.

use crate::labels::{Labels, Map, Selector};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::Deserialize;
use std::{
    net::IpAddr,
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, Deserialize)]
pub struct CaptureMetadata {
    pub services: List<Service>,
    pub pods: List<Pod>,
    #[serde(rename = "rs")]
    pub replica_sets: List<ReplicaSet>,
    pub deployments: List<Deployment>,
    pub pod_metadata: Vec<PodCapture>,
}

/// A cluster-API list object.
#[derive(Clone, Debug, Deserialize)]
pub struct List<T> {
    pub items: Vec<T>,
}

/// Describes a single pod's capture artifact.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PodCapture {
    pub pod: String,

    /// Relative to the directory holding the metadata document.
    pub file: PathBuf,

    #[serde(rename = "IP")]
    pub ip: IpAddr,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,

    #[serde(default)]
    pub labels: Labels,

    #[serde(default)]
    pub owner_references: Option<Vec<OwnerReference>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: ServiceSpec,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServiceSpec {
    #[serde(rename = "clusterIP")]
    pub cluster_ip: Option<String>,

    #[serde(default)]
    pub selector: Option<Map>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Pod {
    pub metadata: Metadata,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PodStatus {
    #[serde(rename = "podIP")]
    pub pod_ip: Option<IpAddr>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReplicaSet {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: WorkloadSpec,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Deployment {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: WorkloadSpec,
}

/// The portion of a workload controller's spec that selects its pods.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub selector: LabelSelector,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read capture metadata {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed capture metadata {}: {source}", .path.display())]
    MalformedMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// === impl CaptureMetadata ===

impl CaptureMetadata {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| LoadError::MalformedMetadata {
            path: path.to_path_buf(),
            source,
        })
    }
}

// === impl PodCapture ===

impl PodCapture {
    /// Resolves the capture artifact relative to `base`, the directory holding
    /// the metadata document.
    pub fn path(&self, base: &Path) -> PathBuf {
        base.join(&self.file)
    }
}

// === impl Metadata ===

impl Metadata {
    pub fn owner_references(&self) -> &[OwnerReference] {
        self.owner_references.as_deref().unwrap_or_default()
    }
}

// === impl Service ===

impl Service {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The service's virtual IP. Headless services (`clusterIP: None`) have
    /// none.
    pub fn cluster_ip(&self) -> Option<IpAddr> {
        self.spec.cluster_ip.as_deref()?.parse().ok()
    }

    /// The pod selector, if the service selects pods at all.
    ///
    /// Services without a selector have manually managed endpoints.
    pub fn selector(&self) -> Option<Selector> {
        let selector = Selector::from_map(self.spec.selector.clone()?);
        (!selector.is_empty()).then_some(selector)
    }
}

// === impl Pod ===

impl Pod {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn labels(&self) -> &Labels {
        &self.metadata.labels
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.status.pod_ip
    }
}
