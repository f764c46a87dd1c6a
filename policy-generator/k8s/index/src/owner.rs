use crate::{ResolveError, TopologyIndex};
use netpol_generator_k8s_api::{LabelSelector, OwnerReference};
use tracing::trace;

/// The workload that manages a pod: its name and a selector matching all of its replicas.
#[derive(Clone, Debug, PartialEq)]
pub struct Workload {
    pub name: String,
    pub selector: LabelSelector,
}

/// Walks pod ownership (`Pod -> ReplicaSet -> Deployment`) to find the workload that manages a
/// pod.
///
/// Traffic observed from one pod is generalized to every replica of its workload, so the
/// selector returned is the topmost controller's rather than the pod's own labels.
#[derive(Copy, Clone, Debug)]
pub struct OwnerResolver<'i> {
    index: &'i TopologyIndex,
}

// === impl OwnerResolver ===

impl<'i> OwnerResolver<'i> {
    pub fn new(index: &'i TopologyIndex) -> Self {
        Self { index }
    }

    /// The workload name for `pod`: the owning deployment's name, else the owning replica set's,
    /// else the pod's own.
    pub fn owner_name(&self, pod: &str) -> Result<String, ResolveError> {
        self.resolve(pod).map(|w| w.name)
    }

    /// The pod selector for `pod`'s workload. Fails if the selector would match every pod.
    pub fn selector(&self, pod: &str) -> Result<LabelSelector, ResolveError> {
        self.resolve(pod)?.require_selector().map(|w| w.selector)
    }

    /// Resolves `pod`'s workload. The selector is not checked; see [`Workload::require_selector`].
    pub fn resolve(&self, pod_name: &str) -> Result<Workload, ResolveError> {
        let pod = self
            .index
            .pod(pod_name)
            .ok_or_else(|| ResolveError::UnknownPod(pod_name.to_string()))?;

        let Some(owner) = sole_owner("Pod", pod_name, pod.metadata.owner_references())? else {
            trace!(pod = %pod_name, "Pod has no owner");
            return Ok(Workload::new(
                pod_name,
                LabelSelector {
                    match_labels: Some(pod.labels().to_map()),
                    ..Default::default()
                },
            ));
        };
        if owner.kind != "ReplicaSet" {
            return Err(ResolveError::UnsupportedOwnerKind {
                owned: "Pod",
                name: pod_name.to_string(),
                kind: owner.kind.clone(),
            });
        }

        let rs = self
            .index
            .replica_set(&owner.name)
            .ok_or_else(|| ResolveError::UnknownOwner {
                kind: "ReplicaSet",
                name: owner.name.clone(),
            })?;
        let rs_name = rs.metadata.name.as_str();

        let Some(owner) = sole_owner("ReplicaSet", rs_name, rs.metadata.owner_references())? else {
            trace!(pod = %pod_name, replicaset = %rs_name, "ReplicaSet has no owner");
            return Ok(Workload::new(rs_name, rs.spec.selector.clone()));
        };
        if owner.kind != "Deployment" {
            return Err(ResolveError::UnsupportedOwnerKind {
                owned: "ReplicaSet",
                name: rs_name.to_string(),
                kind: owner.kind.clone(),
            });
        }

        let deploy = self
            .index
            .deployment(&owner.name)
            .ok_or_else(|| ResolveError::UnknownOwner {
                kind: "Deployment",
                name: owner.name.clone(),
            })?;
        trace!(pod = %pod_name, deployment = %deploy.metadata.name, "Resolved deployment");
        Ok(Workload::new(
            &deploy.metadata.name,
            deploy.spec.selector.clone(),
        ))
    }
}

/// Returns the only owner reference, if any.
fn sole_owner<'o>(
    owned: &'static str,
    name: &str,
    refs: &'o [OwnerReference],
) -> Result<Option<&'o OwnerReference>, ResolveError> {
    match refs {
        [] => Ok(None),
        [owner] => Ok(Some(owner)),
        refs => Err(ResolveError::AmbiguousOwner {
            owned,
            name: name.to_string(),
            count: refs.len(),
        }),
    }
}

// === impl Workload ===

impl Workload {
    fn new(name: &str, selector: LabelSelector) -> Self {
        Self {
            name: name.to_string(),
            selector,
        }
    }

    /// Fails with [`ResolveError::EmptySelector`] if the selector has neither labels nor
    /// expressions.
    ///
    /// An unlabeled pod is still a workload and may appear in the traffic graph, but an empty
    /// selector matches every pod in the namespace and must never be emitted into a policy.
    pub fn require_selector(self) -> Result<Self, ResolveError> {
        let empty_labels = self
            .selector
            .match_labels
            .as_ref()
            .map_or(true, |l| l.is_empty());
        let empty_exprs = self
            .selector
            .match_expressions
            .as_ref()
            .map_or(true, |e| e.is_empty());
        if empty_labels && empty_exprs {
            return Err(ResolveError::EmptySelector(self.name));
        }
        Ok(self)
    }
}
