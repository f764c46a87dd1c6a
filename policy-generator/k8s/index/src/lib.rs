//! Cluster topology lookups and traffic graph construction.
//!
//! A capture run provides a snapshot of the namespace's services, pods, replica sets and
//! deployments. The [`TopologyIndex`] holds that snapshot for the duration of a run and is never
//! modified once built:
//!
//! - A `Service` is indexed by its cluster IP and resolves to the pods its selector matches.
//! - A `Pod` is indexed by name (and scanned by IP) and resolves, through its owner references, to
//!   the workload that manages it.
//! - A `ReplicaSet` or `Deployment` is indexed by name and contributes its name and pod selector
//!   to the workloads it owns.
//!
//! ```text
//! [ Service ] -> [ Pod ] -> [ ReplicaSet ] -> [ Deployment ]
//! ```
//!
//! The [`GraphBuilder`] borrows the index and folds a pod's observed flows into a
//! [`TrafficGraph`](netpol_generator_core::TrafficGraph), resolving each destination address to a
//! workload or an external endpoint.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod ingest;
mod owner;
mod topology;


pub use self::{
    ingest::GraphBuilder,
    owner::{OwnerResolver, Workload},
    topology::TopologyIndex,
};

/// Failures resolving a pod's identity against the topology snapshot.
///
/// All of these abort a run: a policy derived from a partially resolved topology cannot be
/// trusted.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("pod {0} not found")]
    UnknownPod(String),

    #[error("{kind} {name} not found")]
    UnknownOwner { kind: &'static str, name: String },

    #[error("{owned} {name} is owned by unsupported kind {kind}")]
    UnsupportedOwnerKind {
        owned: &'static str,
        name: String,
        kind: String,
    },

    #[error("{owned} {name} has {count} owner references")]
    AmbiguousOwner {
        owned: &'static str,
        name: String,
        count: usize,
    },

    #[error("workload {0} has an empty pod selector")]
    EmptySelector(String),

    #[error("service {0} selects no pods")]
    UnresolvedServiceSelector(String),
}
