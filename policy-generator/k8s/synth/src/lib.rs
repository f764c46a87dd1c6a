//! Derives `NetworkPolicy` resources from a traffic graph.
//!
//! Every workload vertex in the graph becomes the subject of one policy. Its outgoing edges become
//! egress rules and its incoming edges become ingress rules; each rule admits TCP on the ports
//! observed along the edge, to or from a single peer:
//!
//! - a workload peer is selected by its workload's pod selector;
//! - an external address is selected by a single-address `ipBlock`.
//!
//! Pods of the same workload share a policy. Anything not observed is denied once the policies
//! are applied, so a namespace-wide policy allowing DNS is emitted alongside them.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod dns;
mod rules;


pub use self::dns::{dns_policy, DNS_POLICY_NAME};
use self::rules::{PeerKey, Rules};
use netpol_generator_core::{host_net, NodeId, NodeKind, TrafficGraph};
use netpol_generator_k8s_api::{
    IPBlock, LabelSelector, NetworkPolicy, NetworkPolicyPeer, NetworkPolicySpec, ObjectMeta,
};
use netpol_generator_k8s_index::{OwnerResolver, ResolveError, TopologyIndex};
use std::{collections::BTreeMap, net::IpAddr};
use tracing::{debug, info, instrument};

/// Selects which policies are generated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub ingress: bool,
    pub egress: bool,
    pub dns: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{0} cannot be expressed as a network policy peer")]
    UnsupportedPeer(NodeId),

    #[error("invalid external address {0:?}")]
    InvalidAddress(String),

    #[error("workload {0} has the same name as the DNS policy")]
    NameConflict(String),
}

#[derive(Copy, Clone, Debug)]
pub struct Synthesizer<'i> {
    owners: OwnerResolver<'i>,
    config: Config,
}

/// A policy under construction, accumulated across all of a workload's pods.
#[derive(Debug)]
struct Draft {
    selector: LabelSelector,
    ingress: Rules,
    egress: Rules,
}

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            ingress: true,
            egress: true,
            dns: true,
        }
    }
}

// === impl Synthesizer ===

impl<'i> Synthesizer<'i> {
    pub fn new(index: &'i TopologyIndex, config: Config) -> Self {
        Self {
            owners: OwnerResolver::new(index),
            config,
        }
    }

    /// Produces one policy per workload with at least one rule, ordered by name, followed by the
    /// DNS policy.
    #[instrument(skip_all, fields(nodes = graph.node_count(), edges = graph.edge_count()))]
    pub fn synthesize(&self, graph: &TrafficGraph) -> Result<Vec<NetworkPolicy>, SynthesisError> {
        let mut drafts = BTreeMap::<String, Draft>::new();

        for (id, _) in graph.workloads() {
            let mut egress = Rules::default();
            if self.config.egress {
                for (dst, ports) in graph.edges_from(id) {
                    let (key, peer) = self.peer(dst)?;
                    egress.insert(key, peer, ports.iter());
                }
            }

            let mut ingress = Rules::default();
            if self.config.ingress {
                for (src, ports) in graph.edges_to(id) {
                    let (key, peer) = self.peer(src)?;
                    ingress.insert(key, peer, ports.iter());
                }
            }

            if ingress.is_empty() && egress.is_empty() {
                debug!(%id, "No rules");
                continue;
            }

            let workload = self.owners.resolve(&id.key)?.require_selector()?;
            let draft = drafts.entry(workload.name).or_insert_with(|| Draft {
                selector: workload.selector,
                ingress: Rules::default(),
                egress: Rules::default(),
            });
            draft.ingress.extend(ingress);
            draft.egress.extend(egress);
        }

        if self.config.dns && drafts.contains_key(DNS_POLICY_NAME) {
            return Err(SynthesisError::NameConflict(DNS_POLICY_NAME.to_string()));
        }

        let mut policies = drafts
            .into_iter()
            .map(|(name, draft)| draft.into_policy(name))
            .collect::<Vec<_>>();
        info!(workloads = policies.len(), "Synthesized policies");

        if self.config.dns {
            policies.push(dns_policy());
        }
        Ok(policies)
    }

    fn peer(&self, id: &NodeId) -> Result<(PeerKey, NetworkPolicyPeer), SynthesisError> {
        match id.kind {
            NodeKind::Workload => {
                let workload = self.owners.resolve(&id.key)?.require_selector()?;
                let peer = NetworkPolicyPeer {
                    pod_selector: Some(workload.selector),
                    ..Default::default()
                };
                Ok((PeerKey::Workload(workload.name), peer))
            }

            NodeKind::ExternalAddress => {
                let addr = id
                    .key
                    .parse::<IpAddr>()
                    .map_err(|_| SynthesisError::InvalidAddress(id.key.clone()))?;
                let net = host_net(addr);
                let peer = NetworkPolicyPeer {
                    ip_block: Some(IPBlock {
                        cidr: net.to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                Ok((PeerKey::Network(net), peer))
            }

            NodeKind::FullyQualifiedName => Err(SynthesisError::UnsupportedPeer(id.clone())),
        }
    }
}

// === impl Draft ===

impl Draft {
    fn into_policy(self, name: String) -> NetworkPolicy {
        let Self {
            selector,
            ingress,
            egress,
        } = self;

        let mut policy_types = Vec::new();
        if !ingress.is_empty() {
            policy_types.push("Ingress".to_string());
        }
        if !egress.is_empty() {
            policy_types.push("Egress".to_string());
        }

        NetworkPolicy {
            metadata: ObjectMeta {
                name: Some(name),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                pod_selector: selector.into(),
                ingress: (!ingress.is_empty()).then(|| ingress.into_ingress()),
                egress: (!egress.is_empty()).then(|| egress.into_egress()),
                policy_types: Some(policy_types),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
