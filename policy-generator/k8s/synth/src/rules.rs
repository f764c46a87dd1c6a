use netpol_generator_core::IpNet;
use netpol_generator_k8s_api::{
    IntOrString, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort,
};
use std::{
    collections::{btree_map::Entry, BTreeMap, BTreeSet},
    num::NonZeroU16,
};

/// Orders and deduplicates rule peers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum PeerKey {
    Workload(String),
    Network(IpNet),
}

/// The rules for one direction of a policy, with one rule per peer.
///
/// A peer observed through several edges (e.g. from more than one replica) gets the union of the
/// ports observed on each.
#[derive(Debug, Default)]
pub(crate) struct Rules(BTreeMap<PeerKey, Rule>);

#[derive(Debug)]
pub(crate) struct Rule {
    peer: NetworkPolicyPeer,
    ports: BTreeSet<NonZeroU16>,
}

// === impl Rules ===

impl Rules {
    pub(crate) fn insert(
        &mut self,
        key: PeerKey,
        peer: NetworkPolicyPeer,
        ports: impl IntoIterator<Item = NonZeroU16>,
    ) {
        let rule = self.0.entry(key).or_insert_with(|| Rule {
            peer,
            ports: BTreeSet::new(),
        });
        rule.ports.extend(ports);
    }

    pub(crate) fn extend(&mut self, other: Rules) {
        for (key, rule) in other.0 {
            match self.0.entry(key) {
                Entry::Vacant(entry) => {
                    entry.insert(rule);
                }
                Entry::Occupied(mut entry) => entry.get_mut().ports.extend(rule.ports),
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_egress(self) -> Vec<NetworkPolicyEgressRule> {
        self.0
            .into_values()
            .map(|Rule { peer, ports }| NetworkPolicyEgressRule {
                ports: Some(ports.into_iter().map(tcp).collect()),
                to: Some(vec![peer]),
                ..Default::default()
            })
            .collect()
    }

    pub(crate) fn into_ingress(self) -> Vec<NetworkPolicyIngressRule> {
        self.0
            .into_values()
            .map(|Rule { peer, ports }| NetworkPolicyIngressRule {
                ports: Some(ports.into_iter().map(tcp).collect()),
                from: Some(vec![peer]),
                ..Default::default()
            })
            .collect()
    }
}

/// The capture only observes TCP connection establishment, so every observed port is TCP.
fn tcp(port: NonZeroU16) -> NetworkPolicyPort {
    port_with_protocol("TCP", port.get())
}

pub(crate) fn port_with_protocol(protocol: &str, port: u16) -> NetworkPolicyPort {
    NetworkPolicyPort {
        port: Some(IntOrString::Int(i32::from(port))),
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}
