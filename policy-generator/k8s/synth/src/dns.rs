use crate::rules::port_with_protocol;
use netpol_generator_k8s_api::{
    LabelSelector, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicySpec, ObjectMeta,
};

pub const DNS_POLICY_NAME: &str = "dns";

const DNS_PORT: u16 = 53;

/// Allows every pod in the namespace to reach DNS on any destination.
///
/// The workload policies deny all egress that was not observed, and name resolution is typically
/// UDP, which captures never observe.
pub fn dns_policy() -> NetworkPolicy {
    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(DNS_POLICY_NAME.to_string()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default().into(),
            egress: Some(vec![NetworkPolicyEgressRule {
                ports: Some(vec![
                    port_with_protocol("TCP", DNS_PORT),
                    port_with_protocol("UDP", DNS_PORT),
                ]),
                ..Default::default()
            }]),
            policy_types: Some(vec!["Egress".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
