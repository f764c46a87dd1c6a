#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod capture;
pub mod labels;

pub use self::{
    capture::{
        CaptureMetadata, Deployment, LoadError, OwnerReference, Pod, PodCapture, ReplicaSet,
        Service,
    },
    labels::{Labels, Selector},
};
pub use k8s_openapi::{
    api::networking::v1::{
        IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
        NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec,
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};
