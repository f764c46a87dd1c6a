#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod flow;
pub mod graph;
mod network;

pub use self::{
    flow::{ExtractError, FlowRecord, FlowSource},
    graph::{Node, NodeId, NodeKind, ObservedPorts, TrafficGraph},
    network::{host_net, is_link_local},
};
pub use ipnet::IpNet;
