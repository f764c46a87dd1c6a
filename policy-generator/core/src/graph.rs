//! A directed graph of observed traffic between workloads and external
//! endpoints.
//!
//! Vertices are identified by a [`NodeId`] (a kind plus an identity key, the
//! pod name or the raw address). Adjacency is held in ordered maps so that
//! every traversal is deterministic, and the ports observed on each edge are
//! held separately, keyed by the ordered `(source, target)` pair.
//!
//! The graph only grows: nodes and edges are inserted idempotently and each
//! edge accumulates the distinct ports observed on it, so ingesting the same
//! flows in any order produces the same graph.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    net::IpAddr,
    num::NonZeroU16,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    /// A pod, identified by its name and displayed by its owning workload.
    Workload,

    /// An address that resolved to neither a service nor a pod.
    ExternalAddress,

    /// A DNS name.
    FullyQualifiedName,
}

/// Identifies a vertex in the traffic graph.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub kind: NodeKind,
    pub key: String,
}

/// A vertex along with its resolved display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub display_name: String,
}

/// The distinct ports observed on an edge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedPorts(BTreeSet<NonZeroU16>);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrafficGraph {
    names: BTreeMap<NodeId, String>,
    outgoing: BTreeMap<NodeId, BTreeSet<NodeId>>,
    incoming: BTreeMap<NodeId, BTreeSet<NodeId>>,
    edges: BTreeMap<(NodeId, NodeId), ObservedPorts>,
}

// === impl NodeId ===

impl NodeId {
    pub fn workload(pod: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Workload,
            key: pod.into(),
        }
    }

    pub fn external(addr: IpAddr) -> Self {
        Self {
            kind: NodeKind::ExternalAddress,
            key: addr.to_string(),
        }
    }

    pub fn fqdn(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::FullyQualifiedName,
            key: name.into(),
        }
    }

    pub fn is_workload(&self) -> bool {
        self.kind == NodeKind::Workload
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Workload => write!(f, "pod/{}", self.key),
            NodeKind::ExternalAddress => write!(f, "ip/{}", self.key),
            NodeKind::FullyQualifiedName => write!(f, "fqdn/{}", self.key),
        }
    }
}

// === impl Node ===

impl Node {
    pub fn workload(pod: impl Into<String>, workload: impl Into<String>) -> Self {
        Self {
            id: NodeId::workload(pod),
            display_name: workload.into(),
        }
    }

    pub fn external(addr: IpAddr) -> Self {
        let id = NodeId::external(addr);
        Self {
            display_name: id.key.clone(),
            id,
        }
    }
}

// === impl ObservedPorts ===

impl ObservedPorts {
    pub fn record(&mut self, port: NonZeroU16) {
        self.0.insert(port);
    }

    /// Iterates over the ports in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = NonZeroU16> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for ObservedPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, port) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{port}")?;
        }
        f.write_str("]")
    }
}

// === impl TrafficGraph ===

impl TrafficGraph {
    /// Inserts `node` if it is not already present. The first display name
    /// recorded for an identity is retained.
    pub fn add_node(&mut self, node: Node) -> bool {
        let Node { id, display_name } = node;
        if self.names.contains_key(&id) {
            return false;
        }
        self.names.insert(id, display_name);
        true
    }

    /// Records that `source` connected to `target` on `port`, creating both
    /// nodes and the edge between them if necessary.
    pub fn record(&mut self, source: Node, target: Node, port: NonZeroU16) {
        let (src, dst) = (source.id.clone(), target.id.clone());
        self.add_node(source);
        self.add_node(target);
        self.ensure_edge(&src, &dst).record(port);
    }

    pub fn display_name(&self, id: &NodeId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Iterates over all nodes in identity order.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &str)> + '_ {
        self.names.iter().map(|(id, name)| (id, name.as_str()))
    }

    /// Iterates over the `Workload` nodes in identity order.
    pub fn workloads(&self) -> impl Iterator<Item = (&NodeId, &str)> + '_ {
        self.nodes().filter(|(id, _)| id.is_workload())
    }

    /// Iterates over the targets of edges leaving `id`.
    pub fn edges_from<'g>(
        &'g self,
        id: &NodeId,
    ) -> impl Iterator<Item = (&'g NodeId, &'g ObservedPorts)> + 'g {
        self.outgoing
            .get_key_value(id)
            .into_iter()
            .flat_map(move |(src, targets)| {
                targets
                    .iter()
                    .filter_map(move |dst| Some((dst, self.ports(src, dst)?)))
            })
    }

    /// Iterates over the sources of edges entering `id`.
    pub fn edges_to<'g>(
        &'g self,
        id: &NodeId,
    ) -> impl Iterator<Item = (&'g NodeId, &'g ObservedPorts)> + 'g {
        self.incoming
            .get_key_value(id)
            .into_iter()
            .flat_map(move |(dst, sources)| {
                sources
                    .iter()
                    .filter_map(move |src| Some((src, self.ports(src, dst)?)))
            })
    }

    pub fn ports(&self, source: &NodeId, target: &NodeId) -> Option<&ObservedPorts> {
        self.edges.get(&(source.clone(), target.clone()))
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn ensure_edge(&mut self, src: &NodeId, dst: &NodeId) -> &mut ObservedPorts {
        self.outgoing
            .entry(src.clone())
            .or_default()
            .insert(dst.clone());
        self.incoming
            .entry(dst.clone())
            .or_default()
            .insert(src.clone());
        self.edges.entry((src.clone(), dst.clone())).or_default()
    }
}

impl fmt::Display for TrafficGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ((src, dst), ports) in &self.edges {
            let src_name = self.display_name(src).unwrap_or(&src.key);
            let dst_name = self.display_name(dst).unwrap_or(&dst.key);
            writeln!(f, "{src} ({src_name}) -> {dst} ({dst_name}) {ports}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(p: u16) -> NonZeroU16 {
        NonZeroU16::new(p).unwrap()
    }

    #[test]
    fn edges_are_created_once() {
        let mut graph = TrafficGraph::default();
        let web = Node::workload("web-1", "web");
        let db = Node::workload("db-1", "db");
        graph.record(web.clone(), db.clone(), port(5432));
        graph.record(web.clone(), db.clone(), port(5432));
        graph.record(web.clone(), db.clone(), port(5433));

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        let ports = graph.ports(&web.id, &db.id).unwrap();
        assert_eq!(ports.iter().collect::<Vec<_>>(), vec![port(5432), port(5433)]);
        assert_eq!(ports.to_string(), "[5432,5433]");
    }

    #[test]
    fn adjacency_in_both_directions() {
        let mut graph = TrafficGraph::default();
        let web = Node::workload("web-1", "web");
        let db = Node::workload("db-1", "db");
        let ext = Node::external("192.0.2.1".parse().unwrap());
        graph.record(web.clone(), db.clone(), port(5432));
        graph.record(web.clone(), ext.clone(), port(443));

        let out = graph.edges_from(&web.id).map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(out, vec![&db.id, &ext.id]);
        let into_db = graph.edges_to(&db.id).map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(into_db, vec![&web.id]);
        assert_eq!(graph.edges_from(&db.id).count(), 0);
        assert_eq!(graph.workloads().count(), 2);
        assert_eq!(graph.display_name(&ext.id), Some("192.0.2.1"));
    }

    #[test]
    fn self_edges_are_kept() {
        let mut graph = TrafficGraph::default();
        let web = Node::workload("web-1", "web");
        graph.record(web.clone(), web.clone(), port(8080));

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges_from(&web.id).count(), 1);
        assert_eq!(graph.edges_to(&web.id).count(), 1);
    }

    #[test]
    fn node_identity_ignores_display_name() {
        let mut graph = TrafficGraph::default();
        assert!(graph.add_node(Node::workload("web-1", "web")));
        assert!(!graph.add_node(Node::workload("web-1", "other")));
        assert_eq!(graph.display_name(&NodeId::workload("web-1")), Some("web"));
        // Same key, different kind.
        assert!(graph.add_node(Node {
            id: NodeId::fqdn("web-1"),
            display_name: "web-1".into(),
        }));
    }

    #[test]
    fn edges_outlive_the_lookup_key() {
        let mut graph = TrafficGraph::default();
        graph.record(
            Node::workload("web-1", "web"),
            Node::workload("db-1", "db"),
            port(5432),
        );

        let targets = graph
            .edges_from(&NodeId::workload("web-1"))
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        let sources = graph
            .edges_to(&NodeId::workload("db-1"))
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        assert_eq!(targets, vec![&NodeId::workload("db-1")]);
        assert_eq!(sources, vec![&NodeId::workload("web-1")]);
        assert_eq!(graph.edges_from(&NodeId::workload("nope")).count(), 0);
    }

    #[test]
    fn record_is_order_independent() {
        let web = Node::workload("web-1", "web");
        let db = Node::workload("db-1", "db");
        let ext = Node::external("192.0.2.1".parse().unwrap());
        let flows = [
            (db.clone(), port(5432)),
            (ext.clone(), port(443)),
            (db.clone(), port(6432)),
            (db.clone(), port(5432)),
        ];

        let mut forward = TrafficGraph::default();
        for (dst, p) in flows.iter().cloned() {
            forward.record(web.clone(), dst, p);
        }
        let mut reverse = TrafficGraph::default();
        for (dst, p) in flows.iter().rev().cloned() {
            reverse.record(web.clone(), dst, p);
        }
        assert_eq!(forward, reverse);
        assert_eq!(
            forward.ports(&web.id, &db.id).unwrap().iter().collect::<Vec<_>>(),
            vec![port(5432), port(6432)]
        );
    }

    #[test]
    fn display_lists_edges() {
        let mut graph = TrafficGraph::default();
        graph.record(
            Node::workload("web-1", "web"),
            Node::external("192.0.2.1".parse().unwrap()),
            port(443),
        );
        assert_eq!(
            graph.to_string(),
            "pod/web-1 (web) -> ip/192.0.2.1 (192.0.2.1) [443]\n"
        );
    }
}
