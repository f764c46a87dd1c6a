use crate::{OwnerResolver, ResolveError, TopologyIndex};
use netpol_generator_core::{is_link_local, FlowRecord, Node, TrafficGraph};
use std::net::IpAddr;
use tracing::{debug, instrument, trace};

/// Folds observed flows into a traffic graph.
///
/// The builder is the graph's only writer. Flows may be ingested in any order; the resulting graph
/// is the same.
#[derive(Debug)]
pub struct GraphBuilder<'i> {
    index: &'i TopologyIndex,
    graph: TrafficGraph,
}

// === impl GraphBuilder ===

impl<'i> GraphBuilder<'i> {
    pub fn new(index: &'i TopologyIndex) -> Self {
        Self {
            index,
            graph: TrafficGraph::default(),
        }
    }

    /// Ingests all flows observed from `pod`, returning the number of flows recorded.
    #[instrument(skip(self, flows))]
    pub fn ingest_capture(
        &mut self,
        pod: &str,
        flows: impl IntoIterator<Item = FlowRecord>,
    ) -> Result<usize, ResolveError> {
        let mut recorded = 0;
        for flow in flows {
            if self.ingest_flow(pod, flow)? {
                recorded += 1;
            }
        }
        debug!(%recorded, "Ingested capture");
        Ok(recorded)
    }

    /// Records a single flow from `source_pod`. Returns false if the flow was discarded.
    pub fn ingest_flow(&mut self, source_pod: &str, flow: FlowRecord) -> Result<bool, ResolveError> {
        if is_link_local(&flow.destination) {
            debug!(%flow, "Skipping link-local destination");
            return Ok(false);
        }

        let target = self.resolve_destination(flow.destination)?;
        let source = self.workload_node(source_pod)?;
        trace!(
            source = %source.display_name,
            target = %target.display_name,
            port = %flow.port,
            "Recording flow"
        );
        self.graph.record(source, target, flow.port);
        Ok(true)
    }

    pub fn into_graph(self) -> TrafficGraph {
        self.graph
    }

    /// Resolves a destination address to the workload behind a service, the workload of a pod, or
    /// an external address, in that order.
    fn resolve_destination(&self, addr: IpAddr) -> Result<Node, ResolveError> {
        if let Some(svc) = self.index.service_by_ip(addr) {
            match svc.selector() {
                Some(selector) => {
                    let pod = self
                        .index
                        .pods_selected_by(&selector)
                        .next()
                        .ok_or_else(|| {
                            ResolveError::UnresolvedServiceSelector(svc.name().to_string())
                        })?;
                    trace!(service = %svc.name(), pod = %pod.name(), "Resolved service");
                    return self.workload_node(pod.name());
                }
                None => trace!(service = %svc.name(), "Service has no selector"),
            }
        }

        if let Some(pod) = self.index.pod_by_ip(addr) {
            trace!(pod = %pod.name(), "Resolved pod IP");
            return self.workload_node(pod.name());
        }

        debug!(%addr, "No service or pod found; assuming an external address");
        Ok(Node::external(addr))
    }

    fn workload_node(&self, pod: &str) -> Result<Node, ResolveError> {
        let name = OwnerResolver::new(self.index).owner_name(pod)?;
        Ok(Node::workload(pod, name))
    }
}
