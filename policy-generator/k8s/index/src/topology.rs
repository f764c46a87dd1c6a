use netpol_generator_k8s_api::{CaptureMetadata, Deployment, Pod, ReplicaSet, Selector, Service};
use std::{collections::BTreeMap, net::IpAddr};
use tracing::{debug, instrument, trace};

/// Read-only lookups over a topology snapshot.
///
/// All tables are ordered by name so that scans (pods by IP, pods by selector) visit pods in a
/// stable order: when more than one pod matches, the lexicographically smallest name wins.
#[derive(Debug, Default)]
pub struct TopologyIndex {
    services_by_ip: BTreeMap<IpAddr, Service>,
    pods: BTreeMap<String, Pod>,
    replica_sets: BTreeMap<String, ReplicaSet>,
    deployments: BTreeMap<String, Deployment>,
}

// === impl TopologyIndex ===

impl TopologyIndex {
    #[instrument(skip_all)]
    pub fn from_metadata(metadata: &CaptureMetadata) -> Self {
        let mut index = Self::default();
        for svc in &metadata.services.items {
            index.apply_service(svc.clone());
        }
        for pod in &metadata.pods.items {
            index.apply_pod(pod.clone());
        }
        for rs in &metadata.replica_sets.items {
            index.apply_replica_set(rs.clone());
        }
        for deploy in &metadata.deployments.items {
            index.apply_deployment(deploy.clone());
        }
        debug!(
            services = index.services_by_ip.len(),
            pods = index.pods.len(),
            replicasets = index.replica_sets.len(),
            deployments = index.deployments.len(),
            "Indexed topology"
        );
        index
    }

    /// Indexes a service by its cluster IP. Headless services are not addressable and are
    /// skipped.
    pub fn apply_service(&mut self, svc: Service) {
        match svc.cluster_ip() {
            Some(ip) => {
                trace!(service = %svc.name(), %ip, "Indexing service");
                self.services_by_ip.insert(ip, svc);
            }
            None => trace!(service = %svc.name(), "Skipping service without a cluster IP"),
        }
    }

    pub fn apply_pod(&mut self, pod: Pod) {
        self.pods.insert(pod.metadata.name.clone(), pod);
    }

    pub fn apply_replica_set(&mut self, rs: ReplicaSet) {
        self.replica_sets.insert(rs.metadata.name.clone(), rs);
    }

    pub fn apply_deployment(&mut self, deploy: Deployment) {
        self.deployments.insert(deploy.metadata.name.clone(), deploy);
    }

    pub fn service_by_ip(&self, ip: IpAddr) -> Option<&Service> {
        self.services_by_ip.get(&ip)
    }

    pub fn pod(&self, name: &str) -> Option<&Pod> {
        self.pods.get(name)
    }

    /// Scans for the first pod, by name, with the given IP.
    pub fn pod_by_ip(&self, ip: IpAddr) -> Option<&Pod> {
        self.pods.values().find(|pod| pod.ip() == Some(ip))
    }

    /// Iterates over the pods matched by `selector`, in name order.
    pub fn pods_selected_by<'i>(
        &'i self,
        selector: &'i Selector,
    ) -> impl Iterator<Item = &'i Pod> + 'i {
        self.pods
            .values()
            .filter(move |pod| selector.matches(pod.labels()))
    }

    pub fn replica_set(&self, name: &str) -> Option<&ReplicaSet> {
        self.replica_sets.get(name)
    }

    pub fn deployment(&self, name: &str) -> Option<&Deployment> {
        self.deployments.get(name)
    }
}
