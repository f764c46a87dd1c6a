#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use netpol_generator_core as core;
pub use netpol_generator_k8s_api as k8s;
pub use netpol_generator_k8s_index as index;
pub use netpol_generator_k8s_synth as synth;

mod args;
mod capture;
pub mod output;

pub use self::{args::Args, capture::Tshark};

use anyhow::{Context, Result};
use futures::prelude::*;
use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Name of the directory, next to the metadata document, that policies are written to by default.
pub const DEFAULT_OUTPUT_DIR: &str = "network-policies";

/// Loads the capture metadata at `metadata`, extracts and ingests every pod's flows, and
/// synthesizes the resulting policies.
///
/// Extractions may run concurrently, up to `concurrency` at a time, but their results are
/// ingested one at a time in the order the pods are listed.
#[instrument(skip_all, fields(metadata = %metadata.display()))]
pub async fn generate<S>(
    metadata: &Path,
    flows: &S,
    config: synth::Config,
    concurrency: NonZeroUsize,
) -> Result<Vec<k8s::NetworkPolicy>>
where
    S: core::FlowSource + Sync,
{
    let doc = k8s::CaptureMetadata::load(metadata)?;
    let base = metadata_dir(metadata);
    let index = index::TopologyIndex::from_metadata(&doc);
    let mut builder = index::GraphBuilder::new(&index);

    let mut extractions = stream::iter(&doc.pod_metadata)
        .map(move |capture| async move {
            let path = capture.path(base);
            let result = flows.extract(&path, capture.ip).await;
            (capture, path, result)
        })
        .buffered(concurrency.get());

    while let Some((capture, path, result)) = extractions.next().await {
        let records = result.with_context(|| {
            format!(
                "failed to extract flows for pod {} from {}",
                capture.pod,
                path.display()
            )
        })?;
        if records.is_empty() {
            info!(pod = %capture.pod, "No connection attempts captured");
            continue;
        }
        builder
            .ingest_capture(&capture.pod, records)
            .with_context(|| format!("failed to ingest flows for pod {}", capture.pod))?;
    }

    let graph = builder.into_graph();
    if graph.is_empty() {
        info!("No traffic observed");
    }
    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Traffic graph:\n{graph}"
    );

    synth::Synthesizer::new(&index, config)
        .synthesize(&graph)
        .context("failed to synthesize network policies")
}

/// The directory capture files are resolved against.
pub fn metadata_dir(metadata: &Path) -> &Path {
    match metadata.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// The default output directory for a metadata document.
pub fn default_output_dir(metadata: &Path) -> PathBuf {
    metadata_dir(metadata).join(DEFAULT_OUTPUT_DIR)
}
