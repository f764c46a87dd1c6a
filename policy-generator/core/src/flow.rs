use std::{net::IpAddr, num::NonZeroU16, path::Path, process::ExitStatus, time::Duration};

/// A single outbound TCP connection attempt observed in a pod's capture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowRecord {
    pub destination: IpAddr,
    pub port: NonZeroU16,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("flow extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to spawn flow extractor: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("flow extractor exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("malformed flow record {line:?}: {reason}")]
    Malformed { line: String, reason: String },
}

/// Produces the outbound connection attempts made by `source` in a capture
/// artifact.
///
/// The result is finite and order-insensitive; an empty result is valid.
#[async_trait::async_trait]
pub trait FlowSource {
    async fn extract(&self, capture: &Path, source: IpAddr)
        -> Result<Vec<FlowRecord>, ExtractError>;
}

// === impl FlowRecord ===

impl FlowRecord {
    pub fn new(destination: IpAddr, port: NonZeroU16) -> Self {
        Self { destination, port }
    }
}

impl std::fmt::Display for FlowRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.destination {
            IpAddr::V4(addr) => write!(f, "{}:{}", addr, self.port),
            IpAddr::V6(addr) => write!(f, "[{}]:{}", addr, self.port),
        }
    }
}
