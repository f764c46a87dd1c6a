use crate::core::{ExtractError, FlowRecord, FlowSource};
use std::{
    collections::BTreeSet,
    net::IpAddr,
    num::NonZeroU16,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{process::Command, time};
use tracing::{debug, info, instrument};

/// Reads connection attempts out of packet captures with `tshark`.
///
/// Only the initial SYN of each TCP handshake is considered, so a flow is attributed to the pod
/// that opened it regardless of whether the peer answered.
#[derive(Clone, Debug)]
pub struct Tshark {
    binary: PathBuf,
    timeout: time::Duration,
}

// === impl Tshark ===

impl Tshark {
    pub fn new(binary: impl Into<PathBuf>, timeout: time::Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn command(&self, capture: &Path, source: IpAddr) -> Command {
        let (filter, destination) = match source {
            IpAddr::V4(_) => (
                format!("ip.src == {source} && tcp.flags.syn==1 && tcp.flags.ack==0 && not icmp"),
                "ip.dst_host",
            ),
            IpAddr::V6(_) => (
                format!(
                    "ipv6.src == {source} && tcp.flags.syn==1 && tcp.flags.ack==0 && not icmpv6"
                ),
                "ipv6.dst_host",
            ),
        };

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-r")
            .arg(capture)
            .arg("-Y")
            .arg(filter)
            .args(["-T", "fields", "-e", destination, "-e", "tcp.dstport"])
            .args(["-E", "separator=,"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl FlowSource for Tshark {
    #[instrument(skip(self, capture), fields(capture = %capture.display()))]
    async fn extract(
        &self,
        capture: &Path,
        source: IpAddr,
    ) -> Result<Vec<FlowRecord>, ExtractError> {
        let output = time::timeout(self.timeout, self.command(capture, source).output())
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout))?
            .map_err(ExtractError::Spawn)?;

        if !output.status.success() {
            return Err(ExtractError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let records = parse_fields(&String::from_utf8_lossy(&output.stdout))?;
        if records.is_empty() {
            info!("Capture has no connection attempts");
        } else {
            debug!(records = records.len(), "Extracted flows");
        }
        Ok(records)
    }
}

/// Parses `<address>,<port>` lines, returning the distinct records in ascending order.
fn parse_fields(output: &str) -> Result<Vec<FlowRecord>, ExtractError> {
    let mut records = BTreeSet::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let malformed = |reason: &str| ExtractError::Malformed {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let (addr, port) = line
            .split_once(',')
            .ok_or_else(|| malformed("expected <address>,<port>"))?;
        let addr = addr
            .trim()
            .parse::<IpAddr>()
            .map_err(|e| malformed(&e.to_string()))?;
        let port = port
            .trim()
            .parse::<NonZeroU16>()
            .map_err(|e| malformed(&e.to_string()))?;
        records.insert(FlowRecord::new(addr, port));
    }
    Ok(records.into_iter().collect())
}
