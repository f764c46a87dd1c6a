use crate::{capture::Tshark, output, synth};
use anyhow::Result;
use clap::Parser;
use std::{num::NonZeroUsize, path::PathBuf};
use tokio::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "netpol-generator",
    version,
    about = "Generates Kubernetes network policies from captured pod traffic"
)]
pub struct Args {
    #[clap(long, default_value = "netpol=info,warn", env = "NETPOL_GENERATOR_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    /// Capture metadata document describing the namespace's topology and each pod's capture.
    #[clap(value_name = "METADATA")]
    metadata: PathBuf,

    /// Directory the policies are written to. Its previous contents are replaced.
    ///
    /// Defaults to `network-policies` next to the metadata document.
    #[clap(long)]
    output_dir: Option<PathBuf>,

    /// Disables ingress rules.
    #[clap(long)]
    no_ingress: bool,

    /// Disables egress rules.
    #[clap(long)]
    no_egress: bool,

    /// Disables the namespace-wide policy allowing DNS.
    #[clap(long)]
    no_dns_policy: bool,

    /// Path to the `tshark` binary used to read captures.
    #[clap(long, default_value = "tshark")]
    tshark: PathBuf,

    #[clap(long, default_value = "60")]
    capture_timeout_secs: u64,

    /// Maximum number of captures read concurrently.
    #[clap(long, default_value = "1")]
    capture_concurrency: NonZeroUsize,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            metadata,
            output_dir,
            no_ingress,
            no_egress,
            no_dns_policy,
            tshark,
            capture_timeout_secs,
            capture_concurrency,
        } = self;

        log_format.try_init(log_level)?;

        let config = synth::Config {
            ingress: !no_ingress,
            egress: !no_egress,
            dns: !no_dns_policy,
        };
        let tshark = Tshark::new(tshark, Duration::from_secs(capture_timeout_secs));
        let output_dir = output_dir.unwrap_or_else(|| crate::default_output_dir(&metadata));

        let policies = crate::generate(&metadata, &tshark, config, capture_concurrency).await?;
        output::publish(&output_dir, &policies)?;
        info!(
            policies = policies.len(),
            dir = %output_dir.display(),
            "Wrote network policies"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_command() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["netpol-generator", "capture/metadata.json"]).unwrap();
        assert_eq!(args.metadata, PathBuf::from("capture/metadata.json"));
        assert_eq!(args.output_dir, None);
        assert!(!args.no_ingress);
        assert!(!args.no_egress);
        assert!(!args.no_dns_policy);
        assert_eq!(args.tshark, PathBuf::from("tshark"));
        assert_eq!(args.capture_timeout_secs, 60);
        assert_eq!(args.capture_concurrency.get(), 1);
    }

    #[test]
    fn flags() {
        let args = Args::try_parse_from([
            "netpol-generator",
            "--no-ingress",
            "--no-dns-policy",
            "--output-dir",
            "/tmp/policies",
            "--capture-concurrency",
            "4",
            "metadata.json",
        ])
        .unwrap();
        assert!(args.no_ingress);
        assert!(!args.no_egress);
        assert!(args.no_dns_policy);
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/policies")));
        assert_eq!(args.capture_concurrency.get(), 4);
    }

    #[test]
    fn metadata_is_required() {
        let error = Args::try_parse_from(["netpol-generator"]).unwrap_err();
        assert_eq!(error.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(Args::try_parse_from([
            "netpol-generator",
            "--capture-concurrency",
            "0",
            "metadata.json"
        ])
        .is_err());
    }
}
