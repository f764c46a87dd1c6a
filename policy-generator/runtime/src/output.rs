//! Writes policies to disk.
//!
//! Each policy is written as `network_policy_<name>.json` into a staging directory next to the
//! output directory. Once every file is written, the staging directory replaces the output
//! directory, so a failed run never leaves a partial set of policies behind.

use crate::k8s::NetworkPolicy;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

const FILE_PREFIX: &str = "network_policy_";

/// Replaces the contents of `dir` with one file per policy.
pub fn publish(dir: &Path, policies: &[NetworkPolicy]) -> Result<()> {
    let mut files = Vec::with_capacity(policies.len());
    let mut names = BTreeSet::new();
    for policy in policies {
        let name = file_name(policy)?;
        if !names.insert(name.clone()) {
            bail!("more than one policy would be written to {name}");
        }
        files.push((name, policy));
    }

    let staging = staging_dir(dir)?;
    if staging.exists() {
        fs::remove_dir_all(&staging)
            .with_context(|| format!("failed to remove stale {}", staging.display()))?;
    }
    fs::create_dir_all(&staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;

    for (name, policy) in files {
        let path = staging.join(name);
        fs::write(&path, to_json(policy)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(path = %path.display(), "Wrote policy");
    }

    if dir.exists() {
        if let Err(error) = fs::remove_dir_all(dir) {
            warn!(%error, dir = %dir.display(), "Failed to remove previous output directory");
        }
    }

    if let Err(error) = fs::rename(&staging, dir) {
        // The previous directory could not be removed entirely, so move the files into it.
        warn!(%error, dir = %dir.display(), "Failed to replace output directory; moving files");
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        for entry in fs::read_dir(&staging)? {
            let entry = entry?;
            let path = dir.join(entry.file_name());
            fs::rename(entry.path(), &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        fs::remove_dir(&staging)
            .with_context(|| format!("failed to remove {}", staging.display()))?;
    }

    Ok(())
}

/// The file a policy is written to.
pub fn file_name(policy: &NetworkPolicy) -> Result<String> {
    match policy.metadata.name.as_deref() {
        Some(name) if !name.is_empty() && !name.contains(['/', '\\']) && name != ".." => {
            Ok(format!("{FILE_PREFIX}{name}.json"))
        }
        name => bail!("invalid policy name {name:?}"),
    }
}

/// Serializes a policy as JSON indented by four spaces.
pub fn to_json(policy: &NetworkPolicy) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    policy.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(buf)
}

fn staging_dir(dir: &Path) -> Result<PathBuf> {
    let Some(name) = dir.file_name() else {
        bail!("invalid output directory {}", dir.display());
    };
    let mut staging = name.to_os_string();
    staging.push(".staging");
    Ok(dir.with_file_name(staging))
}
