//! Fetch cycle configuration.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use hubtopo_core::TrackedKind;
use hubtopo_kubehub::DEFAULT_MIN_MINOR;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What a cycle does when one kind fails to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the cycle; no snapshot is produced.
    #[default]
    Strict,
    /// Build a snapshot from the kinds that succeeded and mark the rest missing.
    BestEffort,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(FailurePolicy::Strict),
            "best-effort" | "besteffort" | "partial" => Ok(FailurePolicy::BestEffort),
            other => Err(anyhow!("invalid failure policy {other:?} (expect strict or best-effort)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub policy: FailurePolicy,
    /// Maximum outstanding list requests per cycle.
    pub concurrency: usize,
    /// Upper bound on one cycle; `None` waits forever.
    pub deadline: Option<Duration>,
    pub min_minor: u32,
    pub kinds: Vec<TrackedKind>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::Strict,
            concurrency: 4,
            deadline: Some(Duration::from_secs(30)),
            min_minor: DEFAULT_MIN_MINOR,
            kinds: TrackedKind::ALL.to_vec(),
        }
    }
}

impl FetchConfig {
    /// Defaults overridden by `HUBTOPO_*` environment variables. Invalid
    /// values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("HUBTOPO_FETCH_POLICY") {
            match v.parse() {
                Ok(policy) => cfg.policy = policy,
                Err(e) => warn!(error = %e, "ignoring HUBTOPO_FETCH_POLICY"),
            }
        }
        if let Some(n) = lookup("HUBTOPO_FETCH_CONCURRENCY").and_then(|s| s.parse::<usize>().ok()) {
            cfg.concurrency = n.max(1);
        }
        if let Some(secs) = lookup("HUBTOPO_FETCH_DEADLINE_SECS").and_then(|s| s.parse::<u64>().ok()) {
            cfg.deadline = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(m) = lookup("HUBTOPO_MIN_MINOR").and_then(|s| s.parse::<u32>().ok()) {
            cfg.min_minor = m;
        }
        if let Some(list) = lookup("HUBTOPO_KINDS") {
            match parse_kinds(&list) {
                Ok(kinds) if !kinds.is_empty() => cfg.kinds = kinds,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "ignoring HUBTOPO_KINDS"),
            }
        }
        cfg
    }
}

/// Parse a comma separated kind list, dropping duplicates.
pub fn parse_kinds(list: &str) -> Result<Vec<TrackedKind>> {
    let mut kinds = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind: TrackedKind = part.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}
