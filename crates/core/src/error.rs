use std::fmt;

use crate::TrackedKind;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a fetch cycle stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller fired the cycle's cancellation token.
    Signal,
    /// The cycle ran past its deadline.
    Deadline,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Signal => f.write_str("cancelled"),
            CancelReason::Deadline => f.write_str("deadline exceeded"),
        }
    }
}

/// Errors surfaced by topology building and collection matching.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("unsupported server version {raw:?}: {reason}")]
    UnsupportedVersion { raw: String, reason: String },
    #[error("fetching {kind} via {api_version} failed: {source}")]
    FetchFailed {
        kind: TrackedKind,
        api_version: String,
        #[source]
        source: BoxError,
    },
    #[error("fetch cycle stopped: {0}")]
    Cancelled(CancelReason),
    #[error("collection {collection}: {reason}")]
    MatchFailed { collection: String, reason: String },
    /// A newer snapshot was published while this cycle ran.
    #[error("snapshot {epoch} superseded by published snapshot {current}")]
    Superseded { epoch: u64, current: u64 },
}

impl TopologyError {
    pub fn unsupported(raw: &str, reason: impl Into<String>) -> Self {
        TopologyError::UnsupportedVersion { raw: raw.to_string(), reason: reason.into() }
    }

    pub fn is_cancelled(&self) -> bool { matches!(self, TopologyError::Cancelled(_)) }

    /// Short label for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            TopologyError::UnsupportedVersion { .. } => "unsupported_version",
            TopologyError::FetchFailed { .. } => "fetch_failed",
            TopologyError::Cancelled(_) => "cancelled",
            TopologyError::MatchFailed { .. } => "match_failed",
            TopologyError::Superseded { .. } => "superseded",
        }
    }
}
