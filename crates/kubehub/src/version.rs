//! Version gate: admits a server version and plans, per kind, which API
//! group/versions to address.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use hubtopo_core::{TopologyError, TrackedKind};
use serde::Serialize;
use smallvec::SmallVec;

use crate::shapes::SourceShape;

/// Oldest supported minor version (`v1.14`).
pub const DEFAULT_MIN_MINOR: u32 = 14;

/// A `major.minor[.patch]` server version. Pre-release and build suffixes are
/// dropped during parsing; the patch level never affects planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl ServerVersion {
    /// Parse `vMAJOR.MINOR[.PATCH][-suffix]`; the leading `v` is optional.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let s = raw.trim();
        if s.is_empty() {
            return Err("empty version".to_string());
        }
        let s = s.strip_prefix(|c: char| c == 'v' || c == 'V').unwrap_or(s);
        let core = s.split(|c: char| c == '-' || c == '+').next().unwrap_or_default();
        let mut parts = core.split('.');
        let major = parts.next().and_then(number).ok_or_else(|| format!("malformed version {raw:?}"))?;
        let minor = parts.next().and_then(number).ok_or_else(|| format!("no minor version in {raw:?}"))?;
        let patch = match parts.next() {
            None => None,
            Some(p) => Some(number(p).ok_or_else(|| format!("malformed patch version in {raw:?}"))?),
        };
        if parts.next().is_some() {
            return Err(format!("malformed version {raw:?}"));
        }
        Ok(Self { major, minor, patch })
    }

    /// Level used to select shapes. Anything past major 1 counts as newer
    /// than every v1 minor.
    fn feature_level(&self) -> u32 {
        if self.major > 1 { u32::MAX } else { self.minor }
    }
}

fn number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(p) => write!(f, "v{}.{}.{}", self.major, self.minor, p),
            None => write!(f, "v{}.{}", self.major, self.minor),
        }
    }
}

/// Minor-version window `[since, until)` during which a shape is served.
#[derive(Debug, Clone, Copy)]
pub struct ShapeWindow {
    pub shape: SourceShape,
    pub since: u32,
    pub until: Option<u32>,
}

impl ShapeWindow {
    const fn open(shape: SourceShape, since: u32) -> Self { Self { shape, since, until: None } }
    const fn closed(shape: SourceShape, since: u32, until: u32) -> Self { Self { shape, since, until: Some(until) } }

    fn contains(&self, level: u32) -> bool {
        level >= self.since && self.until.map_or(true, |until| level < until)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KindRule {
    pub kind: TrackedKind,
    pub windows: &'static [ShapeWindow],
}

/// Which shapes serve which kind, by minor version. New kinds or thresholds
/// go here.
pub static KIND_TABLE: &[KindRule] = &[
    KindRule { kind: TrackedKind::Namespace, windows: &[ShapeWindow::open(SourceShape::CoreV1Namespace, 0)] },
    KindRule { kind: TrackedKind::Service, windows: &[ShapeWindow::open(SourceShape::CoreV1Service, 0)] },
    KindRule {
        kind: TrackedKind::Ingress,
        windows: &[
            ShapeWindow::closed(SourceShape::ExtensionsV1Beta1Ingress, 0, 22),
            ShapeWindow::closed(SourceShape::NetworkingV1Beta1Ingress, 14, 22),
            ShapeWindow::open(SourceShape::NetworkingV1Ingress, 19),
        ],
    },
    KindRule {
        kind: TrackedKind::IngressClass,
        windows: &[
            ShapeWindow::closed(SourceShape::NetworkingV1Beta1IngressClass, 18, 22),
            ShapeWindow::open(SourceShape::NetworkingV1IngressClass, 19),
        ],
    },
    KindRule { kind: TrackedKind::Api, windows: &[ShapeWindow::open(SourceShape::HubV1Alpha1Api, 0)] },
    KindRule { kind: TrackedKind::ApiCollection, windows: &[ShapeWindow::open(SourceShape::HubV1Alpha1ApiCollection, 0)] },
];

/// Outcome of admitting a server version: the ordered shapes to try per kind.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    version: ServerVersion,
    plans: BTreeMap<TrackedKind, SmallVec<[SourceShape; 3]>>,
}

impl Capabilities {
    fn plan_for(version: ServerVersion, table: &[KindRule]) -> Self {
        let level = version.feature_level();
        let mut plans = BTreeMap::new();
        for rule in table {
            let mut windows: SmallVec<[ShapeWindow; 3]> = rule.windows.iter().copied().filter(|w| w.contains(level)).collect();
            if windows.is_empty() {
                continue;
            }
            windows.sort_by_key(|w| Reverse(w.since));
            plans.insert(rule.kind, windows.into_iter().map(|w| w.shape).collect());
        }
        Self { version, plans }
    }

    pub fn version(&self) -> ServerVersion { self.version }

    /// Shapes to try for `kind`, preferred first. Empty when the kind is not
    /// served at this version.
    pub fn plan(&self, kind: TrackedKind) -> &[SourceShape] {
        self.plans.get(&kind).map(|p| p.as_slice()).unwrap_or(&[])
    }

    pub fn served(&self, kind: TrackedKind) -> bool { !self.plan(kind).is_empty() }
}

/// Admits or rejects server versions.
#[derive(Debug, Clone, Copy)]
pub struct VersionGate {
    min_minor: u32,
    table: &'static [KindRule],
}

impl Default for VersionGate {
    fn default() -> Self { Self { min_minor: DEFAULT_MIN_MINOR, table: KIND_TABLE } }
}

impl VersionGate {
    pub fn new(min_minor: u32) -> Self { Self { min_minor, ..Self::default() } }

    pub fn with_table(mut self, table: &'static [KindRule]) -> Self {
        self.table = table;
        self
    }

    pub fn min_minor(&self) -> u32 { self.min_minor }

    /// Classify `raw`; fails with `UnsupportedVersion` when it is empty,
    /// malformed or older than the minimum.
    pub fn admit(&self, raw: &str) -> Result<Capabilities, TopologyError> {
        let version = ServerVersion::parse(raw).map_err(|reason| TopologyError::unsupported(raw, reason))?;
        if version.major < 1 || (version.major == 1 && version.minor < self.min_minor) {
            return Err(TopologyError::unsupported(raw, format!("minimum supported version is v1.{}", self.min_minor)));
        }
        Ok(Capabilities::plan_for(version, self.table))
    }
}
