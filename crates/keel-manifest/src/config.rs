//! Manager configuration and environment probes.

/// Environment variable that, when non-empty, makes the manager skip
/// undecodable manifest blobs on load (with a warning) instead of failing
/// the whole load. Lets a corrupted repository still open and expose its
/// surviving entries.
pub const IGNORE_MALFORMED_MANIFEST_CONTENTS_ENV: &str = "KOPIA_IGNORE_MALFORMED_MANIFEST_CONTENTS";

/// Environment variable that, when non-empty, attaches a random hex tag to
/// the manager for log correlation.
pub const DEBUG_MANIFEST_MANAGER_ENV: &str = "KOPIA_DEBUG_MANIFEST_MANAGER";

/// Default blob count at or above which a post-load compaction runs.
pub const DEFAULT_AUTO_COMPACTION_THRESHOLD: usize = 16;

/// Default number of concurrent blob fetches during a reload.
pub(crate) const MANIFEST_LOAD_PARALLELISM: usize = 8;

/// Construction-time options for a
/// [`CommittedManifestManager`](crate::CommittedManifestManager).
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Serialization format written at commit time. Version 0 stores each
    /// entry's payload inline in the manifest blob; version 1 stores it as
    /// a separate indirect blob and keeps only its id inline.
    pub format_version: u8,
    /// Blob count at or above which the manager compacts opportunistically
    /// after a load.
    pub auto_compaction_threshold: usize,
    /// Concurrent blob fetches during a reload.
    pub load_parallelism: usize,
    /// Skip undecodable manifest blobs on load instead of failing.
    pub ignore_malformed: bool,
    /// Tag attached to debug logs for correlating managers.
    pub debug_tag: Option<String>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            format_version: 1,
            auto_compaction_threshold: DEFAULT_AUTO_COMPACTION_THRESHOLD,
            load_parallelism: MANIFEST_LOAD_PARALLELISM,
            ignore_malformed: false,
            debug_tag: None,
        }
    }
}

impl ManagerOptions {
    /// Default options with the two environment probes applied.
    pub fn from_env() -> Self {
        Self {
            ignore_malformed: env_set(IGNORE_MALFORMED_MANIFEST_CONTENTS_ENV),
            debug_tag: env_set(DEBUG_MANIFEST_MANAGER_ENV)
                .then(|| format!("{:016x}", rand::random::<u64>())),
            ..Self::default()
        }
    }
}

fn env_set(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|value| !value.is_empty())
}
