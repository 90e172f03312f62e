// ⚙️ Sync Configuration - Settings as data
// Loaded from an optional JSON file; CLI flags are layered on top by the binary

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_ACTOR: &str = "roster-sync";
pub const DEFAULT_ROSTER_ID_BASE: i64 = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Written into created_by / updated_by and the audit trail
    pub actor: String,

    /// Roster id base used when a school has no override
    pub default_roster_id_base: i64,

    /// Per-school roster id bases, keyed by school id
    pub roster_id_bases: HashMap<i64, i64>,

    pub extended_identity_check: bool,

    /// Mark roster entries missing from the batch as deleted
    pub soft_delete: bool,

    /// Run the whole pipeline without touching the store
    pub dry_run: bool,

    /// Explicit school; required when more than one exists
    pub school_id: Option<i64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            actor: DEFAULT_ACTOR.to_string(),
            default_roster_id_base: DEFAULT_ROSTER_ID_BASE,
            roster_id_bases: HashMap::new(),
            extended_identity_check: true,
            soft_delete: false,
            dry_run: false,
            school_id: None,
        }
    }
}

impl SyncConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Base the allocator falls back to for an empty roster
    pub fn base_for(&self, school_id: i64) -> i64 {
        self.roster_id_bases
            .get(&school_id)
            .copied()
            .unwrap_or(self.default_roster_id_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();

        assert_eq!(config.actor, "roster-sync");
        assert!(config.extended_identity_check);
        assert!(!config.soft_delete);
        assert!(!config.dry_run);
        assert_eq!(config.base_for(1), 100_000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "soft_delete": true, "roster_id_bases": {{ "2": 500000 }} }}"#
        )
        .unwrap();

        let config = SyncConfig::load(file.path()).unwrap();

        assert!(config.soft_delete);
        assert!(config.extended_identity_check);
        assert_eq!(config.base_for(2), 500_000);
        assert_eq!(config.base_for(3), 100_000);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(SyncConfig::load(file.path()).is_err());
    }
}
