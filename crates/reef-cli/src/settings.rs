//! Settings file for the `reef` binary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reef_crypto::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

/// Tunables read from an optional TOML file. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Storehouse directory holding one store per owner.
    pub store_root: PathBuf,
    /// Sealed chunk size used by `seal`.
    pub chunk_size: usize,
    /// Capacity for new stores in bytes. 0 means unlimited.
    pub default_capacity: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("./reef-store"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            default_capacity: 0,
        }
    }
}

impl Settings {
    /// Load from `path`, or use defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let s = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings: Settings =
            toml::from_str(&s).with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_file_means_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.chunk_size, 10240);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reef.toml");
        fs::write(&path, "store_root = \"/var/lib/reef\"\nchunk_size = 4096\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.store_root, PathBuf::from("/var/lib/reef"));
        assert_eq!(settings.chunk_size, 4096);
        assert_eq!(settings.default_capacity, 0);
    }

    #[test]
    fn unreadable_or_invalid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("missing.toml"))).is_err());

        let path = dir.path().join("bad.toml");
        fs::write(&path, "chunk_size = \"big\"").unwrap();
        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("invalid settings"));
    }
}
