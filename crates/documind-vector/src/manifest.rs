//! `manifest.json`: the commit point of a saved index.
//!
//! Readers trust only what the manifest names. `save` writes the data first
//! and then replaces the manifest with a rename, so a reader sees either the
//! old index or the new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::Path;

use documind_core::{Error, Result};

use crate::index::IndexSpec;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub generation: u64,
    pub model_id: String,
    pub dim: usize,
    pub normalized: bool,
    pub count: usize,
    pub created_at: DateTime<Utc>,
    /// Directory (relative to the index location) holding this generation.
    pub data_dir: String,
}

impl Manifest {
    pub fn spec(&self) -> IndexSpec {
        IndexSpec { model_id: self.model_id.clone(), dim: self.dim, normalized: self.normalized }
    }

    pub fn read(location: &Path) -> Result<Self> {
        let path = location.join(MANIFEST_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::IndexNotFound(location.to_path_buf())),
            Err(e) => return Err(Error::Io(e)),
        };
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| Error::corrupt(location, format!("unreadable manifest: {}", e)))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::corrupt(location, format!("unsupported format version {}", manifest.format_version)));
        }
        Ok(manifest)
    }

    /// Replace `location/manifest.json` in one rename.
    pub fn write_atomic(&self, location: &Path) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(location)?;
        serde_json::to_writer_pretty(&mut tmp, self).map_err(|e| Error::Storage(e.to_string()))?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(location.join(MANIFEST_FILE)).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn check_compatible(&self, expected: &IndexSpec, location: &Path) -> Result<()> {
        let actual = self.spec();
        if &actual != expected {
            return Err(Error::corrupt(
                location,
                format!(
                    "index was built with {} (dim {}, normalized {}) but queries use {} (dim {}, normalized {})",
                    actual.model_id, actual.dim, actual.normalized, expected.model_id, expected.dim, expected.normalized
                ),
            ));
        }
        Ok(())
    }
}

pub fn generation_dir_name(generation: u64) -> String {
    format!("gen-{:06}", generation)
}

pub fn parse_generation_dir(name: &str) -> Option<u64> {
    name.strip_prefix("gen-")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(generation: u64) -> Manifest {
        Manifest {
            format_version: FORMAT_VERSION,
            generation,
            model_id: "m".into(),
            dim: 3,
            normalized: false,
            count: 2,
            created_at: Utc::now(),
            data_dir: generation_dir_name(generation),
        }
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let tmp = tempfile::tempdir().expect("tmp");
        assert!(matches!(Manifest::read(tmp.path()), Err(Error::IndexNotFound(_))));
    }

    #[test]
    fn garbage_manifest_is_corrupt() {
        let tmp = tempfile::tempdir().expect("tmp");
        std::fs::write(tmp.path().join(MANIFEST_FILE), b"{not json").expect("write");
        assert!(matches!(Manifest::read(tmp.path()), Err(Error::IndexCorrupt { .. })));
    }

    #[test]
    fn write_then_read_replaces_previous() {
        let tmp = tempfile::tempdir().expect("tmp");
        sample(1).write_atomic(tmp.path()).expect("write 1");
        let second = sample(2);
        second.write_atomic(tmp.path()).expect("write 2");
        assert_eq!(Manifest::read(tmp.path()).expect("read"), second);
    }

    #[test]
    fn generation_dir_names_round_trip() {
        assert_eq!(generation_dir_name(7), "gen-000007");
        assert_eq!(parse_generation_dir("gen-000007"), Some(7));
        assert_eq!(parse_generation_dir("manifest.json"), None);
    }

    #[test]
    fn incompatible_spec_is_reported_as_corrupt() {
        let m = sample(1);
        let other = IndexSpec { model_id: "m".into(), dim: 3, normalized: true };
        assert!(matches!(m.check_compatible(&other, Path::new("/x")), Err(Error::IndexCorrupt { .. })));
        assert!(m.check_compatible(&m.spec(), Path::new("/x")).is_ok());
    }
}
