//! Profile file store — one JSON file per profile.
//!
//! Files are named `<ProfileName>-Profile.json` and discovered with a loose
//! `*rofile.json` suffix match so both capitalizations (and hand-renamed
//! files) load at startup.

use std::path::{Path, PathBuf};

use almanac_core::config::ProfileRecord;
use almanac_core::error::{AlmanacError, Result};

/// Suffix every profile file matches at discovery time.
pub const PROFILE_FILE_SUFFIX: &str = "rofile.json";

/// The canonical file path for a profile name.
pub fn profile_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}-Profile.json"))
}

/// List profile files in a config folder, sorted for deterministic load
/// order.
pub async fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(|e| {
        AlmanacError::Persistence(format!("cannot scan {}: {e}", dir.display()))
    })?;
    let mut found = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(|e| {
        AlmanacError::Persistence(format!("cannot scan {}: {e}", dir.display()))
    })? {
        let path = entry.path();
        let is_profile = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PROFILE_FILE_SUFFIX));
        if is_profile {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Read and parse one profile file.
pub async fn read_profile(path: &Path) -> Result<ProfileRecord> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        AlmanacError::Persistence(format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_str(&json)?)
}

/// Serialize and write one profile file, pretty-printed.
pub async fn write_profile(path: &Path, record: &ProfileRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    tokio::fs::write(path, json).await.map_err(|e| {
        AlmanacError::Persistence(format!("cannot write {}: {e}", path.display()))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("almanac-test-store-{tag}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_discover_matches_both_spellings() {
        let dir = test_dir("discover");
        std::fs::write(dir.join("Home-Profile.json"), "{}").unwrap();
        std::fs::write(dir.join("barn-profile.json"), "{}").unwrap();
        std::fs::write(dir.join("notes.json"), "{}").unwrap();
        std::fs::write(dir.join("README.md"), "x").unwrap();

        let found = discover(&dir).await.unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Home-Profile.json", "barn-profile.json"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = test_dir("rw");
        let record = ProfileRecord { name: "Home".into(), ..ProfileRecord::default() };
        let path = profile_path(&dir, "Home");
        write_profile(&path, &record).await.unwrap();
        assert!(path.ends_with("Home-Profile.json"));

        let back = read_profile(&path).await.unwrap();
        assert_eq!(back.name, "Home");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_read_malformed_is_serialization_error() {
        let dir = test_dir("bad");
        let path = dir.join("Bad-Profile.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_profile(&path).await.unwrap_err();
        assert!(matches!(err, AlmanacError::Serialization(_)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
