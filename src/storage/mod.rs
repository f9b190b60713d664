use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tokio::fs;
use walkdir::WalkDir;

use crate::engine::models::{LogoRecord, Manifest};
use crate::error::SyncError;

pub mod digest;

/// Owns `logos.json`: read once at the start of a run, written at most once
/// at the end.
#[derive(Clone, Debug)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no manifest has been written yet.
    pub async fn load(&self) -> Result<Option<Manifest>, SyncError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SyncError::io("failed to read manifest", &self.path, err)),
        };
        let manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|source| SyncError::Parse {
                path: self.path.clone(),
                source,
            })?;
        debug!(
            "manifest: loaded {} records from {}",
            manifest.len(),
            self.path.display()
        );
        Ok(Some(manifest))
    }

    /// Persist `merged` unless it is empty or identical to `previous`.
    /// Returns whether the file was written.
    pub async fn save(
        &self,
        merged: &Manifest,
        previous: Option<&Manifest>,
    ) -> Result<bool, SyncError> {
        if merged.is_empty() || previous == Some(merged) {
            debug!(
                "manifest: logo data is unchanged; skipping update of {}",
                self.path.display()
            );
            return Ok(false);
        }
        let bytes = serde_json::to_vec_pretty(merged).map_err(|source| SyncError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &bytes).await?;
        info!(
            "manifest: saved {} records to {}",
            merged.len(),
            self.path.display()
        );
        Ok(true)
    }
}

/// Union of `existing` and `fresh` by name, existing first so that a fresh
/// record replaces an existing one with the same name.
pub fn merge(existing: Option<&Manifest>, fresh: Vec<LogoRecord>) -> Manifest {
    let existing = existing
        .map(|manifest| manifest.records().to_vec())
        .unwrap_or_default();
    Manifest::from_records(existing.into_iter().chain(fresh))
}

/// Write to a temporary sibling, then rename over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::io("failed to create directory", parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.partial"));
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| SyncError::io("failed to write file", &tmp, e))?;
    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(SyncError::io("failed to move file into place", path, err));
    }
    Ok(())
}

/// Files under `images_dir` that no manifest record points at.
pub fn orphaned_images(images_dir: &Path, manifest: &Manifest) -> Vec<PathBuf> {
    if !images_dir.is_dir() {
        return Vec::new();
    }
    let referenced: BTreeSet<PathBuf> = manifest
        .records()
        .iter()
        .map(|record| PathBuf::from(&record.image.local_path))
        .collect();
    let mut orphans: Vec<PathBuf> = WalkDir::new(images_dir)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let hidden = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            !hidden && !referenced.contains(path)
        })
        .collect();
    orphans.sort();
    orphans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::models::LogoImageRef;

    fn record(name: &str, path: &str) -> LogoRecord {
        LogoRecord {
            name: name.into(),
            slug: crate::util::slugify(name),
            image: LogoImageRef {
                source_url: format!("https://www.carlogos.org/logo/{name}.png"),
                local_path: path.into(),
            },
        }
    }

    #[test]
    fn merge_unions_and_sorts_by_name() {
        let existing = Manifest::from_records([record("Audi", "a.png")]);
        let merged = merge(Some(&existing), vec![record("BMW", "b.png")]);
        let names: Vec<_> = merged.names().collect();
        assert_eq!(names, ["Audi", "BMW"]);
    }

    #[test]
    fn merge_lets_fresh_record_replace_same_name() {
        let existing = Manifest::from_records([record("Audi", "old.png"), record("Kia", "k.png")]);
        let merged = merge(Some(&existing), vec![record("Audi", "new.png")]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.records()[0].image.local_path, "new.png");
    }

    #[test]
    fn merge_without_existing_sorts_fresh() {
        let merged = merge(None, vec![record("Volvo", "v.png"), record("Audi", "a.png")]);
        assert_eq!(merged.names().collect::<Vec<_>>(), ["Audi", "Volvo"]);
    }

    #[tokio::test]
    async fn missing_manifest_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("logos.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logos.json");
        std::fs::write(&path, r#"{"name": "Audi"}"#).unwrap();
        let err = ManifestStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));

        std::fs::write(&path, r#"[{"name": "Audi", "slug": "audi"}]"#).unwrap();
        let err = ManifestStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));
    }

    #[tokio::test]
    async fn saves_merged_manifest_and_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("logos.json"));
        let existing = Manifest::from_records([record("Audi", "a.png")]);
        store.save(&existing, None).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        let merged = merge(Some(&loaded), vec![record("BMW", "b.png")]);
        assert!(store.save(&merged, Some(&loaded)).await.unwrap());
        assert_eq!(store.load().await.unwrap().unwrap(), merged);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["name"], "Audi");
        assert_eq!(raw[1]["image"]["path"], "b.png");
        assert_eq!(raw[1]["image"]["source"], "https://www.carlogos.org/logo/BMW.png");
    }

    #[tokio::test]
    async fn skips_write_when_unchanged_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("logos.json"));
        let manifest = Manifest::from_records([record("Audi", "a.png")]);

        assert!(!store.save(&Manifest::default(), None).await.unwrap());
        assert!(!store.path().exists());
        assert!(!store.save(&manifest, Some(&manifest)).await.unwrap());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logos.json");
        write_atomic(&path, b"[]").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"[]");
        assert!(!dir.path().join("nested").join(".logos.json.partial").exists());
    }

    #[test]
    fn finds_unreferenced_images() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        let kept = images.join("audi.png");
        let stray = images.join("saab.png");
        std::fs::write(&kept, b"a").unwrap();
        std::fs::write(&stray, b"s").unwrap();
        std::fs::write(images.join(".bmw.png.partial"), b"p").unwrap();

        let manifest = Manifest::from_records([record("Audi", &kept.display().to_string())]);
        assert_eq!(orphaned_images(&images, &manifest), vec![stray]);
        assert!(orphaned_images(&dir.path().join("absent"), &manifest).is_empty());
    }
}
