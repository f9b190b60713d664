use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use log::{debug, error, info, warn};
use tokio::fs;
use tokio::sync::Semaphore;

use crate::catalog::{self, DEFAULT_BASE_URL};
use crate::engine::models::{LogoImageRef, LogoRecord, Manifest, ManufacturerRecord};
use crate::engine::state::{ItemFailure, ItemOutcome, RunOutcome, SyncReport};
use crate::env::{DEFAULT_TARGET_DIR, TargetLayout};
use crate::error::SyncError;
use crate::networking::{BlockingFetcher, BlockingHttpGet, Fetcher, HttpGet};
use crate::storage::digest::{digest, digest_file};
use crate::storage::{ManifestStore, merge, orphaned_images, write_atomic};
use crate::util::{file_extension, format_names, slugify};

pub mod models;
pub mod state;

pub const DEFAULT_CONCURRENCY: usize = 8;

/// What to do when a logo already on disk differs from the upstream bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ChangePolicy {
    /// Keep the local file and record nothing.
    #[default]
    Skip,
    /// Replace the local file and record the new download.
    Overwrite,
    /// Keep the local file and write the new bytes next to it under a
    /// content-tagged name.
    Version,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub base_url: String,
    pub target_dir: PathBuf,
    pub concurrency: usize,
    pub change_policy: ChangePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            target_dir: PathBuf::from(DEFAULT_TARGET_DIR),
            concurrency: DEFAULT_CONCURRENCY,
            change_policy: ChangePolicy::default(),
        }
    }
}

pub struct SyncEngine<C, B> {
    config: SyncConfig,
    layout: TargetLayout,
    store: ManifestStore,
    fetcher: Fetcher<C>,
    catalog: Arc<BlockingFetcher<B>>,
}

impl<C, B> SyncEngine<C, B>
where
    C: HttpGet,
    B: BlockingHttpGet + 'static,
{
    pub fn new(config: SyncConfig, fetcher: Fetcher<C>, catalog: BlockingFetcher<B>) -> Self {
        let layout = TargetLayout::new(&config.target_dir);
        let store = ManifestStore::new(layout.manifest_path());
        Self {
            config,
            layout,
            store,
            fetcher,
            catalog: Arc::new(catalog),
        }
    }

    /// Run one full sync. Only run-level failures (catalog, manifest) are
    /// returned as errors; per-manufacturer failures land in the report.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        info!("sync: discovering manufacturers");
        let manufacturers = self.discover().await?;

        let root = self.layout.root();
        if !fs::try_exists(root)
            .await
            .map_err(|e| SyncError::io("failed to inspect target directory", root, e))?
        {
            info!("sync: creating target directory {}", root.display());
            fs::create_dir_all(root)
                .await
                .map_err(|e| SyncError::io("failed to create target directory", root, e))?;
        }

        let existing = self.store.load().await?;
        if let Some(manifest) = &existing {
            debug!(
                "sync: found {} existing logos in {}",
                manifest.len(),
                self.store.path().display()
            );
        }

        info!(
            "sync: downloading logos for {} manufacturers",
            manufacturers.len()
        );
        let permits = Semaphore::new(self.config.concurrency.max(1));
        let tasks = manufacturers.iter().map(|manufacturer| {
            let permits = &permits;
            async move {
                let _permit = permits.acquire().await.ok();
                self.sync_one(manufacturer).await
            }
        });
        let results = join_all(tasks).await;

        let mut report = SyncReport {
            discovered: manufacturers.len(),
            existing: existing.as_ref().map(Manifest::len),
            downloaded: Vec::new(),
            unchanged: Vec::new(),
            changed_skipped: Vec::new(),
            not_found: Vec::new(),
            failures: Vec::new(),
            unaccounted: Vec::new(),
            orphans: Vec::new(),
            outcome: RunOutcome::NothingDownloaded,
            manifest_written: false,
        };
        let mut fresh = Vec::new();
        for (manufacturer, result) in manufacturers.iter().zip(results) {
            let name = manufacturer.name.clone();
            match result {
                Ok(ItemOutcome::Downloaded(record)) => {
                    report.downloaded.push(name);
                    fresh.push(record);
                }
                Ok(ItemOutcome::Unchanged) => report.unchanged.push(name),
                Ok(ItemOutcome::ChangedSkipped) => report.changed_skipped.push(name),
                Ok(ItemOutcome::NotFound) => report.not_found.push(name),
                Err(err) => report.failures.push(ItemFailure {
                    name,
                    error: err.to_string(),
                }),
            }
        }

        report.unaccounted = unaccounted_for(&manufacturers, &report.downloaded, existing.as_ref());
        report.outcome = RunOutcome::classify(
            report.discovered,
            report.existing,
            report.downloaded.len(),
        );
        self.log_outcome(&report);

        let merged = merge(existing.as_ref(), fresh);
        report.manifest_written = self.store.save(&merged, existing.as_ref()).await?;

        let images_dir = self.layout.images_dir();
        report.orphans =
            match tokio::task::spawn_blocking(move || orphaned_images(&images_dir, &merged)).await {
                Ok(orphans) => orphans,
                Err(err) => {
                    warn!("sync: orphan scan did not complete: {err}");
                    Vec::new()
                }
            };
        if !report.orphans.is_empty() {
            let listing = report
                .orphans
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>();
            warn!(
                "sync: {} image files are not referenced by the manifest: {}",
                listing.len(),
                format_names(&listing)
            );
        }

        Ok(report)
    }

    async fn discover(&self) -> Result<Vec<ManufacturerRecord>, SyncError> {
        let url = catalog::catalog_url(&self.config.base_url);
        debug!("sync: fetching manufacturer list from {url}");
        let body = Arc::clone(&self.catalog).fetch_off_runtime(url).await?;
        let manufacturers =
            catalog::discover(&self.config.base_url, &String::from_utf8_lossy(&body))
                .inspect_err(|err| error!("sync: {err}"))?;
        debug!("sync: discovered {} manufacturers", manufacturers.len());
        Ok(manufacturers)
    }

    async fn sync_one(&self, manufacturer: &ManufacturerRecord) -> Result<ItemOutcome, SyncError> {
        self.sync_logo(manufacturer).await.inspect_err(|err| {
            error!(
                "sync: failed to fetch logo for {}: {err}",
                manufacturer.name
            )
        })
    }

    async fn sync_logo(&self, manufacturer: &ManufacturerRecord) -> Result<ItemOutcome, SyncError> {
        let name = &manufacturer.name;
        debug!("sync: processing logo for {name}");

        let page_url = catalog::absolute_url(&self.config.base_url, &manufacturer.source_url)?;
        let page = self.fetcher.fetch(page_url.as_str()).await?;
        let Some(href) = catalog::find_logo_url(&String::from_utf8_lossy(&page)) else {
            warn!("sync: logo for {name} not found");
            return Ok(ItemOutcome::NotFound);
        };

        let logo_url = catalog::absolute_url(&self.config.base_url, &href)?;
        let slug = slugify(name);
        let extension = file_extension(&logo_url);
        let mut target = self.layout.image_path(&slug, &extension);

        let bytes = self.fetcher.fetch(logo_url.as_str()).await?;

        if file_exists(&target).await? {
            let fresh = digest(&bytes);
            if digest_file(&target).await? == fresh {
                debug!(
                    "sync: {} exists and hashes match; skipping download",
                    target.display()
                );
                return Ok(ItemOutcome::Unchanged);
            }
            match self.config.change_policy {
                ChangePolicy::Skip => {
                    info!(
                        "sync: {} differs from upstream; keeping local copy",
                        target.display()
                    );
                    return Ok(ItemOutcome::ChangedSkipped);
                }
                ChangePolicy::Overwrite => {
                    info!("sync: replacing changed logo {}", target.display());
                }
                ChangePolicy::Version => {
                    target = self
                        .layout
                        .versioned_image_path(&slug, &fresh.short(), &extension);
                    if file_exists(&target).await? {
                        debug!(
                            "sync: version {} already stored; skipping download",
                            target.display()
                        );
                        return Ok(ItemOutcome::Unchanged);
                    }
                    info!("sync: storing new version of {name} at {}", target.display());
                }
            }
        }

        write_atomic(&target, &bytes).await?;
        debug!("sync: downloaded logo for {name} to {}", target.display());

        Ok(ItemOutcome::Downloaded(LogoRecord {
            name: name.clone(),
            slug,
            image: LogoImageRef {
                source_url: logo_url.to_string(),
                local_path: target.display().to_string(),
            },
        }))
    }

    fn log_outcome(&self, report: &SyncReport) {
        match &report.outcome {
            RunOutcome::Complete { downloaded } => info!(
                "sync: downloaded {downloaded} logos to {}",
                self.layout.images_dir().display()
            ),
            RunOutcome::Shortfall {
                downloaded,
                expected,
            } => match report.existing {
                Some(existing) if existing > 0 => warn!(
                    "sync: downloaded only {downloaded} logos out of a desired {expected} new logos ({existing} already exist)"
                ),
                _ => warn!(
                    "sync: downloaded only {downloaded} logos out of {expected} discovered manufacturers"
                ),
            },
            RunOutcome::NothingDownloaded => error!("sync: no logos were downloaded"),
        }
        if !report.unaccounted.is_empty() {
            warn!(
                "sync: logos could not be downloaded for the following manufacturers: {}",
                format_names(&report.unaccounted)
            );
        }
    }
}

async fn file_exists(path: &std::path::Path) -> Result<bool, SyncError> {
    fs::try_exists(path)
        .await
        .map_err(|e| SyncError::io("failed to inspect image", path, e))
}

/// Discovered names that were neither downloaded this run nor recorded in the
/// manifest loaded at start.
pub fn unaccounted_for(
    discovered: &[ManufacturerRecord],
    downloaded: &[String],
    existing: Option<&Manifest>,
) -> Vec<String> {
    let mut accounted: BTreeSet<&str> = downloaded.iter().map(String::as_str).collect();
    if let Some(manifest) = existing {
        accounted.extend(manifest.names());
    }
    let missing: BTreeSet<&str> = discovered
        .iter()
        .map(|record| record.name.as_str())
        .filter(|name| !accounted.contains(name))
        .collect();
    missing.into_iter().map(str::to_owned).collect()
}
