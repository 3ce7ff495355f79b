//! Transfer orchestrator - coordinates pre announcements, uploads and FXP
//! transfers against one remote instance.
//!
//! `pre` fans out one raw command per site concurrently; upload and FXP
//! submissions are sequential by design, since the remote service queues
//! transfers itself and a burst of setup calls buys nothing. Iteration
//! order across releases and sites is whatever the caller provides
//! (the CLI iterates sites outer, releases inner).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, Semaphore};
use tracing::{debug, info};

use crate::client::{
    EntryKind, RawCommand, RawPath, RemoteService, TargetFailure, TargetSelector, TransferJob,
    TransferRequest,
};
use crate::config::{Config, SiteConfig};
use crate::error::{PreError, Result};
use crate::policy::{self, Release};

/// Upper bound on concurrent `pre` dispatch workers. One worker per site
/// is used below this cap; the remote serializes per-site command
/// execution anyway, so more buys nothing.
pub const DEFAULT_MAX_PRE_WORKERS: usize = 16;

type DirCache = Mutex<HashMap<String, Arc<OnceCell<Arc<Vec<String>>>>>>;

/// Orchestrates fleet operations against one remote instance.
pub struct Orchestrator {
    remote: Arc<dyn RemoteService>,
    config: Arc<Config>,
    /// Per-site group-directory listings, fetched at most once per run.
    dir_cache: DirCache,
    max_pre_workers: usize,
}

impl Orchestrator {
    /// Create an orchestrator, probing the remote instance first.
    ///
    /// Fails with [`PreError::Unavailable`] when the instance does not
    /// answer the liveness probe, before any operation is attempted.
    pub async fn connect(remote: Arc<dyn RemoteService>, config: Arc<Config>) -> Result<Self> {
        if !remote.is_available().await {
            return Err(PreError::Unavailable(remote.instance_name().to_string()));
        }
        Ok(Orchestrator {
            remote,
            config,
            dir_cache: Mutex::new(HashMap::new()),
            max_pre_workers: DEFAULT_MAX_PRE_WORKERS,
        })
    }

    /// Override the pre-dispatch concurrency cap.
    pub fn with_max_pre_workers(mut self, max: usize) -> Self {
        self.max_pre_workers = max.max(1);
        self
    }

    /// The remote service this orchestrator operates on.
    pub fn remote(&self) -> Arc<dyn RemoteService> {
        self.remote.clone()
    }

    /// List site IDs available on the remote instance.
    pub async fn sites(&self) -> Result<Vec<String>> {
        self.remote.list_sites().await
    }

    /// Group directories existing on a site, memoized for the run.
    ///
    /// The cell is initialized at most once per site even under concurrent
    /// first access; the directory layout does not change mid-run.
    async fn group_dirs(&self, site: &SiteConfig) -> Result<Arc<Vec<String>>> {
        let cell = {
            let mut cache = self.dir_cache.lock().await;
            cache.entry(site.id.clone()).or_default().clone()
        };
        let dirs = cell
            .get_or_try_init(|| async {
                let entries = self
                    .remote
                    .list_path(&site.id, &site.groups_dir, Some(EntryKind::Dir))
                    .await?;
                debug!(site = %site.id, count = entries.len(), "fetched group directories");
                Ok::<_, PreError>(Arc::new(
                    entries.into_iter().map(|entry| entry.name).collect(),
                ))
            })
            .await?;
        Ok(dirs.clone())
    }

    /// Resolve the destination directory for a release on a site.
    async fn destination(&self, site: &SiteConfig, release: &Release) -> Result<String> {
        let dirs = self.group_dirs(site).await?;
        policy::resolve_destination_path(site, release, &dirs)
    }

    /// Pre a release to the given sites, one concurrent worker per site.
    ///
    /// Every site gets its command dispatched regardless of sibling
    /// failures; outcomes are collected after all sites have responded and
    /// surfaced together as one aggregated [`PreError::CommandFailure`].
    pub async fn pre(self: &Arc<Self>, release_name: &str, sites: &[SiteConfig]) -> Result<()> {
        let release = Release::parse(release_name)?;
        let workers = self.max_pre_workers.min(sites.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut handles = Vec::with_capacity(sites.len());
        for site in sites {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let this = Arc::clone(self);
            let site_id = site.id.clone();
            let site = site.clone();
            let release = release.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                this.pre_one(&site, &release).await
            });
            handles.push((site_id, handle));
        }

        let mut failures = Vec::new();
        for (site_id, handle) in handles {
            match handle.await {
                Ok(Ok(())) => debug!(site = %site_id, release = release_name, "pre dispatched"),
                Ok(Err(e)) => failures.push(TargetFailure {
                    name: site_id,
                    reason: e.to_string(),
                }),
                Err(e) => failures.push(TargetFailure {
                    name: site_id,
                    reason: format!("task panicked: {}", e),
                }),
            }
        }

        if !failures.is_empty() {
            return Err(PreError::CommandFailure {
                command: format!("pre {}", release_name),
                failures,
            });
        }
        info!(release = release_name, sites = sites.len(), "pre complete");
        Ok(())
    }

    async fn pre_one(&self, site: &SiteConfig, release: &Release) -> Result<()> {
        let section = policy::resolve_section(&self.config.sections, site, release.name())?;
        let dst_path = self.destination(site, release).await?;
        let command = policy::render_pre_command(site, release.name(), &section);

        let raw = RawCommand {
            command,
            run_async: false,
            targets: TargetSelector::Sites(vec![site.id.clone()]),
            path: Some(RawPath::Directory(dst_path)),
            timeout: None,
        };
        self.remote.submit_raw_command(&raw).await?;
        Ok(())
    }

    /// Upload a release to a site, returning the submitted transfer job.
    pub async fn upload(
        &self,
        site: &SiteConfig,
        release_name: &str,
        src_path: Option<&str>,
    ) -> Result<TransferJob> {
        let release = Release::parse(release_name)?;
        let dst_path = self.destination(site, &release).await?;

        let request = TransferRequest {
            src_site: None,
            src_path: src_path.map(str::to_string),
            dst_site: site.id.clone(),
            dst_path,
            name: release.name().to_string(),
        };
        let job = self.remote.submit_transfer(&request).await?;
        info!(release = release_name, site = %site.id, job = job.id, "upload submitted");
        Ok(job)
    }

    /// FXP a release between two sites, returning the submitted job.
    pub async fn fxp(
        &self,
        src_site: &SiteConfig,
        dst_site: &SiteConfig,
        release_name: &str,
    ) -> Result<TransferJob> {
        let release = Release::parse(release_name)?;
        let src_path = self.destination(src_site, &release).await?;
        let dst_path = self.destination(dst_site, &release).await?;

        let request = TransferRequest {
            src_site: Some(src_site.id.clone()),
            src_path: Some(src_path),
            dst_site: dst_site.id.clone(),
            dst_path,
            name: release.name().to_string(),
        };
        let job = self.remote.submit_transfer(&request).await?;
        info!(
            release = release_name,
            from = %src_site.id,
            to = %dst_site.id,
            job = job.id,
            "fxp submitted"
        );
        Ok(job)
    }

    /// Whether the release's directory on a site contains a completion
    /// marker (any entry name containing "COMPLETE" in any casing).
    pub async fn check_complete(&self, release_name: &str, site: &SiteConfig) -> Result<bool> {
        let release = Release::parse(release_name)?;
        let release_dir = format!("{}/{}", self.destination(site, &release).await?, release.name());
        let entries = self.remote.list_path(&site.id, &release_dir, None).await?;
        Ok(entries
            .iter()
            .any(|entry| entry.name.to_ascii_uppercase().contains("COMPLETE")))
    }
}
