//! Shared test fixtures: an in-memory remote service and config builders.

use async_trait::async_trait;
use regex::RegexBuilder;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::client::{
    EntryKind, JobStatus, PathEntry, RawCommand, RawResponse, RemoteService, TargetFailure,
    TargetSelector, TransferJob, TransferRequest,
};
use crate::config::{DirPolicy, SectionRule, SiteConfig};
use crate::error::{PreError, Result};

/// A site with the given directory policy and a standard shape otherwise.
pub(crate) fn site_with_policy(dir_policy: DirPolicy) -> SiteConfig {
    SiteConfig {
        id: "AL".to_string(),
        groups_dir: "/groups".to_string(),
        pre_command: "site pre {release} {section}".to_string(),
        dir_policy,
        sections: BTreeMap::new(),
    }
}

/// Compile (name, pattern) pairs into ordered section rules.
pub(crate) fn section_rules(rules: &[(&str, &str)]) -> Vec<SectionRule> {
    rules
        .iter()
        .map(|(name, pattern)| SectionRule {
            name: name.to_string(),
            pattern: RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap(),
        })
        .collect()
}

/// A scripted transfer job state.
pub(crate) fn job_state(id: i64, status: JobStatus, estimated: u64, progress: u64) -> TransferJob {
    TransferJob {
        id,
        status,
        size_estimated_bytes: estimated,
        size_progress_bytes: progress,
    }
}

/// In-memory stand-in for a cbftp instance.
///
/// Directory listings and per-job state sequences are seeded up front;
/// every call is recorded for assertions.
pub(crate) struct FakeRemote {
    pub available: bool,
    pub sites: Vec<String>,
    /// (site, path) -> seeded entries.
    pub listings: Mutex<HashMap<(String, String), Vec<PathEntry>>>,
    /// Artificial latency for `list_path`, to force overlap in cache tests.
    pub list_delay: Duration,
    /// Site IDs whose raw commands fail, with the reason.
    pub raw_failures: HashMap<String, String>,

    pub list_calls: AtomicUsize,
    pub raw_calls: Mutex<Vec<RawCommand>>,
    pub submitted: Mutex<Vec<TransferRequest>>,
    pub abort_calls: Mutex<Vec<i64>>,
    /// Scripted job states, consumed front to back; the last state repeats.
    pub jobs: Mutex<HashMap<i64, VecDeque<TransferJob>>>,

    next_job_id: AtomicI64,
}

impl FakeRemote {
    pub fn new() -> Self {
        FakeRemote {
            available: true,
            sites: Vec::new(),
            listings: Mutex::new(HashMap::new()),
            list_delay: Duration::ZERO,
            raw_failures: HashMap::new(),
            list_calls: AtomicUsize::new(0),
            raw_calls: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            abort_calls: Mutex::new(Vec::new()),
            jobs: Mutex::new(HashMap::new()),
            next_job_id: AtomicI64::new(100),
        }
    }

    /// Seed a directory listing of DIR entries.
    pub fn with_dir_listing(self, site: &str, path: &str, names: &[&str]) -> Self {
        let entries = names
            .iter()
            .map(|name| PathEntry {
                name: name.to_string(),
                kind: EntryKind::Dir,
            })
            .collect();
        self.listings
            .lock()
            .unwrap()
            .insert((site.to_string(), path.to_string()), entries);
        self
    }

    /// Seed a listing of FILE entries.
    pub fn with_file_listing(self, site: &str, path: &str, names: &[&str]) -> Self {
        let entries = names
            .iter()
            .map(|name| PathEntry {
                name: name.to_string(),
                kind: EntryKind::File,
            })
            .collect();
        self.listings
            .lock()
            .unwrap()
            .insert((site.to_string(), path.to_string()), entries);
        self
    }

    /// Script the state sequence a job will report.
    pub fn with_job_states(self, id: i64, states: Vec<TransferJob>) -> Self {
        self.jobs.lock().unwrap().insert(id, states.into());
        self
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    fn instance_name(&self) -> &str {
        "fake"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn list_sites(&self) -> Result<Vec<String>> {
        Ok(self.sites.clone())
    }

    async fn list_path(
        &self,
        site: &str,
        path: &str,
        filter: Option<EntryKind>,
    ) -> Result<Vec<PathEntry>> {
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = self
            .listings
            .lock()
            .unwrap()
            .get(&(site.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_default();
        if let Some(kind) = filter {
            entries.retain(|entry| entry.kind == kind);
        }
        Ok(entries)
    }

    async fn submit_raw_command(&self, command: &RawCommand) -> Result<RawResponse> {
        command.validate()?;
        self.raw_calls.lock().unwrap().push(command.clone());

        let failures: Vec<TargetFailure> = match &command.targets {
            TargetSelector::Sites(sites) => sites
                .iter()
                .filter_map(|site| {
                    self.raw_failures.get(site).map(|reason| TargetFailure {
                        name: site.clone(),
                        reason: reason.clone(),
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        if !failures.is_empty() {
            return Err(PreError::CommandFailure {
                command: command.command.clone(),
                failures,
            });
        }
        Ok(RawResponse { failures: Vec::new() })
    }

    async fn get_transfer_job(&self, id: i64) -> Result<TransferJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let states = jobs
            .get_mut(&id)
            .ok_or_else(|| PreError::InvalidRequest(format!("unknown job #{}", id)))?;
        if states.len() > 1 {
            Ok(states.pop_front().unwrap())
        } else {
            states
                .front()
                .cloned()
                .ok_or_else(|| PreError::InvalidRequest(format!("job #{} has no state", id)))
        }
    }

    async fn abort_transfer_job(&self, id: i64) -> Result<()> {
        self.abort_calls.lock().unwrap().push(id);
        Ok(())
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferJob> {
        self.submitted.lock().unwrap().push(request.clone());
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        Ok(TransferJob {
            id,
            status: JobStatus::Queued,
            size_estimated_bytes: 0,
            size_progress_bytes: 0,
        })
    }
}
