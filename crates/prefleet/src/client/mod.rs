//! Remote service client for the cbftp REST API.
//!
//! This module defines the wire types, the [`RemoteService`] seam the
//! orchestrator depends on, and the [`HttpRemote`] implementation backed
//! by reqwest. Request validation happens before any network call; a
//! non-success transport response is fatal to that call, and multi-target
//! command failures are aggregated into one error.

mod http;

pub use http::HttpRemote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{PreError, Result};

/// A directory entry returned by the `/path` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PathEntry {
    /// Entry name.
    pub name: String,

    /// Entry type.
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Path entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    File,
    Dir,
}

/// Transfer job status, vocabulary defined by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Done,
    Failed,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether the job can no longer make progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Aborted)
    }
}

/// A transfer job as reported by the remote service.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferJob {
    /// Remote-assigned job identifier.
    pub id: i64,

    /// Current status.
    #[serde(default)]
    pub status: JobStatus,

    /// Estimated total bytes. Zero until the remote has sized the job.
    #[serde(default)]
    pub size_estimated_bytes: u64,

    /// Bytes transferred so far.
    #[serde(default)]
    pub size_progress_bytes: u64,
}

/// Request body for submitting a transfer job (upload or FXP).
///
/// `src_site` and `src_path` are absent for pure uploads from the local
/// working directory of the remote service.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_site: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_path: Option<String>,

    pub dst_site: String,

    pub dst_path: String,

    /// Release name.
    pub name: String,
}

/// Target selection for a raw command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// Every site known to the instance.
    AllSites,
    /// An explicit list of site IDs.
    Sites(Vec<String>),
    /// Sites that have the given sections defined.
    SitesWithSections(Vec<String>),
}

/// Working directory for a raw command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPath {
    /// cwd to this directory before running the command.
    Directory(String),
    /// cwd to this section before running the command.
    Section(String),
}

/// A raw command to run against one or more sites.
///
/// The typed selector makes conflicting target options unrepresentable;
/// remaining caller mistakes (empty command, empty site list) are rejected
/// by [`RawCommand::validate`] before any network call.
#[derive(Debug, Clone)]
pub struct RawCommand {
    /// The FTP command line to send.
    pub command: String,

    /// Whether the remote should run the command without waiting for the
    /// result.
    pub run_async: bool,

    /// Target selection.
    pub targets: TargetSelector,

    /// Optional working directory or section.
    pub path: Option<RawPath>,

    /// Max wait time in seconds before the remote fails the command.
    pub timeout: Option<u64>,
}

impl RawCommand {
    /// Reject malformed requests before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(PreError::InvalidRequest("raw command is empty".into()));
        }
        match &self.targets {
            TargetSelector::Sites(sites) if sites.is_empty() => {
                Err(PreError::InvalidRequest("empty site list".into()))
            }
            TargetSelector::SitesWithSections(sections) if sections.is_empty() => {
                Err(PreError::InvalidRequest("empty section list".into()))
            }
            _ => Ok(()),
        }
    }

    /// Build the wire body, omitting absent fields.
    pub(crate) fn to_body(&self) -> RawCommandBody<'_> {
        let mut body = RawCommandBody {
            command: &self.command,
            run_async: self.run_async,
            sites_all: None,
            sites: None,
            sites_with_sections: None,
            path: None,
            path_section: None,
            timeout: self.timeout,
        };
        match &self.targets {
            TargetSelector::AllSites => body.sites_all = Some(true),
            TargetSelector::Sites(sites) => body.sites = Some(sites),
            TargetSelector::SitesWithSections(sections) => body.sites_with_sections = Some(sections),
        }
        match &self.path {
            Some(RawPath::Directory(path)) => body.path = Some(path),
            Some(RawPath::Section(section)) => body.path_section = Some(section),
            None => {}
        }
        body
    }
}

/// Wire representation of a raw command request.
#[derive(Debug, Serialize)]
pub(crate) struct RawCommandBody<'a> {
    pub command: &'a str,

    #[serde(rename = "async")]
    pub run_async: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites_all: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites: Option<&'a [String]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites_with_sections: Option<&'a [String]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_section: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// One failed target of a batch command.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetFailure {
    /// Target (site) identifier.
    pub name: String,

    /// Failure reason as reported by the remote.
    pub reason: String,
}

/// Response of the `/raw` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    /// Per-target failures. Non-empty failures are a command-level error,
    /// not a transport error.
    #[serde(default)]
    pub failures: Vec<TargetFailure>,
}

/// The remote file-transfer control service.
///
/// Implemented by [`HttpRemote`] for a live cbftp instance and by
/// in-memory fakes in tests.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Instance name, for logs and error messages.
    fn instance_name(&self) -> &str;

    /// Liveness probe. Any HTTP response (even an error status) counts as
    /// reachable; only a transport-level failure counts as unreachable.
    async fn is_available(&self) -> bool;

    /// List site IDs known to the instance.
    async fn list_sites(&self) -> Result<Vec<String>>;

    /// List a directory on a site, optionally filtered by entry type.
    async fn list_path(
        &self,
        site: &str,
        path: &str,
        filter: Option<EntryKind>,
    ) -> Result<Vec<PathEntry>>;

    /// Run a raw command. Fails with [`PreError::CommandFailure`] carrying
    /// every (target, reason) pair when any target fails.
    async fn submit_raw_command(&self, command: &RawCommand) -> Result<RawResponse>;

    /// Fetch the current state of a transfer job.
    async fn get_transfer_job(&self, id: i64) -> Result<TransferJob>;

    /// Abort a transfer job.
    async fn abort_transfer_job(&self, id: i64) -> Result<()>;

    /// Submit an upload or FXP transfer.
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferJob>;
}

/// Registry of remote clients, one per configured instance.
///
/// Constructed once by the top-level run context and passed by reference
/// to all operations; there is no process-wide cached state.
pub struct ClientRegistry {
    clients: BTreeMap<String, Arc<HttpRemote>>,
}

impl ClientRegistry {
    /// Build a client for every configured instance.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut clients = BTreeMap::new();
        for (name, instance) in &config.instances {
            let proxy_url = instance
                .proxy
                .as_ref()
                .and_then(|proxy| config.proxies.get(proxy))
                .map(String::as_str);
            let client = HttpRemote::new(name.clone(), instance, proxy_url)?;
            clients.insert(name.clone(), Arc::new(client));
        }
        Ok(ClientRegistry { clients })
    }

    /// Get the client for a named instance.
    pub fn get(&self, name: &str) -> Result<Arc<HttpRemote>> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| PreError::Config(format!("unknown cbftp instance '{}'", name)))
    }

    /// Names of all configured instances.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}
