//! reqwest-backed implementation of the remote service contract.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Proxy, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use super::{
    EntryKind, PathEntry, RawCommand, RawResponse, RemoteService, TransferJob, TransferRequest,
};
use crate::config::InstanceConfig;
use crate::error::{PreError, Result};

/// Query-string encoding matching `urlencode(..., safe='/')`: everything
/// but unreserved characters and `/` is percent-encoded. cbftp does not
/// decode an encoded slash in the `path` parameter.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A cbftp instance reached over its REST API.
///
/// Authentication is HTTP basic with an empty username and the instance's
/// shared password. cbftp serves a self-signed certificate, so certificate
/// verification is off unless the instance config enables it.
pub struct HttpRemote {
    name: String,
    base_url: String,
    password: String,
    http: Client,
}

impl HttpRemote {
    /// Build a client for one instance. `proxy_url` is the resolved proxy
    /// address, if the instance references one.
    pub fn new(name: String, instance: &InstanceConfig, proxy_url: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().danger_accept_invalid_certs(!instance.verify);
        if let Some(proxy) = proxy_url {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let http = builder.build()?;

        Ok(HttpRemote {
            name,
            base_url: instance.base_url.trim_end_matches('/').to_string(),
            password: instance.password.clone(),
            http,
        })
    }

    fn url(&self, path_and_query: &str) -> Result<Url> {
        let raw = format!("{}{}", self.base_url, path_and_query);
        Url::parse(&raw).map_err(|e| PreError::InvalidRequest(format!("bad URL '{}': {}", raw, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        trace!(instance = %self.name, "GET {}", path_and_query);
        let response = self
            .http
            .get(self.url(path_and_query)?)
            .basic_auth("", Some(&self.password))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path_and_query: &str,
        body: &B,
    ) -> Result<T> {
        trace!(instance = %self.name, "POST {}", path_and_query);
        let response = self
            .http
            .post(self.url(path_and_query)?)
            .basic_auth("", Some(&self.password))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    fn instance_name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        let Ok(url) = self.url("/") else {
            return false;
        };
        // Any HTTP response counts as reachable, only a transport-level
        // failure does not.
        self.http
            .head(url)
            .basic_auth("", Some(&self.password))
            .send()
            .await
            .is_ok()
    }

    async fn list_sites(&self) -> Result<Vec<String>> {
        self.get_json("/sites").await
    }

    async fn list_path(
        &self,
        site: &str,
        path: &str,
        filter: Option<EntryKind>,
    ) -> Result<Vec<PathEntry>> {
        let query = format!(
            "/path?site={}&path={}",
            utf8_percent_encode(site, QUERY),
            utf8_percent_encode(path, QUERY)
        );
        let mut entries: Vec<PathEntry> = self.get_json(&query).await?;
        if let Some(kind) = filter {
            entries.retain(|entry| entry.kind == kind);
        }
        Ok(entries)
    }

    async fn submit_raw_command(&self, command: &RawCommand) -> Result<RawResponse> {
        command.validate()?;
        let response: RawResponse = self.post_json("/raw", &command.to_body()).await?;
        if !response.failures.is_empty() {
            return Err(PreError::CommandFailure {
                command: command.command.clone(),
                failures: response.failures,
            });
        }
        debug!(instance = %self.name, command = %command.command, "raw command succeeded");
        Ok(response)
    }

    async fn get_transfer_job(&self, id: i64) -> Result<TransferJob> {
        self.get_json(&format!("/transferjobs/{}?id=true", id)).await
    }

    async fn abort_transfer_job(&self, id: i64) -> Result<()> {
        trace!(instance = %self.name, "aborting transfer job #{}", id);
        self.http
            .post(self.url(&format!("/transferjobs/{}/abort?id=true", id))?)
            .basic_auth("", Some(&self.password))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferJob> {
        self.post_json("/transferjobs", request).await
    }
}
