//! # prefleet
//!
//! Release distribution across a fleet of FTP sites managed by a cbftp
//! instance, driven through its REST API.
//!
//! The library covers:
//!
//! - **Site policy resolution** mapping a release name to the destination
//!   group directory and section on each site
//! - **Remote service client** wrapping the cbftp REST contract
//! - **Transfer orchestration** for pre announcements, uploads and
//!   site-to-site (FXP) transfers
//! - **Job progress tracking** with cancellation and abort support
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prefleet::{ClientRegistry, Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> prefleet::Result<()> {
//!     let config = Arc::new(Config::load("config.yaml")?);
//!     let registry = ClientRegistry::from_config(&config)?;
//!     let remote = registry.get("main")?;
//!     let orchestrator = Orchestrator::connect(remote, config.clone()).await?;
//!     let job = orchestrator.upload(&config.sites["alpha"], "Some.Release-GRP", None).await?;
//!     println!("Submitted transfer job #{}", job.id);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod progress;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use client::{
    ClientRegistry, EntryKind, HttpRemote, JobStatus, PathEntry, RawCommand, RawPath,
    RemoteService, TargetFailure, TargetSelector, TransferJob, TransferRequest,
};
pub use config::{Config, DirPolicy, InstanceConfig, SectionRule, SiteConfig};
pub use error::{PreError, Result};
pub use orchestrator::Orchestrator;
pub use policy::Release;
pub use progress::{ConfirmAbort, JobTracker, ProgressSink};
