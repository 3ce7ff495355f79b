//! Error types for the prefleet library.

use thiserror::Error;

use crate::client::TargetFailure;

/// Main error type for fleet operations.
#[derive(Error, Debug)]
pub enum PreError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A site definition violates a structural invariant.
    #[error("Invalid configuration for site '{site}': {reason}")]
    InvalidSiteConfig { site: String, reason: String },

    /// Release name has no group tag (no hyphen).
    #[error("Malformed release name '{0}': no group tag found")]
    MalformedReleaseName(String),

    /// No group directory could be determined for the release's tag.
    #[error("No group directory for tag '{tag}' on site '{site}', and no default configured")]
    UnresolvableGroup { site: String, tag: String },

    /// Neither the candidate nor the fallback directory exists on the site.
    #[error("No matching group directory for '{release}' on site '{site}'")]
    NoMatchingGroupDirectory { site: String, release: String },

    /// No configured section rule matched the release name.
    #[error("No matching section for '{0}'")]
    NoMatchingSection(String),

    /// Caller misuse detected before any network call was made.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A batch remote command failed on one or more targets.
    #[error("Command '{command}' failed on:\n{}", format_failures(.failures))]
    CommandFailure {
        command: String,
        failures: Vec<TargetFailure>,
    },

    /// The remote instance did not answer the liveness probe.
    #[error("Remote instance '{0}' is not reachable")]
    Unavailable(String),

    /// Transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled by the operator.
    #[error("Operation cancelled")]
    Cancelled,
}

fn format_failures(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {}: {}", f.name, f.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

impl PreError {
    /// Create an InvalidSiteConfig error.
    pub fn invalid_site(site: impl Into<String>, reason: impl Into<String>) -> Self {
        PreError::InvalidSiteConfig {
            site: site.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            PreError::Config(_)
            | PreError::InvalidSiteConfig { .. }
            | PreError::Yaml(_)
            | PreError::Io(_) => 2,
            PreError::Unavailable(_) | PreError::Http(_) => 3,
            PreError::CommandFailure { .. } => 4,
            PreError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for fleet operations.
pub type Result<T> = std::result::Result<T, PreError>;
