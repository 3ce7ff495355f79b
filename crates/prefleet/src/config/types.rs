//! Configuration type definitions.

use regex::{Regex, RegexBuilder};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Section rules, tested in declaration order (first match wins).
    pub sections: Vec<SectionRule>,

    /// Site definitions, keyed by a short local name.
    pub sites: BTreeMap<String, SiteConfig>,

    /// Remote cbftp instances, keyed by name.
    pub instances: BTreeMap<String, InstanceConfig>,

    /// Named outbound proxies (name -> proxy URL).
    #[serde(default)]
    pub proxies: BTreeMap<String, String>,
}

/// An ordered section rule: a section name and a case-insensitive pattern.
///
/// Declared in the config file as a two-element list, e.g.
/// `["flac", "\\.FLAC-"]`. The pattern is compiled at parse time so an
/// invalid regex is rejected before any operation runs.
#[derive(Debug, Clone)]
pub struct SectionRule {
    /// Canonical section name.
    pub name: String,

    /// Case-insensitive pattern the release name is tested against.
    pub pattern: Regex,
}

impl<'de> Deserialize<'de> for SectionRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (name, pattern): (String, String) = Deserialize::deserialize(deserializer)?;
        let pattern = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| D::Error::custom(format!("invalid section pattern for '{}': {}", name, e)))?;
        Ok(SectionRule { name, pattern })
    }
}

/// Site configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// cbftp site ID.
    pub id: String,

    /// Absolute path to the groups directory root on the site.
    pub groups_dir: String,

    /// Pre command template; must contain `{release}` and `{section}`.
    pub pre_command: String,

    /// Directory-resolution policy.
    pub dir_policy: DirPolicy,

    /// Section-name remapping (canonical name -> site-specific name).
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
}

/// Directory-resolution policy for a site.
///
/// Exactly one mode is active per site, enforced by the tagged
/// representation at parse time. Each mode carries its own optional
/// fallback directory, used when the resolved directory does not exist
/// on the site.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DirPolicy {
    /// One fixed directory for all releases.
    FixedDir {
        dir: String,
        #[serde(default)]
        default: Option<String>,
    },

    /// Use a directory named after the release's group tag.
    MatchGroupTag {
        #[serde(default)]
        default: Option<String>,
    },

    /// Look the group tag up in an explicit tag -> directory mapping.
    GroupMap {
        map: BTreeMap<String, String>,
        #[serde(default)]
        default: Option<String>,
    },
}

impl DirPolicy {
    /// The fallback directory for this policy, if any.
    pub fn default_dir(&self) -> Option<&str> {
        match self {
            DirPolicy::FixedDir { default, .. }
            | DirPolicy::MatchGroupTag { default }
            | DirPolicy::GroupMap { default, .. } => default.as_deref(),
        }
    }
}

/// A remote cbftp instance.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Base URL of the REST API.
    pub base_url: String,

    /// Shared API password (HTTP basic auth with an empty username).
    pub password: String,

    /// Verify the TLS certificate. cbftp serves a self-signed certificate,
    /// so this defaults to false.
    #[serde(default)]
    pub verify: bool,

    /// Name of the proxy to use, referencing the `proxies` table.
    #[serde(default)]
    pub proxy: Option<String>,
}
