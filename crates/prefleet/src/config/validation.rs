//! Configuration validation.

use super::Config;
use crate::error::{PreError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.instances.is_empty() {
        return Err(PreError::Config(
            "at least one cbftp instance is required".into(),
        ));
    }

    for (name, instance) in &config.instances {
        reqwest::Url::parse(&instance.base_url).map_err(|e| {
            PreError::Config(format!("instances.{}.base_url is not a valid URL: {}", name, e))
        })?;

        if let Some(ref proxy) = instance.proxy {
            if !config.proxies.contains_key(proxy) {
                return Err(PreError::Config(format!(
                    "instances.{}.proxy references '{}' which is not defined in the proxies table",
                    name, proxy
                )));
            }
        }
    }

    for (name, site) in &config.sites {
        if !site.groups_dir.starts_with('/') {
            return Err(PreError::invalid_site(
                name,
                "'groups_dir' must be an absolute path",
            ));
        }

        if !site.pre_command.contains("{release}") || !site.pre_command.contains("{section}") {
            return Err(PreError::invalid_site(
                name,
                "'pre_command' must be a template containing '{release}' and '{section}'",
            ));
        }

        // Every section a site remaps must exist among the configured rules.
        for remapped in site.sections.keys() {
            if !config.sections.iter().any(|rule| &rule.name == remapped) {
                return Err(PreError::invalid_site(
                    name,
                    format!("section '{}' is not defined in the sections configuration", remapped),
                ));
            }
        }
    }

    Ok(())
}
