//! Site policy resolution.
//!
//! Pure functions mapping a release name and a site's directory-layout
//! policy to the destination directory and section on that site. No
//! network access happens here; the live directory listing is supplied
//! by the caller.

use crate::config::{DirPolicy, SectionRule, SiteConfig};
use crate::error::{PreError, Result};

/// A release name with its parsed group tag.
///
/// Immutable once constructed. The group tag is the text after the final
/// hyphen of the release name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    name: String,
    group: String,
}

impl Release {
    /// Parse a release name, extracting the group tag.
    pub fn parse(name: &str) -> Result<Self> {
        let (_, group) = name
            .rsplit_once('-')
            .ok_or_else(|| PreError::MalformedReleaseName(name.to_string()))?;
        Ok(Release {
            name: name.to_string(),
            group: group.to_string(),
        })
    }

    /// The full release name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group tag (text after the final hyphen).
    pub fn group(&self) -> &str {
        &self.group
    }
}

/// Strip the case-insensitive `_int` suffix marking internal releases.
fn strip_internal_suffix(dir: &str) -> &str {
    if let Some(cut) = dir.len().checked_sub(4) {
        // get() rather than slicing: the offset may fall inside a
        // multibyte character, which is not a suffix match anyway.
        if dir.get(cut..).is_some_and(|tail| tail.eq_ignore_ascii_case("_int")) {
            return &dir[..cut];
        }
    }
    dir
}

/// Determine the candidate and fallback group directories for a release.
///
/// Both names are normalized by stripping a trailing `_int` before any
/// further use. The candidate can be absent in group-map mode when the
/// tag is unmapped but a default exists.
pub fn resolve_group_dir(
    site: &SiteConfig,
    release: &Release,
) -> Result<(Option<String>, Option<String>)> {
    let (candidate, default) = match &site.dir_policy {
        DirPolicy::FixedDir { dir, default } => (Some(dir.clone()), default.clone()),
        DirPolicy::MatchGroupTag { default } => (Some(release.group().to_string()), default.clone()),
        DirPolicy::GroupMap { map, default } => {
            let mapped = map.get(release.group()).cloned();
            if mapped.is_none() && default.is_none() {
                return Err(PreError::UnresolvableGroup {
                    site: site.id.clone(),
                    tag: release.group().to_string(),
                });
            }
            (mapped, default.clone())
        }
    };

    let normalize = |dir: Option<String>| dir.map(|d| strip_internal_suffix(&d).to_string());
    Ok((normalize(candidate), normalize(default)))
}

/// Compute the destination directory path for a release on a site.
///
/// `known_site_dirs` is the live listing of group directories on the site;
/// the candidate is preferred, the fallback is used when the candidate does
/// not exist there.
pub fn resolve_destination_path(
    site: &SiteConfig,
    release: &Release,
    known_site_dirs: &[String],
) -> Result<String> {
    let (candidate, fallback) = resolve_group_dir(site, release)?;

    let exists = |dir: &Option<String>| {
        dir.as_ref()
            .map(|d| known_site_dirs.iter().any(|known| known == d))
            .unwrap_or(false)
    };

    let dir = if exists(&candidate) {
        candidate.unwrap()
    } else if exists(&fallback) {
        fallback.unwrap()
    } else {
        return Err(PreError::NoMatchingGroupDirectory {
            site: site.id.clone(),
            release: release.name().to_string(),
        });
    };

    Ok(format!("{}/{}", site.groups_dir.trim_end_matches('/'), dir))
}

/// Determine the section a release belongs to on a site.
///
/// Rules are walked in declaration order; on the first pattern match the
/// site's remapped name is returned if present, else the canonical name.
pub fn resolve_section(rules: &[SectionRule], site: &SiteConfig, release_name: &str) -> Result<String> {
    for rule in rules {
        if rule.pattern.is_match(release_name) {
            let section = site
                .sections
                .get(&rule.name)
                .cloned()
                .unwrap_or_else(|| rule.name.clone());
            return Ok(section);
        }
    }
    Err(PreError::NoMatchingSection(release_name.to_string()))
}

/// Render a site's pre command for a release and section.
pub fn render_pre_command(site: &SiteConfig, release_name: &str, section: &str) -> String {
    site.pre_command
        .replace("{release}", release_name)
        .replace("{section}", section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirPolicy;
    use crate::testing::{section_rules, site_with_policy};
    use std::collections::BTreeMap;

    #[test]
    fn test_release_without_hyphen_is_malformed() {
        let err = Release::parse("NoGroupTagHere").unwrap_err();
        assert!(matches!(err, PreError::MalformedReleaseName(_)));
    }

    #[test]
    fn test_release_group_is_text_after_final_hyphen() {
        let release = Release::parse("Some.Release-2024-GROUPX").unwrap();
        assert_eq!(release.group(), "GROUPX");
    }

    #[test]
    fn test_fixed_dir_ignores_release_tag() {
        let site = site_with_policy(DirPolicy::FixedDir {
            dir: "GROUPX".into(),
            default: Some("MISC".into()),
        });
        let release = Release::parse("Some.Release-GROUPY").unwrap();
        let (candidate, fallback) = resolve_group_dir(&site, &release).unwrap();
        assert_eq!(candidate.as_deref(), Some("GROUPX"));
        assert_eq!(fallback.as_deref(), Some("MISC"));
    }

    #[test]
    fn test_match_group_tag_uses_tag() {
        let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        let release = Release::parse("Some.Release-GROUPX").unwrap();
        let (candidate, fallback) = resolve_group_dir(&site, &release).unwrap();
        assert_eq!(candidate.as_deref(), Some("GROUPX"));
        assert_eq!(fallback, None);
    }

    #[test]
    fn test_group_map_without_match_or_default_fails() {
        let mut map = BTreeMap::new();
        map.insert("GROUPX".to_string(), "groupx_dir".to_string());
        let site = site_with_policy(DirPolicy::GroupMap { map, default: None });
        let release = Release::parse("Some.Release-GROUPY").unwrap();
        let err = resolve_group_dir(&site, &release).unwrap_err();
        assert!(matches!(err, PreError::UnresolvableGroup { .. }));
    }

    #[test]
    fn test_group_map_unmapped_tag_with_default_falls_back() {
        let mut map = BTreeMap::new();
        map.insert("GROUPX".to_string(), "groupx_dir".to_string());
        let site = site_with_policy(DirPolicy::GroupMap {
            map,
            default: Some("MISC".into()),
        });
        let release = Release::parse("Some.Release-GROUPY").unwrap();
        let (candidate, fallback) = resolve_group_dir(&site, &release).unwrap();
        assert_eq!(candidate, None);
        assert_eq!(fallback.as_deref(), Some("MISC"));
    }

    #[test]
    fn test_internal_suffix_stripped_case_insensitively() {
        for tag in ["GROUPX_INT", "GROUPX_int", "GROUPX_Int"] {
            let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
            let release = Release::parse(&format!("Some.Release-{}", tag)).unwrap();
            let (candidate, _) = resolve_group_dir(&site, &release).unwrap();
            assert_eq!(candidate.as_deref(), Some("GROUPX"), "tag {}", tag);
        }
    }

    #[test]
    fn test_multibyte_group_tag_resolves() {
        let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        let release = Release::parse("Some.Release-😀abc").unwrap();
        let (candidate, _) = resolve_group_dir(&site, &release).unwrap();
        assert_eq!(candidate.as_deref(), Some("😀abc"));
    }

    #[test]
    fn test_multibyte_group_tag_with_internal_suffix() {
        let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        let release = Release::parse("Some.Release-GRÜPPE_INT").unwrap();
        let (candidate, _) = resolve_group_dir(&site, &release).unwrap();
        assert_eq!(candidate.as_deref(), Some("GRÜPPE"));
    }

    #[test]
    fn test_destination_prefers_candidate_over_fallback() {
        let site = site_with_policy(DirPolicy::MatchGroupTag {
            default: Some("MISC".into()),
        });
        let release = Release::parse("Some.Release-GROUPX").unwrap();
        let dirs = vec!["GROUPX".to_string(), "MISC".to_string()];
        let path = resolve_destination_path(&site, &release, &dirs).unwrap();
        assert_eq!(path, "/groups/GROUPX");
    }

    #[test]
    fn test_destination_falls_back_when_candidate_missing() {
        let site = site_with_policy(DirPolicy::MatchGroupTag {
            default: Some("MISC".into()),
        });
        let release = Release::parse("Some.Release-GROUPX").unwrap();
        let dirs = vec!["MISC".to_string()];
        let path = resolve_destination_path(&site, &release, &dirs).unwrap();
        assert_eq!(path, "/groups/MISC");
    }

    #[test]
    fn test_destination_fails_when_neither_exists() {
        let site = site_with_policy(DirPolicy::MatchGroupTag {
            default: Some("MISC".into()),
        });
        let release = Release::parse("Some.Release-GROUPX").unwrap();
        let err = resolve_destination_path(&site, &release, &[]).unwrap_err();
        assert!(matches!(err, PreError::NoMatchingGroupDirectory { .. }));
    }

    #[test]
    fn test_normalized_internal_dir_matches_listing() {
        let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        let release = Release::parse("Some.Release-GROUPX_INT").unwrap();
        let dirs = vec!["GROUPX".to_string()];
        let path = resolve_destination_path(&site, &release, &dirs).unwrap();
        assert_eq!(path, "/groups/GROUPX");
    }

    #[test]
    fn test_first_matching_section_rule_wins() {
        let rules = section_rules(&[("first", "Release"), ("second", "Some")]);
        let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        let section = resolve_section(&rules, &site, "Some.Release-GROUPX").unwrap();
        assert_eq!(section, "first");
    }

    #[test]
    fn test_section_pattern_is_case_insensitive() {
        let rules = section_rules(&[("mp3", "\\.mp3-")]);
        let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        let section = resolve_section(&rules, &site, "Artist-Title.MP3-GRP").unwrap();
        assert_eq!(section, "mp3");
    }

    #[test]
    fn test_section_remap_applied() {
        let rules = section_rules(&[("mp3", "\\.MP3-")]);
        let mut site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        site.sections.insert("mp3".to_string(), "MP3-EN".to_string());
        let section = resolve_section(&rules, &site, "Artist-Title.MP3-GRP").unwrap();
        assert_eq!(section, "MP3-EN");
    }

    #[test]
    fn test_no_matching_section() {
        let rules = section_rules(&[("mp3", "\\.MP3-")]);
        let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        let err = resolve_section(&rules, &site, "Some.Release-GRP").unwrap_err();
        assert!(matches!(err, PreError::NoMatchingSection(_)));
    }

    #[test]
    fn test_render_pre_command() {
        let site = site_with_policy(DirPolicy::MatchGroupTag { default: None });
        let command = render_pre_command(&site, "Some.Release-GRP", "mp3");
        assert_eq!(command, "site pre Some.Release-GRP mp3");
    }
}
