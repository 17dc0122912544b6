//! Partition roles and versioned partition names.
//!
//! Names follow `{role}-{variant}-v{semver}`, e.g. `static-pwa-v2.1.0`. The
//! variant distinguishes deployment targets sharing one store and may itself
//! contain dashes; the role is always the first segment and the version the
//! last.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$").unwrap());

static VARIANT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "bmp"];
const STATIC_EXTENSIONS: &[&str] = &["js", "mjs", "css", "woff", "woff2", "ttf", "otf", "eot", "map"];

/// Logical category routing a request to a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Static,
    Dynamic,
    Images,
    Offline,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Static, Role::Dynamic, Role::Images, Role::Offline];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Static => "static",
            Role::Dynamic => "dynamic",
            Role::Images => "images",
            Role::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Role::ALL.into_iter().find(|r| r.as_str() == s)
    }

    /// Role implied by the URL's file extension, if any.
    pub fn for_extension(url: &Url) -> Option<Self> {
        let ext = extension(url)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Role::Images)
        } else if STATIC_EXTENSIONS.contains(&ext.as_str()) {
            Some(Role::Static)
        } else {
            None
        }
    }

    /// Role implied by a content type (request `Accept` or response `Content-Type`).
    pub fn for_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split([';', ',']).next().unwrap_or("").trim().to_ascii_lowercase();
        if essence.starts_with("image/") {
            Some(Role::Images)
        } else if essence == "text/css"
            || essence.starts_with("font/")
            || essence.ends_with("javascript")
            || essence == "application/font-woff"
        {
            Some(Role::Static)
        } else {
            None
        }
    }

    /// Resolve the storage role of a request: extension first, then content
    /// type, then `fallback`.
    pub fn resolve(url: &Url, content_type: Option<&str>, fallback: Role) -> Self {
        Role::for_extension(url)
            .or_else(|| content_type.and_then(Role::for_content_type))
            .unwrap_or(fallback)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// A parsed `{role}-{variant}-v{semver}` partition name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionName {
    pub role: Role,
    pub variant: String,
    pub version: String,
}

impl PartitionName {
    pub fn new(role: Role, variant: &str, version: &str) -> Result<Self, Error> {
        validate_variant(variant)?;
        validate_version(version)?;
        Ok(Self { role, variant: variant.to_string(), version: version.to_string() })
    }

    /// Parse a partition name.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPartitionName` when the name does not follow the
    /// `{role}-{variant}-v{semver}` scheme.
    pub fn parse(name: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidPartitionName(name.to_string());

        let (role, rest) = name.split_once('-').ok_or_else(invalid)?;
        let role = Role::parse(role).ok_or_else(invalid)?;
        let (variant, version) = rest.rsplit_once("-v").ok_or_else(invalid)?;

        Self::new(role, variant, version).map_err(|_| invalid())
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-v{}", self.role, self.variant, self.version)
    }
}

pub(crate) fn validate_variant(variant: &str) -> Result<(), Error> {
    if VARIANT_RE.is_match(variant) {
        Ok(())
    } else {
        Err(Error::InvalidPartitionName(format!("invalid variant: {variant:?}")))
    }
}

pub(crate) fn validate_version(version: &str) -> Result<(), Error> {
    if VERSION_RE.is_match(version) {
        Ok(())
    } else {
        Err(Error::InvalidPartitionName(format!("invalid version: {version:?}")))
    }
}

/// The partition names belonging to one deployed version.
///
/// Exactly one partition per role is current at any time; everything else in
/// the store is stale once this version activates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPartitions {
    variant: String,
    version: String,
}

impl VersionedPartitions {
    pub fn new(variant: &str, version: &str) -> Result<Self, Error> {
        validate_variant(variant)?;
        validate_version(version)?;
        Ok(Self { variant: variant.to_string(), version: version.to_string() })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Current partition name for `role`.
    pub fn name(&self, role: Role) -> String {
        PartitionName { role, variant: self.variant.clone(), version: self.version.clone() }.to_string()
    }

    /// Every name valid for this version.
    pub fn current_names(&self) -> Vec<String> {
        Role::ALL.into_iter().map(|r| self.name(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_partition_name_roundtrip() {
        let name = PartitionName::parse("static-pwa-v2.1.0").unwrap();
        assert_eq!(name.role, Role::Static);
        assert_eq!(name.variant, "pwa");
        assert_eq!(name.version, "2.1.0");
        assert_eq!(name.to_string(), "static-pwa-v2.1.0");
    }

    #[test]
    fn test_partition_name_dashed_variant() {
        let name = PartitionName::parse("images-web-mobile-v1.0.0-beta.1").unwrap();
        assert_eq!(name.role, Role::Images);
        assert_eq!(name.variant, "web-mobile");
        assert_eq!(name.version, "1.0.0-beta.1");
    }

    #[test]
    fn test_partition_name_malformed() {
        for bad in ["static", "static-v1", "assets-pwa-v1.0.0", "static-pwa-1.0.0", "static-PWA-v1.0.0", "static-pwa-v1"] {
            assert!(
                matches!(PartitionName::parse(bad), Err(Error::InvalidPartitionName(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_versioned_partitions() {
        let parts = VersionedPartitions::new("pwa", "2.1.0").unwrap();
        assert_eq!(parts.name(Role::Dynamic), "dynamic-pwa-v2.1.0");
        assert_eq!(
            parts.current_names(),
            vec!["static-pwa-v2.1.0", "dynamic-pwa-v2.1.0", "images-pwa-v2.1.0", "offline-pwa-v2.1.0"]
        );
        assert!(VersionedPartitions::new("pwa", "two").is_err());
        assert!(VersionedPartitions::new("", "1.0.0").is_err());
    }

    #[test]
    fn test_role_for_extension() {
        assert_eq!(Role::for_extension(&url("https://a.com/img/logo.PNG")), Some(Role::Images));
        assert_eq!(Role::for_extension(&url("https://a.com/static/js/main.js")), Some(Role::Static));
        assert_eq!(Role::for_extension(&url("https://a.com/api/data.json")), None);
        assert_eq!(Role::for_extension(&url("https://a.com/")), None);
        assert_eq!(Role::for_extension(&url("https://a.com/.hidden")), None);
    }

    #[test]
    fn test_role_resolve_falls_back_to_content_type() {
        let u = url("https://a.com/avatar/42");
        assert_eq!(Role::resolve(&u, Some("image/webp,image/*;q=0.8"), Role::Dynamic), Role::Images);
        assert_eq!(Role::resolve(&u, Some("text/css"), Role::Dynamic), Role::Static);
        assert_eq!(Role::resolve(&u, Some("application/json"), Role::Dynamic), Role::Dynamic);
        assert_eq!(Role::resolve(&u, None, Role::Static), Role::Static);
    }
}
