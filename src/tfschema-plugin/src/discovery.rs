//! Locating plugin executables on disk.
//!
//! Plugin binaries are named `terraform-<kind>-<name>` optionally followed by
//! `_v<semver>` and a protocol suffix such as `_x5`. The search walks the
//! directories Terraform itself installs into and picks the highest version.

use crate::error::PluginClientError;
use semver::Version;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const KNOWN_OSES: [&str; 7] = [
    "linux", "darwin", "windows", "freebsd", "openbsd", "netbsd", "solaris",
];

/// A plugin executable found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMeta {
    pub name: String,
    /// `None` for unversioned binaries such as `terraform-provider-null`.
    pub version: Option<Version>,
    pub path: PathBuf,
}

/// Where to look for plugins.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub root_dir: PathBuf,
    /// Usually `~/.terraform.d/plugins`.
    pub user_plugin_dir: Option<PathBuf>,
    /// Fall back to an unversioned binary on `$PATH`.
    pub search_path: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Flat,
    Recursive,
}

/// Platform directory name used in plugin trees, e.g. `linux_amd64`.
pub fn os_arch() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{}_{}", std::env::consts::OS, arch)
}

fn plugin_dirs(search: &SearchOptions) -> Vec<(PathBuf, Depth)> {
    let dot_terraform = search.root_dir.join(".terraform");
    let mut dirs = vec![
        (dot_terraform.join("providers"), Depth::Recursive),
        (dot_terraform.join("plugins"), Depth::Recursive),
        (search.root_dir.clone(), Depth::Flat),
    ];
    if let Some(user_dir) = &search.user_plugin_dir {
        dirs.push((user_dir.clone(), Depth::Recursive));
    }
    dirs
}

/// Find the newest plugin executable of the given kind and name.
///
/// On ties the candidate found first in search order wins; unversioned
/// binaries rank below any versioned one.
pub fn find_plugin(
    kind: &str,
    name: &str,
    search: &SearchOptions,
) -> Result<PluginMeta, PluginClientError> {
    let dirs = plugin_dirs(search);
    let mut best: Option<PluginMeta> = None;

    for (dir, depth) in &dirs {
        for candidate in scan_dir(dir, *depth, kind, name) {
            tracing::trace!(path = %candidate.path.display(), "found plugin candidate");
            if best
                .as_ref()
                .map_or(true, |current| candidate.version > current.version)
            {
                best = Some(candidate);
            }
        }
    }

    if best.is_none() && search.search_path {
        if let Ok(path) = which::which(format!("terraform-{kind}-{name}")) {
            best = Some(PluginMeta {
                name: name.to_string(),
                version: None,
                path,
            });
        }
    }

    match best {
        Some(meta) => {
            tracing::debug!(
                plugin = %meta.name,
                version = ?meta.version.as_ref().map(Version::to_string),
                path = %meta.path.display(),
                "resolved plugin"
            );
            Ok(meta)
        }
        None => Err(PluginClientError::PluginNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            searched: dirs.into_iter().map(|(dir, _)| dir).collect(),
        }),
    }
}

fn scan_dir(dir: &Path, depth: Depth, kind: &str, name: &str) -> Vec<PluginMeta> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let max_depth = match depth {
        Depth::Flat => 1,
        Depth::Recursive => 8,
    };
    let host_platform = os_arch();

    WalkDir::new(dir)
        .follow_links(true)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && is_foreign_platform_dir(&entry.file_name().to_string_lossy(), &host_platform))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_executable(entry.path()))
        .filter_map(|entry| {
            let version =
                parse_plugin_file_name(kind, name, &entry.file_name().to_string_lossy())?;
            Some(PluginMeta {
                name: name.to_string(),
                version,
                path: entry.into_path(),
            })
        })
        .collect()
}

fn is_foreign_platform_dir(dir_name: &str, host_platform: &str) -> bool {
    match dir_name.split_once('_') {
        Some((os, _)) if KNOWN_OSES.contains(&os) => dir_name != host_platform,
        _ => false,
    }
}

/// Returns `Some(version)` when `file_name` is a plugin binary for `kind`/`name`.
fn parse_plugin_file_name(kind: &str, name: &str, file_name: &str) -> Option<Option<Version>> {
    let file_name = file_name.strip_suffix(".exe").unwrap_or(file_name);
    let prefix = format!("terraform-{kind}-{name}");
    let rest = file_name.strip_prefix(prefix.as_str())?;
    if rest.is_empty() {
        return Some(None);
    }

    let versioned = rest.strip_prefix("_v")?;
    let raw_version = match versioned.rsplit_once("_x") {
        Some((version, protocol)) if protocol.chars().all(|c| c.is_ascii_digit()) => version,
        _ => versioned,
    };
    Version::parse(raw_version).ok().map(Some)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("exe"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_plugin_file_names() {
        assert_eq!(
            parse_plugin_file_name("provider", "aws", "terraform-provider-aws"),
            Some(None)
        );
        assert_eq!(
            parse_plugin_file_name("provider", "aws", "terraform-provider-aws_v5.31.0_x5"),
            Some(Some(Version::new(5, 31, 0)))
        );
        assert_eq!(
            parse_plugin_file_name("provider", "aws", "terraform-provider-aws_v1.2.3"),
            Some(Some(Version::new(1, 2, 3)))
        );
        assert_eq!(
            parse_plugin_file_name("provider", "aws", "terraform-provider-awscc_v1.0.0_x5"),
            None
        );
        assert_eq!(
            parse_plugin_file_name("provider", "aws", "terraform-provider-aws_vnope"),
            None
        );
    }

    #[test]
    fn foreign_platform_dirs_are_skipped() {
        assert!(!is_foreign_platform_dir("plan9_amd64", "linux_amd64"));
        assert!(is_foreign_platform_dir("darwin_arm64", "linux_amd64"));
        assert!(!is_foreign_platform_dir("linux_amd64", "linux_amd64"));
        assert!(!is_foreign_platform_dir("hashicorp", "linux_amd64"));
    }

    #[cfg(unix)]
    fn install(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn search(root: &Path) -> SearchOptions {
        SearchOptions {
            root_dir: root.to_path_buf(),
            user_plugin_dir: None,
            search_path: false,
        }
    }

    #[test]
    #[cfg(unix)]
    fn picks_newest_version_across_directories() {
        let root = tempfile::tempdir().unwrap();
        let providers = root
            .path()
            .join(".terraform/providers/registry.terraform.io/hashicorp/null");
        install(
            &providers
                .join("3.1.0")
                .join(os_arch())
                .join("terraform-provider-null_v3.1.0_x5"),
        );
        install(
            &root
                .path()
                .join(".terraform/plugins")
                .join(os_arch())
                .join("terraform-provider-null_v3.2.1_x5"),
        );
        install(&root.path().join("terraform-provider-null"));

        let meta = find_plugin("provider", "null", &search(root.path())).unwrap();
        assert_eq!(meta.version, Some(Version::new(3, 2, 1)));
        assert!(meta.path.ends_with("terraform-provider-null_v3.2.1_x5"));
    }

    #[test]
    #[cfg(unix)]
    fn ignores_binaries_for_other_platforms() {
        let root = tempfile::tempdir().unwrap();
        let foreign = if os_arch() == "windows_amd64" {
            "darwin_arm64"
        } else {
            "windows_amd64"
        };
        install(
            &root
                .path()
                .join(".terraform/plugins")
                .join(foreign)
                .join("terraform-provider-null_v9.0.0_x5"),
        );
        install(&root.path().join("terraform-provider-null"));

        let meta = find_plugin("provider", "null", &search(root.path())).unwrap();
        assert_eq!(meta.version, None);
        assert_eq!(meta.path, root.path().join("terraform-provider-null"));
    }

    #[test]
    #[cfg(unix)]
    fn non_executable_files_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("terraform-provider-null_v1.0.0"), "").unwrap();

        let err = find_plugin("provider", "null", &search(root.path())).unwrap_err();
        assert!(matches!(err, PluginClientError::PluginNotFound { .. }));
    }

    #[test]
    fn missing_plugin_reports_searched_directories() {
        let root = tempfile::tempdir().unwrap();
        let err = find_plugin("provider", "nonexistent", &search(root.path())).unwrap_err();
        match err {
            PluginClientError::PluginNotFound { name, searched, .. } => {
                assert_eq!(name, "nonexistent");
                assert!(searched.contains(&root.path().to_path_buf()));
            }
            other => panic!("expected PluginNotFound, got {other:?}"),
        }
    }
}
