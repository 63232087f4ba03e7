//! File scanning for directory uploads.
//!
//! Recursively walks a directory and produces one [`UploadJob`] per regular
//! file, with remote names normalized to forward slashes.

use std::path::Path;

use panup_transfer::UploadJob;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::UploadError;
use crate::glob::glob_match;

/// Patterns that are always excluded, whatever the user supplies.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".DS_Store",
    "Thumbs.db",
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "*.tmp",
    "*.temp",
    "*~",
];

/// How local paths map onto remote names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMapping {
    /// `<root name>/<path relative to root>`.
    #[default]
    KeepStructure,
    /// `<root name>/<file name>`. Same-named files overwrite each other remotely.
    Flatten,
}

/// Exclusion rules: user patterns plus [`DEFAULT_EXCLUDES`].
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    patterns: Vec<String>,
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl ExcludeRules {
    pub fn new<I, S>(user_patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns: Vec<String> = user_patterns.into_iter().map(Into::into).collect();
        patterns.extend(DEFAULT_EXCLUDES.iter().map(|p| p.to_string()));
        Self { patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if any pattern matches the base name, the full path, or
    /// the path relative to the walk root.
    pub fn is_excluded(&self, path: &Path, relative: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let full = path.to_string_lossy().replace('\\', "/");
        let rel = relative.to_string_lossy().replace('\\', "/");

        self.patterns.iter().any(|pattern| {
            glob_match(pattern, &name) || glob_match(pattern, &full) || glob_match(pattern, &rel)
        })
    }
}

/// Splits a comma-separated pattern list, trimming blanks.
pub fn parse_exclude_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Scans `root` recursively and returns upload jobs in walk order.
///
/// Excluded directories are pruned. Entries that cannot be read are logged
/// and skipped. Fails only if `root` is not a directory.
pub fn scan_files_for_upload(
    root: &Path,
    rules: &ExcludeRules,
    mapping: PathMapping,
) -> Result<Vec<UploadJob>, UploadError> {
    if !std::fs::metadata(root)?.is_dir() {
        return Err(UploadError::NotADirectory(root.display().to_string()));
    }

    // `.` and `..` have no name of their own, so resolve it first.
    let folder_name = root
        .canonicalize()?
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let excluded = rules.is_excluded(entry.path(), relative);
            if excluded {
                debug!(path = %entry.path().display(), "skipping excluded entry");
            }
            !excluded
        });

    let mut jobs = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "cannot access entry, skipping");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }

        // Follows symlinks so links to regular files are uploaded.
        let metadata = match std::fs::metadata(entry.path()) {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "cannot stat file, skipping");
                continue;
            }
        };

        let relative = match entry.path().strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let remote_tail = match mapping {
            PathMapping::KeepStructure => relative.to_string_lossy().replace('\\', "/"),
            PathMapping::Flatten => entry.file_name().to_string_lossy().into_owned(),
        };
        let remote_path = if folder_name.is_empty() {
            remote_tail
        } else {
            format!("{folder_name}/{remote_tail}")
        };

        jobs.push(UploadJob {
            local_path: entry.path().to_path_buf(),
            remote_path,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        });
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Creates `<tmp>/project/...` and returns (tmp guard, project root).
    fn create_test_tree() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");

        fs::create_dir_all(root.join("data").join("levels")).unwrap();
        fs::write(root.join("main.rs"), b"MAIN").unwrap();
        fs::write(root.join("readme.txt"), b"READ").unwrap();
        fs::write(root.join("data").join("config.ini"), b"CFG").unwrap();
        fs::write(root.join("data").join("levels").join("level1.dat"), b"LEVEL_DATA").unwrap();

        (dir, root)
    }

    fn remote_paths(jobs: &[UploadJob]) -> Vec<&str> {
        jobs.iter().map(|j| j.remote_path.as_str()).collect()
    }

    #[test]
    fn keep_structure_prefixes_root_name() {
        let (_dir, root) = create_test_tree();
        let jobs =
            scan_files_for_upload(&root, &ExcludeRules::default(), PathMapping::KeepStructure)
                .unwrap();

        assert_eq!(
            remote_paths(&jobs),
            vec![
                "project/data/config.ini",
                "project/data/levels/level1.dat",
                "project/main.rs",
                "project/readme.txt",
            ]
        );
        let level = jobs.iter().find(|j| j.remote_path.ends_with("level1.dat")).unwrap();
        assert_eq!(level.size, 10);
        assert_eq!(level.local_path, root.join("data").join("levels").join("level1.dat"));
    }

    #[test]
    fn flatten_uses_base_names() {
        let (_dir, root) = create_test_tree();
        let jobs =
            scan_files_for_upload(&root, &ExcludeRules::default(), PathMapping::Flatten).unwrap();
        let mut paths = remote_paths(&jobs);
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "project/config.ini",
                "project/level1.dat",
                "project/main.rs",
                "project/readme.txt",
            ]
        );
    }

    #[test]
    fn flatten_keeps_colliding_names() {
        let (_dir, root) = create_test_tree();
        fs::write(root.join("data").join("readme.txt"), b"OTHER").unwrap();
        let jobs =
            scan_files_for_upload(&root, &ExcludeRules::default(), PathMapping::Flatten).unwrap();
        let count = jobs
            .iter()
            .filter(|j| j.remote_path == "project/readme.txt")
            .count();
        assert_eq!(count, 2);
    }

    #[test]
    fn default_excludes_always_apply() {
        let (_dir, root) = create_test_tree();
        fs::write(root.join(".DS_Store"), b"x").unwrap();
        fs::write(root.join("data").join("scratch.tmp"), b"x").unwrap();
        fs::write(root.join("notes.txt~"), b"x").unwrap();
        fs::create_dir_all(root.join(".git").join("objects")).unwrap();
        fs::write(root.join(".git").join("objects").join("abc"), b"x").unwrap();
        fs::create_dir_all(root.join("node_modules").join("dep")).unwrap();
        fs::write(root.join("node_modules").join("dep").join("index.js"), b"x").unwrap();

        let rules = ExcludeRules::new(["*.log"]);
        let jobs = scan_files_for_upload(&root, &rules, PathMapping::KeepStructure).unwrap();

        assert_eq!(jobs.len(), 4);
        for job in &jobs {
            assert!(!job.remote_path.contains(".DS_Store"));
            assert!(!job.remote_path.ends_with(".tmp"));
            assert!(!job.remote_path.contains(".git/"));
            assert!(!job.remote_path.contains("node_modules"));
        }
    }

    #[test]
    fn user_patterns_match_name_or_relative_path() {
        let (_dir, root) = create_test_tree();
        let rules = ExcludeRules::new(parse_exclude_list("*.ini, data/levels"));
        let jobs = scan_files_for_upload(&root, &rules, PathMapping::KeepStructure).unwrap();
        assert_eq!(
            remote_paths(&jobs),
            vec!["project/main.rs", "project/readme.txt"]
        );
    }

    #[test]
    fn empty_dir_yields_no_jobs() {
        let dir = TempDir::new().unwrap();
        let jobs =
            scan_files_for_upload(dir.path(), &ExcludeRules::default(), PathMapping::KeepStructure)
                .unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn nonexistent_root_fails() {
        let result = scan_files_for_upload(
            Path::new("/nonexistent/path/that/does/not/exist"),
            &ExcludeRules::default(),
            PathMapping::KeepStructure,
        );
        assert!(result.is_err());
    }

    #[test]
    fn file_root_is_rejected() {
        let (_dir, root) = create_test_tree();
        let result = scan_files_for_upload(
            &root.join("main.rs"),
            &ExcludeRules::default(),
            PathMapping::KeepStructure,
        );
        assert!(matches!(result, Err(UploadError::NotADirectory(_))));
    }

    #[test]
    fn parse_exclude_list_trims() {
        assert_eq!(
            parse_exclude_list(" *.tmp, ,*.log ,.DS_Store"),
            vec!["*.tmp", "*.log", ".DS_Store"]
        );
        assert!(parse_exclude_list("").is_empty());
    }

    #[test]
    fn rules_include_defaults_after_user_patterns() {
        let rules = ExcludeRules::new(["*.bak"]);
        assert_eq!(rules.patterns()[0], "*.bak");
        assert_eq!(rules.patterns().len(), DEFAULT_EXCLUDES.len() + 1);
    }
}
