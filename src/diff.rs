//! Revision Diff & Review
//!
//! Compares the channel data between two git revisions and reviews the
//! packages a change introduces. Packages are matched by name across all
//! changed files, so moving a package between shards shows up as a
//! modification (or nothing) rather than a remove/add pair.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use git2::{Delta, DiffOptions, Oid, Repository, Tree};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ValidatorConfig;
use crate::diagnostics::Severity;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::format::SelectorRange;
use crate::loader::{Document, Location};
use crate::validate::channel::repository_references;
use crate::validate::package::record_name;

/// A package as it appears at one revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageChange {
    pub name: String,
    /// Repository file the package lives in
    pub file: String,
    pub record: Value,
    pub fingerprint: Fingerprint,
}

impl PackageChange {
    /// A package record found in `file`. `None` when the record has no
    /// usable name.
    pub fn from_record(file: &str, record: Value) -> Result<Option<Self>> {
        let Some(name) = record_name(&record) else {
            return Ok(None);
        };
        let fingerprint = Fingerprint::of_record(&record)?;
        Ok(Some(Self {
            name,
            file: file.to_string(),
            record,
            fingerprint,
        }))
    }
}

/// Differences between two revisions of the channel data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelDiff {
    pub from: String,
    pub to: String,
    pub added_repositories: Vec<String>,
    pub removed_repositories: Vec<String>,
    pub added_packages: Vec<PackageChange>,
    pub removed_packages: Vec<PackageChange>,
    /// New version of each modified package
    pub modified_packages: Vec<PackageChange>,
}

impl ChannelDiff {
    pub fn is_empty(&self) -> bool {
        self.added_repositories.is_empty()
            && self.removed_repositories.is_empty()
            && self.added_packages.is_empty()
            && self.removed_packages.is_empty()
            && self.modified_packages.is_empty()
    }
}

/// Reads channel files out of a git repository
pub struct RevisionDiff {
    repo: Repository,
    channel_file: PathBuf,
    repository_dir: PathBuf,
}

impl RevisionDiff {
    /// Open the git repository containing the channel data
    pub fn open(path: impl AsRef<Path>, config: &ValidatorConfig) -> Result<Self> {
        let repo = Repository::discover(path.as_ref())?;
        Ok(Self {
            repo,
            channel_file: config.channel.file.clone(),
            repository_dir: config.channel.repository_dir.clone(),
        })
    }

    /// Compare the channel data at `from` against `to`
    pub fn diff(&self, from: &str, to: &str) -> Result<ChannelDiff> {
        let old_tree = self.tree(from)?;
        let new_tree = self.tree(to)?;

        let mut result = ChannelDiff {
            from: from.to_string(),
            to: to.to_string(),
            ..ChannelDiff::default()
        };

        let old_repos = self.repositories(&old_tree)?;
        let new_repos = self.repositories(&new_tree)?;
        result.added_repositories = new_repos.iter().filter(|r| !old_repos.contains(r)).cloned().collect();
        result.removed_repositories = old_repos.iter().filter(|r| !new_repos.contains(r)).cloned().collect();

        let mut opts = DiffOptions::new();
        opts.pathspec(format!("{}/*.json", self.repository_dir.display()));
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

        let mut before = BTreeMap::new();
        let mut after = BTreeMap::new();
        for delta in diff.deltas() {
            debug!(status = ?delta.status(), path = ?delta.new_file().path(), "changed file");
            if delta.status() != Delta::Added {
                if let Some(path) = delta.old_file().path() {
                    self.collect_packages(delta.old_file().id(), path, &mut before)?;
                }
            }
            if delta.status() != Delta::Deleted {
                if let Some(path) = delta.new_file().path() {
                    self.collect_packages(delta.new_file().id(), path, &mut after)?;
                }
            }
        }

        for (name, package) in &after {
            match before.get(name) {
                None => result.added_packages.push(package.clone()),
                Some(old) if old.fingerprint != package.fingerprint => {
                    result.modified_packages.push(package.clone())
                }
                Some(_) => {}
            }
        }
        result.removed_packages = before
            .into_iter()
            .filter(|(name, _)| !after.contains_key(name))
            .map(|(_, package)| package)
            .collect();

        Ok(result)
    }

    fn tree(&self, rev: &str) -> Result<Tree<'_>> {
        Ok(self.repo.revparse_single(rev)?.peel_to_tree()?)
    }

    fn read(&self, tree: &Tree<'_>, path: &Path) -> Result<Option<Document>> {
        let entry = match tree.get_path(path) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        Document::from_bytes(Location::Path(path.to_path_buf()), blob.content().to_vec()).map(Some)
    }

    fn repositories(&self, tree: &Tree<'_>) -> Result<Vec<String>> {
        Ok(self
            .read(tree, &self.channel_file)?
            .map(|doc| repository_references(&doc.value))
            .unwrap_or_default())
    }

    fn collect_packages(
        &self,
        id: Oid,
        path: &Path,
        into: &mut BTreeMap<String, PackageChange>,
    ) -> Result<()> {
        if id.is_zero() {
            return Ok(());
        }
        let blob = self.repo.find_blob(id)?;
        let document = Document::from_bytes(Location::Path(path.to_path_buf()), blob.content().to_vec())?;
        let file = path.display().to_string();
        let packages = document
            .value
            .get("packages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for record in packages {
            if let Some(change) = PackageChange::from_record(&file, record)? {
                into.insert(change.name.clone(), change);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Review
// =============================================================================

/// One finding from reviewing a new package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub package: String,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for ReviewFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.package, self.message)
    }
}

/// Review a newly added package.
///
/// Added packages need tagged releases, and packages in the main channel
/// also need `details`. A package with no release for `current_build` gets
/// a warning.
pub fn review_package(package: &PackageChange, current_build: u32, main: bool) -> Vec<ReviewFinding> {
    let mut findings = Vec::new();
    let mut finding = |severity, message: String| {
        findings.push(ReviewFinding {
            package: package.name.clone(),
            severity,
            message,
        })
    };

    if main && package.record.get("details").is_none() {
        finding(Severity::Error, "No \"details\" URL; new packages must link their source repository".to_string());
    }

    let releases = package
        .record
        .get("releases")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for (i, release) in releases.iter().enumerate() {
        if release.get("branch").is_some() {
            finding(
                Severity::Error,
                format!("Release #{} is branch-based; new packages must use tags", i + 1),
            );
        }
    }

    let supports_current = releases.iter().any(|release| {
        release
            .get("sublime_text")
            .and_then(Value::as_str)
            .and_then(|s| SelectorRange::parse(s).ok())
            .map_or(false, |range| range.matches(current_build))
    });
    if !supports_current {
        finding(
            Severity::Warning,
            format!("No release is compatible with build {}", current_build),
        );
    }

    findings
}
