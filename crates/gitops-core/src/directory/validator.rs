//! Conflict detection for fabric directory assignments
//!
//! Directories are compared in normalized form: a leading and trailing `/`,
//! no `.` or `..` segments. Two fabrics on one repository may not share a
//! directory, and a directory nested inside another is reported as an
//! overlap. The repository root `/` is legal and overlaps everything.

use std::collections::BTreeSet;
use std::fs;
use std::sync::LazyLock;

use gitops_fs::{LayoutPath, NormalizedPath};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Fabric, FabricId};
use crate::{Error, Result};

pub const MAX_DIRECTORY_LENGTH: usize = 255;

/// Segment names a fabric directory may never contain.
pub const RESERVED_NAMES: &[&str] = &[
    ".git",
    ".github",
    ".gitlab",
    ".svn",
    ".hg",
    ".vscode",
    ".idea",
    "node_modules",
    "__pycache__",
    "vendor",
];

const SUGGESTION_LIMIT: usize = 20;

static ALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9/_-]*$").expect("valid regex"));

static GITOPS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)gitops|fabric|hedgehog|environments?|clusters?").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    DuplicateAssignment,
    OverlappingPaths,
    InvalidPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ConflictSeverity {
    /// Whether a conflict of this severity invalidates the assignment.
    pub fn is_blocking(&self) -> bool {
        *self >= ConflictSeverity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConflict {
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub message: String,
    /// Fabric already holding the conflicting directory
    pub conflicting_fabric: Option<FabricId>,
    pub conflicting_fabric_name: Option<String>,
    pub conflicting_directory: Option<String>,
    /// How to resolve the conflict
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryValidation {
    pub is_valid: bool,
    /// The candidate after normalization, `None` when it could not be normalized
    pub normalized_directory: Option<String>,
    pub conflicts: Vec<DirectoryConflict>,
    /// Unused directories the fabric could take instead
    pub suggestions: Vec<String>,
}

impl DirectoryValidation {
    pub fn warnings(&self) -> impl Iterator<Item = &DirectoryConflict> {
        self.conflicts.iter().filter(|c| !c.severity.is_blocking())
    }
}

fn invalid(directory: &str, reason: impl Into<String>) -> Error {
    Error::InvalidDirectory {
        directory: directory.to_string(),
        reason: reason.into(),
    }
}

/// Normalize a raw directory to `/a/b/` form, rejecting unsafe input.
pub fn normalize_directory(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let path = NormalizedPath::new(format!("/{trimmed}"));
    if path.has_parent_reference() {
        return Err(invalid(raw, "escapes the repository root"));
    }
    if let Some(reserved) = path.segments().find(|s| RESERVED_NAMES.contains(s)) {
        return Err(invalid(raw, format!("'{reserved}' is a reserved name")));
    }
    if !ALLOWED.is_match(path.as_str()) {
        return Err(invalid(raw, "only letters, digits, '/', '_' and '-' are allowed"));
    }

    let segments: Vec<&str> = path.segments().collect();
    let normalized = if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    };
    if normalized.len() > MAX_DIRECTORY_LENGTH {
        return Err(invalid(raw, format!("longer than {MAX_DIRECTORY_LENGTH} characters")));
    }
    Ok(normalized)
}

/// Whether one normalized directory contains the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Normalized directories of `others`; fabrics whose stored directory is not
/// valid take no part in conflict checks.
fn assigned_directories(others: &[Fabric]) -> Vec<(&Fabric, String)> {
    others
        .iter()
        .filter_map(|fabric| match normalize_directory(&fabric.gitops_directory) {
            Ok(directory) => Some((fabric, directory)),
            Err(e) => {
                tracing::debug!(fabric_id = %fabric.id, error = %e, "Skipping fabric with an invalid stored directory");
                None
            }
        })
        .collect()
}

/// Validate assigning `directory` given the `others` sharing the repository.
///
/// `others` must already exclude the fabric being edited.
pub fn validate_assignment(directory: &str, others: &[Fabric]) -> DirectoryValidation {
    let assigned = assigned_directories(others);
    let used: Vec<String> = assigned.iter().map(|(_, directory)| directory.clone()).collect();
    let suggestions = suggest_directories(&used, &[]);

    let candidate = match normalize_directory(directory) {
        Ok(candidate) => candidate,
        Err(e) => {
            return DirectoryValidation {
                is_valid: false,
                normalized_directory: None,
                conflicts: vec![DirectoryConflict {
                    conflict_type: ConflictType::InvalidPath,
                    severity: ConflictSeverity::Error,
                    message: e.to_string(),
                    conflicting_fabric: None,
                    conflicting_fabric_name: None,
                    conflicting_directory: None,
                    resolution: "Use a relative path of letters, digits, '-', '_' and '/'".to_string(),
                }],
                suggestions,
            };
        }
    };

    let mut conflicts = Vec::new();
    for (fabric, existing) in &assigned {
        if *existing == candidate {
            conflicts.push(DirectoryConflict {
                conflict_type: ConflictType::DuplicateAssignment,
                severity: ConflictSeverity::Error,
                message: format!("Directory {candidate} is already assigned to fabric '{}'", fabric.name),
                conflicting_fabric: Some(fabric.id),
                conflicting_fabric_name: Some(fabric.name.clone()),
                conflicting_directory: Some(existing.clone()),
                resolution: "Use a unique subdirectory per fabric".to_string(),
            });
        } else if overlaps(&candidate, existing) {
            conflicts.push(DirectoryConflict {
                conflict_type: ConflictType::OverlappingPaths,
                severity: ConflictSeverity::Warning,
                message: format!(
                    "Directory {candidate} overlaps {existing} of fabric '{}'",
                    fabric.name
                ),
                conflicting_fabric: Some(fabric.id),
                conflicting_fabric_name: Some(fabric.name.clone()),
                conflicting_directory: Some(existing.clone()),
                resolution: "Use sibling directories so no fabric manages another's files".to_string(),
            });
        }
    }

    let is_valid = !conflicts.iter().any(|c| c.severity.is_blocking());
    tracing::debug!(
        directory = %candidate,
        conflicts = conflicts.len(),
        is_valid,
        "Validated directory assignment"
    );
    DirectoryValidation {
        is_valid,
        normalized_directory: Some(candidate),
        conflicts,
        suggestions,
    }
}

/// The fixed candidate set, normalized.
pub fn standard_candidates() -> Vec<String> {
    let mut candidates: Vec<String> = ["/hedgehog/", "/fabric/", "/gitops/"]
        .into_iter()
        .map(str::to_string)
        .collect();
    candidates.extend(["prod", "staging", "dev"].map(|env| format!("/environments/{env}/")));
    candidates.extend((1..=19).map(|n| format!("/fabrics/fabric-{n:02}/")));
    candidates
}

fn depth(directory: &str) -> usize {
    directory.split('/').filter(|s| !s.is_empty()).count()
}

/// Unused directories from the standard set plus `discovered`.
///
/// Candidates equal to or overlapping a used directory are dropped. The
/// result is sorted by depth then name and holds at most 20 entries.
pub fn suggest_directories(used: &[String], discovered: &[String]) -> Vec<String> {
    let candidates: BTreeSet<String> = standard_candidates()
        .into_iter()
        .chain(discovered.iter().filter_map(|d| normalize_directory(d).ok()))
        .filter(|candidate| candidate != "/")
        .filter(|candidate| !used.iter().any(|u| overlaps(candidate, u)))
        .collect();

    let mut suggestions: Vec<String> = candidates.into_iter().collect();
    suggestions.sort_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));
    suggestions.truncate(SUGGESTION_LIMIT);
    suggestions
}

/// Directories in a working tree that look like GitOps targets.
///
/// A directory qualifies when it is empty (or holds only `.gitkeep`) or its
/// name matches a GitOps naming pattern. `.git` is never walked.
pub fn discover_candidates(root: &NormalizedPath) -> Result<Vec<String>> {
    let mut found = Vec::new();
    let mut pending = vec![root.clone()];

    while let Some(dir) = pending.pop() {
        let mut children = Vec::new();
        let mut has_content = false;
        for entry in fs::read_dir(dir.to_native())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() {
                if name != LayoutPath::GitDir.as_str() {
                    children.push(dir.join(&name));
                }
                has_content = true;
            } else if name != LayoutPath::GitKeep.as_str() {
                has_content = true;
            }
        }

        if dir != *root
            && let Some(relative) = dir.strip_prefix(root)
        {
            let name = dir.file_name().unwrap_or_default();
            if !has_content || GITOPS_NAME.is_match(name) {
                found.push(format!("/{}/", relative.as_str()));
            }
        }
        pending.extend(children);
    }

    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn fabric(id: u64, name: &str, directory: &str) -> Fabric {
        Fabric::new(FabricId(id), name).with_repository(crate::model::RepositoryId(1), directory)
    }

    #[rstest]
    #[case("fabric-a", "/fabric-a/")]
    #[case("/fabric-a", "/fabric-a/")]
    #[case("  envs/prod/ ", "/envs/prod/")]
    #[case("a/./b/../c", "/a/c/")]
    #[case("", "/")]
    #[case("/", "/")]
    #[case("//a//b//", "/a/b/")]
    fn normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_directory(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("../outside")]
    #[case("a/../../b")]
    #[case("has space")]
    #[case("dots.not.allowed")]
    #[case("a/.git/b")]
    #[case("node_modules")]
    fn rejects(#[case] raw: &str) {
        assert!(matches!(normalize_directory(raw), Err(Error::InvalidDirectory { .. })));
    }

    #[test]
    fn rejects_overlong_directories() {
        let raw = "a".repeat(MAX_DIRECTORY_LENGTH);
        assert!(normalize_directory(&raw).is_err());
        assert!(normalize_directory(&"a".repeat(MAX_DIRECTORY_LENGTH - 2)).is_ok());
    }

    #[test]
    fn duplicate_after_normalization_is_invalid() {
        let others = vec![fabric(1, "fabric-a", "/fabric-a/")];
        let result = validate_assignment("fabric-a", &others);

        assert!(!result.is_valid);
        assert_eq!(result.normalized_directory.as_deref(), Some("/fabric-a/"));
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::DuplicateAssignment);
        assert_eq!(result.conflicts[0].conflicting_fabric, Some(FabricId(1)));
        let standard = standard_candidates();
        assert!(result.suggestions.iter().any(|s| standard.contains(s)));
        assert!(!result.suggestions.contains(&"/fabric-a/".to_string()));
    }

    #[test]
    fn overlap_is_reported_both_ways_as_a_warning() {
        let parent = fabric(1, "parent", "/a/");
        let child = fabric(2, "child", "/a/b/");

        let as_child = validate_assignment(&child.gitops_directory, std::slice::from_ref(&parent));
        assert!(as_child.is_valid);
        assert_eq!(as_child.conflicts[0].conflict_type, ConflictType::OverlappingPaths);
        assert_eq!(as_child.conflicts[0].conflicting_fabric, Some(parent.id));

        let as_parent = validate_assignment(&parent.gitops_directory, std::slice::from_ref(&child));
        assert!(as_parent.is_valid);
        assert_eq!(as_parent.conflicts[0].conflict_type, ConflictType::OverlappingPaths);
        assert_eq!(as_parent.conflicts[0].conflicting_fabric, Some(child.id));
    }

    #[test]
    fn sibling_prefixes_do_not_overlap() {
        let others = vec![fabric(1, "a", "/fabric/")];
        let result = validate_assignment("/fabric-two/", &others);
        assert!(result.is_valid);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn root_overlaps_everything() {
        let others = vec![fabric(1, "a", "/x/"), fabric(2, "b", "/y/z/")];
        let result = validate_assignment("/", &others);
        assert!(result.is_valid);
        assert_eq!(result.warnings().count(), 2);
    }

    #[test]
    fn invalid_input_is_a_blocking_conflict() {
        let result = validate_assignment("../etc", &[]);
        assert!(!result.is_valid);
        assert_eq!(result.normalized_directory, None);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::InvalidPath);
    }

    #[test]
    fn fabrics_with_invalid_stored_directories_are_ignored() {
        let others = vec![fabric(1, "broken", "/team/bad dir/"), fabric(2, "legacy", "/team/")];
        let result = validate_assignment("/team/", &others[..1]);
        assert!(result.is_valid);
        assert!(result.conflicts.is_empty());

        let result = validate_assignment("/team/", &others);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflicting_fabric, Some(FabricId(2)));
    }

    #[test]
    fn suggestions_are_sorted_capped_and_unused() {
        let used = vec!["/fabric/".to_string(), "/environments/".to_string()];
        let suggestions = suggest_directories(&used, &["clusters/east".to_string()]);

        assert_eq!(suggestions.len(), 20);
        assert_eq!(&suggestions[..2], &["/gitops/".to_string(), "/hedgehog/".to_string()]);
        assert!(suggestions.iter().all(|s| !s.starts_with("/environments/")));
        assert!(suggestions.contains(&"/clusters/east/".to_string()));
        let depths: Vec<usize> = suggestions.iter().map(|s| depth(s)).collect();
        assert!(depths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn discovers_empty_and_gitops_named_directories() {
        let temp = TempDir::new().unwrap();
        let root = NormalizedPath::new(temp.path());
        fs::create_dir_all(root.join("docs").to_native()).unwrap();
        fs::write(root.join("docs/readme.md").to_native(), "x").unwrap();
        fs::create_dir_all(root.join("empty").to_native()).unwrap();
        fs::create_dir_all(root.join("kept").to_native()).unwrap();
        fs::write(root.join("kept/.gitkeep").to_native(), "").unwrap();
        fs::create_dir_all(root.join("Clusters/west").to_native()).unwrap();
        fs::write(root.join("Clusters/west/app.yaml").to_native(), "x").unwrap();
        fs::create_dir_all(root.join(".git/refs").to_native()).unwrap();

        let found = discover_candidates(&root).unwrap();
        assert_eq!(
            found,
            vec!["/Clusters/".to_string(), "/empty/".to_string(), "/kept/".to_string()]
        );
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[a-z0-9/_-]{0,40}") {
            let once = normalize_directory(&raw).unwrap();
            prop_assert!(once.starts_with('/') && once.ends_with('/'));
            prop_assert_eq!(normalize_directory(&once).unwrap(), once.clone());
        }

        #[test]
        fn overlap_is_symmetric(a in "[a-c]{1,2}(/[a-c]{1,2}){0,2}", b in "[a-c]{1,2}(/[a-c]{1,2}){0,2}") {
            let a = normalize_directory(&a).unwrap();
            let b = normalize_directory(&b).unwrap();
            prop_assert_eq!(overlaps(&a, &b), overlaps(&b, &a));
        }
    }
}
