//! The three-zone layout inside a fabric's directory
//!
//! Everything here works on a checked-out working tree and never touches the
//! network; [`super::DirectoryManager`] supplies the clone and the push.

use chrono::{DateTime, Utc};
use gitops_fs::{LayoutPath, NormalizedPath, io};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::model::Fabric;

pub const STRUCTURE_VERSION: &str = "1.0";

const RAW_README: &str = "# Raw\n\nDrop resource YAML into `pending/`. Ingestion moves each file to \
`processed/` once its resources are written under `managed/`, or to `errors/` when it cannot be read.\n";

const UNMANAGED_README: &str = "# Unmanaged\n\nFiles here are owned by other tools or edited by hand. \
`external-configs/` holds preserved foreign files; `manual-overrides/` holds deliberate local changes.\n";

const MANAGED_README: &str = "# Managed\n\nGenerated by the fabric GitOps integration. Do not edit by hand; \
changes are overwritten on the next ingestion.\n";

/// README files of the layout, relative to the fabric directory.
pub const READMES: [(&str, &str); 3] = [
    ("raw/README.md", RAW_README),
    ("unmanaged/README.md", UNMANAGED_README),
    ("managed/README.md", MANAGED_README),
];

/// Contents of `managed/metadata/gitops-structure.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDescriptor {
    pub fabric_name: String,
    pub gitops_directory: String,
    pub created_at: DateTime<Utc>,
    pub structure_version: String,
    pub directories: Vec<String>,
}

impl StructureDescriptor {
    pub fn new(fabric: &Fabric, now: DateTime<Utc>) -> Self {
        Self {
            fabric_name: fabric.name.clone(),
            gitops_directory: fabric.gitops_directory.clone(),
            created_at: now,
            structure_version: STRUCTURE_VERSION.to_string(),
            directories: LayoutPath::DIRECTORIES.iter().map(|d| d.as_str().to_string()).collect(),
        }
    }
}

/// Outcome of materializing the layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationResult {
    pub success: bool,
    pub directories_created: Vec<String>,
    pub files_written: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub commit_sha: Option<String>,
    pub pushed: bool,
}

impl InitializationResult {
    /// Whether the working tree changed and needs a commit.
    ///
    /// Newly created directories always need one. A `force` run that only
    /// rewrote README or descriptor files needs one too, since those files
    /// are part of the pushed layout; a run that changed nothing does not.
    pub fn needs_commit(&self) -> bool {
        self.errors.is_empty() && (!self.directories_created.is_empty() || !self.files_written.is_empty())
    }
}

/// Create whatever is missing of the layout below `base`.
///
/// Existing directories are kept with a warning. Existing README and
/// descriptor files are only rewritten when `force` is set. Every directory
/// created gets a `.gitkeep`.
pub fn apply_layout(base: &NormalizedPath, fabric: &Fabric, force: bool, now: DateTime<Utc>) -> InitializationResult {
    let mut result = InitializationResult::default();

    for directory in LayoutPath::DIRECTORIES {
        let path = base.join(directory.as_str());
        if path.is_dir() {
            result.warnings.push(format!("{directory}/ already exists"));
            continue;
        }
        let created = io::ensure_dir(&path)
            .and_then(|_| io::write_text(&path.join(LayoutPath::GitKeep.as_str()), ""));
        match created {
            Ok(()) => result.directories_created.push(format!("{directory}/")),
            Err(e) => result.errors.push(format!("{directory}/: {e}")),
        }
    }

    let descriptor = StructureDescriptor::new(fabric, now);
    let descriptor_text = match serde_json::to_string_pretty(&descriptor) {
        Ok(text) => text,
        Err(e) => {
            result.errors.push(format!("{}: {e}", LayoutPath::StructureDescriptor));
            String::new()
        }
    };

    let mut files: Vec<(&str, &str)> = READMES.to_vec();
    if !descriptor_text.is_empty() {
        files.push((LayoutPath::StructureDescriptor.as_str(), descriptor_text.as_str()));
    }
    for (relative, content) in files {
        let path = base.join(relative);
        if path.is_file() && !force {
            result.warnings.push(format!("{relative} already exists"));
            continue;
        }
        match io::write_text(&path, content) {
            Ok(()) => result.files_written.push(relative.to_string()),
            Err(e) => result.errors.push(format!("{relative}: {e}")),
        }
    }

    result.success = result.errors.is_empty();
    result
}

/// Result of checking a working tree against the layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutValidation {
    pub valid: bool,
    pub issues: Vec<String>,
    pub missing_directories: Vec<String>,
    /// Files directly in the fabric directory, outside every zone
    pub extra_files: Vec<String>,
}

/// Check that every element of the layout exists below `base`.
pub fn inspect_layout(base: &NormalizedPath) -> Result<LayoutValidation> {
    let mut result = LayoutValidation::default();
    if !base.is_dir() {
        result.issues.push("GitOps directory does not exist".to_string());
        result.missing_directories = LayoutPath::DIRECTORIES.iter().map(|d| format!("{d}/")).collect();
        return Ok(result);
    }

    for directory in LayoutPath::DIRECTORIES {
        if !base.join(directory.as_str()).is_dir() {
            result.missing_directories.push(format!("{directory}/"));
        }
    }
    if !result.missing_directories.is_empty() {
        result
            .issues
            .push(format!("{} layout directories are missing", result.missing_directories.len()));
    }

    let expected_files = READMES
        .iter()
        .map(|(relative, _)| *relative)
        .chain([LayoutPath::StructureDescriptor.as_str()]);
    for relative in expected_files {
        if !base.join(relative).is_file() {
            result.issues.push(format!("{relative} is missing"));
        }
    }

    if base.join(LayoutPath::StructureDescriptor.as_str()).is_file() {
        let text = io::read_text(&base.join(LayoutPath::StructureDescriptor.as_str()))?;
        if let Err(e) = serde_json::from_str::<StructureDescriptor>(&text) {
            result.issues.push(format!("{} is unreadable: {e}", LayoutPath::StructureDescriptor));
        }
    }

    for entry in std::fs::read_dir(base.to_native())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_file() && name != LayoutPath::GitKeep.as_str() {
            result.extra_files.push(name);
        }
    }
    result.extra_files.sort();

    result.valid = result.issues.is_empty();
    Ok(result)
}

/// What to do with files outside the three zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmanagedAction {
    /// Move into `unmanaged/external-configs/`
    Preserve,
    /// Move into `archive/<timestamp>/`
    Archive,
    /// Only report
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmanagedReport {
    pub action: UnmanagedAction,
    /// Files found outside the zones, relative to the fabric directory
    pub files: Vec<String>,
    /// `(from, to)` pairs of files moved
    pub moved: Vec<(String, String)>,
    pub errors: Vec<String>,
}

impl UnmanagedReport {
    pub fn changed(&self) -> bool {
        !self.moved.is_empty()
    }
}

/// Files below `base` that belong to no zone.
pub fn unmanaged_files(base: &NormalizedPath) -> Result<Vec<NormalizedPath>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let zones: Vec<&str> = LayoutPath::ZONES
        .iter()
        .map(|zone| zone.as_str())
        .chain([LayoutPath::Archive.as_str()])
        .collect();
    let files = io::list_files(base, &[LayoutPath::GitDir.as_str()])?;
    Ok(files
        .into_iter()
        .filter(|file| file.file_name() != Some(LayoutPath::GitKeep.as_str()))
        .filter(|file| !file.segments().next().is_some_and(|first| zones.contains(&first)))
        .collect())
}

/// Apply `action` to every unmanaged file below `base`.
pub fn handle_unmanaged_in(base: &NormalizedPath, action: UnmanagedAction, now: DateTime<Utc>) -> Result<UnmanagedReport> {
    let files = unmanaged_files(base)?;
    let mut report = UnmanagedReport {
        action,
        files: files.iter().map(|f| f.as_str().to_string()).collect(),
        moved: Vec::new(),
        errors: Vec::new(),
    };

    let destination = match action {
        UnmanagedAction::Warn => {
            for file in &report.files {
                tracing::warn!(file = %file, "Unmanaged file in GitOps directory");
            }
            return Ok(report);
        }
        UnmanagedAction::Preserve => LayoutPath::UnmanagedExternalConfigs.as_str().to_string(),
        UnmanagedAction::Archive => format!("{}/{}", LayoutPath::Archive, now.format("%Y%m%d-%H%M%S")),
    };

    for file in files {
        let target = format!("{destination}/{file}");
        match io::move_file(&base.join(file.as_str()), &base.join(&target)) {
            Ok(()) => report.moved.push((file.as_str().to_string(), target)),
            Err(e) => report.errors.push(format!("{file}: {e}")),
        }
    }
    Ok(report)
}
