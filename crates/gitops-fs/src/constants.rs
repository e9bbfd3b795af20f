//! Names of the fixed three-zone GitOps layout inside a fabric's directory.
//!
//! Other GitOps tooling reads this exact shape, so these strings are part of
//! the external contract.

use std::path::Path;

/// Well-known directories and files of the GitOps layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutPath {
    /// Incoming files awaiting ingestion
    Raw,
    RawPending,
    RawProcessed,
    RawErrors,
    /// Files owned by other tools or edited by hand
    Unmanaged,
    UnmanagedExternalConfigs,
    UnmanagedManualOverrides,
    /// Files generated and owned by the fabric
    Managed,
    ManagedVpcs,
    ManagedConnections,
    ManagedSwitches,
    ManagedServers,
    ManagedSwitchGroups,
    ManagedMetadata,
    /// Destination of archived unmanaged files
    Archive,
    /// Placeholder that keeps otherwise empty directories in Git
    GitKeep,
    /// Layout descriptor written under `managed/metadata`
    StructureDescriptor,
    /// The Git database directory
    GitDir,
}

impl LayoutPath {
    /// Every directory of the layout, parents before children.
    pub const DIRECTORIES: [LayoutPath; 14] = [
        LayoutPath::Raw,
        LayoutPath::RawPending,
        LayoutPath::RawProcessed,
        LayoutPath::RawErrors,
        LayoutPath::Unmanaged,
        LayoutPath::UnmanagedExternalConfigs,
        LayoutPath::UnmanagedManualOverrides,
        LayoutPath::Managed,
        LayoutPath::ManagedVpcs,
        LayoutPath::ManagedConnections,
        LayoutPath::ManagedSwitches,
        LayoutPath::ManagedServers,
        LayoutPath::ManagedSwitchGroups,
        LayoutPath::ManagedMetadata,
    ];

    /// The three top-level zones.
    pub const ZONES: [LayoutPath; 3] = [LayoutPath::Raw, LayoutPath::Unmanaged, LayoutPath::Managed];

    /// Path relative to the fabric's directory.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::RawPending => "raw/pending",
            Self::RawProcessed => "raw/processed",
            Self::RawErrors => "raw/errors",
            Self::Unmanaged => "unmanaged",
            Self::UnmanagedExternalConfigs => "unmanaged/external-configs",
            Self::UnmanagedManualOverrides => "unmanaged/manual-overrides",
            Self::Managed => "managed",
            Self::ManagedVpcs => "managed/vpcs",
            Self::ManagedConnections => "managed/connections",
            Self::ManagedSwitches => "managed/switches",
            Self::ManagedServers => "managed/servers",
            Self::ManagedSwitchGroups => "managed/switch-groups",
            Self::ManagedMetadata => "managed/metadata",
            Self::Archive => "archive",
            Self::GitKeep => ".gitkeep",
            Self::StructureDescriptor => "managed/metadata/gitops-structure.json",
            Self::GitDir => ".git",
        }
    }
}

impl AsRef<Path> for LayoutPath {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for LayoutPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for LayoutPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
