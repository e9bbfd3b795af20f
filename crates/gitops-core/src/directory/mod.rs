//! Fabric directories inside GitOps repositories
//!
//! [`validator`] decides which directory a fabric may own, [`layout`] shapes
//! that directory into the raw/unmanaged/managed zones and [`manager`] runs
//! both against the remote through transient clones.

pub mod ingest;
pub mod layout;
pub mod manager;
pub mod validator;

pub use ingest::{IngestionPipeline, IngestionReport, KindRoutingPipeline};
pub use layout::{InitializationResult, LayoutValidation, StructureDescriptor, UnmanagedAction, UnmanagedReport};
pub use manager::DirectoryManager;
pub use validator::{
    ConflictSeverity, ConflictType, DirectoryConflict, DirectoryValidation, normalize_directory, suggest_directories,
    validate_assignment,
};
