//! Directory assignment and layout maintenance against local bare remotes

mod common;

use std::sync::Arc;

use common::{FlakyTransport, add_fabric, add_repository, service};
use gitops_core::directory::validator::standard_candidates;
use gitops_core::model::{FabricId, RepositoryId};
use gitops_core::{ConflictSeverity, ConflictType, DirectoryStatus, Error, UnmanagedAction};
use gitops_fs::LayoutPath;
use gitops_git::{Deadline, Git2Transport};
use gitops_test_utils::{bare_remote_with_commit, clone_for_inspection, seed_remote_files};

mod assignment {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn second_fabric_cannot_claim_the_same_directory() {
        let service = service(Arc::new(FlakyTransport::new()));
        let repo = add_repository(&service, 1, "/unused/remote.git");
        add_fabric(&service, 1, "fabric-a", repo, "/prod/");
        let b = add_fabric(&service, 2, "fabric-b", repo, "/staging/");

        let validation = service.assign_fabric_directory(b, Some(repo), "prod").await.unwrap();

        assert!(!validation.is_valid);
        assert_eq!(validation.conflicts.len(), 1);
        let conflict = &validation.conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::DuplicateAssignment);
        assert_eq!(conflict.severity, ConflictSeverity::Error);
        assert_eq!(conflict.conflicting_fabric, Some(FabricId(1)));
        assert!(!validation.suggestions.is_empty());

        // Nothing was written
        assert_eq!(service.store().fabric(b).unwrap().gitops_directory, "/staging/");
    }

    #[tokio::test]
    async fn nested_directories_warn_in_both_directions() {
        let service = service(Arc::new(FlakyTransport::new()));
        let repo = add_repository(&service, 1, "/unused/remote.git");
        add_fabric(&service, 1, "parent", repo, "/prod/");
        let second = add_repository(&service, 2, "/unused/other.git");
        add_fabric(&service, 2, "child", second, "/prod/east/");

        let below = service.validate_directory_assignment(repo, "/prod/east", None).unwrap();
        let above = service.validate_directory_assignment(second, "/prod", None).unwrap();

        for validation in [&below, &above] {
            assert!(validation.is_valid);
            assert_eq!(validation.conflicts.len(), 1);
            assert_eq!(validation.conflicts[0].conflict_type, ConflictType::OverlappingPaths);
            assert_eq!(validation.conflicts[0].severity, ConflictSeverity::Warning);
            assert_eq!(validation.warnings().count(), 1);
        }
        assert_eq!(below.conflicts[0].conflicting_fabric, Some(FabricId(1)));
        assert_eq!(above.conflicts[0].conflicting_fabric, Some(FabricId(2)));
    }

    #[tokio::test]
    async fn valid_assignment_is_stored_normalized() {
        let service = service(Arc::new(FlakyTransport::new()));
        let repo = add_repository(&service, 1, "/unused/remote.git");
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/");

        let validation = service
            .assign_fabric_directory(fabric, Some(repo), "fabrics//fabric-a")
            .await
            .unwrap();

        assert!(validation.is_valid);
        assert_eq!(validation.normalized_directory.as_deref(), Some("/fabrics/fabric-a/"));
        assert_eq!(service.store().fabric(fabric).unwrap().gitops_directory, "/fabrics/fabric-a/");
    }

    #[tokio::test]
    async fn reassigning_a_fabric_ignores_its_own_directory() {
        let service = service(Arc::new(FlakyTransport::new()));
        let repo = add_repository(&service, 1, "/unused/remote.git");
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/prod/");

        let validation = service.assign_fabric_directory(fabric, Some(repo), "/prod/").await.unwrap();

        assert!(validation.is_valid);
    }

    #[tokio::test]
    async fn invalid_directory_is_reported_not_raised() {
        let service = service(Arc::new(FlakyTransport::new()));
        let repo = add_repository(&service, 1, "/unused/remote.git");

        let validation = service.validate_directory_assignment(repo, "../etc", None).unwrap();

        assert!(!validation.is_valid);
        assert_eq!(validation.conflicts[0].conflict_type, ConflictType::InvalidPath);
    }

    #[tokio::test]
    async fn detaching_updates_usage_and_frees_the_repository() {
        let service = service(Arc::new(FlakyTransport::new()));
        let repo = add_repository(&service, 1, "/unused/remote.git");
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/prod/");
        assert_eq!(service.store().repository(repo).unwrap().fabric_count, 1);

        let err = service.delete_repository(repo).await.unwrap_err();
        assert!(matches!(err, Error::RepositoryInUse { .. }));

        service.assign_fabric_directory(fabric, None, "").await.unwrap();
        assert_eq!(service.store().repository(repo).unwrap().fabric_count, 0);
        service.delete_repository(repo).await.unwrap();
        assert!(matches!(
            service.store().repository(repo),
            Err(Error::RepositoryNotFound(RepositoryId(1)))
        ));
    }
}

mod layout {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn initialization_pushes_the_layout_once() {
        let remote = bare_remote_with_commit();
        let service = service(Arc::new(Git2Transport::default()));
        let repo = add_repository(&service, 1, &remote.url());
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/fabric-a/");

        let first = service.initialize_directories(fabric, false, Deadline::none()).await.unwrap();
        assert!(first.success, "{:?}", first.errors);
        assert_eq!(first.directories_created.len(), LayoutPath::DIRECTORIES.len());
        assert!(first.pushed);
        assert!(first.commit_sha.is_some());
        assert_eq!(
            service.store().fabric(fabric).unwrap().directory_status,
            DirectoryStatus::Initialized
        );

        let checkout = clone_for_inspection(remote.path());
        let base = checkout.path().join("fabric-a");
        for dir in LayoutPath::DIRECTORIES {
            assert!(base.join(dir.as_str()).join(".gitkeep").is_file(), "{dir}");
        }
        assert!(base.join(LayoutPath::StructureDescriptor.as_str()).is_file());
        assert!(base.join("managed/README.md").is_file());

        let second = service.initialize_directories(fabric, false, Deadline::none()).await.unwrap();
        assert!(second.success);
        assert!(second.directories_created.is_empty());
        assert!(!second.pushed);
        assert!(!second.warnings.is_empty());
    }

    #[tokio::test]
    async fn concurrent_initializations_are_serialized() {
        let remote = bare_remote_with_commit();
        let service = service(Arc::new(Git2Transport::default()));
        let repo = add_repository(&service, 1, &remote.url());
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/fabric-a/");

        let (a, b) = tokio::join!(
            service.initialize_directories(fabric, false, Deadline::none()),
            service.initialize_directories(fabric, false, Deadline::none()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.success && b.success);
        let mut created = vec![a.directories_created.len(), b.directories_created.len()];
        created.sort();
        assert_eq!(created, vec![0, LayoutPath::DIRECTORIES.len()]);
    }

    #[tokio::test]
    async fn failed_push_marks_the_directory_status() {
        let remote = bare_remote_with_commit();
        let service = service(Arc::new(FlakyTransport::new().failing_pushes(1, "remote rejected")));
        let repo = add_repository(&service, 1, &remote.url());
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/fabric-a/");

        let result = service.initialize_directories(fabric, false, Deadline::none()).await.unwrap();

        assert!(!result.success);
        assert!(!result.pushed);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.directories_created.len(), LayoutPath::DIRECTORIES.len());
        assert_eq!(service.store().fabric(fabric).unwrap().directory_status, DirectoryStatus::Error);
    }

    #[tokio::test]
    async fn validation_follows_initialization() {
        let remote = bare_remote_with_commit();
        let service = service(Arc::new(Git2Transport::default()));
        let repo = add_repository(&service, 1, &remote.url());
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/fabric-a/");

        let before = service.validate_directories(fabric, Deadline::none()).await.unwrap();
        assert!(!before.valid);
        assert!(!before.missing_directories.is_empty());

        service.initialize_directories(fabric, false, Deadline::none()).await.unwrap();
        let after = service.validate_directories(fabric, Deadline::none()).await.unwrap();
        assert!(after.valid, "{:?}", after.issues);
        assert!(after.missing_directories.is_empty());
    }

    #[tokio::test]
    async fn unassigned_fabric_cannot_be_initialized() {
        let service = service(Arc::new(FlakyTransport::new()));
        service
            .store()
            .insert_fabric(gitops_core::Fabric::new(FabricId(3), "loose"))
            .unwrap();

        let err = service
            .initialize_directories(FabricId(3), false, Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FabricUnassigned { fabric: FabricId(3) }));
    }
}

mod maintenance {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn raw_files_are_routed_into_managed_directories() {
        let remote = bare_remote_with_commit();
        let service = service(Arc::new(Git2Transport::default()));
        let repo = add_repository(&service, 1, &remote.url());
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/fabric-a/");
        service.initialize_directories(fabric, false, Deadline::none()).await.unwrap();
        seed_remote_files(
            remote.path(),
            &[
                ("fabric-a/raw/pending/vpc.yaml", "kind: VPC\nmetadata:\n  name: vpc-1\n"),
                ("fabric-a/raw/pending/odd.yaml", "kind: ConfigMap\nmetadata:\n  name: cm\n"),
            ],
        );

        let report = service.ingest_raw(fabric, Deadline::none()).await.unwrap();

        assert_eq!(report.processed, vec!["vpc.yaml".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.written, vec!["managed/vpcs/vpc-1.yaml".to_string()]);

        let checkout = clone_for_inspection(remote.path());
        let base = checkout.path().join("fabric-a");
        assert!(base.join("managed/vpcs/vpc-1.yaml").is_file());
        assert!(base.join("raw/processed/vpc.yaml").is_file());
        assert!(base.join("raw/errors/odd.yaml").is_file());
        assert!(!base.join("raw/pending/vpc.yaml").exists());
    }

    #[tokio::test]
    async fn unmanaged_files_are_archived() {
        let remote = bare_remote_with_commit();
        let service = service(Arc::new(Git2Transport::default()));
        let repo = add_repository(&service, 1, &remote.url());
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/fabric-a/");
        service.initialize_directories(fabric, false, Deadline::none()).await.unwrap();
        seed_remote_files(remote.path(), &[("fabric-a/notes/todo.txt", "hand edited\n")]);

        let report = service
            .handle_unmanaged(fabric, UnmanagedAction::Archive, Deadline::none())
            .await
            .unwrap();

        assert_eq!(report.files, vec!["notes/todo.txt".to_string()]);
        assert_eq!(report.moved.len(), 1);
        let (_, target) = &report.moved[0];
        assert!(target.starts_with("archive/"));

        let checkout = clone_for_inspection(remote.path());
        let base = checkout.path().join("fabric-a");
        assert!(!base.join("notes/todo.txt").exists());
        assert!(base.join(target).is_file());
    }

    #[tokio::test]
    async fn warning_about_unmanaged_files_changes_nothing() {
        let remote = bare_remote_with_commit();
        let transport = Arc::new(FlakyTransport::new().failing_pushes(10, "push should not happen"));
        let service = service(transport);
        let repo = add_repository(&service, 1, &remote.url());
        let fabric = add_fabric(&service, 1, "fabric-a", repo, "/fabric-a/");
        seed_remote_files(remote.path(), &[("fabric-a/stray.yaml", "a: 1\n")]);

        let report = service
            .handle_unmanaged(fabric, UnmanagedAction::Warn, Deadline::none())
            .await
            .unwrap();

        assert_eq!(report.files, vec!["stray.yaml".to_string()]);
        assert!(report.moved.is_empty());
    }

    #[tokio::test]
    async fn suggestions_skip_used_and_overlapping_directories() {
        let remote = bare_remote_with_commit();
        seed_remote_files(remote.path(), &[("clusters/edge/kustomization.yaml", "resources: []\n")]);
        let service = service(Arc::new(Git2Transport::default()));
        let repo = add_repository(&service, 1, &remote.url());
        add_fabric(&service, 1, "fabric-a", repo, "/gitops/");

        let suggestions = service.suggest_available_directories(repo, Deadline::none()).await.unwrap();

        assert!(!suggestions.is_empty());
        assert!(suggestions.len() <= 20);
        assert!(!suggestions.iter().any(|s| s.starts_with("/gitops/")));
        assert!(suggestions.contains(&"/fabric/".to_string()));
        assert!(standard_candidates().contains(&"/gitops/".to_string()));
    }
}
