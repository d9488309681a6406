//! Upload session integration tests
//!
//! Merge grouping, folder adds, label collisions (sequential and
//! interleaved), failure atomicity, and submission assembly.

use mrs_common::config::MergePolicy;
use mrs_common::{EventBus, MrsEvent, UploadRole};
use mrs_upload::models::{ProcessingMode, RoleSelections, SelectedFile};
use mrs_upload::services::{OptionState, QueuedFolderPicker, UnsupportedFolderPicker, UploadAssembler};
use mrs_upload::{SelectionError, UploadSession};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn mem(rel: &str) -> SelectedFile {
    SelectedFile::in_memory(rel, rel.as_bytes().to_vec())
}

/// Create `<base>/<rel>/<file>` for each file name and return the folder
fn make_folder(base: &Path, rel: &str, files: &[&str]) -> PathBuf {
    let dir = base.join(rel);
    fs::create_dir_all(&dir).unwrap();
    for name in files {
        fs::write(dir.join(name), b"DICM").unwrap();
    }
    dir
}

fn rel_paths(files: &[SelectedFile]) -> Vec<String> {
    files.iter().map(|f| f.relative_path.clone()).collect()
}

// ============================================================================
// Merge
// ============================================================================

#[tokio::test]
async fn test_merge_groups_dcm_and_drops_other_files() {
    // Given: a directory-input selection with a stray text file
    let session = UploadSession::new(EventBus::new(16));

    // When: merged into the multi-folder role
    let written = session
        .merge_files(
            UploadRole::MultiFolder,
            vec![mem("S14/a.dcm"), mem("S14/b.dcm"), mem("junk.txt")],
        )
        .await;

    // Then: one batch S14 with both .dcm files
    assert_eq!(written, vec!["S14".to_string()]);
    assert_eq!(session.labels(UploadRole::MultiFolder).await, vec!["S14".to_string()]);
    assert_eq!(session.file_count(UploadRole::MultiFolder).await, 2);
    assert_eq!(
        session.summary(UploadRole::MultiFolder).await.to_string(),
        "S14: 2 .dcm\nTotal: 2 .dcm"
    );
}

#[tokio::test]
async fn test_merge_of_parent_folder_groups_by_subject() {
    let session = UploadSession::new(EventBus::new(16));

    session
        .merge_files(
            UploadRole::MultiFolder,
            vec![
                mem("study/S15/a.dcm"),
                mem("study/S14/a.dcm"),
                mem("study/S15/b.dcm"),
                mem("study/top.dcm"),
            ],
        )
        .await;

    assert_eq!(
        session.labels(UploadRole::MultiFolder).await,
        vec!["study/S15".to_string(), "study/S14".to_string(), "study".to_string()]
    );
    assert_eq!(
        rel_paths(&session.flattened(UploadRole::MultiFolder).await),
        vec!["study/S15/a.dcm", "study/S15/b.dcm", "study/S14/a.dcm", "study/top.dcm"]
    );
}

#[tokio::test]
async fn test_same_label_merge_replaces_by_default() {
    let session = UploadSession::new(EventBus::new(16));

    session
        .merge_files(UploadRole::MonoFid, vec![mem("A/x.dcm"), mem("A/y.dcm")])
        .await;
    session
        .merge_files(UploadRole::MonoFid, vec![mem("B/z.dcm")])
        .await;
    session
        .merge_files(UploadRole::MonoFid, vec![mem("A/w.dcm")])
        .await;

    // Position of A is kept; its contents are the last merge's
    assert_eq!(
        session.labels(UploadRole::MonoFid).await,
        vec!["A".to_string(), "B".to_string()]
    );
    assert_eq!(
        rel_paths(&session.flattened(UploadRole::MonoFid).await),
        vec!["A/w.dcm", "B/z.dcm"]
    );
}

#[tokio::test]
async fn test_same_label_merge_appends_under_append_policy() {
    let session = UploadSession::with_policy(EventBus::new(16), MergePolicy::Append);

    session.merge_files(UploadRole::MonoFid, vec![mem("A/x.dcm")]).await;
    session.merge_files(UploadRole::MonoFid, vec![mem("A/y.dcm")]).await;

    assert_eq!(
        rel_paths(&session.batch(UploadRole::MonoFid, "A").await.unwrap()),
        vec!["A/x.dcm", "A/y.dcm"]
    );
}

#[tokio::test]
async fn test_roles_are_independent() {
    let session = UploadSession::new(EventBus::new(16));

    session.merge_files(UploadRole::MonoFid, vec![mem("A/x.dcm")]).await;
    session.merge_files(UploadRole::MonoWater, vec![mem("A/w.dcm")]).await;

    let snapshot = session.snapshot().await;
    assert_eq!(rel_paths(&snapshot.mono_fid), vec!["A/x.dcm"]);
    assert_eq!(rel_paths(&snapshot.mono_water), vec!["A/w.dcm"]);
    assert!(snapshot.multi_folder.is_empty());
}

// ============================================================================
// Folder add
// ============================================================================

#[tokio::test]
async fn test_sequential_same_name_picks_get_unique_labels() {
    // Given: two different folders both named S14
    let temp_dir = TempDir::new().unwrap();
    let first = make_folder(temp_dir.path(), "site1/S14", &["a.dcm", "b.dcm"]);
    let second = make_folder(temp_dir.path(), "site2/S14", &["a.dcm"]);
    let picker = QueuedFolderPicker::new([first, second]);
    let session = UploadSession::new(EventBus::new(16));

    // When: both are added one after the other
    let label1 = session.add_folder(UploadRole::MultiFolder, &picker).await.unwrap();
    let label2 = session.add_folder(UploadRole::MultiFolder, &picker).await.unwrap();

    // Then: S14 and S14_2, and file names do not collide
    assert_eq!(label1, "S14");
    assert_eq!(label2, "S14_2");
    assert_eq!(
        rel_paths(&session.flattened(UploadRole::MultiFolder).await),
        vec!["S14/a.dcm", "S14/b.dcm", "S14_2/a.dcm"]
    );
}

#[tokio::test]
async fn test_interleaved_same_name_picks_get_unique_labels() {
    let temp_dir = TempDir::new().unwrap();
    let first = make_folder(temp_dir.path(), "site1/S14", &["a.dcm"]);
    let second = make_folder(temp_dir.path(), "site2/S14", &["a.dcm"]);
    let picker1 = QueuedFolderPicker::new([first]);
    let picker2 = QueuedFolderPicker::new([second]);
    let session = UploadSession::new(EventBus::new(16));

    // Both walks are in flight before either commits
    let (r1, r2) = tokio::join!(
        session.add_folder(UploadRole::MultiFolder, &picker1),
        session.add_folder(UploadRole::MultiFolder, &picker2),
    );

    let mut labels = vec![r1.unwrap(), r2.unwrap()];
    labels.sort();
    assert_eq!(labels, vec!["S14".to_string(), "S14_2".to_string()]);

    let mut paths = rel_paths(&session.flattened(UploadRole::MultiFolder).await);
    paths.sort();
    assert_eq!(paths, vec!["S14/a.dcm", "S14_2/a.dcm"]);
}

#[tokio::test]
async fn test_folder_add_never_replaces_merged_batch() {
    let temp_dir = TempDir::new().unwrap();
    let folder = make_folder(temp_dir.path(), "S14", &["c.dcm"]);
    let session = UploadSession::new(EventBus::new(16));

    session
        .merge_files(UploadRole::MultiFolder, vec![mem("S14/a.dcm")])
        .await;
    let label = session
        .add_folder(UploadRole::MultiFolder, &QueuedFolderPicker::new([folder]))
        .await
        .unwrap();

    assert_eq!(label, "S14_2");
    assert_eq!(session.file_count(UploadRole::MultiFolder).await, 2);
}

#[tokio::test]
async fn test_folder_add_collects_nested_dcm_only() {
    let temp_dir = TempDir::new().unwrap();
    let folder = make_folder(temp_dir.path(), "S20", &["b.dcm", "notes.txt"]);
    make_folder(&folder, "sub", &["a.DCM"]);
    let session = UploadSession::new(EventBus::new(16));

    session
        .add_folder(UploadRole::MultiFolder, &QueuedFolderPicker::new([folder]))
        .await
        .unwrap();

    assert_eq!(
        rel_paths(&session.flattened(UploadRole::MultiFolder).await),
        vec!["S20/b.dcm", "S20/sub/a.DCM"]
    );
}

#[tokio::test]
async fn test_walk_failure_commits_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("gone");
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let session = UploadSession::new(bus);

    let result = session
        .add_folder(UploadRole::MultiFolder, &QueuedFolderPicker::new([missing]))
        .await;

    assert!(matches!(result, Err(SelectionError::Walk { .. })));
    assert!(session.labels(UploadRole::MultiFolder).await.is_empty());
    assert!(rx.try_recv().is_err(), "No selection event for a failed add");
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_subfolder_aborts_whole_add() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let folder = make_folder(temp_dir.path(), "S14", &["a.dcm"]);
    let locked = make_folder(&folder, "locked", &["b.dcm"]);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root ignores permissions; only check when the lock is effective
    let effective = fs::read_dir(&locked).is_err();

    let session = UploadSession::new(EventBus::new(16));
    let result = session
        .add_folder(UploadRole::MultiFolder, &QueuedFolderPicker::new([folder]))
        .await;

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    if effective {
        assert!(matches!(result, Err(SelectionError::Walk { .. })));
        assert_eq!(session.file_count(UploadRole::MultiFolder).await, 0);
    } else {
        assert!(result.is_ok());
    }
}

#[tokio::test]
async fn test_cancelled_and_unsupported_pickers_leave_state_alone() {
    let session = UploadSession::new(EventBus::new(16));
    session.merge_files(UploadRole::MonoFid, vec![mem("A/x.dcm")]).await;

    let cancelled = session
        .add_folder(UploadRole::MonoFid, &QueuedFolderPicker::new(Vec::<PathBuf>::new()))
        .await;
    let unsupported = session.add_folder(UploadRole::MonoFid, &UnsupportedFolderPicker).await;

    assert!(matches!(cancelled, Err(SelectionError::Cancelled)));
    assert!(matches!(unsupported, Err(SelectionError::UnsupportedOperation)));
    assert_eq!(session.file_count(UploadRole::MonoFid).await, 1);
}

#[tokio::test]
async fn test_merge_directory_walks_like_file_input() {
    let temp_dir = TempDir::new().unwrap();
    let parent = temp_dir.path().join("study");
    make_folder(&parent, "S14", &["a.dcm", "b.dcm"]);
    make_folder(&parent, "S15", &["a.dcm", "readme.txt"]);
    let session = UploadSession::new(EventBus::new(16));

    let written = session
        .merge_directory(UploadRole::MultiFolder, parent)
        .await
        .unwrap();

    assert_eq!(written, vec!["study/S14".to_string(), "study/S15".to_string()]);
    assert_eq!(session.file_count(UploadRole::MultiFolder).await, 3);
}

// ============================================================================
// Reset, events, submission
// ============================================================================

#[tokio::test]
async fn test_reset_clears_every_role_and_publishes() {
    let bus = EventBus::new(16);
    let session = UploadSession::new(bus.clone());
    session.merge_files(UploadRole::MultiFolder, vec![mem("S14/a.dcm")]).await;
    session.merge_files(UploadRole::MonoWater, vec![mem("W/a.dcm")]).await;

    let mut rx = bus.subscribe();
    session.reset().await;

    for role in UploadRole::ALL {
        assert_eq!(session.file_count(role).await, 0);
        assert!(session.summary(role).await.to_string().is_empty());
    }
    assert!(matches!(rx.recv().await.unwrap(), MrsEvent::SelectionReset { .. }));
}

#[tokio::test]
async fn test_submit_readiness_uses_fallback_for_empty_roles() {
    let session = UploadSession::new(EventBus::new(16));
    let fallback = RoleSelections {
        mono_fid: vec![mem("x.dcm"), mem("notes.txt")],
        ..Default::default()
    };

    let multi = session
        .submit_readiness(
            Some(ProcessingMode::Multi),
            OptionState::Selected,
            OptionState::Selected,
            &fallback,
        )
        .await;
    assert!(!multi.enabled);
    assert!(multi
        .hints
        .iter()
        .any(|h| h.contains("MONO input selected (1 .dcm)")));

    let mono = session
        .submit_readiness(
            Some(ProcessingMode::Mono),
            OptionState::Selected,
            OptionState::Selected,
            &fallback,
        )
        .await;
    assert!(mono.enabled);
}

#[tokio::test]
async fn test_mono_submission_uses_relative_paths() {
    let session = UploadSession::new(EventBus::new(16));
    session.merge_files(UploadRole::MonoFid, vec![mem("A/x.dcm")]).await;

    let plan = UploadAssembler::new("MEGA-PRESS")
        .assemble(
            Some(ProcessingMode::Mono),
            &session.snapshot().await,
            &RoleSelections::default(),
        )
        .unwrap();

    let fid: Vec<&str> = plan.parts_for("dcmFiles").map(|p| p.file_name.as_str()).collect();
    assert_eq!(fid, vec!["A/x.dcm"]);
    assert_eq!(plan.parts_for("waterDcmFiles").count(), 0);
}
