//! Edge cells of the action matrix: conflicts, moved+deleted recreation,
//! native-app formats, trashed subtrees

use crate::fake_drive::DriveCall;
use crate::rig::{rig, seed_cold_start, t};

#[tokio::test]
async fn local_edit_against_remote_deletion_is_a_conflict() {
    let rig = rig().await;
    seed_cold_start(&rig.drive);
    rig.engine.run().await.unwrap();

    // Local edit while the remote side deleted the file
    let local = rig.drive_path.join("My Drive").join("a.txt");
    std::fs::write(&local, b"edited locally").unwrap();
    rig.drive.remote_remove("f-a");

    rig.engine.run().await.unwrap();

    // The local edit survives; nothing was transferred or deleted locally
    assert_eq!(std::fs::read(&local).unwrap(), b"edited locally");
    assert_eq!(
        rig.drive
            .count_calls(|c| matches!(c, DriveCall::Download { .. })),
        1
    );
    assert_eq!(
        rig.drive
            .count_calls(|c| matches!(c, DriveCall::UpdateMedia { .. })),
        0
    );
    assert_eq!(
        rig.drive.count_calls(|c| matches!(c, DriveCall::Delete { .. })),
        0
    );
}

#[tokio::test]
async fn locally_deleted_file_moved_remotely_is_recreated_at_the_new_path() {
    let rig = rig().await;
    seed_cold_start(&rig.drive);
    rig.engine.run().await.unwrap();

    std::fs::remove_file(rig.drive_path.join("My Drive").join("a.txt")).unwrap();
    rig.drive
        .remote_rename("f-a", "b.txt", t("2024-02-01T00:00:00Z"));

    rig.engine.run().await.unwrap();

    let new_path = rig.drive_path.join("My Drive").join("b.txt");
    assert_eq!(std::fs::read(&new_path).unwrap(), b"123456789");
    assert_eq!(
        rig.drive
            .count_calls(|c| matches!(c, DriveCall::Download { .. })),
        2
    );
    // The file was recreated, not deleted remotely
    assert_eq!(
        rig.drive.count_calls(|c| matches!(c, DriveCall::Delete { .. })),
        0
    );
}

#[tokio::test]
async fn native_app_documents_are_tracked_but_never_downloaded() {
    let rig = rig().await;
    rig.drive.seed_root("My Drive");
    rig.drive.add_native_doc(
        "f-doc",
        "notes",
        "root",
        "application/vnd.google-apps.document",
        t("2024-01-01T00:00:00Z"),
    );

    rig.engine.run().await.unwrap();

    // The catalog knows the document; the filesystem never sees it
    assert!(rig.catalog.get_by_id("f-doc").await.unwrap().is_some());
    assert!(!rig.drive_path.join("My Drive").join("notes").exists());
    assert_eq!(
        rig.drive
            .count_calls(|c| matches!(c, DriveCall::Download { .. })),
        0
    );
}

#[tokio::test]
async fn remote_folder_removal_takes_the_local_subtree_with_it() {
    let rig = rig().await;
    rig.drive.seed_root("My Drive");
    rig.drive
        .add_folder("f-sub", "sub", "root", t("2024-01-01T00:00:00Z"));
    rig.drive.add_file(
        "f-x",
        "x.txt",
        "f-sub",
        b"nested",
        t("2024-01-01T00:00:00Z"),
    );
    rig.engine.run().await.unwrap();

    let sub = rig.drive_path.join("My Drive").join("sub");
    assert!(sub.join("x.txt").exists());

    rig.drive.remote_remove("f-sub");
    rig.engine.run().await.unwrap();

    assert!(!sub.exists());
    assert!(rig.catalog.get_by_id("f-sub").await.unwrap().is_none());
    // The orphaned child row is swept by cleanup
    assert!(rig.catalog.get_by_id("f-x").await.unwrap().is_none());
}

#[tokio::test]
async fn a_folder_renamed_before_it_was_ever_synced_is_created_at_its_new_name() {
    let rig = rig().await;
    rig.drive.seed_root("My Drive");
    rig.engine.run().await.unwrap();

    // The folder appears and is renamed remotely between our passes:
    // both changes land in the same feed batch, so the catalog inserts
    // it and re-labels it before the local side ever saw it.
    rig.drive
        .add_folder("f-new", "draft", "root", t("2024-01-01T00:00:00Z"));
    rig.drive.remote_touch("f-new", t("2024-01-01T00:00:00Z"));
    rig.drive
        .remote_rename("f-new", "final", t("2024-01-02T00:00:00Z"));
    rig.drive.add_file(
        "f-c",
        "c.txt",
        "f-new",
        b"inside",
        t("2024-01-01T00:00:00Z"),
    );
    rig.drive.remote_touch("f-c", t("2024-01-01T00:00:00Z"));

    rig.engine.run().await.unwrap();

    // Created under the new name, never under the old one, and the
    // child landed inside it
    let final_dir = rig.drive_path.join("My Drive").join("final");
    assert!(final_dir.is_dir());
    assert!(!rig.drive_path.join("My Drive").join("draft").exists());
    assert_eq!(std::fs::read(final_dir.join("c.txt")).unwrap(), b"inside");

    let entry = rig.catalog.get_by_id("f-new").await.unwrap().unwrap();
    assert_eq!(entry.prev_remote_name, "final");
    assert_eq!(entry.cur_remote_name, "final");
}

#[tokio::test]
async fn a_preexisting_identical_local_file_is_adopted_without_transfer() {
    let rig = rig().await;
    seed_cold_start(&rig.drive);

    // The mirror already holds the file before the catalog ever saw it,
    // as after a lost database. The content probe adopts it in place.
    let mirror = rig.drive_path.join("My Drive");
    std::fs::create_dir(&mirror).unwrap();
    std::fs::write(mirror.join("a.txt"), b"123456789").unwrap();

    rig.engine.run().await.unwrap();

    assert_eq!(
        rig.drive
            .count_calls(|c| matches!(c, DriveCall::Download { .. })),
        0
    );
    assert_eq!(
        rig.drive
            .count_calls(|c| matches!(c, DriveCall::UpdateMedia { .. })),
        0
    );
    let entry = rig.catalog.get_by_id("f-a").await.unwrap().unwrap();
    assert!(entry.download_time.is_some());
}

#[tokio::test]
async fn a_preexisting_divergent_local_file_wins_an_upload() {
    let rig = rig().await;
    seed_cold_start(&rig.drive);

    let mirror = rig.drive_path.join("My Drive");
    std::fs::create_dir(&mirror).unwrap();
    std::fs::write(mirror.join("a.txt"), b"different local truth").unwrap();

    rig.engine.run().await.unwrap();

    // The local content was pushed, not overwritten
    assert_eq!(
        rig.drive
            .count_calls(|c| matches!(c, DriveCall::Download { .. })),
        0
    );
    assert_eq!(
        rig.drive
            .count_calls(|c| matches!(c, DriveCall::UpdateMedia { .. })),
        1
    );
    assert_eq!(
        std::fs::read(mirror.join("a.txt")).unwrap(),
        b"different local truth"
    );
}
