use std::collections::BTreeSet;
use std::fs;
use std::time::Duration;

use super::*;
use crate::provider::RemoteEntry;
use crate::sync::retry::RetryPolicy;
use crate::sync::test_support::{FakeFailure, FakeProvider};
use crate::sync::transfer::TransferConfig;
use tempfile::{TempDir, tempdir};

fn engine(provider: FakeProvider, root: &Path) -> SyncEngine<FakeProvider> {
    engine_with(provider, FolderMapping::retropie_default(), root, false)
}

fn engine_with(
    provider: FakeProvider,
    mapping: FolderMapping,
    root: &Path,
    dry_run: bool,
) -> SyncEngine<FakeProvider> {
    SyncEngine::new(provider, mapping, root.to_path_buf())
        .with_transfer(TransferClient::with_config(TransferConfig {
            download_concurrency: 2,
            retry: RetryPolicy::new(2, Duration::ZERO, Duration::ZERO, false),
        }))
        .with_options(SyncOptions {
            folder_concurrency: 2,
            dry_run,
        })
}

fn roms_root(dirs: &[&str]) -> TempDir {
    let root = tempdir().unwrap();
    for dir in dirs {
        fs::create_dir_all(root.path().join(dir)).unwrap();
    }
    root
}

fn names_in(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect()
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn reconciles_rom_scenario() {
    let root = roms_root(&["nes"]);
    let nes = root.path().join("nes");
    for name in ["mario.nes", "zelda.nes", "oldrom.nes"] {
        fs::write(nes.join(name), b"local").unwrap();
    }
    let provider = FakeProvider::new().with_folder(
        "NES",
        "f-nes",
        &[
            ("mario.nes", "id1", b"mario"),
            ("zelda.nes", "id2", b"zelda"),
            ("newrom.nes", "id3", b"\x4e\x45\x53\x1a\x00\xff"),
        ],
    );

    let engine = engine(provider, root.path());
    let report = engine.perform_sync().await.unwrap();

    assert_eq!(report.folders.len(), 1);
    let folder = &report.folders[0];
    assert_eq!(folder.deleted, vec!["oldrom.nes".to_string()]);
    assert_eq!(folder.downloaded, vec!["newrom.nes".to_string()]);
    assert_eq!(names_in(&nes), set(&["mario.nes", "zelda.nes", "newrom.nes"]));
    assert_eq!(
        fs::read(nes.join("newrom.nes")).unwrap(),
        b"\x4e\x45\x53\x1a\x00\xff"
    );
    // Existing names are trusted, not re-downloaded.
    assert_eq!(fs::read(nes.join("mario.nes")).unwrap(), b"local");
    assert_eq!(engine.provider().opened(), vec!["id3".to_string()]);
}

#[tokio::test]
async fn second_pass_is_a_noop() {
    let root = roms_root(&["snes"]);
    let provider = FakeProvider::new().with_folder(
        "SNES",
        "f-snes",
        &[("a.sfc", "a", b"aaaa"), ("b.sfc", "b", b"bbbb")],
    );
    let engine = engine(provider, root.path());

    let first = engine.perform_sync().await.unwrap();
    assert_eq!(first.total_downloaded(), 2);

    let second = engine.perform_sync().await.unwrap();
    assert_eq!(second.total_deleted(), 0);
    assert_eq!(second.total_downloaded(), 0);
    assert!(second.folders.iter().all(FolderReport::is_noop));
    assert_eq!(engine.provider().opened().len(), 2);
}

#[tokio::test]
async fn unmapped_and_unsupported_folders_touch_nothing() {
    let root = roms_root(&["nes"]);
    fs::write(root.path().join("nes").join("keep.nes"), b"k").unwrap();
    let provider = FakeProvider::new()
        .with_folder("Huge Game Collection", "f-huge", &[("big.zip", "h", b"zip")])
        .with_folder("Dreamcast", "f-dc", &[("sonic.cdi", "d", b"cdi")]);

    let engine = engine(provider, root.path());
    let report = engine.perform_sync().await.unwrap();

    assert!(report.folders.is_empty());
    assert_eq!(
        report.skipped,
        vec![
            SkippedFolder {
                folder: "Huge Game Collection".into(),
                reason: SkipReason::Unsupported,
            },
            SkippedFolder {
                folder: "Dreamcast".into(),
                reason: SkipReason::NotMapped,
            },
        ]
    );
    assert!(engine.provider().listed().is_empty());
    assert!(engine.provider().opened().is_empty());
    assert_eq!(names_in(root.path()), set(&["nes"]));
    assert_eq!(names_in(&root.path().join("nes")), set(&["keep.nes"]));
}

#[tokio::test]
async fn missing_local_dir_skips_only_that_folder() {
    let root = roms_root(&["snes"]);
    let provider = FakeProvider::new()
        .with_folder("NES", "f-nes", &[("mario.nes", "id1", b"m")])
        .with_folder("SNES", "f-snes", &[("zelda.sfc", "id2", b"z")]);

    let engine = engine(provider, root.path());
    let report = engine.perform_sync().await.unwrap();

    assert_eq!(
        report.skipped,
        vec![SkippedFolder {
            folder: "NES".into(),
            reason: SkipReason::MissingLocalDir,
        }]
    );
    assert!(!root.path().join("nes").exists());
    assert_eq!(engine.provider().listed(), vec!["f-snes".to_string()]);
    assert_eq!(names_in(&root.path().join("snes")), set(&["zelda.sfc"]));
}

#[tokio::test]
async fn duplicate_remote_names_download_first_entry_once() {
    let root = roms_root(&["gb"]);
    let provider = FakeProvider::new().with_folder(
        "GameBoy",
        "f-gb",
        &[("tetris.gb", "old", b"first"), ("tetris.gb", "new", b"second")],
    );

    let engine = engine(provider, root.path());
    let report = engine.perform_sync().await.unwrap();

    assert_eq!(report.folders[0].duplicate_names, vec!["tetris.gb".to_string()]);
    assert_eq!(
        fs::read(root.path().join("gb").join("tetris.gb")).unwrap(),
        b"first"
    );
    assert_eq!(engine.provider().opened(), vec!["old".to_string()]);
}

#[tokio::test]
async fn local_directories_survive_and_block_same_named_downloads() {
    let root = roms_root(&["n64", "n64/media"]);
    fs::write(root.path().join("n64").join("media").join("box.png"), b"png").unwrap();
    let provider = FakeProvider::new().with_folder("N64", "f-n64", &[("mk.z64", "mk", b"z64")]);

    let engine = engine(provider, root.path());
    let report = engine.perform_sync().await.unwrap();

    assert_eq!(report.folders[0].kept_directories, vec!["media".to_string()]);
    assert!(report.folders[0].deleted.is_empty());
    assert!(root.path().join("n64").join("media").join("box.png").exists());
    assert_eq!(names_in(&root.path().join("n64")), set(&["media", "mk.z64"]));
}

#[tokio::test]
async fn parent_relative_mapping_targets_sibling_of_root() {
    let base = tempdir().unwrap();
    let root = base.path().join("roms");
    fs::create_dir_all(&root).unwrap();
    fs::create_dir_all(base.path().join("splashscreens")).unwrap();
    let provider =
        FakeProvider::new().with_folder("Pictures", "f-pics", &[("boot.png", "p", b"png")]);

    let engine = engine(provider, &root);
    engine.perform_sync().await.unwrap();

    assert!(base.path().join("splashscreens").join("boot.png").exists());
}

#[tokio::test]
async fn dry_run_reports_without_touching_disk() {
    let root = roms_root(&["nes"]);
    let nes = root.path().join("nes");
    fs::write(nes.join("oldrom.nes"), b"old").unwrap();
    let provider = FakeProvider::new().with_folder("NES", "f-nes", &[("new.nes", "n", b"new")]);

    let engine = engine_with(provider, FolderMapping::retropie_default(), root.path(), true);
    let report = engine.perform_sync().await.unwrap();

    let folder = &report.folders[0];
    assert!(folder.dry_run);
    assert_eq!(folder.deleted, vec!["oldrom.nes".to_string()]);
    assert_eq!(folder.downloaded, vec!["new.nes".to_string()]);
    assert_eq!(names_in(&nes), set(&["oldrom.nes"]));
    assert!(engine.provider().opened().is_empty());
}

#[tokio::test]
async fn per_file_failures_do_not_stop_the_batch() {
    let root = roms_root(&["gba"]);
    let provider = FakeProvider::new()
        .with_folder(
            "GameBoyAdvanced",
            "f-gba",
            &[("ok.gba", "ok", b"fine"), ("gone.gba", "gone", b"x")],
        )
        .fail("gone", FakeFailure::NotFound, 1);

    let engine = engine(provider, root.path());
    let report = engine.perform_sync().await.unwrap();

    assert!(report.has_failures());
    assert_eq!(report.folders[0].failed[0].name, "gone.gba");
    assert_eq!(names_in(&root.path().join("gba")), set(&["ok.gba"]));

    // The next run retries only what is still missing.
    let again = engine.perform_sync().await.unwrap();
    assert_eq!(again.folders[0].downloaded, vec!["gone.gba".to_string()]);
    assert_eq!(names_in(&root.path().join("gba")), set(&["gone.gba", "ok.gba"]));
}

#[tokio::test]
async fn auth_failure_aborts_the_run() {
    let root = roms_root(&["nes"]);
    let provider = FakeProvider::new()
        .with_folder("NES", "f-nes", &[("a.nes", "a", b"a")])
        .fail("a", FakeFailure::Unauthorized, 1);

    let engine = engine(provider, root.path());
    let err = engine.perform_sync().await.unwrap_err();

    assert!(err.is_auth());
    assert!(!root.path().join("nes").join("a.nes").exists());
}

#[tokio::test]
async fn shared_destination_is_synced_serially() {
    let root = roms_root(&["nes"]);
    let mapping = FolderMapping::from_json_str(r#"{"NES": "nes", "NES Hacks": "nes"}"#).unwrap();
    let provider = FakeProvider::new()
        .with_folder("NES", "f-nes", &[("mario.nes", "m", b"m")])
        .with_folder("NES Hacks", "f-hacks", &[("mario-hack.nes", "h", b"h")]);

    let engine = engine_with(provider, mapping, root.path(), false);
    let report = engine.perform_sync().await.unwrap();

    assert_eq!(report.folders.len(), 2);
    assert_eq!(report.folders[0].folder, "NES");
    assert_eq!(report.folders[1].folder, "NES Hacks");
    assert_eq!(report.folders[1].deleted, vec!["mario.nes".to_string()]);
    assert_eq!(names_in(&root.path().join("nes")), set(&["mario-hack.nes"]));
}

#[tokio::test]
async fn unsafe_remote_names_are_never_written() {
    let root = roms_root(&["nes"]);
    let provider = FakeProvider::new().with_entry(
        "f-nes",
        RemoteEntry {
            name: "../escape.nes".into(),
            id: "evil".into(),
            md5: None,
        },
        b"x",
    );
    let provider = provider.with_folder("NES", "f-nes", &[]);

    let engine = engine(provider, root.path());
    let report = engine.perform_sync().await.unwrap();

    assert_eq!(report.folders[0].unsafe_names, vec!["../escape.nes".to_string()]);
    assert!(!root.path().join("escape.nes").exists());
    assert!(engine.provider().opened().is_empty());
}

#[tokio::test]
async fn remote_files_named_like_staging_files_converge() {
    let root = roms_root(&["nes"]);
    let nes = root.path().join("nes");
    fs::write(nes.join("a.nes.partial"), b"synced").unwrap();
    let provider = FakeProvider::new().with_folder(
        "NES",
        "f-nes",
        &[("a.nes", "id-a", b"AAAA"), ("a.nes.partial", "id-p", b"synced")],
    );

    let engine = engine(provider, root.path());
    let first = engine.perform_sync().await.unwrap();

    assert_eq!(first.folders[0].downloaded, vec!["a.nes".to_string()]);
    assert!(first.folders[0].deleted.is_empty());
    assert_eq!(names_in(&nes), set(&["a.nes", "a.nes.partial"]));
    assert_eq!(fs::read(nes.join("a.nes.partial")).unwrap(), b"synced");
    assert_eq!(fs::read(nes.join("a.nes")).unwrap(), b"AAAA");

    let second = engine.perform_sync().await.unwrap();
    assert_eq!(second.total_downloaded(), 0);
    assert_eq!(second.total_deleted(), 0);
    assert_eq!(engine.provider().opened(), vec!["id-a"]);
}

#[tokio::test]
async fn failed_download_keeps_synced_neighbours() {
    let root = roms_root(&["nes"]);
    let nes = root.path().join("nes");
    fs::write(nes.join("a.nes.partial"), b"synced").unwrap();
    let provider = FakeProvider::new()
        .with_folder(
            "NES",
            "f-nes",
            &[("a.nes", "id-a", b"AAAA"), ("a.nes.partial", "id-p", b"synced")],
        )
        .fail("id-a", FakeFailure::NotFound, 1);

    let engine = engine(provider, root.path());
    let report = engine.perform_sync().await.unwrap();

    assert_eq!(report.folders[0].failed[0].name, "a.nes");
    assert_eq!(names_in(&nes), set(&["a.nes.partial"]));
    assert_eq!(fs::read(nes.join("a.nes.partial")).unwrap(), b"synced");
}
