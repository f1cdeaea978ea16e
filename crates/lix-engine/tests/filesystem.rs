use serde_json::json;

use lix_engine::{FileSystem, Lix, StdFileSystem, TracingFileSystem};

#[tokio::test]
async fn test_sync_and_export_round_trip() {
    let source = tempfile::tempdir().unwrap();
    let fs = TracingFileSystem::new(StdFileSystem);
    fs.write(&source.path().join("a.json"), br#"{"x": 1}"#).await.unwrap();
    fs.write(&source.path().join("docs/readme.md"), b"# Title\n\nSome text.\n")
        .await
        .unwrap();
    fs.write(&source.path().join("notes.txt"), b"one\ntwo\n").await.unwrap();
    fs.write(&source.path().join("image.bin"), &[0u8, 159, 146, 150]).await.unwrap();

    let lix = Lix::open_memory().unwrap();
    let session = lix.session().unwrap();
    let synced = lix.sync_from_fs(&session, &fs, source.path()).await.unwrap();
    assert_eq!(synced, 3);

    let paths: Vec<String> = lix
        .list_files(&session)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.path)
        .collect();
    assert_eq!(paths, vec!["/a.json", "/docs/readme.md", "/notes.txt"]);

    let target = tempfile::tempdir().unwrap();
    let exported = lix.export_to_fs(&session, &fs, target.path()).await.unwrap();
    assert_eq!(exported, 3);

    let md = fs.read(&target.path().join("docs/readme.md")).await.unwrap();
    assert_eq!(md, b"# Title\n\nSome text.\n");
    let txt = fs.read(&target.path().join("notes.txt")).await.unwrap();
    assert_eq!(txt, b"one\ntwo\n");
    let data: serde_json::Value =
        serde_json::from_slice(&fs.read(&target.path().join("a.json")).await.unwrap()).unwrap();
    assert_eq!(data, json!({"x": 1}));
}

#[tokio::test]
async fn test_unhandled_file_is_rejected() {
    let lix = Lix::open_memory().unwrap();
    let session = lix.session().unwrap();
    let err = lix.write_file(&session, "/image.bin", &[1, 2, 3]).await.unwrap_err();
    assert_eq!(err.error_code(), "NO_PLUGIN");
}

#[tokio::test]
async fn test_database_survives_reopen_and_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repo.lix");

    let exported = {
        let lix = Lix::open(&path).unwrap();
        let session = lix.session().unwrap();
        lix.write_file(&session, "/notes.txt", b"kept\n").await.unwrap();
        lix.commit(&session, "keep").await.unwrap();
        lix.export().unwrap()
    };

    let reopened = Lix::open(&path).unwrap();
    let session = reopened.session().unwrap();
    let file = reopened.read_file(&session, "/notes.txt").await.unwrap();
    assert_eq!(file.data, b"kept\n");

    let copy = Lix::import(&exported, dir.path().join("copy.lix")).unwrap();
    let session = copy.session().unwrap();
    let history = copy.history(&session).await.unwrap();
    assert_eq!(history[0].description, "keep");
    assert_eq!(copy.read_file(&session, "/notes.txt").await.unwrap().data, b"kept\n");
}
