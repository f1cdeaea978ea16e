mod common;

use serde_json::json;

use common::{add_todo, pair, setup, text, todo_schema, todos};
use lix_engine::ast::{col, func, lit, Delete, Insert, Literal, Select, Update};
use lix_engine::{Lix, LixError, RegisterOutcome, SqlValue};

#[tokio::test]
async fn test_file_view_reads_and_writes() {
    let lix = Lix::open_memory().unwrap();
    let session = lix.session().unwrap();

    let inserted = lix
        .execute(
            &session,
            Insert::into_view("file")
                .columns(["path", "data"])
                .values(vec![lit("/notes.txt"), lit(b"hello\nworld\n".to_vec())]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(inserted.rows_affected, 1);

    let rows = lix
        .execute(
            &session,
            Select::star_from("file").filter(col("path").eq(lit("/notes.txt"))),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows.rows.len(), 1);
    assert_eq!(rows.get(0, "data"), Some(&SqlValue::Blob(b"hello\nworld\n".to_vec())));

    lix.execute(
        &session,
        Update::view("file")
            .set("data", lit(b"bye\n".to_vec()))
            .filter(col("path").eq(lit("/notes.txt"))),
        &[],
    )
    .await
    .unwrap();
    let file = lix.read_file(&session, "/notes.txt").await.unwrap();
    assert_eq!(file.data, b"bye\n");

    let deleted = lix
        .execute(
            &session,
            Delete::from_view("file").filter(col("path").eq(lit("/notes.txt"))),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(deleted.rows_affected, 1);
    let err = lix.read_file(&session, "/notes.txt").await.unwrap_err();
    assert_eq!(err.error_code(), "FILE_NOT_FOUND");
}

#[tokio::test]
async fn test_file_entities_are_queryable() {
    let lix = Lix::open_memory().unwrap();
    let session = lix.session().unwrap();
    let file = lix.write_file(&session, "/a.json", br#"{"x": 1, "y": [true]}"#).await.unwrap();

    let rows = lix
        .execute(
            &session,
            Select::star_from("state")
                .columns(["entity_id"])
                .filter(col("file_id").eq(lit(file.id.as_str())))
                .order_by(col("entity_id"), false),
            &[],
        )
        .await
        .unwrap();
    let ids: Vec<String> = rows.rows.iter().map(|r| text(&r[0])).collect();
    assert_eq!(ids, vec!["/x".to_string(), "/y/0".to_string()]);
}

#[tokio::test]
async fn test_entity_insert_derives_id_and_params() {
    let (lix, session) = setup().await;
    lix.execute(
        &session,
        Insert::into_view("todo")
            .columns(["id", "title"])
            .values(vec![lix_engine::ast::param(1), lix_engine::ast::param(2)]),
        &[Literal::from("t9"), Literal::from("From params")],
    )
    .await
    .unwrap();

    let rows = lix
        .execute(
            &session,
            Select::star_from("state")
                .columns(["entity_id", "snapshot_content"])
                .filter(col("schema_key").eq(lit("todo"))),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(text(&rows.rows[0][0]), "t9");
    let content: serde_json::Value = serde_json::from_str(&text(&rows.rows[0][1])).unwrap();
    assert_eq!(content, json!({"id": "t9", "title": "From params"}));
}

#[tokio::test]
async fn test_invalid_snapshot_is_rejected() {
    let (lix, session) = setup().await;
    let err = lix
        .execute(
            &session,
            Insert::into_view("todo").columns(["id"]).values(vec![lit("t1")]),
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "SCHEMA_VALIDATION");
    assert!(matches!(err, LixError::Query { .. }));
    assert!(todos(&lix, &session).await.is_empty());
}

#[tokio::test]
async fn test_entity_in_missing_file_is_rejected() {
    let (lix, session) = setup().await;
    let err = lix
        .execute(
            &session,
            Insert::into_view("state")
                .columns(["schema_key", "file_id", "snapshot_content"])
                .values(vec![lit("todo"), lit("missing"), lit(r#"{"id":"x","title":"y"}"#)]),
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "FOREIGN_KEY_VIOLATION");
}

#[tokio::test]
async fn test_query_errors_carry_sql() {
    let (lix, session) = setup().await;

    let err = lix.execute(&session, Select::star_from("nope"), &[]).await.unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_VIEW");
    match &err {
        LixError::Query { original_sql, .. } => assert!(original_sql.contains("nope")),
        other => panic!("expected query context, got {other:?}"),
    }

    let err = lix
        .execute(
            &session,
            Select::star_from("todo").filter(func("load_extension", vec![lit("x")]).is_null()),
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_FUNCTION");

    let err = lix
        .execute(&session, Delete::from_view("todo_history"), &[])
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "READ_ONLY_VIEW");

    let err = lix
        .execute(
            &session,
            Update::view("todo").set("id", lit("t2")).filter(col("id").eq(lit("t1"))),
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_entity_history_by_depth() {
    let (lix, session) = setup().await;
    add_todo(&lix, &session, "t1", "Draft").await;
    lix.commit(&session, "draft").await.unwrap();
    lix.execute(
        &session,
        Update::view("todo").set("title", lit("Final")).filter(col("id").eq(lit("t1"))),
        &[],
    )
    .await
    .unwrap();
    let tip = lix.commit(&session, "final").await.unwrap();

    let rows = lix
        .execute(
            &session,
            Select::star_from("todo_history")
                .columns(["title", "lixcol_depth"])
                .filter(col("id").eq(lit("t1")))
                .filter(col("lixcol_root_commit_id").eq(lit(tip.id.as_str())))
                .order_by(col("lixcol_depth"), false),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(
        rows.rows,
        vec![
            vec![SqlValue::Text("Final".into()), SqlValue::Integer(0)],
            vec![SqlValue::Text("Draft".into()), SqlValue::Integer(1)],
        ]
    );
}

#[tokio::test]
async fn test_schema_registration_is_immutable() {
    let (lix, session) = setup().await;

    let again = lix.register_schema(&session, todo_schema()).await.unwrap();
    assert_eq!(again, RegisterOutcome::Unchanged);

    let mut changed = todo_schema();
    changed["properties"]["due"] = json!({ "type": "string" });
    let err = lix.register_schema(&session, changed.clone()).await.unwrap_err();
    assert_eq!(err.error_code(), "SCHEMA_CONFLICT");

    changed["x-lix-version"] = json!("1.1");
    let bumped = lix.register_schema(&session, changed).await.unwrap();
    assert_eq!(bumped, RegisterOutcome::Inserted);

    // The view now follows the newest version.
    lix.execute(
        &session,
        Insert::into_view("todo")
            .columns(["id", "title", "due"])
            .values(vec![lit("t1"), lit("Plan"), lit("2026-11-01")]),
        &[],
    )
    .await
    .unwrap();
    let rows = lix
        .execute(&session, Select::star_from("todo").columns(["due", "lixcol_schema_version"]), &[])
        .await
        .unwrap();
    assert_eq!(
        rows.rows[0],
        vec![SqlValue::Text("2026-11-01".into()), SqlValue::Text("1.1".into())]
    );
}

#[tokio::test]
async fn test_failed_transaction_leaves_no_trace() {
    let (lix, session) = setup().await;
    let before = lix.history(&session).await.unwrap();

    let err = lix
        .transaction(&session, |tx| {
            tx.write_file("/a.txt", b"doomed\n")?;
            tx.commit("never lands")?;
            Err::<(), _>(LixError::invalid_argument("abort"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_ARGUMENT");

    assert_eq!(lix.history(&session).await.unwrap(), before);
    let err = lix.read_file(&session, "/a.txt").await.unwrap_err();
    assert_eq!(err.error_code(), "FILE_NOT_FOUND");
}

#[tokio::test]
async fn test_rolled_back_schema_leaves_no_view() {
    let (lix, session) = setup().await;
    let mut ghost = todo_schema();
    ghost["x-lix-key"] = json!("ghost");

    let err = lix
        .transaction(&session, |tx| {
            tx.register_schema(ghost)?;
            let rows = tx.execute(&Select::star_from("ghost").into(), &[])?;
            assert!(rows.rows.is_empty());
            Err::<(), _>(LixError::invalid_argument("abort"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_ARGUMENT");

    let err = lix.execute(&session, Select::star_from("ghost"), &[]).await.unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_VIEW");
    assert!(lix.execute(&session, Select::star_from("todo"), &[]).await.is_ok());
}

#[tokio::test]
async fn test_skipped_change_control_only_caches_bytes() {
    let lix = Lix::open_memory().unwrap();
    let session = lix.session().unwrap();
    lix.write_file(&session, "/notes.txt", b"hello\n").await.unwrap();
    lix.commit(&session, "notes").await.unwrap();

    let commit = lix
        .transaction(&session, |tx| {
            {
                let _guard = tx.session().skip_change_control();
                tx.write_file("/notes.txt", b"cached only\n")?;
                assert_eq!(tx.read_file("/notes.txt")?.data, b"cached only\n");

                let err = tx.write_file("/missing.txt", b"nope\n").unwrap_err();
                assert_eq!(err.error_code(), "FILE_NOT_FOUND");
            }
            tx.commit("nothing staged")
        })
        .await
        .unwrap();
    assert!(commit.change_ids.is_empty());

    // Rendering after the cache is dropped refreshes the bytes without
    // staging anything either.
    let commit = lix
        .transaction(&session, |tx| {
            tx.clear_cache()?;
            assert_eq!(tx.read_file("/notes.txt")?.data, b"hello\n");
            tx.commit("read only")
        })
        .await
        .unwrap();
    assert!(commit.change_ids.is_empty());
    assert!(!session.is_change_control_skipped());
}

#[tokio::test]
async fn test_transaction_groups_writes() {
    let (lix, session) = setup().await;
    let commit = lix
        .transaction(&session, |tx| {
            for (id, title) in [("t1", "One"), ("t2", "Two")] {
                tx.execute(
                    &Insert::into_view("todo")
                        .columns(["id", "title"])
                        .values(vec![lit(id), lit(title)])
                        .into(),
                    &[],
                )?;
            }
            tx.commit("both")
        })
        .await
        .unwrap();

    assert_eq!(commit.change_ids.len(), 2);
    assert_eq!(todos(&lix, &session).await, vec![pair("t1", "One"), pair("t2", "Two")]);
}

#[tokio::test]
async fn test_engine_functions() {
    let lix = Lix::open_memory().unwrap();
    let session = lix.session().unwrap();

    let a = lix.call_function(&session, "lix_ulid", &[]).await.unwrap();
    let b = lix.call_function(&session, "lix_ulid", &[]).await.unwrap();
    assert_ne!(a, b);

    let h1 = lix
        .call_function(&session, "lix_content_hash", &[Literal::from(r#"{"b":1,"a":2}"#)])
        .await
        .unwrap();
    let h2 = lix
        .call_function(&session, "lix_content_hash", &[Literal::from(r#"{"a":2,"b":1}"#)])
        .await
        .unwrap();
    assert_eq!(h1, h2);

    let err = lix.call_function(&session, "random", &[]).await.unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_FUNCTION");
}

#[tokio::test]
async fn test_plans_are_memoized_per_generation() {
    let (lix, session) = setup().await;
    let query = || Select::star_from("todo").filter(col("id").eq(lit("t1")));

    lix.execute(&session, query(), &[]).await.unwrap();
    lix.execute(&session, query(), &[]).await.unwrap();
    let warm = lix.plan_cache_stats();
    assert!(warm.hits >= 1);

    let mut bumped = todo_schema();
    bumped["x-lix-version"] = json!("2.0");
    lix.register_schema(&session, bumped).await.unwrap();

    lix.execute(&session, query(), &[]).await.unwrap();
    let cold = lix.plan_cache_stats();
    assert_eq!(cold.hits, warm.hits);
    assert_eq!(cold.misses, warm.misses + 1);
}
