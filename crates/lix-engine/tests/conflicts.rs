mod common;

use common::{add_todo, pair, setup, text, todos};
use lix_engine::ast::{col, lit, Select, Update};
use lix_engine::{Lix, MergeOutcome, Session, VersionBase};

async fn retitle(lix: &Lix, session: &Session, id: &str, title: &str) {
    lix.execute(
        session,
        Update::view("todo").set("title", lit(title)).filter(col("id").eq(lit(id))),
        &[],
    )
    .await
    .unwrap();
}

async fn change_id(lix: &Lix, session: &Session, id: &str) -> String {
    let rows = lix
        .execute(
            session,
            Select::star_from("todo")
                .columns(["lixcol_change_id"])
                .filter(col("id").eq(lit(id))),
            &[],
        )
        .await
        .unwrap();
    text(&rows.rows[0][0])
}

/// main at C1 with one todo, and versions `a` and `b` branched from it.
async fn forked() -> (Lix, Session, Session, Session, String) {
    let (lix, main) = setup().await;
    add_todo(&lix, &main, "t1", "Base").await;
    let base = lix.commit(&main, "base").await.unwrap();

    for name in ["a", "b"] {
        lix.create_version(&main, VersionBase::Active, None, Some(name))
            .await
            .unwrap();
    }
    let a = lix.session_at("a").unwrap();
    let b = lix.session_at("b").unwrap();
    (lix, main, a, b, base.id)
}

#[tokio::test]
async fn test_diverging_edits_conflict_symmetrically() {
    let (lix, _main, a, b, base) = forked().await;

    retitle(&lix, &a, "t1", "From A").await;
    let commit_a = lix.commit(&a, "a edits").await.unwrap();
    retitle(&lix, &b, "t1", "From B").await;
    let commit_b = lix.commit(&b, "b edits").await.unwrap();

    let forward = lix.detect_conflicts(&a, &commit_a.id, &commit_b.id).await.unwrap();
    let backward = lix.detect_conflicts(&a, &commit_b.id, &commit_a.id).await.unwrap();
    assert_eq!(forward.len(), 1);
    assert_eq!(forward, backward);
    assert_eq!(forward[0].key.entity_id, "t1");
    assert_eq!(forward[0].common_ancestor_commit_id.as_deref(), Some(base.as_str()));

    let change_a = change_id(&lix, &a, "t1").await;
    let change_b = change_id(&lix, &b, "t1").await;
    let ab = lix
        .detect_diverging_entity_conflict(&a, &change_a, &change_b)
        .await
        .unwrap();
    let ba = lix
        .detect_diverging_entity_conflict(&a, &change_b, &change_a)
        .await
        .unwrap();
    assert!(ab.is_some());
    assert_eq!(ab, ba);

    match lix.merge_version(&a, "b").await.unwrap() {
        MergeOutcome::Conflicts(conflicts) => assert_eq!(conflicts, forward),
        other => panic!("expected conflicts, got {other:?}"),
    }
    // Nothing was written by the failed merge.
    assert_eq!(todos(&lix, &a).await, vec![pair("t1", "From A")]);
}

#[tokio::test]
async fn test_identical_edits_do_not_conflict() {
    let (lix, _main, a, b, _base) = forked().await;

    retitle(&lix, &a, "t1", "Same").await;
    let commit_a = lix.commit(&a, "a").await.unwrap();
    retitle(&lix, &b, "t1", "Same").await;
    let commit_b = lix.commit(&b, "b").await.unwrap();

    let conflicts = lix.detect_conflicts(&a, &commit_a.id, &commit_b.id).await.unwrap();
    assert!(conflicts.is_empty());
}

#[tokio::test]
async fn test_descendant_edit_is_not_a_conflict() {
    let (lix, main, a, _b, _base) = forked().await;
    let base_change = change_id(&lix, &main, "t1").await;

    retitle(&lix, &a, "t1", "Later").await;
    lix.commit(&a, "later").await.unwrap();
    let later_change = change_id(&lix, &a, "t1").await;

    let found = lix
        .detect_diverging_entity_conflict(&a, &base_change, &later_change)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_merge_brings_changes_into_target() {
    let (lix, main, a, _b, base) = forked().await;

    retitle(&lix, &a, "t1", "From A").await;
    add_todo(&lix, &a, "t2", "New in A").await;
    let tip_a = lix.commit(&a, "a edits").await.unwrap();

    let merged = match lix.merge_version(&main, "a").await.unwrap() {
        MergeOutcome::Merged(commit) => commit,
        other => panic!("expected a merge commit, got {other:?}"),
    };
    assert_eq!(merged.parent_ids, vec![base, tip_a.id]);
    assert_eq!(
        todos(&lix, &main).await,
        vec![pair("t1", "From A"), pair("t2", "New in A")]
    );

    assert_eq!(lix.merge_version(&main, "a").await.unwrap(), MergeOutcome::UpToDate);
}
