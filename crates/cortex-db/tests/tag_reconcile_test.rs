//! Integration tests for the tag-count reconciler and batch reference
//! updater.
//!
//! Covers the reconciler's idempotence, convergence after arbitrary content
//! mutations, and the union semantics of reference-change reconciliation.

use cortex_core::{
    ContentRepository, CreateContentRequest, CreateTagRequest, TagRepository,
    UpdateContentRequest,
};
use cortex_db::test_fixtures::{cleanup_user, connect_test_db, unique_user};

fn content_with_tags(title: &str, tag_ids: &[&str]) -> CreateContentRequest {
    CreateContentRequest {
        title: title.to_string(),
        description: String::new(),
        link: None,
        content_type: "article".to_string(),
        personal_notes: String::new(),
        thumbnail_url: None,
        tag_ids: tag_ids.iter().map(|s| s.to_string()).collect(),
    }
}

fn tag(name: &str) -> CreateTagRequest {
    CreateTagRequest {
        tag_name: name.to_string(),
        color_code: None,
        description: None,
    }
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_reconcile_counts_referencing_content() {
    let db = connect_test_db().await;
    let user = unique_user("reconcile");

    db.tags.create(&user, tag("rust")).await.unwrap();
    db.content
        .insert(&user, content_with_tags("one", &["rust"]))
        .await
        .unwrap();
    db.content
        .insert(&user, content_with_tags("two", &["rust"]))
        .await
        .unwrap();
    db.content
        .insert(&user, content_with_tags("three", &[]))
        .await
        .unwrap();

    db.tags.reconcile_content_count(&user, "rust").await.unwrap();

    let rust = db.tags.get(&user, "rust").await.unwrap().unwrap();
    assert_eq!(rust.content_count, 2);

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_reconcile_is_idempotent() {
    let db = connect_test_db().await;
    let user = unique_user("idempotent");

    db.tags.create(&user, tag("rust")).await.unwrap();
    db.content
        .insert(&user, content_with_tags("one", &["rust"]))
        .await
        .unwrap();

    db.tags.reconcile_content_count(&user, "rust").await.unwrap();
    let first = db.tags.get(&user, "rust").await.unwrap().unwrap();

    db.tags.reconcile_content_count(&user, "rust").await.unwrap();
    let second = db.tags.get(&user, "rust").await.unwrap().unwrap();

    assert_eq!(first.content_count, second.content_count);

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_reconcile_converges_from_drift() {
    let db = connect_test_db().await;
    let user = unique_user("drift");

    db.tags.create(&user, tag("rust")).await.unwrap();
    db.content
        .insert(&user, content_with_tags("one", &["rust"]))
        .await
        .unwrap();

    // Force arbitrary drift in the stored counter.
    sqlx::query("UPDATE tag SET content_count = 99 WHERE user_id = $1 AND id = 'rust'")
        .bind(&user)
        .execute(&db.pool)
        .await
        .unwrap();

    db.tags.reconcile_content_count(&user, "rust").await.unwrap();

    let rust = db.tags.get(&user, "rust").await.unwrap().unwrap();
    assert_eq!(rust.content_count, 1, "recompute must overwrite drift");

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_reconcile_missing_tag_is_noop() {
    let db = connect_test_db().await;
    let user = unique_user("missing");

    // Neither the blank id nor the unknown id may error.
    db.tags.reconcile_content_count(&user, "").await.unwrap();
    db.tags
        .reconcile_content_count(&user, "never-created")
        .await
        .unwrap();

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_reference_change_reconciles_union() {
    let db = connect_test_db().await;
    let user = unique_user("union");

    for name in ["alpha", "beta", "gamma"] {
        db.tags.create(&user, tag(name)).await.unwrap();
    }

    let item = db
        .content
        .insert(&user, content_with_tags("one", &["alpha", "beta"]))
        .await
        .unwrap();

    // Seed drift on all three so the reconciled set is observable.
    sqlx::query("UPDATE tag SET content_count = 50 WHERE user_id = $1")
        .bind(&user)
        .execute(&db.pool)
        .await
        .unwrap();

    let (updated, old_ids) = db
        .content
        .update(
            &user,
            item.id,
            UpdateContentRequest {
                tag_ids: Some(vec!["beta".to_string(), "gamma".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(old_ids, vec!["alpha".to_string(), "beta".to_string()]);
    assert_eq!(
        updated.tag_ids,
        vec!["beta".to_string(), "gamma".to_string()]
    );

    let report = db
        .tags
        .reconcile_for_change(&user, &old_ids, &updated.tag_ids)
        .await
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(
        report.reconciled,
        vec![
            "alpha".to_string(),
            "beta".to_string(),
            "gamma".to_string()
        ]
    );

    let alpha = db.tags.get(&user, "alpha").await.unwrap().unwrap();
    let beta = db.tags.get(&user, "beta").await.unwrap().unwrap();
    let gamma = db.tags.get(&user, "gamma").await.unwrap().unwrap();
    assert_eq!(alpha.content_count, 0);
    assert_eq!(beta.content_count, 1);
    assert_eq!(gamma.content_count, 1);

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_full_pass_converges_after_mutations() {
    let db = connect_test_db().await;
    let user = unique_user("converge");

    for name in ["one", "two", "three"] {
        db.tags.create(&user, tag(name)).await.unwrap();
    }

    let a = db
        .content
        .insert(&user, content_with_tags("a", &["one", "two"]))
        .await
        .unwrap();
    db.content
        .insert(&user, content_with_tags("b", &["two", "three"]))
        .await
        .unwrap();
    let c = db
        .content
        .insert(&user, content_with_tags("c", &["three"]))
        .await
        .unwrap();

    // A mixed sequence: edit one item, delete another.
    db.content
        .update(
            &user,
            a.id,
            UpdateContentRequest {
                tag_ids: Some(vec!["one".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    db.content.delete(&user, c.id).await.unwrap();

    // Full reconciliation pass over every tag.
    let all_ids: Vec<String> = db
        .tags
        .list(&user)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    let report = db.tags.reconcile_many(&user, &all_ids).await.unwrap();
    assert!(report.is_clean());

    // Remaining content: a={one}, b={two,three}.
    for (id, expected) in [("one", 1), ("two", 1), ("three", 1)] {
        let t = db.tags.get(&user, id).await.unwrap().unwrap();
        assert_eq!(t.content_count, expected, "tag {}", id);
    }

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_tag_delete_strips_references() {
    let db = connect_test_db().await;
    let user = unique_user("strip");

    db.tags.create(&user, tag("doomed")).await.unwrap();
    db.tags.create(&user, tag("kept")).await.unwrap();
    let item = db
        .content
        .insert(&user, content_with_tags("a", &["doomed", "kept"]))
        .await
        .unwrap();

    let deleted = db.tags.delete(&user, "doomed").await.unwrap();
    assert!(deleted);

    let item = db.content.fetch(&user, item.id).await.unwrap();
    assert_eq!(item.tag_ids, vec!["kept".to_string()]);

    cleanup_user(&db, &user).await;
}
