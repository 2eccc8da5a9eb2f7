//! Store Integration Tests
//!
//! Tests selection and reconciliation writes against a real SQLite file:
//! - Validity window and staleness filtering
//! - Most-stale-first ordering and limits
//! - Atomic two-table outcome writes
//! - Read-only selection pool

use crate::fixtures::{create_test_db, fixed_now, insert_token, load_token, TokenFixture};
use chrono::Duration;
use token_checker::models::{CheckOutcome, TokenKey};
use token_checker::store::{SqliteTokenStore, StalenessPolicy, TokenStore};
use uuid::Uuid;

fn policy() -> StalenessPolicy {
    StalenessPolicy::default()
}

#[tokio::test]
async fn test_selects_only_tokens_inside_validity_window() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    let live = TokenFixture::new("live", Duration::days(2), Duration::days(2));
    let expired = TokenFixture::new("expired", Duration::days(8), Duration::days(8));
    insert_token(&db, &live).await;
    insert_token(&db, &expired).await;

    let query = policy().query(fixed_now(), fixed_now(), 10);
    let selected = store.select_due(&query).await.unwrap();

    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].key, live.key);
    assert_eq!(selected[0].api_token, "live");
    assert_eq!(selected[0].display_name, "Legacy.1234");
}

#[tokio::test]
async fn test_fresh_tokens_are_not_due() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    insert_token(
        &db,
        &TokenFixture::new("fresh", Duration::hours(1), Duration::hours(1)),
    )
    .await;

    let query = policy().query(fixed_now(), fixed_now(), 10);
    assert!(store.select_due(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stale_name_alone_makes_token_due() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    let fixture = TokenFixture::new("name-stale", Duration::hours(1), Duration::hours(1))
        .with_check_ages(Duration::hours(1), Duration::days(2));
    insert_token(&db, &fixture).await;

    let query = policy().query(fixed_now(), fixed_now(), 10);
    let selected = store.select_due(&query).await.unwrap();

    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].key, fixture.key);
}

#[tokio::test]
async fn test_orders_by_earlier_check_timestamp() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    // Staleness keys: a = 3d, b = 5d (name), c = 4d
    let a = TokenFixture::new("a", Duration::days(1), Duration::days(1))
        .with_check_ages(Duration::days(3), Duration::hours(1));
    let b = TokenFixture::new("b", Duration::days(1), Duration::days(1))
        .with_check_ages(Duration::days(2), Duration::days(5));
    let c = TokenFixture::new("c", Duration::days(1), Duration::days(4));
    for fixture in [&a, &b, &c] {
        insert_token(&db, fixture).await;
    }

    let query = policy().query(fixed_now(), fixed_now(), 10);
    let selected = store.select_due(&query).await.unwrap();
    let order: Vec<&str> = selected.iter().map(|t| t.api_token.as_str()).collect();

    assert_eq!(order, vec!["b", "c", "a"]);
    assert!(selected
        .windows(2)
        .all(|pair| pair[0].staleness_key() <= pair[1].staleness_key()));
}

#[tokio::test]
async fn test_limit_is_respected() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    for i in 0..5 {
        let fixture = TokenFixture::new(
            &format!("token-{}", i),
            Duration::days(1),
            Duration::days(2 + i),
        );
        insert_token(&db, &fixture).await;
    }

    let query = policy().query(fixed_now(), fixed_now(), 3);
    let selected = store.select_due(&query).await.unwrap();
    let order: Vec<&str> = selected.iter().map(|t| t.api_token.as_str()).collect();
    assert_eq!(order, vec!["token-4", "token-3", "token-2"]);

    let empty = policy().query(fixed_now(), fixed_now(), 0);
    assert!(store.select_due(&empty).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_checked_before_excludes_tokens_checked_this_run() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    // Validity checked 30 minutes ago, name stale
    let fixture = TokenFixture::new("recent", Duration::days(1), Duration::days(2))
        .with_check_ages(Duration::minutes(30), Duration::days(2));
    insert_token(&db, &fixture).await;

    let run_started_earlier = fixed_now() - Duration::hours(1);
    let run_started_later = fixed_now() - Duration::minutes(10);

    let before_check = policy().query(fixed_now(), run_started_earlier, 10);
    assert!(store.select_due(&before_check).await.unwrap().is_empty());

    let after_check = policy().query(fixed_now(), run_started_later, 10);
    assert_eq!(store.select_due(&after_check).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_token_without_account_record_is_not_selected() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    let fixture = TokenFixture::new("orphan", Duration::days(1), Duration::days(2));
    insert_token(&db, &fixture).await;
    sqlx::query("DELETE FROM linked_accounts")
        .execute(&db.writer)
        .await
        .unwrap();

    let query = policy().query(fixed_now(), fixed_now(), 10);
    assert!(store.select_due(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_valid_outcome_updates_both_records() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    let fixture = TokenFixture::new("valid", Duration::days(2), Duration::days(2));
    insert_token(&db, &fixture).await;

    let outcome = CheckOutcome::Valid {
        display_name: "Hero.1234".to_string(),
    };
    store
        .record_outcome(&fixture.key, &outcome, fixed_now())
        .await
        .unwrap();

    let stored = load_token(&db, &fixture.key).await;
    assert_eq!(stored.display_name, "Hero.1234");
    assert_eq!(stored.last_valid_time, fixed_now());
    assert_eq!(stored.last_valid_check_time, fixed_now());
    assert_eq!(stored.last_name_check_time, fixed_now());
}

#[tokio::test]
async fn test_invalid_outcome_only_stamps_check_time() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    let fixture = TokenFixture::new("invalid", Duration::days(2), Duration::days(2));
    insert_token(&db, &fixture).await;

    store
        .record_outcome(&fixture.key, &CheckOutcome::Invalid, fixed_now())
        .await
        .unwrap();

    let stored = load_token(&db, &fixture.key).await;
    assert_eq!(stored.display_name, "Legacy.1234");
    assert_eq!(stored.last_valid_time, fixture.last_valid_time);
    assert_eq!(stored.last_valid_check_time, fixed_now());
    assert_eq!(stored.last_name_check_time, fixture.last_name_check_time);
}

#[tokio::test]
async fn test_repeated_outcome_write_is_idempotent() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    let fixture = TokenFixture::new("twice", Duration::days(2), Duration::days(2));
    insert_token(&db, &fixture).await;

    let outcome = CheckOutcome::Valid {
        display_name: "Hero.1234".to_string(),
    };
    store
        .record_outcome(&fixture.key, &outcome, fixed_now())
        .await
        .unwrap();
    let first = load_token(&db, &fixture.key).await;

    store
        .record_outcome(&fixture.key, &outcome, fixed_now())
        .await
        .unwrap();
    let second = load_token(&db, &fixture.key).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_outcome_for_missing_record_is_a_no_op() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    let missing = TokenKey::new(Uuid::new_v4(), Uuid::new_v4());
    let outcome = CheckOutcome::Valid {
        display_name: "Ghost.0000".to_string(),
    };

    assert!(store
        .record_outcome(&missing, &outcome, fixed_now())
        .await
        .is_ok());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM linked_accounts")
        .fetch_one(&db.writer)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_outcome_only_touches_its_own_record() {
    let (db, _temp) = create_test_db().await;
    let store = SqliteTokenStore::new(db.clone());

    let target = TokenFixture::new("target", Duration::days(2), Duration::days(2));
    let bystander = TokenFixture::new("bystander", Duration::days(2), Duration::days(2))
        .with_display_name("Bystander.5678");
    insert_token(&db, &target).await;
    insert_token(&db, &bystander).await;

    store
        .record_outcome(
            &target.key,
            &CheckOutcome::Valid {
                display_name: "Hero.1234".to_string(),
            },
            fixed_now(),
        )
        .await
        .unwrap();

    let untouched = load_token(&db, &bystander.key).await;
    assert_eq!(untouched.display_name, "Bystander.5678");
    assert_eq!(untouched.last_valid_check_time, bystander.last_valid_check_time);
}

#[tokio::test]
async fn test_reader_pool_rejects_writes() {
    let (db, _temp) = create_test_db().await;
    insert_token(
        &db,
        &TokenFixture::new("guarded", Duration::days(1), Duration::days(2)),
    )
    .await;

    let result = sqlx::query("DELETE FROM api_token_links")
        .execute(&db.reader)
        .await;
    assert!(result.is_err(), "read-only pool must not accept writes");
}

#[tokio::test]
async fn test_schema_can_be_applied_twice() {
    let (db, _temp) = create_test_db().await;
    assert!(token_checker::db::apply_schema(&db.writer).await.is_ok());
}
