//! Store-level guarantees behind fulfillment: one completed entry per
//! transaction, an append-only ledger, and set-semantics entitlements.

use storefront::error::AppError;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn order_input(account_id: &str, transaction_id: &str) -> CreateOrder {
    CreateOrder {
        transaction_id: transaction_id.to_string(),
        account_id: account_id.to_string(),
        intent_id: None,
        items: vec![OrderItem {
            product_id: "halo".to_string(),
            title: "Halo Infinite".to_string(),
            quantity: 1,
            unit_price_cents: 5999,
        }],
        total_cents: 5999,
        currency: "usd".to_string(),
        source: OrderSource::Webhook,
    }
}

#[test]
fn test_second_completed_entry_for_transaction_is_rejected() {
    let (_dir, pool) = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let account = create_test_account(&conn, "a@example.com", false);

    let first = queries::record_ledger_entry(&mut conn, &order_input(&account.id, "tx_1")).unwrap();
    let second = queries::record_ledger_entry(&mut conn, &order_input(&account.id, "tx_1"));

    assert!(matches!(second, Err(AppError::DuplicateTransaction(ref tx)) if tx == "tx_1"));
    assert_eq!(count_ledger_entries(&conn, "tx_1"), 1);

    let found = queries::find_ledger_entry(&conn, "tx_1").unwrap().unwrap();
    assert_eq!(found.id, first.id);
    assert_eq!(found.items.len(), 1);
}

#[test]
fn test_unique_index_backs_the_existence_check() {
    let (_dir, pool) = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let account = create_test_account(&conn, "a@example.com", false);
    queries::record_ledger_entry(&mut conn, &order_input(&account.id, "tx_1")).unwrap();

    // A raw insert that skips the check still cannot add a second completed entry
    let result = conn.execute(
        "INSERT INTO orders (id, transaction_id, account_id, total_cents, currency, status, source, created_at)
         VALUES ('dup', 'tx_1', ?1, 5999, 'usd', 'completed', 'webhook', 0)",
        [&account.id],
    );
    assert!(result.is_err());

    // Non-completed rows are outside the constraint
    conn.execute(
        "INSERT INTO orders (id, transaction_id, account_id, total_cents, currency, status, source, created_at)
         VALUES ('pending-1', 'tx_1', ?1, 5999, 'usd', 'pending', 'webhook', 0)",
        [&account.id],
    )
    .unwrap();
}

#[test]
fn test_ledger_entries_are_immutable() {
    let (_dir, pool) = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let account = create_test_account(&conn, "a@example.com", false);
    let order = queries::record_ledger_entry(&mut conn, &order_input(&account.id, "tx_1")).unwrap();

    let result = conn.execute(
        "UPDATE orders SET total_cents = 1 WHERE id = ?1",
        [&order.id],
    );
    assert!(result.is_err(), "totals must not change");

    let result = conn.execute("DELETE FROM orders WHERE id = ?1", [&order.id]);
    assert!(result.is_err(), "entries must not be deleted");

    let result = conn.execute(
        "UPDATE order_items SET unit_price_cents = 1 WHERE order_id = ?1",
        [&order.id],
    );
    assert!(result.is_err(), "captured prices must not change");

    let result = conn.execute("DELETE FROM order_items WHERE order_id = ?1", [&order.id]);
    assert!(result.is_err(), "lines must not be deleted");

    let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(reloaded.total_cents, 5999);
    assert_eq!(reloaded.items[0].unit_price_cents, 5999);
}

#[test]
fn test_propagation_marker_is_set_once() {
    let (_dir, pool) = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let account = create_test_account(&conn, "a@example.com", false);
    let order = queries::record_ledger_entry(&mut conn, &order_input(&account.id, "tx_1")).unwrap();

    assert_eq!(queries::list_unpropagated_orders(&conn, 10).unwrap().len(), 1);
    assert!(queries::mark_order_propagated(&conn, &order.id).unwrap());
    assert!(!queries::mark_order_propagated(&conn, &order.id).unwrap());
    assert!(queries::list_unpropagated_orders(&conn, 10).unwrap().is_empty());

    let result = conn.execute(
        "UPDATE orders SET propagated_at = NULL WHERE id = ?1",
        [&order.id],
    );
    assert!(result.is_err(), "marker cannot be cleared");
}

#[test]
fn test_entitlement_grant_has_set_semantics() {
    let (_dir, pool) = setup_test_pool();
    let conn = pool.get().unwrap();
    let account = create_test_account(&conn, "a@example.com", false);
    create_test_game(&conn, "halo", "Halo Infinite", 5999);
    create_test_game(&conn, "celeste", "Celeste", 1999);

    let halo = vec!["halo".to_string()];
    assert_eq!(queries::grant_entitlements(&conn, &account.id, &halo, None).unwrap(), 1);
    assert_eq!(queries::grant_entitlements(&conn, &account.id, &halo, None).unwrap(), 0);

    let both = vec!["halo".to_string(), "celeste".to_string()];
    assert_eq!(queries::grant_entitlements(&conn, &account.id, &both, None).unwrap(), 1);

    let mut owned = queries::list_owned_product_ids(&conn, &account.id).unwrap();
    owned.sort();
    assert_eq!(owned, vec!["celeste".to_string(), "halo".to_string()]);
}

#[test]
fn test_recording_consumes_the_checkout_intent() {
    let (_dir, pool) = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let account = create_test_account(&conn, "a@example.com", false);
    let halo = create_test_game(&conn, "halo", "Halo Infinite", 5999);
    let intent = create_test_intent(&conn, &account.id, &[&halo], "tx_1");

    let mut input = order_input(&account.id, "tx_1");
    input.intent_id = Some(intent.id.clone());
    queries::record_ledger_entry(&mut conn, &input).unwrap();

    let intent = queries::get_checkout_intent_by_id(&conn, &intent.id)
        .unwrap()
        .unwrap();
    assert!(intent.consumed_at.is_some());
}

#[test]
fn test_purge_only_removes_abandoned_intents() {
    let (_dir, pool) = setup_test_pool();
    let mut conn = pool.get().unwrap();
    let account = create_test_account(&conn, "a@example.com", false);
    let halo = create_test_game(&conn, "halo", "Halo Infinite", 5999);

    let abandoned = create_test_intent(&conn, &account.id, &[&halo], "cs_abandoned");
    let paid = create_test_intent(&conn, &account.id, &[&halo], "cs_paid");
    let mut input = order_input(&account.id, "cs_paid");
    input.intent_id = Some(paid.id.clone());
    queries::record_ledger_entry(&mut conn, &input).unwrap();

    let future_cutoff = chrono::Utc::now().timestamp() + 60;
    let purged = queries::purge_abandoned_checkout_intents(&conn, future_cutoff).unwrap();

    assert_eq!(purged, 1);
    assert!(queries::get_checkout_intent_by_id(&conn, &abandoned.id).unwrap().is_none());
    assert!(queries::get_checkout_intent_by_id(&conn, &paid.id).unwrap().is_some());
}
