//! Concurrent triggers for the same transaction must converge on one ledger entry.

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use storefront::fulfillment::{FulfillmentRequest, FulfillmentStatus, fulfill};

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_webhook_and_confirmation_race_records_one_entry() {
    let app = TestApp::new().await;
    let (buyer, token) = app.create_user("a@example.com", false);
    let intent = {
        let conn = app.conn();
        let halo = create_test_game(&conn, "halo", "Halo Infinite", 5999);
        let celeste = create_test_game(&conn, "celeste", "Celeste", 1999);
        create_test_intent(&conn, &buyer.id, &[&halo, &celeste], "cs_race")
    };
    let session = checkout_session_json("cs_race", &intent, "paid");
    app.stripe.put_session(session.clone());

    let router = app.router();
    let mut handles = Vec::new();
    for i in 0..6 {
        let request = if i % 2 == 0 {
            signed_webhook(checkout_event("checkout.session.completed", session.clone()))
        } else {
            json_request(
                "POST",
                "/fulfillment/add-games",
                Some(&token),
                json!({ "session_id": "cs_race" }),
            )
        };
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            router.oneshot(request).await.unwrap().status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(app.ledger_count("cs_race"), 1);
    let mut owned = app.owned(&buyer.id);
    owned.sort();
    assert_eq!(owned, vec!["celeste".to_string(), "halo".to_string()]);
    assert_eq!(count_entitlements(&app.conn()), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fulfill_calls_have_one_winner() {
    let app = TestApp::new().await;
    let (buyer, intent) = {
        let conn = app.conn();
        let buyer = create_test_account(&conn, "a@example.com", false);
        let halo = create_test_game(&conn, "halo", "Halo Infinite", 5999);
        let intent = create_test_intent(&conn, &buyer.id, &[&halo], "tx_1");
        (buyer, intent)
    };

    let mut handles = Vec::new();
    for i in 0..8 {
        let state = app.state.clone();
        let intent = intent.clone();
        let source = if i % 2 == 0 {
            OrderSource::Webhook
        } else {
            OrderSource::Confirmation
        };
        handles.push(tokio::spawn(async move {
            fulfill(
                &state,
                &FulfillmentRequest {
                    transaction_id: "tx_1",
                    intent: &intent,
                    charged: Some((5999, "usd".to_string())),
                    source,
                },
            )
            .await
            .unwrap()
        }));
    }

    let mut winners = 0;
    let mut order_ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        if outcome.status == FulfillmentStatus::Fulfilled {
            winners += 1;
        }
        order_ids.push(outcome.order.id);
    }

    assert_eq!(winners, 1, "exactly one caller should record the entry");
    order_ids.dedup();
    assert_eq!(order_ids.len(), 1, "every caller should see the same entry");
    assert_eq!(app.ledger_count("tx_1"), 1);
    assert_eq!(app.owned(&buyer.id), vec!["halo".to_string()]);
}
