//! Public catalog: listing, filtering, lookup.

use axum::http::StatusCode;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn seed_catalog(app: &TestApp) {
    let conn = app.conn();
    for (id, title, price, category, trending) in [
        ("halo", "Halo Infinite", 59.99, "Shooter", true),
        ("doom", "DOOM Eternal", 39.99, "Shooter", false),
        ("celeste", "Celeste", 19.99, "Platformer", true),
        ("hades", "Hades", 24.99, "Roguelike", false),
    ] {
        let input = CreateProduct {
            id: Some(id.to_string()),
            title: title.to_string(),
            description: String::new(),
            price,
            category: category.to_string(),
            is_trending: trending,
            release_date: None,
            stock: 999,
        };
        let cents = price_to_cents(price).unwrap();
        queries::create_product(&conn, &input, cents).unwrap();
    }
}

fn ids(body: &serde_json::Value) -> Vec<String> {
    let mut ids: Vec<String> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_list_games() {
    let app = TestApp::new().await;
    seed_catalog(&app);

    let (status, body) = app.send(get_request("/games", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 4);
    assert_eq!(ids(&body), vec!["celeste", "doom", "hades", "halo"]);
}

#[tokio::test]
async fn test_filter_by_category_trending_and_search() {
    let app = TestApp::new().await;
    seed_catalog(&app);

    let (_, body) = app.send(get_request("/games?category=shooter", None)).await;
    assert_eq!(ids(&body), vec!["doom", "halo"]);

    let (_, body) = app.send(get_request("/games?trending=true", None)).await;
    assert_eq!(ids(&body), vec!["celeste", "halo"]);

    let (_, body) = app
        .send(get_request("/games?category=Shooter&trending=false", None))
        .await;
    assert_eq!(ids(&body), vec!["doom"]);

    let (_, body) = app.send(get_request("/games?q=HAL", None)).await;
    assert_eq!(ids(&body), vec!["halo"]);

    // LIKE wildcards in the query are matched literally
    let (_, body) = app.send(get_request("/games?q=%25", None)).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_pagination() {
    let app = TestApp::new().await;
    seed_catalog(&app);

    let (_, first) = app.send(get_request("/games?limit=3", None)).await;
    let (_, second) = app.send(get_request("/games?limit=3&offset=3", None)).await;

    assert_eq!(first["total"], 4);
    assert_eq!(first["limit"], 3);
    assert_eq!(first["items"].as_array().unwrap().len(), 3);
    assert_eq!(second["items"].as_array().unwrap().len(), 1);
    assert_eq!(second["offset"], 3);
}

#[tokio::test]
async fn test_get_game() {
    let app = TestApp::new().await;
    seed_catalog(&app);

    let (status, body) = app.send(get_request("/games/halo", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Halo Infinite");
    assert_eq!(body["price_cents"], 5999);
    assert_eq!(body["category"], "Shooter");

    let (status, body) = app.send(get_request("/games/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["details"], "Game not found");
}

#[tokio::test]
async fn test_removed_games_are_hidden() {
    let app = TestApp::new().await;
    seed_catalog(&app);
    assert!(queries::soft_delete_product(&app.conn(), "doom").unwrap());

    let (_, body) = app.send(get_request("/games?category=Shooter", None)).await;
    assert_eq!(ids(&body), vec!["halo"]);

    let (status, _) = app.send(get_request("/games/doom", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(!queries::soft_delete_product(&app.conn(), "doom").unwrap());
}

#[tokio::test]
async fn test_invalid_query_is_bad_request() {
    let app = TestApp::new().await;
    let (status, _) = app.send(get_request("/games?trending=maybe", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
