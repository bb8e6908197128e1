//! Tests for the Scryfall catalog resolver

use super::*;
use crate::db::init_schema;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_db() -> Db {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn client_for(mock_uri: &str) -> ScryfallClient {
    ScryfallClient::new(ScryfallConfig {
        base_url: mock_uri.to_string(),
        max_workers: 4,
        timeout_seconds: 5,
    })
}

fn card_json(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "set": "lea",
        "collector_number": "232",
        "image_uris": { "small": null, "normal": "https://example.com/n.jpg", "large": null }
    })
}

#[test]
fn image_url_prefers_direct_uris() {
    let card: ScryfallCard = serde_json::from_value(card_json("id-1", "Black Lotus")).unwrap();
    assert_eq!(card.image_url("normal"), Some("https://example.com/n.jpg"));
    assert_eq!(card.image_url("large"), None);
}

#[test]
fn image_url_falls_back_to_front_face() {
    let card: ScryfallCard = serde_json::from_str(
        r#"{
            "id": "id-2",
            "name": "Delver of Secrets // Insectile Aberration",
            "card_faces": [
                { "name": "Delver of Secrets",
                  "image_uris": { "small": null, "normal": "https://example.com/front.jpg", "large": null } },
                { "name": "Insectile Aberration",
                  "image_uris": { "small": null, "normal": "https://example.com/back.jpg", "large": null } }
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(card.image_url("normal"), Some("https://example.com/front.jpg"));
}

#[test]
fn card_deserializes_with_minimal_fields() {
    let card: ScryfallCard = serde_json::from_str(r#"{"id":"id-3"}"#).unwrap();
    assert_eq!(card.id, "id-3");
    assert!(card.name.is_none());
    assert!(card.image_url("normal").is_none());
}

#[tokio::test]
async fn fetch_by_id_uses_cache_without_network() {
    // No mock mounted: any request would come back 404 and fail the assert.
    let mock_server = MockServer::start().await;
    let client = client_for(&mock_server.uri());
    let db = test_db();

    let card: ScryfallCard = serde_json::from_value(card_json("id-1", "Black Lotus")).unwrap();
    {
        let conn = db.lock().unwrap();
        crate::db::save_card_cache(&conn, &to_cached(&card).unwrap()).unwrap();
    }

    let resolved = client.fetch_card_by_id(&db, "id-1").await.unwrap();
    assert_eq!(resolved.name.as_deref(), Some("Black Lotus"));
}

#[tokio::test]
async fn fetch_by_id_caches_on_miss() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/id-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json("id-9", "Brainstorm")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let db = test_db();

    let card = client.fetch_card_by_id(&db, "id-9").await.unwrap();
    assert_eq!(card.name.as_deref(), Some("Brainstorm"));

    // Second call must hit the cache, not the mock (expect(1) above).
    let again = client.fetch_card_by_id(&db, "id-9").await.unwrap();
    assert_eq!(again.id, "id-9");
}

#[tokio::test]
async fn resolve_prefers_id_over_other_strategies() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/id-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json("id-1", "Black Lotus")))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let db = test_db();
    let reference = CardRef {
        scryfall_id: Some("id-1".to_string()),
        set_code: Some("lea".to_string()),
        collector_number: Some("232".to_string()),
        card_name: Some("Black Lotus".to_string()),
    };

    let (card, strategy) = client.resolve(&db, &reference).await;
    assert_eq!(card.unwrap().id, "id-1");
    assert_eq!(strategy, Some(ResolveStrategy::Id));
}

#[tokio::test]
async fn resolve_falls_back_to_set_and_number() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/lea/232"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json("id-1", "Black Lotus")))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let db = test_db();
    let reference = CardRef {
        set_code: Some("LEA".to_string()),
        collector_number: Some("232".to_string()),
        card_name: Some("Black Lotus".to_string()),
        ..Default::default()
    };

    let (card, strategy) = client.resolve(&db, &reference).await;
    assert!(card.is_some());
    assert_eq!(strategy, Some(ResolveStrategy::Set));

    // The set lookup caches by resulting id.
    let conn = db.lock().unwrap();
    assert!(crate::db::load_card_cache(&conn, "id-1").unwrap().is_some());
}

#[tokio::test]
async fn resolve_falls_back_to_fuzzy_name() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/named"))
        .and(query_param("fuzzy", "blck lotus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json("id-1", "Black Lotus")))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let db = test_db();
    let reference = CardRef {
        card_name: Some("blck lotus".to_string()),
        ..Default::default()
    };

    let (card, strategy) = client.resolve(&db, &reference).await;
    assert_eq!(card.unwrap().name.as_deref(), Some("Black Lotus"));
    assert_eq!(strategy, Some(ResolveStrategy::Fuzzy));
}

#[tokio::test]
async fn resolve_swallows_upstream_failures() {
    // Everything 404s: the chain exhausts and yields (None, None).
    let mock_server = MockServer::start().await;
    let client = client_for(&mock_server.uri());
    let db = test_db();
    let reference = CardRef {
        scryfall_id: Some("id-x".to_string()),
        set_code: Some("zzz".to_string()),
        collector_number: Some("999".to_string()),
        card_name: Some("No Such Card".to_string()),
    };

    let (card, strategy) = client.resolve(&db, &reference).await;
    assert!(card.is_none());
    assert!(strategy.is_none());
}

#[tokio::test]
async fn fetch_cards_by_ids_merges_cache_and_fetches() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/id-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json("id-2", "Counterspell")))
        .mount(&mock_server)
        .await;
    // id-3 is never mounted: it 404s and must be omitted.

    let client = client_for(&mock_server.uri());
    let db = test_db();
    let cached: ScryfallCard = serde_json::from_value(card_json("id-1", "Black Lotus")).unwrap();
    {
        let conn = db.lock().unwrap();
        crate::db::save_card_cache(&conn, &to_cached(&cached).unwrap()).unwrap();
    }

    let ids = vec![
        "id-1".to_string(),
        "id-2".to_string(),
        "id-2".to_string(),
        "id-3".to_string(),
    ];
    let cards = client.fetch_cards_by_ids(&db, &ids).await;

    assert_eq!(cards.len(), 2);
    assert_eq!(cards["id-1"].name.as_deref(), Some("Black Lotus"));
    assert_eq!(cards["id-2"].name.as_deref(), Some("Counterspell"));
    assert!(!cards.contains_key("id-3"));

    // The fetched entry was persisted in the bulk write.
    let conn = db.lock().unwrap();
    assert!(crate::db::load_card_cache(&conn, "id-2").unwrap().is_some());
}

#[tokio::test]
async fn search_cards_truncates_to_limit() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/search"))
        .and(query_param("order", "released"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                card_json("id-1", "Bolt 1"),
                card_json("id-2", "Bolt 2"),
                card_json("id-3", "Bolt 3")
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let cards = client.search_cards("bolt", 2).await;
    assert_eq!(cards.len(), 2);
}

#[tokio::test]
async fn search_cards_returns_empty_on_error() {
    let mock_server = MockServer::start().await;
    let client = client_for(&mock_server.uri());
    assert!(client.search_cards("anything", 5).await.is_empty());
}
