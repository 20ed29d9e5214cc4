//! HTTP contract tests for `RestRemoteStore` against a mock server.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use raffle_core::remote::{RemoteError, RemoteStore};
use raffle_rest::RestRemoteStore;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn store_for(server: &MockServer) -> RestRemoteStore {
    RestRemoteStore::new(&server.uri(), "anon-key").expect("valid credentials")
}

#[tokio::test]
async fn select_all_sends_credentials_and_decodes_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sales"))
        .and(query_param("select", "*"))
        .and(header("apikey", "anon-key"))
        .and(header("Authorization", "Bearer anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "s-1", "numbers": [4, 5]},
            {"id": "s-2", "numbers": [9]}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = store_for(&server).await.select_all("sales").await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["id"], "s-2");
}

#[tokio::test]
async fn select_all_pages_until_total_is_reached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sales"))
        .and(query_param("order", "id.asc"))
        .and(header("Range-Unit", "items"))
        .and(header("Range", "0-1"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "0-1/3")
                .set_body_json(json!([{"id": "s-1"}, {"id": "s-2"}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sales"))
        .and(header("Range", "2-3"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "2-2/3")
                .set_body_json(json!([{"id": "s-3"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await.with_page_size(2);
    let rows = store.select_all("sales").await.unwrap();

    let ids: Vec<&str> = rows.iter().filter_map(|row| row["id"].as_str()).collect();
    assert_eq!(ids, vec!["s-1", "s-2", "s-3"]);
}

#[tokio::test]
async fn select_all_stops_on_full_last_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/holders"))
        .and(header("Range", "0-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Range", "0-1/2")
                .set_body_json(json!([{"id": "h-1"}, {"id": "h-2"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await.with_page_size(2);
    assert_eq!(store.select_all("holders").await.unwrap().len(), 2);
}

#[tokio::test]
async fn count_reads_content_range_total() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/sales"))
        .and(header("Prefer", "count=exact"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "0-4/5"))
        .mount(&server)
        .await;

    assert_eq!(store_for(&server).await.count("sales").await.unwrap(), 5);
}

#[tokio::test]
async fn count_of_empty_table_is_zero() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/reservations"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "*/0"))
        .mount(&server)
        .await;

    assert_eq!(store_for(&server).await.count("reservations").await.unwrap(), 0);
}

#[tokio::test]
async fn upsert_posts_record_with_id_and_merge_preference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/assignment_holders"))
        .and(query_param("on_conflict", "id"))
        .and(header_exists("Prefer"))
        .and(body_json(json!([{"id": "h-1", "name": "Rosa"}])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server)
        .await
        .upsert("assignment_holders", "h-1", json!({"name": "Rosa"}))
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_filters_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/sales"))
        .and(query_param("id", "eq.s-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server).await.delete("sales", "s-7").await.unwrap();
}

#[tokio::test]
async fn delete_all_reports_removed_rows() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/number_owners"))
        .and(query_param("id", "not.is.null"))
        .respond_with(ResponseTemplate::new(204).insert_header("Content-Range", "*/3"))
        .mount(&server)
        .await;

    let removed = store_for(&server)
        .await
        .delete_all("number_owners")
        .await
        .unwrap();
    assert_eq!(removed, 3);
}

#[tokio::test]
async fn unauthorized_maps_to_unauthorized_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sales"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = store_for(&server).await.select_all("sales").await;
    assert_eq!(result, Err(RemoteError::Unauthorized));
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/sales"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = store_for(&server)
        .await
        .upsert("sales", "s-1", json!({}))
        .await;
    assert_eq!(
        result,
        Err(RemoteError::Status {
            status: 503,
            message: "maintenance".to_string(),
        })
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_unavailable() {
    let server = MockServer::start().await;
    let store = store_for(&server).await;
    drop(server);

    assert!(matches!(
        store.count("sales").await,
        Err(RemoteError::Unavailable(_))
    ));
}
