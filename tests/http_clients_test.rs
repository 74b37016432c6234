//! Integration tests for the ERP source and PocketBase HTTP clients

use erp_sync::adapters::downstream::{DownstreamStore, PocketBaseClient};
use erp_sync::adapters::source::{ErpApiClient, FetchQuery, SourceClient};
use erp_sync::config::{secret_string, DownstreamConfig, SourceConfig};
use erp_sync::domain::{CompositeKey, DownstreamError, ErpSyncError, SourceError};
use mockito::Matcher;
use serde_json::json;

const RECORDS_PATH: &str = "/api/collections/DEFAULT_erpConsolidateData/records";
const AUTH_PATH: &str = "/api/collections/_superusers/auth-with-password";

fn source_client(server: &mockito::Server) -> ErpApiClient {
    ErpApiClient::new(&SourceConfig::new(format!(
        "{}/api/transactions",
        server.url()
    )))
    .unwrap()
}

fn downstream_config(server: &mockito::Server, with_credentials: bool) -> DownstreamConfig {
    let mut config = DownstreamConfig {
        base_url: server.url(),
        ..DownstreamConfig::default()
    };
    if with_credentials {
        config.admin_email = Some("sync@example.com".to_string());
        config.admin_password = Some(secret_string("pb-secret".to_string()));
    }
    config
}

fn sample_key() -> CompositeKey {
    CompositeKey {
        order_id: "SO-1".to_string(),
        line_no: 10,
        part_id: "P-7".to_string(),
    }
}

#[tokio::test]
async fn test_source_fetch_sends_filters() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/transactions")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("txnType".into(), "BOM".into()),
            Matcher::UrlEncoded("fromDate".into(), "2024-01-01".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"CUST_ORDER_ID": "SO-1"}, {"CUST_ORDER_ID": "SO-2"}]"#)
        .create_async()
        .await;

    let query = FetchQuery {
        txn_type: Some("BOM".to_string()),
        from_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1),
    };
    let items = source_client(&server).fetch(&query).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["CUST_ORDER_ID"], json!("SO-2"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_source_error_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/transactions")
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let err = source_client(&server)
        .fetch(&FetchQuery::default())
        .await
        .unwrap_err();

    assert!(err.is_source_unavailable());
    assert_eq!(err.status_code(), Some(502));
    assert!(err.to_string().contains("bad gateway"));
}

#[tokio::test]
async fn test_source_non_array_body_is_invalid() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/transactions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "maintenance"}"#)
        .create_async()
        .await;

    let err = source_client(&server)
        .fetch(&FetchQuery::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ErpSyncError::Source(SourceError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_source_unreachable() {
    let client = ErpApiClient::new(&SourceConfig::new("http://127.0.0.1:1/api/transactions")).unwrap();
    let err = client.fetch(&FetchQuery::default()).await.unwrap_err();
    assert!(matches!(
        err,
        ErpSyncError::Source(SourceError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_authenticate_stores_token_for_later_calls() {
    let mut server = mockito::Server::new_async().await;
    let auth = server
        .mock("POST", AUTH_PATH)
        .match_body(Matcher::Json(json!({
            "identity": "sync@example.com",
            "password": "pb-secret"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token": "tok-1", "record": {"id": "admin"}}"#)
        .create_async()
        .await;
    let find = server
        .mock("GET", RECORDS_PATH)
        .match_header("authorization", "Bearer tok-1")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded(
                "filter".into(),
                r#"CUST_ORDER_ID="SO-1" && CUST_ORDER_LINE_NO="10" && BOM_PART_ID="P-7""#.into(),
            ),
            Matcher::UrlEncoded("perPage".into(), "1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"page": 1, "items": [{"id": "abc123"}]}"#)
        .create_async()
        .await;

    let client = PocketBaseClient::new(&downstream_config(&server, true)).unwrap();
    client.authenticate().await.unwrap();
    let found = client.find_by_key(&sample_key()).await.unwrap();

    assert_eq!(found.as_deref(), Some("abc123"));
    auth.assert_async().await;
    find.assert_async().await;
}

#[tokio::test]
async fn test_rejected_login_is_an_authentication_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", AUTH_PATH)
        .with_status(400)
        .with_body(r#"{"message": "Failed to authenticate."}"#)
        .create_async()
        .await;

    let client = PocketBaseClient::new(&downstream_config(&server, true)).unwrap();
    let err = client.authenticate().await.unwrap_err();

    assert!(matches!(
        err,
        ErpSyncError::Downstream(DownstreamError::AuthenticationFailed(_))
    ));
    assert_eq!(err.status_code(), Some(401));
}

#[tokio::test]
async fn test_find_returns_none_when_no_match() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", RECORDS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"page": 1, "items": []}"#)
        .create_async()
        .await;

    let client = PocketBaseClient::new(&downstream_config(&server, false)).unwrap();
    assert_eq!(client.find_by_key(&sample_key()).await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_token_triggers_one_login() {
    let mut server = mockito::Server::new_async().await;
    let rejected = server
        .mock("GET", RECORDS_PATH)
        .match_query(Matcher::Any)
        .match_header("authorization", Matcher::Missing)
        .with_status(401)
        .with_body(r#"{"message": "The request requires valid record authorization token."}"#)
        .expect(1)
        .create_async()
        .await;
    let auth = server
        .mock("POST", AUTH_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token": "fresh"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", RECORDS_PATH)
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items": [{"id": "abc123"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let client = PocketBaseClient::new(&downstream_config(&server, true)).unwrap();
    let found = client.find_by_key(&sample_key()).await.unwrap();

    assert_eq!(found.as_deref(), Some("abc123"));
    rejected.assert_async().await;
    auth.assert_async().await;
    accepted.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_without_credentials_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", RECORDS_PATH)
        .with_status(401)
        .with_body("unauthorized")
        .create_async()
        .await;

    let client = PocketBaseClient::new(&downstream_config(&server, false)).unwrap();
    let err = client.create(&json!({"CUST_ORDER_ID": "SO-1"})).await.unwrap_err();
    assert_eq!(err.status_code(), Some(401));
    assert!(err.is_delivery_error());
}

#[tokio::test]
async fn test_create_and_update_return_response() {
    let mut server = mockito::Server::new_async().await;
    let create = server
        .mock("POST", RECORDS_PATH)
        .match_body(Matcher::PartialJson(json!({"CUST_ORDER_ID": "SO-1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "new001"}"#)
        .create_async()
        .await;
    let update = server
        .mock("PATCH", format!("{RECORDS_PATH}/abc123").as_str())
        .match_body(Matcher::PartialJson(json!({"BOM_QTY": 5.0})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "abc123"}"#)
        .create_async()
        .await;

    let client = PocketBaseClient::new(&downstream_config(&server, false)).unwrap();

    let created = client
        .create(&json!({"CUST_ORDER_ID": "SO-1", "BOM_QTY": 4.0}))
        .await
        .unwrap();
    assert_eq!(created.status, 200);
    assert!(created.body.contains("new001"));

    let updated = client
        .update("abc123", &json!({"CUST_ORDER_ID": "SO-1", "BOM_QTY": 5.0}))
        .await
        .unwrap();
    assert_eq!(updated.status, 200);

    create.assert_async().await;
    update.assert_async().await;
}

#[tokio::test]
async fn test_validation_failure_keeps_status_and_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", RECORDS_PATH)
        .with_status(400)
        .with_body(r#"{"message": "Failed to create record.", "data": {"BOM_QTY": {"code": "validation_invalid_number"}}}"#)
        .create_async()
        .await;

    let client = PocketBaseClient::new(&downstream_config(&server, false)).unwrap();
    let err = client.create(&json!({})).await.unwrap_err();

    match err {
        ErpSyncError::Downstream(DownstreamError::HttpStatus { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("validation_invalid_number"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
