use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use httpmock::Method::PATCH;
use ingress_adapter_jao::adapters::azure_auth::ClientSecretCredential;
use ingress_adapter_jao::core::{CorridorId, Storage, WatermarkStore};
use ingress_adapter_jao::{DataLakeStorage, IngressError, StateFileWatermarkStore};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;

async fn token_endpoint(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/tenant/oauth2/v2.0/token");
            then.status(200).json_body(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "storage-token"
            }));
        })
        .await
}

fn storage(server: &MockServer) -> DataLakeStorage {
    let credential =
        ClientSecretCredential::new(Client::new(), &server.base_url(), "tenant", "client", "secret")
            .unwrap();
    DataLakeStorage::new(Client::new(), &server.base_url(), "datasets", Arc::new(credential))
        .unwrap()
}

#[tokio::test]
async fn test_write_stages_outside_dataset_then_renames() {
    let server = MockServer::start_async().await;
    let token = token_endpoint(&server).await;

    let create = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path_contains("/datasets/.staging/guid/DK1-DE/2020-01-01_2020-01-03.json.")
                .query_param("resource", "file")
                .header("authorization", "Bearer storage-token")
                .header("x-ms-version", "2021-08-06");
            then.status(201);
        })
        .await;
    let append = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path_contains("/datasets/.staging/")
                .query_param("action", "append")
                .query_param("position", "0")
                .body("[1,2]");
            then.status(202);
        })
        .await;
    let flush = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path_contains("/datasets/.staging/")
                .query_param("action", "flush")
                .query_param("position", "5");
            then.status(200);
        })
        .await;
    let mkdir = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/datasets/guid/DK1-DE")
                .query_param("resource", "directory");
            then.status(201);
        })
        .await;
    let rename = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/datasets/guid/DK1-DE/2020-01-01_2020-01-03.json")
                .header_exists("x-ms-rename-source");
            then.status(201);
        })
        .await;

    storage(&server)
        .write_file("guid/DK1-DE/2020-01-01_2020-01-03.json", b"[1,2]")
        .await
        .unwrap();

    token.assert_hits_async(1).await;
    create.assert_async().await;
    append.assert_async().await;
    flush.assert_async().await;
    mkdir.assert_async().await;
    rename.assert_async().await;
}

#[tokio::test]
async fn test_failed_rename_leaves_nothing_in_dataset() {
    let server = MockServer::start_async().await;
    token_endpoint(&server).await;

    let dataset_creates = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path_contains("/datasets/guid/")
                .query_param("resource", "file");
            then.status(201);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT)
                .path_contains("/datasets/.staging/")
                .query_param("resource", "file");
            then.status(201);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PATCH);
            then.status(202);
        })
        .await;
    // 目錄已存在
    server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/datasets/guid")
                .query_param("resource", "directory");
            then.status(409).body("PathAlreadyExists");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/datasets/guid/state.json")
                .header_exists("x-ms-rename-source");
            then.status(412).body("SourceConditionNotMet");
        })
        .await;
    let cleanup = server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path_contains("/datasets/.staging/guid/state.json.");
            then.status(200);
        })
        .await;

    let err = storage(&server)
        .write_file("guid/state.json", b"{}")
        .await
        .unwrap_err();

    assert!(matches!(err, IngressError::StorageError { .. }));
    assert!(err.to_string().contains("412"));
    cleanup.assert_async().await;
    dataset_creates.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_read_missing_object_is_none() {
    let server = MockServer::start_async().await;
    token_endpoint(&server).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/datasets/guid/state.json");
            then.status(404);
        })
        .await;

    let data = storage(&server).read_file("guid/state.json").await.unwrap();
    assert!(data.is_none());
}

#[tokio::test]
async fn test_unavailable_service_is_storage_error() {
    let server = MockServer::start_async().await;
    token_endpoint(&server).await;
    server
        .mock_async(|when, then| {
            when.method(PUT);
            then.status(503).body("ServerBusy");
        })
        .await;

    let err = storage(&server)
        .write_file("guid/DK1-DE/a.json", b"[]")
        .await
        .unwrap_err();

    assert!(matches!(err, IngressError::StorageError { .. }));
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_watermark_store_loads_remote_document() {
    let server = MockServer::start_async().await;
    token_endpoint(&server).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/datasets/guid/state.json");
            then.status(200).json_body(json!({
                "LastUpdates": [
                    {"Corridor": "DK1-DE", "LastSuccessfulMonthlyDate": "2020-03-01"}
                ]
            }));
        })
        .await;

    let default = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
    let store = StateFileWatermarkStore::load(storage(&server), "guid/state.json", default)
        .await
        .unwrap();

    let known = CorridorId::parse("DK1-DE").unwrap();
    let unknown = CorridorId::parse("DE-DK1").unwrap();
    assert_eq!(
        store.get(&known).await.unwrap(),
        Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(store.get(&unknown).await.unwrap(), default);
}

#[tokio::test]
async fn test_unreadable_remote_state_aborts_load() {
    let server = MockServer::start_async().await;
    token_endpoint(&server).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/datasets/guid/state.json");
            then.status(403).body("AuthorizationPermissionMismatch");
        })
        .await;

    let default = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
    let result = StateFileWatermarkStore::load(storage(&server), "guid/state.json", default).await;

    assert!(matches!(result, Err(IngressError::PersistenceError { .. })));
}
