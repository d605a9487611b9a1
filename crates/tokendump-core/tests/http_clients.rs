//! Integration tests for BackendClient and GatewayClient.
//!
//! Uses wiremock for HTTP mocking. Tests cover known-depot fetch, payload
//! submission, status mapping (401/429/5xx), retry behavior and the gateway's
//! content service endpoints.

use std::time::Duration;

use tokendump_core::{
    BackendClient, ContentService, CredentialPayload, DumpError, DumperConfig, GatewayClient,
    KnownDepots, ResultCode, USER_AGENT_VALUE,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(mock_server: &MockServer) -> DumperConfig {
    DumperConfig {
        max_retries: 0,
        ..DumperConfig::default()
    }
    .with_backend_url(format!("{}/api", mock_server.uri()))
    .with_gateway_url(mock_server.uri())
}

#[tokio::test]
async fn test_known_depots_feed_skip_list() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/KnownDepots"))
        .and(header("user-agent", USER_AGENT_VALUE))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "depots": [7, 8, 9] })),
        )
        .mount(&mock_server)
        .await;

    let client = BackendClient::new(&test_config(&mock_server)).unwrap();
    let mut known = KnownDepots::new();
    let count = known.fetch_server_skip_list(&client).await.unwrap();

    assert_eq!(count, 3);
    assert!(known.is_known(8));
    assert!(!known.previously_sent().contains(&8));
}

#[tokio::test]
async fn test_submit_payload() {
    let mock_server = MockServer::start().await;

    let mut payload = CredentialPayload::new().with_steam_id(76561197960287930);
    payload.insert_sub(100, 7);
    payload.insert_app(10, 1111);
    payload.insert_depot_key(11, &[0xde, 0xad]);

    Mock::given(method("POST"))
        .and(path("/api/SubmitTokens"))
        .and(body_json(serde_json::json!({
            "v": 2,
            "steamid": "76561197960287930",
            "subs": { "100": "7" },
            "apps": { "10": "1111" },
            "depots": { "11": "DEAD" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "message": "thanks"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = BackendClient::new(&test_config(&mock_server)).unwrap();
    let response = client.submit(&payload).await.unwrap();
    assert_eq!(response.message.as_deref(), Some("thanks"));
}

#[tokio::test]
async fn test_submit_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/SubmitTokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "message": "payload too old"
        })))
        .mount(&mock_server)
        .await;

    let client = BackendClient::new(&test_config(&mock_server)).unwrap();
    let err = client.submit(&CredentialPayload::new()).await.unwrap_err();

    match err {
        DumpError::InvalidResponse { message } => assert_eq!(message, "payload too old"),
        other => panic!("expected InvalidResponse, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/KnownDepots"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let client = BackendClient::new(&test_config(&mock_server)).unwrap();
    let result = client.known_depots().await;

    assert!(matches!(result, Err(DumpError::Unauthorized { .. })));
}

#[tokio::test]
async fn test_rate_limiting_with_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/KnownDepots"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
        .mount(&mock_server)
        .await;

    let client = BackendClient::new(&test_config(&mock_server)).unwrap();
    let result = client.known_depots().await;

    match result {
        Err(DumpError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(5)));
        }
        _ => panic!("expected RateLimited error"),
    }
}

#[tokio::test]
async fn test_retry_on_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/KnownDepots"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/KnownDepots"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "depots": [1] })),
        )
        .mount(&mock_server)
        .await;

    let config = DumperConfig {
        max_retries: 2,
        ..test_config(&mock_server)
    };
    let client = BackendClient::new(&config).unwrap();

    assert_eq!(client.known_depots().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_server_error_without_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/KnownDepots"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = BackendClient::new(&test_config(&mock_server)).unwrap();
    let err = client.known_depots().await.unwrap_err();

    assert!(matches!(err, DumpError::Network { .. }));
    assert!(err.to_string().contains("HTTP 500"));
}

#[tokio::test]
async fn test_submit_not_resent_after_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/SubmitTokens"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = DumperConfig {
        max_retries: 3,
        ..test_config(&mock_server)
    };
    let client = BackendClient::new(&config).unwrap();
    let mut payload = CredentialPayload::new();
    payload.insert_app(10, 1111);

    let err = client.submit(&payload).await.unwrap_err();
    assert!(matches!(err, DumpError::Network { .. }));
}

#[tokio::test]
async fn test_malformed_known_depots() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/KnownDepots"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock_server)
        .await;

    let client = BackendClient::new(&test_config(&mock_server)).unwrap();
    let result = client.known_depots().await;

    assert!(matches!(result, Err(DumpError::InvalidResponse { .. })));
}

#[tokio::test]
async fn test_gateway_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "steamid": 76561197960287930u64,
            "licenses": [
                { "packageid": 0, "access_token": 0, "flags": 0 },
                { "packageid": 100, "access_token": 7, "flags": 512 }
            ]
        })))
        .mount(&mock_server)
        .await;

    let gateway = GatewayClient::new(&test_config(&mock_server)).unwrap();
    let session = gateway.session().await.unwrap();

    assert_eq!(session.steam_id, 76561197960287930);
    assert_eq!(session.licenses.len(), 2);
    assert_eq!(session.licenses[1].access_token, 7);
}

#[tokio::test]
async fn test_gateway_content_service() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/packageinfo"))
        .and(body_json(serde_json::json!({ "packageids": [100] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "packages": [{ "packageid": 100, "appids": [10, 20] }]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "granted": { "10": 1111, "20": 0 },
            "denied": []
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/appinfo"))
        .and(body_json(serde_json::json!({
            "apps": [{ "appid": 10, "access_token": 1111 }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "apps": [{
                "appid": 10,
                "depots": [
                    { "name": "11" },
                    { "name": "228988", "depotfromapp": 228980 }
                ]
            }]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/depotkey"))
        .and(body_json(serde_json::json!({ "depotid": 11, "appid": 10 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "depotid": 11,
            "appid": 10,
            "result": 1,
            "key": "00ff"
        })))
        .mount(&mock_server)
        .await;

    let gateway = GatewayClient::new(&test_config(&mock_server)).unwrap();

    let packages = gateway.package_info(&[100]).await.unwrap();
    assert_eq!(packages[0].app_ids, vec![10, 20]);

    let grants = gateway.access_tokens(&[10, 20]).await.unwrap();
    assert_eq!(grants.granted.get(&10), Some(&1111));
    assert_eq!(grants.granted.get(&20), Some(&0));

    let apps = gateway
        .app_info(&[tokendump_core::AppRequest {
            app_id: 10,
            access_token: 1111,
        }])
        .await
        .unwrap();
    assert_eq!(apps[0].depots.len(), 2);
    assert!(apps[0].depots[1].is_redistributable());

    let key = gateway.depot_decryption_key(11, 10).await.unwrap();
    assert_eq!(key.result, ResultCode::OK);
    assert_eq!(key.key, vec![0x00, 0xff]);
}
