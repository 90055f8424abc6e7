#![cfg(feature = "contact")]

use chrono::NaiveDate;
use meterbook::config::ApiConfig;
use meterbook::contact::ContactClient;
use meterbook::error::MeterbookError;
use meterbook::{Resolution, UsageSource};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-api-key";

fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: server.uri(),
        api_key: API_KEY.to_string(),
        email: "meter@example.com".to_string(),
        password: "hunter2".to_string(),
        account_timeout_secs: 5,
        usage_timeout_secs: 5,
    }
}

fn client(server: &MockServer) -> ContactClient {
    ContactClient::new(&api_config(server), "A1", chrono_tz::Pacific::Auckland).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn mount_login(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/login/v2"))
        .and(header("x-api-key", API_KEY))
        .and(body_json(json!({
            "username": "meter@example.com",
            "password": "hunter2",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_usage(server: &MockServer, token: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/usage/v2/C1"))
        .and(header("x-api-key", API_KEY))
        .and(header("session", token))
        .and(header("authorization", token))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_stores_the_session_token() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1", 1).await;

    let client = client(&server);
    assert!(!client.is_authenticated().await);
    client.authenticate().await.unwrap();
    assert!(client.is_authenticated().await);
}

#[tokio::test]
async fn login_failures_are_classified() {
    for (status, auth) in [(400, true), (401, true), (403, true), (502, false)] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/v2"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let err = client(&server).authenticate().await.unwrap_err();
        assert_eq!(err.is_auth(), auth, "status {}", status);
        if !auth {
            assert!(matches!(err, MeterbookError::Network { .. }));
        }
    }
}

#[tokio::test]
async fn login_without_token_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "segment": "RES" })))
        .mount(&server)
        .await;

    let err = client(&server).authenticate().await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let server = MockServer::start().await;
    let mut config = api_config(&server);
    config.password = String::new();
    let client = ContactClient::new(&config, "A1", chrono_tz::Pacific::Auckland).unwrap();

    let err = client
        .get_usage("C1", Resolution::Daily, date("2025-01-10"), date("2025-01-11"))
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn daily_usage_is_queried_and_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/usage/v2/C1"))
        .and(query_param("ba", "A1"))
        .and(query_param("interval", "daily"))
        .and(query_param("from", "2025-01-10"))
        .and(query_param("to", "2025-01-11"))
        .and(header("session", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"date": "2025-01-10T00:00:00.000+13:00", "value": "12.5", "offpeakValue": "3.0",
             "unchargedValue": "2.5", "dollarValue": "3.95", "currency": "NZD"},
            {"date": "2025-01-11", "value": 8.0, "offpeakValue": 0, "unchargedValue": 0,
             "dollarValue": 2.4},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    client.set_token("tok").await;
    let records = client
        .get_usage("C1", Resolution::Daily, date("2025-01-10"), date("2025-01-11"))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    let first = &records[0];
    assert!((first.total_kwh - 12.5).abs() < 1e-9);
    assert!((first.peak_kwh - 7.0).abs() < 1e-9);
    assert!((first.offpeak_kwh - 3.0).abs() < 1e-9);
    assert!((first.paid_kwh - 10.0).abs() < 1e-9);
    assert!((first.free_kwh - 2.5).abs() < 1e-9);
    assert_eq!(first.key(Resolution::Daily).as_deref(), Some("2025-01-10"));
    assert_eq!(records[1].key(Resolution::Daily).as_deref(), Some("2025-01-11"));
}

#[tokio::test]
async fn wrapped_hourly_response_is_accepted() {
    let server = MockServer::start().await;
    mount_usage(
        &server,
        "tok",
        ResponseTemplate::new(200).set_body_json(json!({
            "usage": [
                {"date": "2025-01-10T21:00:00.000+13:00", "value": "0.8", "unchargedValue": "0.8"},
                {"date": "2025-01-10T22:00:00.000+13:00", "value": "0.6", "unchargedValue": "0.6"},
            ]
        })),
    )
    .await;

    let client = client(&server);
    client.set_token("tok").await;
    let records = client
        .get_usage("C1", Resolution::Hourly, date("2025-01-10"), date("2025-01-10"))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.paid_kwh.abs() < 1e-9));
    assert_eq!(
        records[0].key(Resolution::Hourly).as_deref(),
        Some("2025-01-10T21:00:00+13:00")
    );
}

#[tokio::test]
async fn first_request_logs_in_on_demand() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 1).await;
    mount_usage(&server, "fresh", ResponseTemplate::new(200).set_body_json(json!([]))).await;

    let records = client(&server)
        .get_usage("C1", Resolution::Monthly, date("2024-01-01"), date("2024-12-31"))
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn expired_session_is_renewed_once() {
    let server = MockServer::start().await;
    mount_login(&server, "fresh", 1).await;
    mount_usage(&server, "stale", ResponseTemplate::new(401)).await;
    mount_usage(
        &server,
        "fresh",
        ResponseTemplate::new(200).set_body_json(json!([{"date": "2025-01-10", "value": 4.0}])),
    )
    .await;

    let client = client(&server);
    client.set_token("stale").await;
    let records = client
        .get_usage("C1", Resolution::Daily, date("2025-01-10"), date("2025-01-10"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn repeated_unauthorized_is_an_auth_error() {
    let server = MockServer::start().await;
    mount_login(&server, "still-bad", 1).await;
    mount_usage(&server, "stale", ResponseTemplate::new(401)).await;
    mount_usage(&server, "still-bad", ResponseTemplate::new(401)).await;

    let client = client(&server);
    client.set_token("stale").await;
    let err = client
        .get_usage("C1", Resolution::Daily, date("2025-01-10"), date("2025-01-10"))
        .await
        .unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn usage_statuses_map_onto_the_error_taxonomy() {
    let cases = [
        (403, "auth"),
        (404, "api"),
        (422, "api"),
        (500, "network"),
        (503, "network"),
    ];
    for (status, kind) in cases {
        let server = MockServer::start().await;
        mount_usage(
            &server,
            "tok",
            ResponseTemplate::new(status).set_body_string("upstream said no"),
        )
        .await;

        let client = client(&server);
        client.set_token("tok").await;
        let err = client
            .get_usage("C1", Resolution::Daily, date("2025-01-10"), date("2025-01-10"))
            .await
            .unwrap_err();
        let actual = match err {
            MeterbookError::Auth { .. } => "auth",
            MeterbookError::Api { .. } => "api",
            MeterbookError::Network { .. } => "network",
            _ => "other",
        };
        assert_eq!(actual, kind, "status {}", status);
    }
}

#[tokio::test]
async fn malformed_usage_body_is_an_api_error() {
    let server = MockServer::start().await;
    mount_usage(&server, "tok", ResponseTemplate::new(200).set_body_string("<html>")).await;

    let client = client(&server);
    client.set_token("tok").await;
    let err = client
        .get_usage("C1", Resolution::Daily, date("2025-01-10"), date("2025-01-10"))
        .await
        .unwrap_err();
    assert!(matches!(err, MeterbookError::Api { .. }));
}

#[tokio::test]
async fn first_contract_comes_from_the_accounts_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/v2"))
        .and(query_param("ba", "A1"))
        .and(header("session", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accountsSummary": [
                {"id": "A1", "nickname": "Home", "contracts": [{"contractId": "C1", "icp": "0000123456UN001"}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    client.set_token("tok").await;
    let contract = client.first_contract().await.unwrap();
    assert_eq!(contract.account_id, "A1");
    assert_eq!(contract.contract_id, "C1");
    assert_eq!(contract.nickname.as_deref(), Some("Home"));
}

#[tokio::test]
async fn empty_accounts_summary_has_no_contract() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accountsSummary": [] })))
        .mount(&server)
        .await;

    let client = client(&server);
    client.set_token("tok").await;
    assert!(matches!(
        client.first_contract().await.unwrap_err(),
        MeterbookError::Api { .. }
    ));
}
