//! End-to-end tests: credentials → session → gateway → tool dispatch
//! against a mock CRM.

use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fundwise_sf_api::auth::{Credentials, SessionManager};
use fundwise_sf_api::client::ClientConfig;
use fundwise_sf_api::ops::{CrmGateway, ResponseCache, ToolRequest, ToolRouter};

fn oauth_credentials() -> Credentials {
    Credentials::OAuthRefresh {
        client_id: "client123".into(),
        client_secret: "secret456".into(),
        refresh_token: "refresh789".into(),
        instance_url: None,
        domain: "login".into(),
    }
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-token-1",
            "instance_url": server.uri()
        })))
        .mount(server)
        .await;
}

async fn router_against(server: &MockServer) -> ToolRouter {
    mount_token_endpoint(server).await;
    let sessions = SessionManager::with_token_url(
        oauth_credentials(),
        format!("{}/services/oauth2/token", server.uri()),
    );
    let gateway =
        CrmGateway::with_parts(sessions, ClientConfig::default(), ResponseCache::new()).unwrap();
    ToolRouter::new(gateway)
}

fn donor_page() -> Value {
    json!({
        "totalSize": 2,
        "done": true,
        "records": [
            {
                "Id": "003000000000001AAA",
                "Name": "Ada Lovelace",
                "Email": "ada@example.org",
                "npo02__TotalOppAmount__c": 12500.0,
                "npo02__LastCloseDate__c": "2025-05-01"
            },
            {
                "Id": "003000000000002AAA",
                "Name": "Grace Hopper",
                "Email": "grace@example.org",
                "npo02__TotalOppAmount__c": 980.0,
                "npo02__LastCloseDate__c": "2025-04-02"
            }
        ]
    })
}

#[tokio::test]
async fn mutation_invalidates_cached_segment_reads() {
    let server = MockServer::start().await;
    let router = router_against(&server).await;

    // Two query round-trips expected: the cached repeat must not hit the
    // server until the mutation clears the cache.
    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(donor_page()))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/services/data/v62.0/sobjects/Opportunity"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "006000000000001AAA",
            "success": true,
            "errors": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let read = ToolRequest {
        operation: "query_donors".into(),
        parameters: json!({"segment": "recent", "lookback_months": 6}),
    };

    let first = router.dispatch(&read).await;
    assert!(first.ok, "{:?}", first);

    // Cache hit: no additional query request.
    let cached = router.dispatch(&read).await;
    assert!(cached.ok);
    assert_eq!(cached.data, first.data);

    let mutation = router
        .dispatch(&ToolRequest {
            operation: "create_opportunity".into(),
            parameters: json!({
                "Name": "FY25 Major Gift",
                "StageName": "Closed Won",
                "CloseDate": "2025-10-01",
                "Amount": 5000
            }),
        })
        .await;
    assert!(mutation.ok, "{:?}", mutation);
    assert_eq!(mutation.data.as_ref().unwrap()["amount_display"], "$5,000.00");

    // Miss after invalidation: this is the second expected query request.
    let repeat = router.dispatch(&read).await;
    assert!(repeat.ok);
}

#[tokio::test]
async fn expired_session_is_refreshed_transparently_once() {
    let server = MockServer::start().await;

    // Token endpoint: initial acquire plus the post-401 refresh.
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-token-1",
            "instance_url": server.uri()
        })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/query"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!([{
            "errorCode": "INVALID_SESSION_ID",
            "message": "Session expired or invalid"
        }])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(donor_page()))
        .expect(1)
        .mount(&server)
        .await;

    let sessions = SessionManager::with_token_url(
        oauth_credentials(),
        format!("{}/services/oauth2/token", server.uri()),
    );
    let router = ToolRouter::new(CrmGateway::new(sessions).unwrap());

    // The 401 is invisible to the caller: one refresh, one retry, success.
    let response = router
        .dispatch(&ToolRequest {
            operation: "query_donors".into(),
            parameters: json!({"segment": "major", "min_amount": 1000}),
        })
        .await;
    assert!(response.ok, "{:?}", response);
    assert_eq!(response.data.unwrap()["count"], 2);
}

#[tokio::test]
async fn rate_limit_surfaces_with_hint_and_no_retry() {
    let server = MockServer::start().await;
    let router = router_against(&server).await;

    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/query"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "120")
                .set_body_json(json!([{
                    "errorCode": "REQUEST_LIMIT_EXCEEDED",
                    "message": "TotalRequests Limit exceeded."
                }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = router
        .dispatch(&ToolRequest {
            operation: "query_donors".into(),
            parameters: json!({"segment": "recent", "lookback_months": 3}),
        })
        .await;

    assert!(!response.ok);
    assert_eq!(response.error_kind.as_deref(), Some("rate_limited"));
    assert_eq!(response.retry_after_secs, Some(120));
}

#[tokio::test]
async fn profile_lookup_round_trip_and_identifier_cache() {
    let server = MockServer::start().await;
    let router = router_against(&server).await;

    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 1,
            "done": true,
            "records": [{
                "Id": "003000000000001AAA",
                "Name": "Ada Lovelace",
                "Email": "ada@example.org",
                "Phone": "555-0100",
                "MailingCity": "London",
                "MailingState": "",
                "npo02__TotalOppAmount__c": 12500.0,
                "npo02__LastCloseDate__c": "2025-05-01"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = ToolRequest {
        operation: "get_donor_profile".into(),
        parameters: json!({"identifier": "003000000000001AAA"}),
    };

    let first = router.dispatch(&request).await;
    assert!(first.ok, "{:?}", first);
    let profile = &first.data.as_ref().unwrap()["profile"];
    assert_eq!(profile["Name"], "Ada Lovelace");
    assert_eq!(profile["LifetimeGivingDisplay"], "$12,500.00");

    // Same identifier again: served from the cache (expect(1) above).
    let second = router.dispatch(&request).await;
    assert!(second.ok);
    assert_eq!(second.data, first.data);
}

#[tokio::test]
async fn find_prospects_scores_and_sorts_by_lifetime_giving() {
    let server = MockServer::start().await;
    let router = router_against(&server).await;

    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 2,
            "done": true,
            "records": [
                {"Id": "003000000000002AAA", "Name": "Grace Hopper",
                 "npo02__TotalOppAmount__c": 980.0},
                {"Id": "003000000000001AAA", "Name": "Ada Lovelace",
                 "npo02__TotalOppAmount__c": 12500.0}
            ]
        })))
        .mount(&server)
        .await;

    let response = router
        .dispatch(&ToolRequest {
            operation: "find_prospects".into(),
            parameters: json!({}),
        })
        .await;

    assert!(response.ok, "{:?}", response);
    let records = response.data.unwrap()["records"].clone();
    // Highest lifetime giving first.
    assert_eq!(records[0]["Name"], "Ada Lovelace");
    assert_eq!(records[0]["ProspectScore"], 12.5);
    assert_eq!(records[1]["ProspectScore"], 0.98);
}

#[tokio::test]
async fn analytics_operations_aggregate_and_format() {
    let server = MockServer::start().await;
    let router = router_against(&server).await;

    // Both analytics reads go through the same query endpoint; respond with
    // an aggregate row that satisfies either projection.
    Mock::given(method("GET"))
        .and(path("/services/data/v62.0/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 1,
            "done": true,
            "records": [{
                "gift_year": 2025,
                "gift_month": 6,
                "gift_count": 42,
                "total_amount": 61234.5,
                "total_raised": 61234.5,
                "average_gift": 1458.0
            }]
        })))
        .mount(&server)
        .await;

    let patterns = router
        .dispatch(&ToolRequest {
            operation: "analyze_giving_patterns".into(),
            parameters: json!({"months": 6}),
        })
        .await;
    assert!(patterns.ok, "{:?}", patterns);
    let data = patterns.data.unwrap();
    assert_eq!(data["months"], 6);
    assert_eq!(data["buckets"][0]["gift_count"], 42);

    let metrics = router
        .dispatch(&ToolRequest {
            operation: "get_portfolio_metrics".into(),
            parameters: json!({}),
        })
        .await;
    assert!(metrics.ok, "{:?}", metrics);
    let data = metrics.data.unwrap();
    assert_eq!(data["total_display"], "$61,234.50");

    // Analytics take no arbitrary parameters.
    let rejected = router
        .dispatch(&ToolRequest {
            operation: "get_portfolio_metrics".into(),
            parameters: json!({"region": "EMEA"}),
        })
        .await;
    assert!(!rejected.ok);
    assert_eq!(rejected.error_kind.as_deref(), Some("validation_failed"));
}

#[tokio::test]
async fn incomplete_credentials_fail_before_any_network_use() {
    let err = Credentials::from_lookup(|_| None).unwrap_err();
    assert_eq!(err.kind_label(), "config");
}
