use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::models::{AutomationTrigger, BookingStatus};
use booking_cell::router::{booking_routes, webhook_routes, BookingState};
use booking_cell::services::automation::BookingAutomationService;
use availability_cell::SlotCache;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockPostgrestResponses, TestConfig, TestUser};

fn test_config(server: &MockServer) -> AppConfig {
    let base = TestConfig {
        supabase_url: server.uri(),
        calendar_api_base_url: server.uri(),
        ..TestConfig::default()
    };
    base.to_app_config()
}

fn test_state(config: &AppConfig) -> Arc<BookingState> {
    Arc::new(BookingState {
        config: config.clone(),
        slot_cache: SlotCache::new(StdDuration::from_secs(60), 16),
    })
}

fn booking_app(state: Arc<BookingState>) -> Router {
    booking_routes(state)
}

/// A future weekday morning (10:00 in the business timezone), safely
/// past the minimum lead time and clear of weekend surcharges.
fn future_weekday_morning() -> DateTime<Utc> {
    let mut candidate = Utc::now() + Duration::days(3);
    while matches!(candidate.weekday(), Weekday::Sat | Weekday::Sun) {
        candidate += Duration::days(1);
    }
    // 10:00 at UTC-6 is 16:00Z.
    candidate
        .date_naive()
        .and_hms_opt(16, 0, 0)
        .unwrap()
        .and_utc()
}

async fn mount_empty_guard_query(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param(
            "status",
            "in.(payment_pending,confirmed,scheduled,ready_for_service,in_progress)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_service_lookup(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .and(query_param("service_type", "eq.STANDARD_NOTARY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::service_response("STANDARD_NOTARY", 60, 7_500)
        ])))
        .mount(server)
        .await;
}

async fn mount_append_only_sinks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_status_events"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockPostgrestResponses::status_event_response(Uuid::new_v4(), None, "requested")
        ])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notification_log"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .mount(server)
        .await;
}

fn create_booking_body(scheduled: DateTime<Utc>, customer_email: &str) -> Value {
    json!({
        "service_type": "STANDARD_NOTARY",
        "scheduled_date_time": scheduled.to_rfc3339(),
        "customer_name": "Test Customer",
        "customer_email": customer_email,
        "location_type": "mobile",
        "address": "123 Main St, Houston TX",
        "signer_count": 1,
        "document_count": 1,
        "distance_miles": 25.0
    })
}

fn authed_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("content-type", "application/json");

    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

// ==============================================================================
// BOOKING CREATION
// ==============================================================================

#[tokio::test]
async fn test_create_booking_snapshots_travel_priced_total() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let user = TestUser::client("customer@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, None);

    let scheduled = future_weekday_morning();
    let booking_id = Uuid::new_v4();

    mount_service_lookup(&server).await;
    mount_empty_guard_query(&server).await;
    mount_append_only_sinks(&server).await;

    // The insert echoes the created row, including the authoritative
    // price snapshot: $75 base + $2.50 travel (25 mi vs 20 included).
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "requested",
                scheduled,
                7_750,
            )
        ])))
        .mount(&server)
        .await;

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "POST",
        "/",
        &token,
        Some(create_booking_body(scheduled, "customer@example.com")),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["booking"]["status"], "requested");
    assert_eq!(body["booking"]["price_snapshot_cents"], 7_750);
    assert_eq!(body["booking"]["breakdown"]["travel_cents"], 250);
    assert_eq!(body["booking"]["breakdown"]["total_cents"], 7_750);
}

#[tokio::test]
async fn test_create_booking_conflicting_window_is_rejected() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let user = TestUser::client("customer@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, None);

    let scheduled = future_weekday_morning();

    mount_service_lookup(&server).await;

    // An active booking already holds an overlapping window.
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param(
            "status",
            "in.(payment_pending,confirmed,scheduled,ready_for_service,in_progress)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                Uuid::new_v4(),
                "STANDARD_NOTARY",
                "scheduled",
                scheduled,
                7_500,
            )
        ])))
        .mount(&server)
        .await;

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "POST",
        "/",
        &token,
        Some(create_booking_body(scheduled, "customer@example.com")),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = response_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("no longer available"));
}

#[tokio::test]
async fn test_create_booking_losing_insert_race_maps_to_conflict() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let user = TestUser::client("customer@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, None);

    let scheduled = future_weekday_morning();

    mount_service_lookup(&server).await;
    mount_empty_guard_query(&server).await;

    // Both concurrent requests passed the advisory check; the unique
    // slot-key index rejects the second insert.
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(409).set_body_string(
            "duplicate key value violates unique constraint \"bookings_slot_key_active_idx\"",
        ))
        .mount(&server)
        .await;

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "POST",
        "/",
        &token,
        Some(create_booking_body(scheduled, "customer@example.com")),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_booking_rejects_lead_time_violation() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let user = TestUser::client("customer@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, None);

    // Thirty minutes out is inside the two-hour minimum lead time.
    let scheduled = Utc::now() + Duration::minutes(30);

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "POST",
        "/",
        &token,
        Some(create_booking_body(scheduled, "customer@example.com")),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_booking_for_other_customer_requires_staff() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let user = TestUser::client("someone-else@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, None);

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "POST",
        "/",
        &token,
        Some(create_booking_body(
            future_weekday_morning(),
            "customer@example.com",
        )),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let user = TestUser::client("customer@example.com");
    let token = JwtTestUtils::create_expired_token(&user, &config.supabase_jwt_secret);

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "POST",
        "/",
        &token,
        Some(create_booking_body(
            future_weekday_morning(),
            "customer@example.com",
        )),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_booking_requires_token() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    let app = booking_app(test_state(&config));
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(
            create_booking_body(future_weekday_morning(), "customer@example.com").to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ==============================================================================
// STATUS TRANSITIONS
// ==============================================================================

#[tokio::test]
async fn test_illegal_transition_is_rejected_naming_both_states() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let staff = TestUser::staff("dispatcher@example.com");
    let token = JwtTestUtils::create_test_token(&staff, &config.supabase_jwt_secret, None);

    let booking_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", booking_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "requested",
                future_weekday_morning(),
                7_750,
            )
        ])))
        .mount(&server)
        .await;

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "PATCH",
        &format!("/{}/status", booking_id),
        &token,
        Some(json!({ "target_status": "completed" })),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = response_json(response).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("requested"));
    assert!(message.contains("completed"));
}

#[tokio::test]
async fn test_legal_transition_commits_and_reports_both_states() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let staff = TestUser::staff("dispatcher@example.com");
    let token = JwtTestUtils::create_test_token(&staff, &config.supabase_jwt_secret, None);

    let booking_id = Uuid::new_v4();
    let scheduled = future_weekday_morning();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", booking_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "payment_pending",
                scheduled,
                7_750,
            )
        ])))
        .mount(&server)
        .await;
    mount_append_only_sinks(&server).await;

    // Compare-and-swap on the previous status.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", booking_id)))
        .and(query_param("status", "eq.payment_pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "confirmed",
                scheduled,
                7_750,
            )
        ])))
        .mount(&server)
        .await;

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "PATCH",
        &format!("/{}/status", booking_id),
        &token,
        Some(json!({ "target_status": "confirmed", "reason": "deposit received" })),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["previous_status"], "payment_pending");
    assert_eq!(body["new_status"], "confirmed");
}

#[tokio::test]
async fn test_concurrent_status_writer_gets_conflict() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let staff = TestUser::staff("dispatcher@example.com");
    let token = JwtTestUtils::create_test_token(&staff, &config.supabase_jwt_secret, None);

    let booking_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", booking_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "payment_pending",
                future_weekday_morning(),
                7_750,
            )
        ])))
        .mount(&server)
        .await;
    mount_append_only_sinks(&server).await;

    // Empty result: another writer already moved the status.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "PATCH",
        &format!("/{}/status", booking_id),
        &token,
        Some(json!({ "target_status": "confirmed" })),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_client_cannot_complete_bookings() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let client = TestUser::client("customer@example.com");
    let token = JwtTestUtils::create_test_token(&client, &config.supabase_jwt_secret, None);

    let app = booking_app(test_state(&config));
    let request = authed_request(
        "PATCH",
        &format!("/{}/status", Uuid::new_v4()),
        &token,
        Some(json!({ "target_status": "completed" })),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ==============================================================================
// STATUS READS + AUTOMATION
// ==============================================================================

#[tokio::test]
async fn test_status_read_surfaces_no_show_suggestion_without_applying() {
    let server = MockServer::start().await;
    let config = test_config(&server);
    let staff = TestUser::staff("dispatcher@example.com");
    let token = JwtTestUtils::create_test_token(&staff, &config.supabase_jwt_secret, None);

    let booking_id = Uuid::new_v4();
    // Appointment time two hours in the past, nobody checked in.
    let scheduled = Utc::now() - Duration::hours(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", booking_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "scheduled",
                scheduled,
                7_750,
            )
        ])))
        .mount(&server)
        .await;

    let app = booking_app(test_state(&config));
    let request = authed_request("GET", &format!("/{}/status", booking_id), &token, None);

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    // Suggestion only; the stored status is untouched by default.
    assert_eq!(body["status"], "scheduled");
    assert_eq!(
        body["automation_suggestion"]["suggested_status"],
        "no_show"
    );
    let next: Vec<&str> = body["valid_next_statuses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(next.contains(&"no_show"));
    assert!(next.contains(&"in_progress"));
}

#[tokio::test]
async fn test_progress_is_idempotent_and_appends_no_duplicate_audit() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    let booking_id = Uuid::new_v4();
    // Already scheduled, appointment still ahead: nothing to do.
    let scheduled = Utc::now() + Duration::hours(6);

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", booking_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "scheduled",
                scheduled,
                7_750,
            )
        ])))
        .mount(&server)
        .await;

    // No transition may be attempted: zero audit appends expected.
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_status_events"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .expect(0)
        .mount(&server)
        .await;

    let cache = SlotCache::new(StdDuration::from_secs(60), 16);
    let automation = BookingAutomationService::new(&config, cache);

    let first = automation
        .progress_booking_status(booking_id, AutomationTrigger::TimeElapsed, None)
        .await
        .unwrap();
    let second = automation
        .progress_booking_status(booking_id, AutomationTrigger::TimeElapsed, None)
        .await
        .unwrap();

    assert!(first.is_none());
    assert!(second.is_none());
}

// ==============================================================================
// PAYMENT WEBHOOK
// ==============================================================================

async fn mount_payment_intent_lookup(
    server: &MockServer,
    booking_id: Uuid,
    status: &str,
    snapshot_cents: i64,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("payment_intent_id", "eq.pi_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                status,
                future_weekday_morning(),
                snapshot_cents,
            )
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_payment_capture_confirms_booking() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    let booking_id = Uuid::new_v4();
    mount_payment_intent_lookup(&server, booking_id, "payment_pending", 7_750).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", booking_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "payment_pending",
                future_weekday_morning(),
                7_750,
            )
        ])))
        .mount(&server)
        .await;
    mount_append_only_sinks(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("status", "eq.payment_pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::booking_response(
                booking_id,
                "STANDARD_NOTARY",
                "confirmed",
                future_weekday_morning(),
                7_750,
            )
        ])))
        .mount(&server)
        .await;

    let app = webhook_routes(test_state(&config));
    let request = Request::builder()
        .method("POST")
        .uri("/payment")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "payment_intent_id": "pi_test_123",
                "status": "succeeded",
                "amount_cents": 7_750
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["transition"]["new_status"], "confirmed");
}

#[tokio::test]
async fn test_payment_amount_mismatch_is_fatal_and_applies_nothing() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    let booking_id = Uuid::new_v4();
    mount_payment_intent_lookup(&server, booking_id, "payment_pending", 7_750).await;

    // No transition and no audit append may happen on a mismatch.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{}])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_status_events"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .expect(0)
        .mount(&server)
        .await;

    let app = webhook_routes(test_state(&config));
    let request = Request::builder()
        .method("POST")
        .uri("/payment")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "payment_intent_id": "pi_test_123",
                "status": "succeeded",
                "amount_cents": 9_999
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_payment_intent_is_not_found() {
    let server = MockServer::start().await;
    let config = test_config(&server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let app = webhook_routes(test_state(&config));
    let request = Request::builder()
        .method("POST")
        .uri("/payment")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "payment_intent_id": "pi_unknown",
                "status": "succeeded",
                "amount_cents": 7_750
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==============================================================================
// LIFECYCLE TABLE (service level, via BookingStatus wire names)
// ==============================================================================

#[test]
fn test_status_wire_names_round_trip() {
    for status in [
        BookingStatus::Requested,
        BookingStatus::PaymentPending,
        BookingStatus::Confirmed,
        BookingStatus::Scheduled,
        BookingStatus::AwaitingClientAction,
        BookingStatus::ReadyForService,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::RequiresReschedule,
        BookingStatus::NoShow,
        BookingStatus::CancelledByClient,
        BookingStatus::CancelledByStaff,
        BookingStatus::Archived,
    ] {
        let wire = serde_json::to_value(status).unwrap();
        assert_eq!(wire, json!(status.to_string()));
        let parsed: BookingStatus = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed, status);
    }
}
