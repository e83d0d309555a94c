use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub calendar_api_base_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            calendar_api_base_url: "http://localhost:54322".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        let mut calendar_ids = std::collections::HashMap::new();
        for service_type in shared_config::KNOWN_SERVICE_TYPES {
            calendar_ids.insert(service_type.to_string(), format!("cal_{}", service_type.to_lowercase()));
        }

        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            calendar_api_base_url: self.calendar_api_base_url.clone(),
            calendar_api_key: "test-calendar-key".to_string(),
            calendar_timeout_secs: 2,
            calendar_ids,
            scheduling: shared_config::SchedulingConfig::default(),
            automation: shared_config::AutomationConfig::default(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "client".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn client(email: &str) -> Self {
        Self::new(email, "client")
    }

    pub fn staff(email: &str) -> Self {
        Self::new(email, "staff")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }
}

/// Canned PostgREST rows used across cell integration tests.
pub struct MockPostgrestResponses;

impl MockPostgrestResponses {
    pub fn service_response(service_type: &str, duration_minutes: i64, base_price_cents: i64) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "service_type": service_type,
            "name": "Test Service",
            "duration_minutes": duration_minutes,
            "base_price_cents": base_price_cents,
            "deposit_required": false,
            "deposit_cents": 0,
            "is_active": true,
            "external_calendar_id": format!("cal_{}", service_type.to_lowercase())
        })
    }

    pub fn booking_response(
        booking_id: Uuid,
        service_type: &str,
        status: &str,
        scheduled: DateTime<Utc>,
        price_snapshot_cents: i64,
    ) -> Value {
        json!({
            "id": booking_id,
            "service_type": service_type,
            "scheduled_date_time": scheduled.to_rfc3339(),
            "duration_minutes": 60,
            "status": status,
            "location_type": "mobile",
            "address": "123 Main St",
            "customer_name": "Test Customer",
            "customer_email": "customer@example.com",
            "customer_phone": null,
            "price_snapshot_cents": price_snapshot_cents,
            "deposit_cents": 0,
            "deposit_status": "not_required",
            "promo_code": null,
            "discount_cents": 0,
            "payment_intent_id": "pi_test_123",
            "notes": null,
            "external_contact_id": null,
            "external_event_id": null,
            "slot_key": format!("cal_{}:{}", service_type.to_lowercase(), scheduled.to_rfc3339()),
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn status_event_response(booking_id: Uuid, from: Option<&str>, to: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "booking_id": booking_id,
            "from_status": from,
            "to_status": to,
            "actor": "system",
            "reason": null,
            "created_at": Utc::now().to_rfc3339()
        })
    }
}
