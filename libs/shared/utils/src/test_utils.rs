use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, PaymentGatewayConfig};
use shared_database::InMemoryStore;
use shared_models::{
    appointment::{Appointment, AppointmentStatus},
    auth::User,
    inventory::{Batch, BatchStatus},
};

use crate::state::AppState;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub gateway_endpoint: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            gateway_endpoint: "http://localhost:9999/v2/gateway/api/create".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_gateway(endpoint: &str) -> Self {
        Self {
            gateway_endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            payment: PaymentGatewayConfig {
                endpoint: self.gateway_endpoint.clone(),
                partner_code: "MOMOTEST".to_string(),
                access_key: "test-access-key".to_string(),
                secret_key: "test-gateway-secret".to_string(),
                redirect_url: "http://localhost:5173/payment-result".to_string(),
                ipn_base_url: "http://localhost:3000".to_string(),
                timeout_seconds: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }

    /// State over a fresh in-memory store; the store handle is returned for
    /// seeding and inspection.
    pub fn to_state(&self) -> (Arc<AppState>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(self.to_arc(), store.clone());
        (Arc::new(state), store)
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
            role: "patient".to_string(),
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

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn pharmacist(email: &str) -> Self {
        Self::new(email, "pharmacist")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
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
    fn sign(payload: serde_json::Value, secret: &str) -> String {
        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
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

    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        Self::sign(
            json!({
                "sub": user.id,
                "email": user.email,
                "role": user.role,
                "iat": now.timestamp(),
                "exp": exp.timestamp()
            }),
            secret,
        )
    }

    /// Token shaped like Supabase issues it: clinic role in `app_metadata`.
    pub fn create_token_with_app_role(user: &TestUser, secret: &str, db_role: &str) -> String {
        let now = Utc::now();
        Self::sign(
            json!({
                "sub": user.id,
                "email": user.email,
                "role": db_role,
                "app_metadata": { "role": user.role },
                "iat": now.timestamp(),
                "exp": (now + Duration::hours(1)).timestamp()
            }),
            secret,
        )
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

// ==============================================================================
// RECORD FIXTURES
// ==============================================================================

pub struct Fixtures;

impl Fixtures {
    pub fn appointment(
        id: i64,
        patient_id: Uuid,
        doctor_id: Uuid,
        at: DateTime<Utc>,
        status: AppointmentStatus,
    ) -> Appointment {
        let created = at - Duration::days(3);
        Appointment {
            id,
            patient_id,
            doctor_id,
            appointment_datetime: at,
            fee: 200_000,
            status,
            note: None,
            compensation_code_id: None,
            cancelled_by: None,
            cancel_reason: None,
            cancelled_at: None,
            accepted_at: (status != AppointmentStatus::WaitingForConfirmation).then_some(created),
            completed_at: (status == AppointmentStatus::Completed).then_some(at),
            rescheduled_from_id: None,
            rescheduled_to_id: None,
            created_at: created,
            updated_at: created,
        }
    }

    pub fn batch(id: i64, medicine_id: i64, quantity: i32, expiry_date: NaiveDate) -> Batch {
        Batch {
            id,
            medicine_id,
            quantity,
            import_date: expiry_date - Duration::days(365),
            expiry_date,
            status: BatchStatus::Active,
            updated_at: None,
        }
    }
}
